//! Model instances.
//!
//! Instances live in a process-wide arena; [`Model`] is a cheap `Copy`
//! handle wrapping the arena key. Handles stay valid as the object graph
//! changes and go stale when the instance is destroyed — every operation
//! on a stale handle fails with [`ModelError::StaleModel`].
//!
//! Construction takes a shared [`ModelSchema`]: literal defaults are
//! stored directly, computed defaults are deferred and evaluated during
//! construction under the capture protocol, establishing the instance's
//! initial dependency subscriptions. This happens once per instance, not
//! once per type — computed defaults are typically bound to the instance
//! they belong to.
//!
//! # Example
//!
//! ```
//! use trellis_model::{Model, ModelSchema, Value};
//!
//! let schema = ModelSchema::builder("Badge")
//!     .property("first", "Ada")
//!     .property("last", "Lovelace")
//!     .computed("full", |m| {
//!         let first = m.get("first")?;
//!         let last = m.get("last")?;
//!         Ok(Value::from(format!("{first} {last}")))
//!     })
//!     .build()
//!     .unwrap();
//!
//! let badge = Model::new(&schema).unwrap();
//! assert_eq!(badge.get("full").unwrap(), Value::from("Ada Lovelace"));
//!
//! badge.set("first", "Grace").unwrap();
//! assert_eq!(badge.get("full").unwrap(), Value::from("Grace Lovelace"));
//! ```

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use slotmap::{new_key_type, SlotMap};

use crate::error::{ModelError, Result};
use crate::logging::targets;
use crate::property::{self, Assignment, Generator, PropertySlot};
use crate::schema::{ModelSchema, PropertyDefault, CHILD_ADDED, CHILD_REMOVED};
use crate::signal::{SignalHub, SubscriptionId};
use crate::value::Value;

new_key_type! {
    /// A unique identifier for a model instance in the arena.
    pub struct ModelId;
}

/// Per-instance data held by the arena.
pub(crate) struct Instance {
    pub(crate) schema: Arc<ModelSchema>,
    /// One slot per declared property, in declaration order.
    pub(crate) slots: Vec<PropertySlot>,
    pub(crate) hub: Arc<SignalHub>,
    /// Ordered containment list.
    pub(crate) children: Vec<Model>,
}

static REGISTRY: OnceLock<RwLock<SlotMap<ModelId, Instance>>> = OnceLock::new();

fn registry() -> &'static RwLock<SlotMap<ModelId, Instance>> {
    REGISTRY.get_or_init(|| RwLock::new(SlotMap::with_key()))
}

/// Run `f` with shared access to the arena.
///
/// The lock must never be held while user code (handlers, generators)
/// runs; callers clone what they need out and release.
pub(crate) fn read_registry<R>(f: impl FnOnce(&SlotMap<ModelId, Instance>) -> R) -> R {
    f(&registry().read())
}

/// Run `f` with exclusive access to the arena. Same holding rule as
/// [`read_registry`].
pub(crate) fn write_registry<R>(f: impl FnOnce(&mut SlotMap<ModelId, Instance>) -> R) -> R {
    f(&mut registry().write())
}

/// Clone out an instance's schema and hub, validating liveness.
pub(crate) fn instance_parts(model: Model) -> Result<(Arc<ModelSchema>, Arc<SignalHub>)> {
    read_registry(|reg| {
        reg.get(model.id())
            .map(|inst| (inst.schema.clone(), inst.hub.clone()))
    })
    .ok_or(ModelError::StaleModel)
}

/// A handle to a model instance.
///
/// `Model` is `Copy`; clone it freely into generators, handlers, and
/// value payloads. Two handles are equal iff they refer to the same
/// instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Model {
    id: ModelId,
}

impl Model {
    /// Construct an instance of `schema`.
    ///
    /// Fails if a computed default's first evaluation fails (the
    /// half-built instance is discarded).
    pub fn new(schema: &Arc<ModelSchema>) -> Result<Model> {
        let mut slots = Vec::with_capacity(schema.property_count());
        let mut deferred = Vec::new();
        for (index, prop) in schema.properties().enumerate() {
            match &prop.default {
                PropertyDefault::Value(value) => {
                    slots.push(PropertySlot::literal(value.clone()));
                }
                PropertyDefault::Computed(compute) => {
                    // Placeholder until the deferred pass below.
                    slots.push(PropertySlot::literal(Value::Null));
                    deferred.push((index, compute.clone()));
                }
            }
        }

        let hub = Arc::new(SignalHub::new(schema.signal_table()));
        let id = write_registry(|reg| {
            reg.insert(Instance {
                schema: schema.clone(),
                slots,
                hub,
                children: Vec::new(),
            })
        });
        let model = Model { id };

        tracing::trace!(
            target: targets::MODEL,
            model = schema.type_name(),
            ?id,
            "constructed instance"
        );

        // Computed defaults are evaluated once per instance, in
        // declaration order, through the regular derived-assignment path.
        for (index, compute) in deferred {
            let generator: Generator = Arc::new(move || compute(model));
            if let Err(err) = property::assign(model, index, Assignment::Computed(generator)) {
                let _ = model.destroy();
                return Err(err);
            }
        }

        Ok(model)
    }

    /// The arena key of this handle.
    pub fn id(&self) -> ModelId {
        self.id
    }

    /// Whether the instance behind this handle still exists.
    pub fn is_alive(&self) -> bool {
        read_registry(|reg| reg.contains_key(self.id))
    }

    /// The instance's schema.
    pub fn schema(&self) -> Result<Arc<ModelSchema>> {
        read_registry(|reg| reg.get(self.id).map(|inst| inst.schema.clone()))
            .ok_or(ModelError::StaleModel)
    }

    fn resolve(&self, name: &str) -> Result<usize> {
        let schema = self.schema()?;
        schema
            .property_index(name)
            .ok_or_else(|| ModelError::UnknownProperty {
                model: schema.type_name().to_string(),
                name: name.to_string(),
            })
    }

    /// Read a property's current value.
    ///
    /// Inside a generator this also records the read as a dependency of
    /// the derived property being evaluated.
    pub fn get(&self, name: &str) -> Result<Value> {
        let index = self.resolve(name)?;
        property::read(*self, index)
    }

    /// Assign a property: a literal value or a computation.
    ///
    /// All resulting notifications and dependent recomputes complete,
    /// depth-first, before this returns.
    pub fn set(&self, name: &str, assignment: impl Into<Assignment>) -> Result<()> {
        let index = self.resolve(name)?;
        property::assign(*self, index, assignment.into())
    }

    /// Subscribe a handler to one of this instance's declared signals.
    pub fn connect<F>(&self, signal: &str, handler: F) -> Result<SubscriptionId>
    where
        F: Fn(&[Value]) -> Result<()> + Send + Sync + 'static,
    {
        let (_, hub) = instance_parts(*self)?;
        Ok(hub.subscribe(signal, Arc::new(handler))?)
    }

    /// Remove a subscription made with [`connect`](Self::connect).
    pub fn disconnect(&self, id: SubscriptionId) -> Result<()> {
        let (_, hub) = instance_parts(*self)?;
        Ok(hub.unsubscribe(id)?)
    }

    /// Emit a declared signal with positional arguments.
    pub fn emit(&self, signal: &str, args: &[Value]) -> Result<()> {
        let (_, hub) = instance_parts(*self)?;
        hub.emit(signal, args)
    }

    /// Number of live subscriptions across all of this instance's
    /// signals, dependency edges included.
    pub fn subscription_count(&self) -> Result<usize> {
        let (_, hub) = instance_parts(*self)?;
        Ok(hub.subscription_count())
    }

    /// Append `child` to the ordered child list and emit `child-added`.
    pub fn add_child(&self, child: Model) -> Result<()> {
        if !child.is_alive() {
            return Err(ModelError::StaleModel);
        }
        let (_, hub) = instance_parts(*self)?;
        write_registry(|reg| {
            reg.get_mut(self.id)
                .map(|inst| inst.children.push(child))
                .ok_or(ModelError::StaleModel)
        })?;
        tracing::trace!(target: targets::MODEL, parent = ?self.id, child = ?child.id, "child added");
        hub.emit(CHILD_ADDED, &[Value::Model(child)])
    }

    /// Remove the first occurrence of `child` and emit `child-removed`.
    pub fn remove_child(&self, child: Model) -> Result<()> {
        let (_, hub) = instance_parts(*self)?;
        write_registry(|reg| {
            let inst = reg.get_mut(self.id).ok_or(ModelError::StaleModel)?;
            match inst.children.iter().position(|c| *c == child) {
                Some(position) => {
                    inst.children.remove(position);
                    Ok(())
                }
                None => Err(ModelError::UnknownChild),
            }
        })?;
        tracing::trace!(target: targets::MODEL, parent = ?self.id, child = ?child.id, "child removed");
        hub.emit(CHILD_REMOVED, &[Value::Model(child)])
    }

    /// Iterate the current children.
    ///
    /// The sequence is a snapshot taken at call time; mutations after the
    /// call do not affect it. Restart by calling again or cloning the
    /// iterator.
    pub fn children(&self) -> Result<Children> {
        read_registry(|reg| {
            reg.get(self.id).map(|inst| Children {
                inner: inst.children.clone().into_iter(),
            })
        })
        .ok_or(ModelError::StaleModel)
    }

    /// Number of children.
    pub fn child_count(&self) -> Result<usize> {
        read_registry(|reg| reg.get(self.id).map(|inst| inst.children.len()))
            .ok_or(ModelError::StaleModel)
    }

    /// All declared properties with their current values, in declaration
    /// order.
    pub fn attributes(&self) -> Result<Vec<(String, Value)>> {
        read_registry(|reg| {
            reg.get(self.id).map(|inst| {
                inst.schema
                    .properties()
                    .zip(inst.slots.iter())
                    .map(|(prop, slot)| (prop.name.clone(), slot.value.clone()))
                    .collect()
            })
        })
        .ok_or(ModelError::StaleModel)
    }

    /// Destroy the instance, releasing its dependency subscriptions.
    ///
    /// Children are not destroyed: containment is not ownership, and a
    /// child may be listed under several parents. Handles to this
    /// instance (including entries in other instances' child lists)
    /// become stale.
    pub fn destroy(&self) -> Result<()> {
        let instance = write_registry(|reg| reg.remove(self.id)).ok_or(ModelError::StaleModel)?;
        for slot in &instance.slots {
            if let Some(binding) = &slot.binding {
                property::release_edges(&binding.edges);
            }
        }
        tracing::trace!(
            target: targets::MODEL,
            model = instance.schema.type_name(),
            id = ?self.id,
            "destroyed instance"
        );
        Ok(())
    }

    /// A handle that refers to nothing. Test scaffolding.
    #[cfg(test)]
    pub(crate) fn dangling() -> Model {
        Model {
            id: ModelId::default(),
        }
    }
}

static_assertions::assert_impl_all!(Model: Send, Sync, Copy);

/// Snapshot iterator over an instance's children.
///
/// Returned by [`Model::children`]; `Clone` it to restart.
#[derive(Debug, Clone)]
pub struct Children {
    inner: std::vec::IntoIter<Model>,
}

impl Iterator for Children {
    type Item = Model;

    fn next(&mut self) -> Option<Model> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Children {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ModelSchema;

    fn plain_schema() -> Arc<ModelSchema> {
        ModelSchema::builder("Plain")
            .property("foo", "foo")
            .property("count", 0i64)
            .build()
            .unwrap()
    }

    #[test]
    fn test_literal_defaults_initialized() {
        let m = Model::new(&plain_schema()).unwrap();
        assert_eq!(m.get("foo").unwrap(), Value::from("foo"));
        assert_eq!(m.get("count").unwrap(), Value::from(0i64));
    }

    #[test]
    fn test_unknown_property_fails() {
        let m = Model::new(&plain_schema()).unwrap();
        let err = m.get("nope").unwrap_err();
        assert!(matches!(err, ModelError::UnknownProperty { .. }));
        let err = m.set("nope", 1i64).unwrap_err();
        assert!(matches!(err, ModelError::UnknownProperty { .. }));
    }

    #[test]
    fn test_attributes_in_declaration_order() {
        let m = Model::new(&plain_schema()).unwrap();
        m.set("count", 5i64).unwrap();
        let attrs = m.attributes().unwrap();
        assert_eq!(
            attrs,
            vec![
                ("foo".to_string(), Value::from("foo")),
                ("count".to_string(), Value::from(5i64)),
            ]
        );
    }

    #[test]
    fn test_destroyed_handle_is_stale() {
        let m = Model::new(&plain_schema()).unwrap();
        assert!(m.is_alive());
        m.destroy().unwrap();
        assert!(!m.is_alive());
        assert_eq!(m.get("foo"), Err(ModelError::StaleModel));
        assert_eq!(m.destroy(), Err(ModelError::StaleModel));
    }

    #[test]
    fn test_children_snapshot_is_stable() {
        let parent = Model::new(&plain_schema()).unwrap();
        let a = Model::new(&plain_schema()).unwrap();
        let b = Model::new(&plain_schema()).unwrap();
        parent.add_child(a).unwrap();

        let snapshot = parent.children().unwrap();
        parent.add_child(b).unwrap();

        assert_eq!(snapshot.collect::<Vec<_>>(), vec![a]);
        assert_eq!(parent.children().unwrap().collect::<Vec<_>>(), vec![a, b]);
    }

    #[test]
    fn test_add_stale_child_rejected() {
        let parent = Model::new(&plain_schema()).unwrap();
        let child = Model::new(&plain_schema()).unwrap();
        child.destroy().unwrap();
        assert_eq!(parent.add_child(child), Err(ModelError::StaleModel));
    }

    #[test]
    fn test_remove_unknown_child_rejected() {
        let parent = Model::new(&plain_schema()).unwrap();
        let stranger = Model::new(&plain_schema()).unwrap();
        assert_eq!(parent.remove_child(stranger), Err(ModelError::UnknownChild));
    }
}
