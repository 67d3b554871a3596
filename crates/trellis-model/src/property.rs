//! The property descriptor engine.
//!
//! Each declared property on an instance is in exactly one of two modes:
//!
//! - **literal** — the stored value was assigned directly and there are no
//!   active dependency subscriptions;
//! - **derived** — the stored value is the result of a generator, and the
//!   instance holds one subscription per attribute the generator read
//!   during its last evaluation.
//!
//! Assignment is a tagged choice ([`Assignment`]), not value sniffing.
//! Assigning a literal to a derived property reverts it to literal mode
//! and tears its subscriptions down. Assigning a generator (re)enters
//! derived mode: the generator runs under a capture frame, the reads it
//! performed become the new subscription set, and the freshly computed
//! value is stored.
//!
//! Dependencies are dynamic. Every recompute re-captures from scratch,
//! because a generator may branch and read different attributes on
//! different calls; the subscription set is replaced wholesale each time.
//!
//! Change propagation is synchronous and depth-first: by the time a `set`
//! returns, every transitively dependent property has recomputed and every
//! resulting notification has been delivered. A cyclic dependency graph
//! would recurse forever, so propagation depth is bounded; exceeding the
//! bound fails the triggering call with [`ModelError::DependencyCycle`].
//!
//! A generator that fails leaves its property untouched: previous value,
//! previous subscriptions, no notifications. The error surfaces from the
//! `set` (or upstream `set`) that triggered the evaluation.

use std::cell::Cell;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::capture::CaptureFrame;
use crate::error::{ModelError, Result};
use crate::logging::targets;
use crate::model::{self, Model};
use crate::schema::{ModelSchema, ATTRIBUTE_CHANGED};
use crate::signal::SignalHub;
use crate::value::Value;

/// A zero-argument computation producing a property's value.
///
/// Generators are pure functions of other attributes: they read model
/// properties (which records the dependencies) and combine them. Failures
/// propagate to whoever triggered the evaluation.
pub type Generator = Arc<dyn Fn() -> Result<Value> + Send + Sync>;

/// What to store into a property: a concrete value or a computation.
#[derive(Clone)]
pub enum Assignment {
    /// Store the value directly; the property becomes (or stays) literal.
    Value(Value),
    /// Install the generator; the property becomes derived.
    Computed(Generator),
}

impl Assignment {
    /// Wrap a closure as a derived assignment.
    pub fn computed<F>(generator: F) -> Self
    where
        F: Fn() -> Result<Value> + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(generator))
    }
}

impl fmt::Debug for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Computed(_) => f.debug_tuple("Computed").field(&"<fn>").finish(),
        }
    }
}

impl From<Value> for Assignment {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl From<&str> for Assignment {
    fn from(s: &str) -> Self {
        Self::Value(Value::from(s))
    }
}

impl From<String> for Assignment {
    fn from(s: String) -> Self {
        Self::Value(Value::from(s))
    }
}

impl From<bool> for Assignment {
    fn from(b: bool) -> Self {
        Self::Value(Value::from(b))
    }
}

impl From<i64> for Assignment {
    fn from(n: i64) -> Self {
        Self::Value(Value::from(n))
    }
}

impl From<i32> for Assignment {
    fn from(n: i32) -> Self {
        Self::Value(Value::from(n))
    }
}

impl From<f64> for Assignment {
    fn from(x: f64) -> Self {
        Self::Value(Value::from(x))
    }
}

impl From<Vec<Value>> for Assignment {
    fn from(items: Vec<Value>) -> Self {
        Self::Value(Value::from(items))
    }
}

impl From<Model> for Assignment {
    fn from(m: Model) -> Self {
        Self::Value(Value::from(m))
    }
}

/// One dependency subscription held by a derived property.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DependencyEdge {
    pub(crate) source: Model,
    pub(crate) subscription: crate::signal::SubscriptionId,
}

/// Derived-mode state of a property slot.
pub(crate) struct ComputedBinding {
    pub(crate) generator: Generator,
    pub(crate) edges: Vec<DependencyEdge>,
}

/// Per-instance storage for one declared property.
pub(crate) struct PropertySlot {
    pub(crate) value: Value,
    /// `Some` while derived, `None` while literal.
    pub(crate) binding: Option<ComputedBinding>,
}

impl PropertySlot {
    pub(crate) fn literal(value: Value) -> Self {
        Self {
            value,
            binding: None,
        }
    }
}

/// Bound on synchronous propagation depth. A well-formed dependency graph
/// never comes near it; a cyclic one hits it instead of overflowing the
/// stack.
const MAX_PROPAGATION_DEPTH: usize = 64;

thread_local! {
    static PROPAGATION_DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct PropagationGuard;

impl PropagationGuard {
    fn enter() -> Option<Self> {
        PROPAGATION_DEPTH.with(|depth| {
            if depth.get() >= MAX_PROPAGATION_DEPTH {
                None
            } else {
                depth.set(depth.get() + 1);
                Some(Self)
            }
        })
    }
}

impl Drop for PropagationGuard {
    fn drop(&mut self) {
        PROPAGATION_DEPTH.with(|depth| depth.set(depth.get() - 1));
    }
}

/// Read a property's current value, recording the access if a capture
/// frame is open.
pub(crate) fn read(model: Model, index: usize) -> Result<Value> {
    let value = model::read_registry(|reg| {
        reg.get(model.id()).map(|inst| inst.slots[index].value.clone())
    })
    .ok_or(ModelError::StaleModel)?;
    crate::capture::record_access(model, index);
    Ok(value)
}

/// Store an assignment into a property, propagating all resulting change
/// notifications and recomputes before returning.
pub(crate) fn assign(model: Model, index: usize, assignment: Assignment) -> Result<()> {
    match assignment {
        Assignment::Value(value) => assign_literal(model, index, value),
        Assignment::Computed(generator) => bind_computed(model, index, generator),
    }
}

fn assign_literal(model: Model, index: usize, value: Value) -> Result<()> {
    let (schema, hub) = model::instance_parts(model)?;
    let name = schema.property(index).name.clone();
    let Some(_guard) = PropagationGuard::enter() else {
        return Err(ModelError::DependencyCycle { property: name });
    };

    tracing::trace!(
        target: targets::PROPERTY,
        model = schema.type_name(),
        property = name.as_str(),
        "literal assignment"
    );

    let new = value.clone();
    let (old, changed, edges) = model::write_registry(|reg| -> Result<(Value, bool, Vec<DependencyEdge>)> {
        let inst = reg.get_mut(model.id()).ok_or(ModelError::StaleModel)?;
        let slot = &mut inst.slots[index];
        let changed = !slot.value.try_eq(&value)?;
        let old = std::mem::replace(&mut slot.value, value);
        // Any non-function assignment reverts the property to literal
        // mode, even when the value is unchanged.
        let edges = slot.binding.take().map(|b| b.edges).unwrap_or_default();
        Ok((old, changed, edges))
    })?;

    release_edges(&edges);

    if changed {
        emit_changed(&hub, &schema, index, &old, &new)?;
    }
    Ok(())
}

fn bind_computed(model: Model, index: usize, generator: Generator) -> Result<()> {
    let (schema, hub) = model::instance_parts(model)?;
    let name = schema.property(index).name.clone();
    let Some(_guard) = PropagationGuard::enter() else {
        return Err(ModelError::DependencyCycle { property: name });
    };

    tracing::trace!(
        target: targets::PROPERTY,
        model = schema.type_name(),
        property = name.as_str(),
        "entering derived mode"
    );

    evaluate_and_store(model, index, generator, &schema, &hub)
}

/// Re-evaluate a derived property because one of its dependencies changed.
///
/// Installed as the handler on every dependency's `<prop>-changed` signal.
/// Stale wakeups — the dependent was destroyed, or reverted to literal
/// mode by an earlier handler in the same emit pass — are ignored.
pub(crate) fn recompute(model: Model, index: usize) -> Result<()> {
    let Some((schema, hub, generator)) = model::read_registry(|reg| {
        reg.get(model.id()).and_then(|inst| {
            inst.slots[index]
                .binding
                .as_ref()
                .map(|b| (inst.schema.clone(), inst.hub.clone(), b.generator.clone()))
        })
    }) else {
        return Ok(());
    };

    let name = &schema.property(index).name;
    let Some(_guard) = PropagationGuard::enter() else {
        return Err(ModelError::DependencyCycle {
            property: name.clone(),
        });
    };

    tracing::trace!(
        target: targets::PROPERTY,
        model = schema.type_name(),
        property = name.as_str(),
        "recomputing"
    );

    evaluate_and_store(model, index, generator, &schema, &hub)
}

/// Evaluate `generator` under a fresh capture frame, replace the
/// property's subscription set with the observed dependencies, store the
/// result, and notify if the stored value changed.
fn evaluate_and_store(
    model: Model,
    index: usize,
    generator: Generator,
    schema: &Arc<ModelSchema>,
    hub: &Arc<SignalHub>,
) -> Result<()> {
    let frame = CaptureFrame::begin();
    let result = generator();
    let reads = frame.finish();
    // On failure the previous value and subscription set stay in place.
    let new = result?;

    // Dedupe repeated reads, preserving first-access order.
    let mut seen = HashSet::new();
    let mut new_edges = Vec::new();
    for (source, src_index) in reads {
        if !seen.insert((source, src_index)) {
            continue;
        }
        let Some((source_hub, changed_signal)) = model::read_registry(|reg| {
            reg.get(source.id()).map(|inst| {
                (
                    inst.hub.clone(),
                    inst.schema.property(src_index).changed_signal.clone(),
                )
            })
        }) else {
            // The generator destroyed an instance after reading it; a dead
            // source can never change, so the edge is dropped.
            tracing::warn!(
                target: targets::PROPERTY,
                property = schema.property(index).name.as_str(),
                "dependency on destroyed instance dropped"
            );
            continue;
        };
        let handler: crate::signal::Handler =
            Arc::new(move |_args: &[Value]| recompute(model, index));
        let subscription = source_hub.subscribe(&changed_signal, handler)?;
        new_edges.push(DependencyEdge {
            source,
            subscription,
        });
    }

    // Compare before committing; an incomparable value must not disturb
    // the existing state.
    let old = match model::read_registry(|reg| {
        reg.get(model.id()).map(|inst| inst.slots[index].value.clone())
    }) {
        Some(value) => value,
        None => {
            release_edges(&new_edges);
            return Err(ModelError::StaleModel);
        }
    };
    let changed = match old.try_eq(&new) {
        Ok(equal) => !equal,
        Err(err) => {
            release_edges(&new_edges);
            return Err(err.into());
        }
    };

    // Commit: store the value and swap the subscription set. Even an
    // equal value re-establishes subscriptions, since the dependency set
    // observed by this evaluation replaces the previous one.
    let old_edges = model::write_registry(|reg| -> Result<Vec<DependencyEdge>> {
        let inst = reg.get_mut(model.id()).ok_or(ModelError::StaleModel)?;
        let slot = &mut inst.slots[index];
        slot.value = new.clone();
        Ok(match slot.binding.as_mut() {
            Some(binding) => {
                binding.generator = generator;
                std::mem::replace(&mut binding.edges, new_edges)
            }
            None => {
                slot.binding = Some(ComputedBinding {
                    generator,
                    edges: new_edges,
                });
                Vec::new()
            }
        })
    })?;
    release_edges(&old_edges);

    if changed {
        emit_changed(hub, schema, index, &old, &new)?;
    }
    Ok(())
}

/// Tear down dependency subscriptions. Sources destroyed since the edge
/// was created are skipped.
pub(crate) fn release_edges(edges: &[DependencyEdge]) {
    for edge in edges {
        if let Some(hub) = model::read_registry(|reg| reg.get(edge.source.id()).map(|i| i.hub.clone()))
        {
            let _ = hub.unsubscribe(edge.subscription);
        }
    }
}

/// Emit the change pair for one effective store: the generic
/// `attribute-changed` first, then the property's own `<name>-changed`.
fn emit_changed(
    hub: &Arc<SignalHub>,
    schema: &Arc<ModelSchema>,
    index: usize,
    old: &Value,
    new: &Value,
) -> Result<()> {
    let prop = schema.property(index);
    hub.emit(
        ATTRIBUTE_CHANGED,
        &[
            Value::from(prop.name.as_str()),
            old.clone(),
            new.clone(),
        ],
    )?;
    hub.emit(&prop.changed_signal, &[old.clone(), new.clone()])
}
