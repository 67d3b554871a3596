//! Model type schemas.
//!
//! A [`ModelSchema`] is the static registration table for one model type:
//! the ordered set of declared properties (with a literal default or an
//! instance-bound computed default) and the declared signal set. Schemas
//! are built once with [`SchemaBuilder`] and shared between instances via
//! `Arc` — the construction-time declaration surface of the framework.
//!
//! Three built-in signals exist on every type, and each property `p`
//! contributes a generated `p-changed` signal:
//!
//! | signal               | positional args          |
//! |----------------------|--------------------------|
//! | `attribute-changed`  | `name`, `old`, `new`     |
//! | `child-added`        | `child`                  |
//! | `child-removed`      | `child`                  |
//! | `<prop>-changed`     | `old`, `new`             |
//!
//! # Example
//!
//! ```
//! use trellis_model::{ModelSchema, Value};
//!
//! let schema = ModelSchema::builder("Account")
//!     .property("name", "unnamed")
//!     .property("credit", 0.0)
//!     .property("debit", 0.0)
//!     .computed("balance", |m| {
//!         let credit = m.get("credit")?.as_float().unwrap_or(0.0);
//!         let debit = m.get("debit")?.as_float().unwrap_or(0.0);
//!         Ok(Value::from(credit - debit))
//!     })
//!     .signal("reconciled", &["amount"])
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(schema.type_name(), "Account");
//! assert!(schema.has_signal("balance-changed"));
//! assert!(schema.has_signal("reconciled"));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ModelError, Result};
use crate::model::Model;
use crate::value::Value;

/// The generic change event carried by every type: `(name, old, new)`.
pub const ATTRIBUTE_CHANGED: &str = "attribute-changed";
/// Containment event: `(child)`.
pub const CHILD_ADDED: &str = "child-added";
/// Containment event: `(child)`.
pub const CHILD_REMOVED: &str = "child-removed";

/// The generated per-property change signal name: `<prop>-changed`.
pub fn changed_signal_name(property: &str) -> String {
    format!("{property}-changed")
}

/// An instance-bound computation: evaluated against the owning instance on
/// every (re)compute of the property.
pub type ComputeFn = Arc<dyn Fn(Model) -> Result<Value> + Send + Sync>;

/// A property's declared default.
#[derive(Clone)]
pub enum PropertyDefault {
    /// A literal value, stored directly at construction.
    Value(Value),
    /// A computation deferred to construction time, when it is evaluated
    /// under the capture protocol to establish the instance's initial
    /// dependency subscriptions. Bound per instance, not per type.
    Computed(ComputeFn),
}

impl fmt::Debug for PropertyDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Computed(_) => f.debug_tuple("Computed").field(&"<fn>").finish(),
        }
    }
}

/// One declared property.
#[derive(Debug, Clone)]
pub(crate) struct PropertyDecl {
    pub(crate) name: String,
    /// Precomputed `<name>-changed`, resolved on every emit and subscribe.
    pub(crate) changed_signal: String,
    pub(crate) default: PropertyDefault,
}

/// One declared signal: its name and positional argument names.
///
/// Argument names are introspection metadata; delivery is positional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalDecl {
    /// The event name.
    pub name: String,
    /// Names of the positional arguments, in order.
    pub args: Vec<String>,
}

/// The static metadata table for one model type.
///
/// Built with [`ModelSchema::builder`], then shared by reference between
/// every instance of the type.
pub struct ModelSchema {
    type_name: String,
    properties: Vec<PropertyDecl>,
    property_index: HashMap<String, usize>,
    signals: Vec<SignalDecl>,
    signal_index: HashMap<String, usize>,
}

impl ModelSchema {
    /// Start declaring a new model type.
    pub fn builder(type_name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            type_name: type_name.into(),
            properties: Vec::new(),
            signals: Vec::new(),
        }
    }

    /// The declared type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Number of declared properties.
    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    /// Declared property names, in declaration order.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name.as_str())
    }

    /// Whether `name` is a declared property.
    pub fn has_property(&self, name: &str) -> bool {
        self.property_index.contains_key(name)
    }

    /// Declared signal names (built-in, generated, and custom).
    pub fn signal_names(&self) -> impl Iterator<Item = &str> {
        self.signals.iter().map(|s| s.name.as_str())
    }

    /// Whether `name` is in the declared signal set.
    pub fn has_signal(&self, name: &str) -> bool {
        self.signal_index.contains_key(name)
    }

    /// Look up a signal declaration by name.
    pub fn signal(&self, name: &str) -> Option<&SignalDecl> {
        self.signal_index.get(name).map(|&i| &self.signals[i])
    }

    pub(crate) fn property_index(&self, name: &str) -> Option<usize> {
        self.property_index.get(name).copied()
    }

    pub(crate) fn property(&self, index: usize) -> &PropertyDecl {
        &self.properties[index]
    }

    pub(crate) fn properties(&self) -> impl Iterator<Item = &PropertyDecl> {
        self.properties.iter()
    }

    /// `(name, arity)` pairs for seeding an instance's signal hub.
    pub(crate) fn signal_table(&self) -> impl Iterator<Item = (String, usize)> + '_ {
        self.signals.iter().map(|s| (s.name.clone(), s.args.len()))
    }
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSchema")
            .field("type_name", &self.type_name)
            .field("properties", &self.properties)
            .field("signals", &self.signals)
            .finish()
    }
}

/// Builder for [`ModelSchema`].
///
/// Declarations are collected in call order; [`build`](Self::build)
/// validates the whole table and rejects duplicate names.
pub struct SchemaBuilder {
    type_name: String,
    properties: Vec<PropertyDecl>,
    signals: Vec<SignalDecl>,
}

impl SchemaBuilder {
    /// Declare a property with a literal default value.
    pub fn property(mut self, name: &str, default: impl Into<Value>) -> Self {
        self.properties.push(PropertyDecl {
            name: name.to_string(),
            changed_signal: changed_signal_name(name),
            default: PropertyDefault::Value(default.into()),
        });
        self
    }

    /// Declare a derived property.
    ///
    /// `compute` receives the owning instance and is evaluated at
    /// construction and again whenever any attribute it read changes.
    pub fn computed<F>(mut self, name: &str, compute: F) -> Self
    where
        F: Fn(Model) -> Result<Value> + Send + Sync + 'static,
    {
        self.properties.push(PropertyDecl {
            name: name.to_string(),
            changed_signal: changed_signal_name(name),
            default: PropertyDefault::Computed(Arc::new(compute)),
        });
        self
    }

    /// Declare a custom signal with its positional argument names.
    pub fn signal(mut self, name: &str, args: &[&str]) -> Self {
        self.signals.push(SignalDecl {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        });
        self
    }

    /// Validate and freeze the schema.
    pub fn build(self) -> Result<Arc<ModelSchema>> {
        let mut property_index = HashMap::new();
        for (i, prop) in self.properties.iter().enumerate() {
            if property_index.insert(prop.name.clone(), i).is_some() {
                return Err(ModelError::DuplicateProperty {
                    name: prop.name.clone(),
                });
            }
        }

        let mut signals = vec![
            SignalDecl {
                name: ATTRIBUTE_CHANGED.to_string(),
                args: vec!["name".to_string(), "old".to_string(), "new".to_string()],
            },
            SignalDecl {
                name: CHILD_ADDED.to_string(),
                args: vec!["child".to_string()],
            },
            SignalDecl {
                name: CHILD_REMOVED.to_string(),
                args: vec!["child".to_string()],
            },
        ];
        for prop in &self.properties {
            signals.push(SignalDecl {
                name: prop.changed_signal.clone(),
                args: vec!["old".to_string(), "new".to_string()],
            });
        }
        signals.extend(self.signals);

        let mut signal_index = HashMap::new();
        for (i, signal) in signals.iter().enumerate() {
            if signal_index.insert(signal.name.clone(), i).is_some() {
                return Err(ModelError::DuplicateSignal {
                    name: signal.name.clone(),
                });
            }
        }

        Ok(Arc::new(ModelSchema {
            type_name: self.type_name,
            properties: self.properties,
            property_index,
            signals,
            signal_index,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_declarations() {
        let schema = ModelSchema::builder("Thing")
            .property("foo", "foo")
            .property("count", 0i64)
            .signal("poked", &["who", "how_hard"])
            .build()
            .unwrap();

        assert_eq!(schema.type_name(), "Thing");
        assert_eq!(
            schema.property_names().collect::<Vec<_>>(),
            vec!["foo", "count"]
        );
        assert!(schema.has_property("foo"));
        assert!(!schema.has_property("bar"));
    }

    #[test]
    fn test_builtin_and_generated_signals() {
        let schema = ModelSchema::builder("Thing")
            .property("foo", Value::Null)
            .build()
            .unwrap();

        for name in [ATTRIBUTE_CHANGED, CHILD_ADDED, CHILD_REMOVED, "foo-changed"] {
            assert!(schema.has_signal(name), "missing {name}");
        }
        assert_eq!(
            schema.signal(ATTRIBUTE_CHANGED).unwrap().args,
            vec!["name", "old", "new"]
        );
        assert_eq!(schema.signal("foo-changed").unwrap().args, vec!["old", "new"]);
    }

    #[test]
    fn test_duplicate_property_rejected() {
        let err = ModelSchema::builder("Thing")
            .property("foo", 1i64)
            .property("foo", 2i64)
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::DuplicateProperty { .. }));
    }

    #[test]
    fn test_custom_signal_colliding_with_generated_rejected() {
        let err = ModelSchema::builder("Thing")
            .property("foo", 1i64)
            .signal("foo-changed", &["old", "new"])
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::DuplicateSignal { .. }));
    }
}
