//! Reactive object model for Trellis.
//!
//! This crate provides the model layer of an MVC desktop toolkit:
//!
//! - **Schemas**: declare a model type's properties and signals once,
//!   instantiate it many times
//! - **Reactive Properties**: attribute writes emit change notifications
//!   automatically, with change detection by value equality
//! - **Derived Attributes**: assign a computation instead of a value and
//!   the attribute recomputes whenever anything it read changes —
//!   dependencies are discovered implicitly, never declared
//! - **Signals**: per-instance named events with ordered, synchronous
//!   delivery and stable subscription IDs
//! - **Containment**: ordered child lists with `child-added` /
//!   `child-removed` notifications
//!
//! # Reactive Property Example
//!
//! ```
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use trellis_model::{Model, ModelSchema, Value};
//!
//! let schema = ModelSchema::builder("Candy")
//!     .property("foo", "foo")
//!     .property("bar", "bar")
//!     .build()
//!     .unwrap();
//! let m = Model::new(&schema).unwrap();
//!
//! // Watch every attribute change on the instance.
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let seen_clone = seen.clone();
//! m.connect("attribute-changed", move |args| {
//!     seen_clone.lock().push(args[0].clone());
//!     Ok(())
//! })
//! .unwrap();
//!
//! m.set("foo", "candy").unwrap();
//! m.set("foo", "candy").unwrap(); // unchanged: no notification
//!
//! assert_eq!(*seen.lock(), vec![Value::from("foo")]);
//! ```
//!
//! # Derived Attribute Example
//!
//! ```
//! use trellis_model::{Assignment, Model, ModelSchema, Value};
//!
//! let schema = ModelSchema::builder("Greeting")
//!     .property("name", "world")
//!     .build()
//!     .unwrap();
//! let m = Model::new(&schema).unwrap();
//!
//! let other_schema = ModelSchema::builder("Banner")
//!     .property("text", Value::Null)
//!     .build()
//!     .unwrap();
//! let banner = Model::new(&other_schema).unwrap();
//!
//! // `text` now tracks `name` on the other instance.
//! banner
//!     .set(
//!         "text",
//!         Assignment::computed(move || {
//!             Ok(Value::from(format!("hello, {}", m.get("name")?)))
//!         }),
//!     )
//!     .unwrap();
//! assert_eq!(banner.get("text").unwrap(), Value::from("hello, world"));
//!
//! m.set("name", "trellis").unwrap();
//! assert_eq!(banner.get("text").unwrap(), Value::from("hello, trellis"));
//! ```
//!
//! # Threading
//!
//! Handles are `Send + Sync`, but the engine is a single-threaded
//! cooperative core: dependency capture state is thread-local and change
//! propagation is synchronous on the calling thread. Drive a given model
//! graph from one logical thread (the UI thread), or serialize access
//! externally.

mod capture;
mod error;
mod property;

pub mod logging;
pub mod model;
pub mod schema;
pub mod signal;
pub mod value;

pub use error::{ModelError, Result, SignalError, ValueError};
pub use logging::ModelTreeDebug;
pub use model::{Children, Model, ModelId};
pub use property::{Assignment, Generator};
pub use schema::{
    changed_signal_name, ComputeFn, ModelSchema, PropertyDefault, SchemaBuilder, SignalDecl,
    ATTRIBUTE_CHANGED, CHILD_ADDED, CHILD_REMOVED,
};
pub use signal::SubscriptionId;
pub use value::Value;
