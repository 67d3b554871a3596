//! Logging and debugging facilities.
//!
//! Trellis instruments itself with the `tracing` crate. Install a
//! subscriber in your application to see the traces:
//!
//! ```ignore
//! tracing_subscriber::fmt::init();
//! ```
//!
//! Emission, assignment, recompute, and instance lifecycle all trace at
//! `TRACE` level under the targets in [`targets`], so individual
//! subsystems can be filtered with standard `tracing` directives, e.g.
//! `trellis_model::signal=trace`.

use std::fmt::Write as _;

use crate::error::Result;
use crate::model::{read_registry, Model};

/// Target names for log filtering.
pub mod targets {
    /// Model lifecycle and containment.
    pub const MODEL: &str = "trellis_model::model";
    /// Signal subscription and emission.
    pub const SIGNAL: &str = "trellis_model::signal";
    /// Property assignment and recompute.
    pub const PROPERTY: &str = "trellis_model::property";
}

/// Debug visualization for a containment tree.
///
/// Produces an indented dump of an instance and its children with type
/// names and current attribute values.
///
/// ```ignore
/// let dump = ModelTreeDebug::new(document).format_tree()?;
/// println!("{dump}");
/// ```
pub struct ModelTreeDebug {
    root: Model,
}

// Containment is a plain list with no circularity check, so traversal is
// depth-capped rather than trusted.
const MAX_TREE_DEPTH: usize = 32;

impl ModelTreeDebug {
    /// Create a formatter rooted at `root`.
    pub fn new(root: Model) -> Self {
        Self { root }
    }

    /// Format the tree, one instance per line.
    ///
    /// Fails if the root handle is stale; destroyed descendants are shown
    /// as `(destroyed)` leaves instead.
    pub fn format_tree(&self) -> Result<String> {
        if !self.root.is_alive() {
            return Err(crate::ModelError::StaleModel);
        }
        let mut output = String::new();
        self.format_recursive(self.root, 0, &mut output);
        Ok(output)
    }

    fn format_recursive(&self, model: Model, depth: usize, output: &mut String) {
        let indent = "  ".repeat(depth);
        let (type_name, summary) = describe(model);
        let _ = writeln!(output, "{indent}[{:?}] {type_name}{summary}", model.id());
        if depth >= MAX_TREE_DEPTH {
            let _ = writeln!(output, "{indent}  ...");
            return;
        }
        let Ok(children) = model.children() else {
            return;
        };
        for child in children {
            self.format_recursive(child, depth + 1, output);
        }
    }
}

fn describe(model: Model) -> (String, String) {
    read_registry(|reg| {
        reg.get(model.id())
            .map(|inst| {
                let values: Vec<String> = inst
                    .schema
                    .properties()
                    .zip(inst.slots.iter())
                    .map(|(prop, slot)| format!("{}={}", prop.name, slot.value))
                    .collect();
                let summary = if values.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", values.join(", "))
                };
                (inst.schema.type_name().to_string(), summary)
            })
            .unwrap_or_else(|| ("(destroyed)".to_string(), String::new()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use crate::schema::ModelSchema;

    #[test]
    fn test_format_tree() {
        let schema = ModelSchema::builder("Node")
            .property("label", "n")
            .build()
            .unwrap();
        let root = Model::new(&schema).unwrap();
        let child = Model::new(&schema).unwrap();
        root.set("label", "root").unwrap();
        child.set("label", "leaf").unwrap();
        root.add_child(child).unwrap();

        let dump = ModelTreeDebug::new(root).format_tree().unwrap();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Node (label=root)"));
        assert!(lines[1].starts_with("  "));
        assert!(lines[1].contains("label=leaf"));
    }
}
