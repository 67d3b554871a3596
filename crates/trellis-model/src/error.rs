//! Error types for Trellis.

use std::fmt;

/// The main error type for Trellis model operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The named property is not declared in the instance's schema.
    UnknownProperty {
        /// The schema's type name.
        model: String,
        /// The property name that was requested.
        name: String,
    },
    /// The model handle refers to an instance that has been destroyed.
    StaleModel,
    /// The model passed to `remove_child` is not a child of this instance.
    UnknownChild,
    /// Change propagation exceeded the recursion limit, which indicates a
    /// cyclic dependency graph (e.g. A's generator reads B while B's
    /// generator reads A).
    DependencyCycle {
        /// The property whose recompute tripped the guard.
        property: String,
    },
    /// A schema declared the same property name twice.
    DuplicateProperty {
        /// The offending property name.
        name: String,
    },
    /// A schema declared the same signal name twice, or a custom signal
    /// collides with a built-in or generated `<prop>-changed` name.
    DuplicateSignal {
        /// The offending signal name.
        name: String,
    },
    /// Signal-related error.
    Signal(SignalError),
    /// Value-related error.
    Value(ValueError),
    /// A generator failed while evaluating a derived attribute.
    Generator {
        /// Human-readable description of the failure.
        message: String,
    },
}

impl ModelError {
    /// Construct a generator failure from any printable message.
    ///
    /// Generators return `Result<Value, ModelError>`; use this for failures
    /// that have no more specific variant.
    pub fn generator(message: impl Into<String>) -> Self {
        Self::Generator {
            message: message.into(),
        }
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownProperty { model, name } => {
                write!(f, "Property '{name}' is not declared on '{model}'")
            }
            Self::StaleModel => write!(f, "Model instance has been destroyed"),
            Self::UnknownChild => write!(f, "Model is not a child of this instance"),
            Self::DependencyCycle { property } => {
                write!(
                    f,
                    "Cyclic dependency detected while recomputing '{property}'"
                )
            }
            Self::DuplicateProperty { name } => {
                write!(f, "Property '{name}' declared more than once")
            }
            Self::DuplicateSignal { name } => {
                write!(f, "Signal '{name}' declared more than once")
            }
            Self::Signal(err) => write!(f, "Signal error: {err}"),
            Self::Value(err) => write!(f, "Value error: {err}"),
            Self::Generator { message } => write!(f, "Generator failed: {message}"),
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Signal(err) => Some(err),
            Self::Value(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SignalError> for ModelError {
    fn from(err: SignalError) -> Self {
        Self::Signal(err)
    }
}

impl From<ValueError> for ModelError {
    fn from(err: ValueError) -> Self {
        Self::Value(err)
    }
}

/// Signal-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// The signal name is not part of the instance's declared signal set.
    ///
    /// The declared-signals set is part of each schema's contract;
    /// subscribing to or emitting an undeclared name is a configuration
    /// error and fails fast rather than being silently ignored.
    UnknownSignal {
        /// The signal name that was requested.
        name: String,
    },
    /// The subscription ID is invalid or has already been removed.
    StaleSubscription,
    /// An emission supplied the wrong number of positional arguments.
    ArityMismatch {
        /// The signal name.
        signal: String,
        /// The declared argument count.
        expected: usize,
        /// The argument count that was supplied.
        got: usize,
    },
}

impl fmt::Display for SignalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSignal { name } => write!(f, "Signal '{name}' is not declared"),
            Self::StaleSubscription => write!(f, "Invalid or removed subscription ID"),
            Self::ArityMismatch {
                signal,
                expected,
                got,
            } => {
                write!(
                    f,
                    "Signal '{signal}' expects {expected} argument(s), got {got}"
                )
            }
        }
    }
}

impl std::error::Error for SignalError {}

/// Value-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// The two values cannot be compared for equality (NaN floats).
    ///
    /// Change detection requires comparable values; storing an
    /// incomparable one is a configuration error surfaced at first use.
    Incomparable,
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomparable => write!(f, "Values cannot be compared for equality"),
        }
    }
}

impl std::error::Error for ValueError {}

/// A specialized Result type for Trellis model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
