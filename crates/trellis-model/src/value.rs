//! Dynamically typed attribute values.
//!
//! Model attributes hold [`Value`]s — a closed tagged union covering the
//! payload types the framework moves around: scalars, strings, lists, and
//! references to other model instances. Signal arguments use the same type.
//!
//! Change detection compares values with [`Value::try_eq`], which is
//! equality by value, not identity. Comparison is fallible: a NaN float has
//! no defined equality, so comparing one is a configuration error
//! ([`ValueError::Incomparable`]) surfaced at first use instead of silently
//! treating every store as a change.

use std::fmt;

use crate::error::ValueError;
use crate::model::Model;

/// A dynamically typed attribute value.
///
/// `Value` is what `get` returns and what literal `set` accepts; derived
/// attributes produce one from their generator on every (re)evaluation.
/// Lists nest arbitrarily, and [`Value::Model`] lets attributes reference
/// other instances (a transactions list, a selected child, ...).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absence of a value; the implicit default for undeclared defaults.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point. NaN payloads are storable but not comparable.
    Float(f64),
    /// Owned string.
    Str(String),
    /// Ordered list of values.
    List(Vec<Value>),
    /// Reference to another model instance, compared by identity handle.
    Model(Model),
}

impl Value {
    /// Equality by value.
    ///
    /// Values of different variants compare unequal (`1` is not `1.0`).
    /// Returns [`ValueError::Incomparable`] if either side contains a NaN
    /// float, recursively through lists.
    pub fn try_eq(&self, other: &Value) -> Result<bool, ValueError> {
        match (self, other) {
            (Value::Null, Value::Null) => Ok(true),
            (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
            (Value::Int(a), Value::Int(b)) => Ok(a == b),
            (Value::Float(a), Value::Float(b)) => {
                if a.is_nan() || b.is_nan() {
                    Err(ValueError::Incomparable)
                } else {
                    Ok(a == b)
                }
            }
            (Value::Str(a), Value::Str(b)) => Ok(a == b),
            (Value::List(a), Value::List(b)) => {
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    if !x.try_eq(y)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (Value::Model(a), Value::Model(b)) => Ok(a == b),
            _ => Ok(false),
        }
    }

    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the string payload, if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The boolean payload, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer payload, if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// The float payload; `Int` widens losslessly enough for model math.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Borrow the list payload, if this is a `List`.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// The model handle, if this is a `Model`.
    pub fn as_model(&self) -> Option<Model> {
        match self {
            Value::Model(m) => Some(*m),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Model(m) => write!(f, "<model {:?}>", m.id()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Model> for Value {
    fn from(m: Model) -> Self {
        Value::Model(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_eq_same_variant() {
        assert!(Value::from("foo").try_eq(&Value::from("foo")).unwrap());
        assert!(!Value::from("foo").try_eq(&Value::from("bar")).unwrap());
        assert!(Value::from(3i64).try_eq(&Value::from(3i64)).unwrap());
        assert!(Value::Null.try_eq(&Value::Null).unwrap());
    }

    #[test]
    fn test_try_eq_cross_variant_is_unequal() {
        assert!(!Value::from(1i64).try_eq(&Value::from(1.0)).unwrap());
        assert!(!Value::from("1").try_eq(&Value::from(1i64)).unwrap());
        assert!(!Value::Null.try_eq(&Value::from(false)).unwrap());
    }

    #[test]
    fn test_try_eq_nan_is_incomparable() {
        let nan = Value::from(f64::NAN);
        assert_eq!(nan.try_eq(&Value::from(1.0)), Err(ValueError::Incomparable));
        assert_eq!(
            Value::List(vec![Value::from(f64::NAN)])
                .try_eq(&Value::List(vec![Value::from(1.0)])),
            Err(ValueError::Incomparable)
        );
    }

    #[test]
    fn test_try_eq_lists() {
        let a = Value::List(vec![Value::from(1i64), Value::from("x")]);
        let b = Value::List(vec![Value::from(1i64), Value::from("x")]);
        let c = Value::List(vec![Value::from(1i64)]);
        assert!(a.try_eq(&b).unwrap());
        assert!(!a.try_eq(&c).unwrap());
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::from("hi").as_str(), Some("hi"));
        assert_eq!(Value::from(2i64).as_float(), Some(2.0));
        assert_eq!(Value::from(2.5).as_int(), None);
        assert!(Value::Null.is_null());
    }

    #[test]
    fn test_display() {
        let v = Value::List(vec![Value::from(1i64), Value::from("a")]);
        assert_eq!(v.to_string(), "[1, a]");
    }
}
