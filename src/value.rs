/// Tagged runtime value.
///
/// Int and Float both carry 64-bit payloads so integer arithmetic never
/// converts. Strings are shared `Arc<str>` — register moves and constant
/// loads clone the handle, not the bytes. `Map` is a handle to an
/// externally-owned keyed mapping whose lifetime exceeds any single VM call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Handle to an externally-owned keyed mapping.
pub type MapHandle = Arc<Mutex<HashMap<String, Value>>>;

#[derive(Clone)]
pub enum Value {
    Nil,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(Arc<str>),
    Map(MapHandle),
}

impl Value {
    #[inline]
    pub fn str(s: &str) -> Value {
        Value::Str(Arc::from(s))
    }

    /// Truthiness: Nil is false, Bool is itself, everything else is true.
    #[inline]
    pub fn truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            _ => true,
        }
    }

    /// Numeric widening. Succeeds for Int and Float only.
    #[inline]
    pub fn to_float(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Map(_) => "map",
        }
    }

    /// Language equality: same-tag compares payloads, Int↔Float compares
    /// after float widening, strings compare by bytes, Nil equals Nil.
    /// Everything else is unequal.
    #[inline]
    pub fn eq_val(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) => (*a as f64) == *b,
            (Value::Float(a), Value::Int(b)) => *a == (*b as f64),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Ordering is defined on numeric pairs only; any other pair is false.
    #[inline]
    pub fn lt(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a < b,
            _ => match (self.to_float(), other.to_float()) {
                (Some(a), Some(b)) => a < b,
                _ => false,
            },
        }
    }

    #[inline]
    pub fn le(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a <= b,
            _ => match (self.to_float(), other.to_float()) {
                (Some(a), Some(b)) => a <= b,
                _ => false,
            },
        }
    }

    /// Constant-pool identity: tag-strict, floats by bit pattern.
    /// `Int(1)` and `Float(1.0)` are distinct pool entries.
    pub fn const_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        }
    }

    /// The string-coercion rule shared by `Concat`, the `concat` builtin
    /// and constant folding: strings as-is, Int in decimal, Float in
    /// shortest round-trip form, booleans as `true`/`false`, Nil as `""`.
    pub fn push_display(&self, out: &mut String) {
        use std::fmt::Write;
        match self {
            Value::Nil => {}
            Value::Int(n) => {
                let _ = write!(out, "{n}");
            }
            Value::Float(f) => {
                let _ = write!(out, "{f}");
            }
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Str(s) => out.push_str(s),
            Value::Map(_) => out.push_str("<map>"),
        }
    }
}

impl PartialEq for Value {
    /// Structural equality for assertions and tests: tag-strict, so
    /// `Int(7) != Float(7.0)`. Language equality is [`Value::eq_val`].
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Map(_) => write!(f, "Map(<handle>)"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.push_display(&mut out);
        f.write_str(&out)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Value {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(Arc::from(s.as_str()))
    }
}
