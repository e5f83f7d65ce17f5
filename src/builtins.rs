/// Builtin function registry and the pooled concat buffer.
///
/// The registry is a process-wide static, initialized once and read-only
/// thereafter. Builtins take a slice of argument values and return a value
/// or a runtime error; new builtins attach by inserting into the table.
///
/// `concat` is the canonical member. It writes through a pooled growable
/// `String` so repeated executions of string-building rules do not allocate;
/// buffers are cleared on check-in and the pool is internally serialized.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::errors::RuntimeError;
use crate::value::Value;

pub type BuiltinFn = fn(&[Value]) -> Result<Value, RuntimeError>;

static REGISTRY: Lazy<HashMap<&'static str, BuiltinFn>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, BuiltinFn> = HashMap::new();
    table.insert("concat", builtin_concat);
    table.insert("len", builtin_len);
    table.insert("upper", builtin_upper);
    table.insert("lower", builtin_lower);
    table.insert("abs", builtin_abs);
    table.insert("min", builtin_min);
    table.insert("max", builtin_max);
    table
});

pub fn lookup(name: &str) -> Option<BuiltinFn> {
    REGISTRY.get(name).copied()
}

// ---------------------------------------------------------------------------
// Output buffer pool
// ---------------------------------------------------------------------------

const POOL_CAP: usize = 32;

static BUFFERS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(Vec::new()));

fn take_buffer() -> String {
    BUFFERS
        .lock()
        .pop()
        .unwrap_or_else(|| String::with_capacity(64))
}

fn recycle_buffer(mut buf: String) {
    buf.clear();
    let mut pool = BUFFERS.lock();
    if pool.len() < POOL_CAP {
        pool.push(buf);
    }
}

/// Coerce every value by the display rule and concatenate. Shared by the
/// `Concat` opcode and the `concat` builtin.
pub fn concat_values(args: &[Value]) -> Value {
    let mut buf = take_buffer();
    for v in args {
        v.push_display(&mut buf);
    }
    let out = Value::str(&buf);
    recycle_buffer(buf);
    out
}

// ---------------------------------------------------------------------------
// Builtins
// ---------------------------------------------------------------------------

fn builtin_concat(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(concat_values(args))
}

fn builtin_len(args: &[Value]) -> Result<Value, RuntimeError> {
    match args {
        [Value::Str(s)] => Ok(Value::Int(s.len() as i64)),
        [other] => Err(misuse("len", format!("expected a string, got {}", other.type_name()))),
        _ => Err(misuse("len", format!("expected 1 argument, got {}", args.len()))),
    }
}

fn builtin_upper(args: &[Value]) -> Result<Value, RuntimeError> {
    match args {
        [Value::Str(s)] => Ok(Value::from(s.to_ascii_uppercase())),
        [other] => Err(misuse("upper", format!("expected a string, got {}", other.type_name()))),
        _ => Err(misuse("upper", format!("expected 1 argument, got {}", args.len()))),
    }
}

fn builtin_lower(args: &[Value]) -> Result<Value, RuntimeError> {
    match args {
        [Value::Str(s)] => Ok(Value::from(s.to_ascii_lowercase())),
        [other] => Err(misuse("lower", format!("expected a string, got {}", other.type_name()))),
        _ => Err(misuse("lower", format!("expected 1 argument, got {}", args.len()))),
    }
}

fn builtin_abs(args: &[Value]) -> Result<Value, RuntimeError> {
    match args {
        [Value::Int(n)] => Ok(Value::Int(n.wrapping_abs())),
        [Value::Float(f)] => Ok(Value::Float(f.abs())),
        [other] => Err(misuse("abs", format!("expected a number, got {}", other.type_name()))),
        _ => Err(misuse("abs", format!("expected 1 argument, got {}", args.len()))),
    }
}

fn builtin_min(args: &[Value]) -> Result<Value, RuntimeError> {
    extremum("min", args, |candidate, best| candidate.lt(best))
}

fn builtin_max(args: &[Value]) -> Result<Value, RuntimeError> {
    extremum("max", args, |candidate, best| best.lt(candidate))
}

fn extremum(
    name: &'static str,
    args: &[Value],
    better: fn(&Value, &Value) -> bool,
) -> Result<Value, RuntimeError> {
    if args.len() < 2 {
        return Err(misuse(name, format!("expected at least 2 arguments, got {}", args.len())));
    }
    for v in args {
        if !v.is_numeric() {
            return Err(misuse(name, format!("expected numbers, got {}", v.type_name())));
        }
    }
    let mut best = &args[0];
    for v in &args[1..] {
        if better(v, best) {
            best = v;
        }
    }
    Ok(best.clone())
}

fn misuse(builtin: &'static str, message: String) -> RuntimeError {
    RuntimeError::BuiltinMisuse { builtin, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_applies_display_coercion() {
        let out = concat_values(&[
            Value::str("x="),
            Value::Int(3),
            Value::str(" y="),
            Value::Float(1.5),
            Value::str(" "),
            Value::Bool(false),
            Value::Nil,
        ]);
        assert_eq!(out, Value::str("x=3 y=1.5 false"));
    }

    #[test]
    fn concat_of_nothing_is_empty_string() {
        assert_eq!(concat_values(&[]), Value::str(""));
    }

    #[test]
    fn registry_lookup() {
        assert!(lookup("concat").is_some());
        assert!(lookup("len").is_some());
        assert!(lookup("nope").is_none());
    }

    #[test]
    fn len_counts_bytes() {
        let f = lookup("len").unwrap();
        assert_eq!(f(&[Value::str("héllo")]).unwrap(), Value::Int(6));
        assert!(f(&[Value::Int(1)]).is_err());
        assert!(f(&[]).is_err());
    }

    #[test]
    fn case_mapping_is_ascii() {
        let up = lookup("upper").unwrap();
        let lo = lookup("lower").unwrap();
        assert_eq!(up(&[Value::str("abÿc")]).unwrap(), Value::str("ABÿC"));
        assert_eq!(lo(&[Value::str("ABC")]).unwrap(), Value::str("abc"));
    }

    #[test]
    fn numeric_builtins() {
        let abs = lookup("abs").unwrap();
        assert_eq!(abs(&[Value::Int(-3)]).unwrap(), Value::Int(3));
        assert_eq!(abs(&[Value::Float(-2.5)]).unwrap(), Value::Float(2.5));

        let min = lookup("min").unwrap();
        let max = lookup("max").unwrap();
        assert_eq!(min(&[Value::Int(3), Value::Int(1), Value::Int(2)]).unwrap(), Value::Int(1));
        assert_eq!(max(&[Value::Int(3), Value::Float(3.5)]).unwrap(), Value::Float(3.5));
        assert!(min(&[Value::Int(1)]).is_err());
        assert!(max(&[Value::Int(1), Value::str("x")]).is_err());
    }

    #[test]
    fn pool_reuses_buffers() {
        // Run enough concats to exercise take/recycle round trips.
        for _ in 0..100 {
            let _ = concat_values(&[Value::str("a"), Value::Int(1)]);
        }
        assert!(BUFFERS.lock().len() <= POOL_CAP);
    }
}
