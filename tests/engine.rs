/// End-to-end engine behavior through the public surface.
///
/// Covers:
///   • the concrete rule scenarios (value + environment delta)
///   • short-circuit purity (skipped assignments must not happen)
///   • truthiness and nil/absent-variable semantics
///   • integer fast path (Int op Int stays Int)
///   • runtime error taxonomy (division by zero, modulo, unknown builtin)
///   • determinism across repeated executions

use std::collections::HashMap;

use pretty_assertions::assert_eq;
use uwasa::{Engine, OptLevel, Options, RuntimeError, Value};

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn vars(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn eval(source: &str, env: &mut HashMap<String, Value>) -> Value {
    let engine = Engine::compile(source, Options::default()).expect("compile should succeed");
    engine.execute(env).expect("execution should succeed")
}

fn eval_no_checks(source: &str, env: &mut HashMap<String, Value>) -> Result<Value, RuntimeError> {
    let options = Options {
        algebraic: false,
        ..Options::default()
    };
    let engine = Engine::compile(source, options).expect("compile should succeed");
    engine.execute(env)
}

// ─── Concrete scenarios ───────────────────────────────────────────────────────

#[test]
fn bonus_rule_full_pipeline() {
    let rule = r#"if (score >= 90 || attendance > 0.9) && status == "active" then bonus = 100"#;
    let mut env = vars(&[
        ("score", Value::Int(95)),
        ("attendance", Value::Float(0.8)),
        ("status", Value::str("active")),
        ("bonus", Value::Int(0)),
    ]);
    let result = eval(rule, &mut env);
    assert_eq!(result, Value::Int(100));
    assert_eq!(env["bonus"], Value::Int(100));
}

#[test]
fn bonus_rule_negative_case_leaves_env_alone() {
    let rule = r#"if (score >= 90 || attendance > 0.9) && status == "active" then bonus = 100"#;
    let mut env = vars(&[
        ("score", Value::Int(50)),
        ("attendance", Value::Float(0.5)),
        ("status", Value::str("active")),
        ("bonus", Value::Int(0)),
    ]);
    let result = eval(rule, &mut env);
    assert_eq!(result, Value::Nil);
    assert_eq!(env["bonus"], Value::Int(0));
}

#[test]
fn chained_else_if_selects_final_arm() {
    let rule = r#"if a == 0 is "yes" else if a == 1 is "ok" else is "bad""#;
    let mut env = vars(&[("a", Value::Int(2))]);
    assert_eq!(eval(rule, &mut env), Value::str("bad"));

    let mut env = vars(&[("a", Value::Int(0))]);
    assert_eq!(eval(rule, &mut env), Value::str("yes"));

    let mut env = vars(&[("a", Value::Int(1))]);
    assert_eq!(eval(rule, &mut env), Value::str("ok"));
}

#[test]
fn false_and_skips_assignment() {
    let mut env = vars(&[("a", Value::Int(0))]);
    let result = eval("false && (a = 2)", &mut env);
    assert_eq!(result, Value::Bool(false));
    assert_eq!(env["a"], Value::Int(0));
}

#[test]
fn true_or_skips_assignment() {
    let mut env = vars(&[("a", Value::Int(0))]);
    let result = eval("true || (a = 2)", &mut env);
    assert_eq!(result, Value::Bool(true));
    assert_eq!(env["a"], Value::Int(0));
}

#[test]
fn dynamic_short_circuit_skips_assignment() {
    // Same purity requirement with a non-literal left side.
    let mut env = vars(&[("flag", Value::Bool(false)), ("a", Value::Int(0))]);
    let result = eval("flag && (a = 2)", &mut env);
    assert_eq!(result, Value::Bool(false));
    assert_eq!(env["a"], Value::Int(0));

    let mut env = vars(&[("flag", Value::Bool(true)), ("a", Value::Int(0))]);
    let result = eval("flag || (a = 2)", &mut env);
    assert_eq!(result, Value::Bool(true));
    assert_eq!(env["a"], Value::Int(0));
}

#[test]
fn concat_with_variable() {
    let mut env = vars(&[("name", Value::str("world"))]);
    assert_eq!(
        eval(r#"concat("hello", " ", name)"#, &mut env),
        Value::str("hello world")
    );
}

#[test]
fn integer_arithmetic_stays_integer() {
    let mut env = HashMap::new();
    assert_eq!(eval("1 + 2 * 3", &mut env), Value::Int(7));
    // Also through the VM, not just the folder.
    let mut env = vars(&[("one", Value::Int(1))]);
    assert_eq!(eval("one + 2 * 3", &mut env), Value::Int(7));
    assert_eq!(eval("one * 5 - 2", &mut env), Value::Int(3));
    let mut env = vars(&[("n", Value::Int(7))]);
    assert_eq!(eval("n / 2", &mut env), Value::Int(3));
}

#[test]
fn mixed_numeric_promotes_to_float() {
    let mut env = vars(&[("a", Value::Int(10)), ("b", Value::Float(2.5))]);
    assert_eq!(eval("a + b", &mut env), Value::Float(12.5));
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    // Dynamic zero divisor.
    let mut env = vars(&[("a", Value::Int(5)), ("b", Value::Int(0))]);
    assert_eq!(
        eval_no_checks("a / b", &mut env),
        Err(RuntimeError::DivisionByZero)
    );
    // Literal zero divisor with the static pass disabled reaches the VM.
    let mut env = vars(&[("a", Value::Int(5))]);
    assert_eq!(
        eval_no_checks("a / 0", &mut env),
        Err(RuntimeError::DivisionByZero)
    );
    // With the static pass enabled the same rule fails at compile time.
    assert!(Engine::compile("a / 0", Options::default()).is_err());
}

// ─── Language semantics ───────────────────────────────────────────────────────

#[test]
fn truthiness_rules() {
    // The simple-if form materializes the condition's truthiness.
    let mut env = vars(&[("x", Value::Nil)]);
    assert_eq!(eval("if x", &mut env), Value::Bool(false));
    let mut env = vars(&[("x", Value::Bool(false))]);
    assert_eq!(eval("if x", &mut env), Value::Bool(false));
    let mut env = vars(&[("x", Value::Int(0))]);
    assert_eq!(eval("if x", &mut env), Value::Bool(true));
    let mut env = vars(&[("x", Value::str(""))]);
    assert_eq!(eval("if x", &mut env), Value::Bool(true));
    // Absent variable reads Nil.
    let mut env = HashMap::new();
    assert_eq!(eval("if x", &mut env), Value::Bool(false));
}

#[test]
fn absent_variables_compare_equal_to_each_other() {
    let mut env = HashMap::new();
    assert_eq!(eval("ghost_a == ghost_b", &mut env), Value::Bool(true));
    assert_eq!(eval("ghost_a != ghost_b", &mut env), Value::Bool(false));
}

#[test]
fn logical_operators_materialize_bool() {
    let mut env = vars(&[("a", Value::Int(1)), ("b", Value::Int(2))]);
    assert_eq!(eval("a && b", &mut env), Value::Bool(true));
    assert_eq!(eval("a || b", &mut env), Value::Bool(true));
    let mut env = vars(&[("a", Value::Int(1))]);
    assert_eq!(eval("a && missing", &mut env), Value::Bool(false));
}

#[test]
fn assignment_is_an_expression() {
    let mut env = vars(&[("b", Value::Int(4))]);
    assert_eq!(eval("a = b + 1", &mut env), Value::Int(5));
    assert_eq!(env["a"], Value::Int(5));

    let mut env = HashMap::new();
    assert_eq!(eval("a = b = 3", &mut env), Value::Int(3));
    assert_eq!(env["a"], Value::Int(3));
    assert_eq!(env["b"], Value::Int(3));
}

#[test]
fn string_comparisons() {
    let mut env = vars(&[("s", Value::str("active"))]);
    assert_eq!(eval(r#"s == "active""#, &mut env), Value::Bool(true));
    assert_eq!(eval(r#"s != "idle""#, &mut env), Value::Bool(true));
    // Ordering on strings is always false.
    assert_eq!(eval_no_checks(r#"s > "a""#, &mut env), Ok(Value::Bool(false)));
}

#[test]
fn nil_concats_as_empty_string() {
    let mut env = HashMap::new();
    assert_eq!(eval(r#"concat("a", ghost, "b")"#, &mut env), Value::str("ab"));
}

#[test]
fn unary_operators() {
    let mut env = vars(&[("n", Value::Int(3)), ("f", Value::Float(1.5))]);
    assert_eq!(eval("-n", &mut env), Value::Int(-3));
    assert_eq!(eval("-f", &mut env), Value::Float(-1.5));
    assert_eq!(eval("!n", &mut env), Value::Bool(false));
    assert_eq!(eval("!missing", &mut env), Value::Bool(true));
}

#[test]
fn modulo_semantics() {
    let mut env = vars(&[("n", Value::Int(7))]);
    assert_eq!(eval("n % 3", &mut env), Value::Int(1));
    let mut env = vars(&[("n", Value::Int(7)), ("f", Value::Float(2.0))]);
    assert_eq!(
        eval_no_checks("n % f", &mut env),
        Err(RuntimeError::ModuloNonInteger)
    );
    let mut env = vars(&[("n", Value::Int(7)), ("z", Value::Int(0))]);
    assert_eq!(
        eval_no_checks("n % z", &mut env),
        Err(RuntimeError::DivisionByZero)
    );
}

#[test]
fn unknown_builtin_is_a_runtime_error() {
    let mut env = HashMap::new();
    assert_eq!(
        eval_no_checks("frobnicate(1)", &mut env),
        Err(RuntimeError::UnknownFunction {
            name: "frobnicate".to_string()
        })
    );
}

#[test]
fn supplemental_builtins() {
    let mut env = vars(&[("s", Value::str("Rule")), ("a", Value::Int(-4))]);
    assert_eq!(eval("len(s)", &mut env), Value::Int(4));
    assert_eq!(eval("upper(s)", &mut env), Value::str("RULE"));
    assert_eq!(eval("lower(s)", &mut env), Value::str("rule"));
    assert_eq!(eval("abs(a)", &mut env), Value::Int(4));
    assert_eq!(eval("min(a, 1, 7)", &mut env), Value::Int(-4));
    assert_eq!(eval("max(a, 1, 7)", &mut env), Value::Int(7));
}

#[test]
fn runtime_error_aborts_with_no_partial_env_write() {
    // The assignment target is written only after the division succeeds.
    let mut env = vars(&[("z", Value::Int(0)), ("a", Value::Int(1))]);
    let result = eval_no_checks("a = 10 / z", &mut env);
    assert_eq!(result, Err(RuntimeError::DivisionByZero));
    assert_eq!(env["a"], Value::Int(1));
}

// ─── Determinism ──────────────────────────────────────────────────────────────

#[test]
fn repeated_execution_is_deterministic() {
    let rule = r#"if score >= 90 is bonus + 1 else is bonus - 1"#;
    let engine = Engine::compile(rule, Options::default()).unwrap();
    for _ in 0..10 {
        let mut env = vars(&[("score", Value::Int(95)), ("bonus", Value::Int(7))]);
        assert_eq!(engine.execute(&mut env).unwrap(), Value::Int(8));
        assert_eq!(env, vars(&[("score", Value::Int(95)), ("bonus", Value::Int(7))]));
    }
}

#[test]
fn compiled_rules_are_shareable_across_threads() {
    use std::sync::Arc;
    let engine = Arc::new(
        Engine::compile("if score >= 90 is grade + 1 else is grade", Options::default()).unwrap(),
    );
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                let mut env = vars(&[
                    ("score", Value::Int(88 + i)),
                    ("grade", Value::Int(10)),
                ]);
                engine.execute(&mut env).unwrap()
            })
        })
        .collect();
    let results: Vec<Value> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(
        results,
        vec![Value::Int(10), Value::Int(10), Value::Int(11), Value::Int(11)]
    );
}

#[test]
fn shared_engine_across_changing_environments() {
    let engine = Engine::compile("count = count + 1", Options::default()).unwrap();
    let mut env = vars(&[("count", Value::Int(0))]);
    for expected in 1..=5 {
        assert_eq!(engine.execute(&mut env).unwrap(), Value::Int(expected));
    }
    assert_eq!(env["count"], Value::Int(5));
}

// ─── Options surface ──────────────────────────────────────────────────────────

#[test]
fn opt_levels_agree_on_results() {
    let rule = "2 * 3 + 4";
    let mut a = HashMap::new();
    let mut b = HashMap::new();
    let full = Engine::compile(rule, Options::default()).unwrap();
    let none = Engine::compile(
        rule,
        Options {
            level: OptLevel::None,
            algebraic: false,
            one_pass: false,
        },
    )
    .unwrap();
    assert!(full.is_constant());
    assert!(!none.is_constant());
    assert_eq!(full.execute(&mut a).unwrap(), none.execute(&mut b).unwrap());
    assert_eq!(a, b);
}
