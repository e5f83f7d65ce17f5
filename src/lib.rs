/// Uwasa — an embeddable rule engine.
///
/// Callers hand over a short rule in a small expression language plus a
/// mutable variable environment; the engine compiles the rule once and
/// evaluates it many times against changing environments, returning one
/// value per execution and mutating variables as a side effect.
///
/// Module layout, front to back of the pipeline:
///   - value     — tagged scalar Value and its conversion rules
///   - lexer     — byte-level scanner, keyword table
///   - ast       — expression tree
///   - parser    — Pratt parser with accumulated diagnostics
///   - optimizer — constant folding, algebraic identities, static checks
///   - bytecode  — instruction set, packing rules, Program container
///   - compiler  — AST → byte-code lowering (register allocation, diamonds)
///   - onepass   — token stream → byte-code lowering (fold-as-you-go)
///   - peephole  — instruction fusion + jump renumbering
///   - vm        — register VM with a map-specialized access path
///   - env       — Environment capability + default map implementation
///   - engine    — façade: options, compile, execute, constant fast path
///   - builtins  — registry, `concat`, pooled output buffers
///   - errors    — the full error taxonomy
///
/// ```
/// use std::collections::HashMap;
/// use uwasa::{Engine, Options, Value};
///
/// let engine = Engine::compile("if score >= 90 then bonus = 100", Options::default()).unwrap();
/// let mut vars = HashMap::from([("score".to_string(), Value::Int(95))]);
/// engine.execute(&mut vars).unwrap();
/// assert_eq!(vars["bonus"], Value::Int(100));
/// ```

pub mod ast;
pub mod builtins;
pub mod bytecode;
pub mod compiler;
pub mod engine;
pub mod env;
pub mod errors;
pub mod lexer;
pub mod onepass;
pub mod optimizer;
pub mod parser;
pub mod peephole;
pub mod value;
pub mod vm;

pub use engine::{eval, Engine, OptLevel, Options};
pub use env::{Environment, MapEnv};
pub use errors::{CompileError, Error, ParseError, RuntimeError, StaticError};
pub use value::Value;
