/// Engine façade: compile once, execute many times.
///
/// The compilation pipeline is parse → fold (optional) → algebraic
/// simplify + static checks (optional) → lower → fuse, or the one-pass
/// token-stream lowering. Rules that resolve to a single literal — either
/// because the tree folded all the way down or because the byte-code is a
/// lone load-then-return — cache their value and never touch the VM.
///
/// A compiled engine is immutable; concurrent executions over independent
/// environments may share it freely.

use std::collections::HashMap;

use tracing::debug;

use crate::compiler::Compiler;
use crate::env::Environment;
use crate::errors::{CompileError, Error, RuntimeError};
use crate::bytecode::{Op, Program};
use crate::onepass::OnePass;
use crate::optimizer::{literal_value, Optimizer};
use crate::parser::Parser;
use crate::peephole;
use crate::value::Value;
use crate::vm::{self, EnvVars, MapVars};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptLevel {
    /// No tree rewriting at all.
    None,
    /// Constant folding.
    Basic,
}

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub level: OptLevel,
    /// Run the algebraic-simplification + static-check pass.
    pub algebraic: bool,
    /// Use the one-pass token-stream lowering instead of the AST pipeline.
    /// Folding happens on the fly there; `level` and `algebraic` apply to
    /// the AST pipeline only.
    pub one_pass: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            level: OptLevel::Basic,
            algebraic: true,
            one_pass: false,
        }
    }
}

#[derive(Debug)]
enum Compiled {
    /// The rule's value was known at compile time; execution skips the VM.
    Constant(Value),
    Program(Program),
}

#[derive(Debug)]
pub struct Engine {
    compiled: Compiled,
}

impl Engine {
    pub fn compile(source: &str, options: Options) -> Result<Engine, CompileError> {
        debug!(bytes = source.len(), ?options, "compiling rule");
        if options.one_pass {
            let mut program = OnePass::compile(source)?;
            peephole::fuse(&mut program);
            return Ok(Engine::from_program(program));
        }

        let expr = Parser::new(source).parse().map_err(CompileError::Syntax)?;

        let mut opt = Optimizer::new();
        let mut expr = expr;
        if options.level == OptLevel::Basic {
            expr = opt.fold(expr);
        }
        if options.algebraic {
            expr = opt.simplify(expr);
            opt.check(&expr);
        }
        let errors = opt.finish();
        if !errors.is_empty() {
            return Err(CompileError::Static(errors));
        }

        if let Some(v) = literal_value(&expr) {
            debug!("rule folded to a constant; VM will be skipped");
            return Ok(Engine {
                compiled: Compiled::Constant(v),
            });
        }

        let mut program = Compiler::compile(&expr)?;
        peephole::fuse(&mut program);
        Ok(Engine::from_program(program))
    }

    fn from_program(program: Program) -> Engine {
        if let Some(v) = constant_program(&program) {
            debug!("byte-code is a single load-then-return; caching the value");
            return Engine {
                compiled: Compiled::Constant(v),
            };
        }
        Engine {
            compiled: Compiled::Program(program),
        }
    }

    /// True when execution returns a cached literal without running the VM.
    pub fn is_constant(&self) -> bool {
        matches!(self.compiled, Compiled::Constant(_))
    }

    /// The compiled byte-code, absent for constant rules.
    pub fn program(&self) -> Option<&Program> {
        match &self.compiled {
            Compiled::Program(p) => Some(p),
            Compiled::Constant(_) => None,
        }
    }

    /// Execute against a raw mapping — the specialized fast path.
    pub fn execute(&self, vars: &mut HashMap<String, Value>) -> Result<Value, RuntimeError> {
        match &self.compiled {
            Compiled::Constant(v) => Ok(v.clone()),
            Compiled::Program(p) => vm::run(p, &mut MapVars(vars)),
        }
    }

    /// Execute against any environment implementation.
    pub fn execute_with(&self, env: &mut dyn Environment) -> Result<Value, RuntimeError> {
        match &self.compiled {
            Compiled::Constant(v) => Ok(v.clone()),
            Compiled::Program(p) => vm::run(p, &mut EnvVars(env)),
        }
    }
}

fn constant_program(program: &Program) -> Option<Value> {
    match program.instructions.as_slice() {
        [load, ret]
            if load.op == Op::LoadConst
                && ret.op == Op::Return
                && ret.src1 == load.dest =>
        {
            program.constants.get(load.arg as usize).cloned()
        }
        _ => None,
    }
}

/// One-shot convenience: compile with default options and execute once.
pub fn eval(source: &str, vars: &mut HashMap<String, Value>) -> Result<Value, Error> {
    let engine = Engine::compile(source, Options::default())?;
    Ok(engine.execute(vars)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_rule_skips_the_vm() {
        let engine = Engine::compile("1 + 2 * 3", Options::default()).unwrap();
        assert!(engine.is_constant());
        assert!(engine.program().is_none());
        let mut vars = HashMap::new();
        assert_eq!(engine.execute(&mut vars).unwrap(), Value::Int(7));
    }

    #[test]
    fn constant_detection_works_without_opt() {
        // At OptLevel::None the tree is not folded, but `42` still lowers
        // to a lone load-then-return, which is cached all the same.
        let options = Options {
            level: OptLevel::None,
            algebraic: false,
            one_pass: false,
        };
        let engine = Engine::compile("42", options).unwrap();
        assert!(engine.is_constant());
    }

    #[test]
    fn one_pass_constant_detection() {
        let options = Options {
            one_pass: true,
            ..Options::default()
        };
        let engine = Engine::compile("2 * 21", options).unwrap();
        assert!(engine.is_constant());
        let mut vars = HashMap::new();
        assert_eq!(engine.execute(&mut vars).unwrap(), Value::Int(42));
    }

    #[test]
    fn non_constant_rule_keeps_its_program() {
        let engine = Engine::compile("a + 1", Options::default()).unwrap();
        assert!(!engine.is_constant());
        assert!(engine.program().is_some());
    }

    #[test]
    fn assignment_is_never_a_constant_rule() {
        let engine = Engine::compile("a = 2", Options::default()).unwrap();
        assert!(!engine.is_constant());
        let mut vars = HashMap::new();
        assert_eq!(engine.execute(&mut vars).unwrap(), Value::Int(2));
        assert_eq!(vars.get("a"), Some(&Value::Int(2)));
    }

    #[test]
    fn syntax_diagnostics_surface_in_the_error() {
        let err = Engine::compile("a & b", Options::default()).unwrap_err();
        assert!(!err.syntax_diagnostics().is_empty());
    }

    #[test]
    fn static_diagnostics_surface_in_the_error() {
        let err = Engine::compile("a / 0", Options::default()).unwrap_err();
        assert!(!err.static_diagnostics().is_empty());
    }

    #[test]
    fn no_opt_defers_literal_zero_division_to_runtime() {
        let options = Options {
            level: OptLevel::None,
            algebraic: false,
            one_pass: false,
        };
        let engine = Engine::compile("1 / 0", options).unwrap();
        let mut vars = HashMap::new();
        assert_eq!(
            engine.execute(&mut vars),
            Err(RuntimeError::DivisionByZero)
        );
    }

    #[test]
    fn eval_round_trip() {
        let mut vars = HashMap::new();
        vars.insert("x".to_string(), Value::Int(5));
        assert_eq!(eval("x * 2", &mut vars).unwrap(), Value::Int(10));
    }
}
