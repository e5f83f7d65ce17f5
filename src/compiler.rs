/// AST → byte-code lowering.
///
/// Depth-first over the optimized tree, compiling every expression into a
/// caller-chosen destination register. Temporaries follow a strict stack
/// discipline: allocated on the way into a subtree, released on the way
/// out, so a value's register is never read after its slot has been
/// recycled. Short-circuit `&&`/`||` and the `if` forms lower to jump
/// diamonds; the And/Or opcodes only materialize the truthy-coerced result.
///
/// Register pressure above `REG_LIMIT` is a compile error. The VM itself
/// has 256 registers; the gap is headroom for the fused decode paths.

use tracing::debug;

use crate::ast::{Expr, InfixOp, PrefixOp};
use crate::bytecode::{Instr, Op, Program};
use crate::errors::CompileError;
use crate::value::Value;

pub(crate) const REG_LIMIT: u16 = 250;

// ---------------------------------------------------------------------------
// Register allocator — stack discipline, high-water tracked
// ---------------------------------------------------------------------------

pub(crate) struct RegAlloc {
    top: u16,
    high: u16,
}

impl RegAlloc {
    pub fn new() -> Self {
        RegAlloc { top: 0, high: 0 }
    }

    pub fn alloc(&mut self) -> Result<u8, CompileError> {
        if self.top >= REG_LIMIT {
            return Err(CompileError::RegisterLimitExceeded { limit: REG_LIMIT });
        }
        let r = self.top as u8;
        self.top += 1;
        if self.top > self.high {
            self.high = self.top;
        }
        Ok(r)
    }

    pub fn free(&mut self, r: u8) {
        debug_assert_eq!(r as u16 + 1, self.top, "temporaries must free in stack order");
        self.top = r as u16;
    }

    pub fn mark(&self) -> u16 {
        self.top
    }

    pub fn reset_to(&mut self, mark: u16) {
        self.top = mark;
    }

    pub fn high_water(&self) -> u16 {
        self.high
    }
}

// ---------------------------------------------------------------------------
// Compiler
// ---------------------------------------------------------------------------

pub struct Compiler {
    program: Program,
    regs: RegAlloc,
}

impl Compiler {
    /// Lower an expression tree into a byte-code program ending in Return.
    pub fn compile(expr: &Expr) -> Result<Program, CompileError> {
        let mut c = Compiler {
            program: Program::new(),
            regs: RegAlloc::new(),
        };
        let dst = c.regs.alloc()?;
        c.compile_expr(expr, dst)?;
        c.program.emit(Instr::sx(Op::Return, dst, 0));
        c.program.max_registers = c.regs.high_water();
        debug!(
            instructions = c.program.instructions.len(),
            constants = c.program.constants.len(),
            registers = c.program.max_registers,
            "lowered expression tree"
        );
        Ok(c.program)
    }

    fn emit(&mut self, instr: Instr) -> usize {
        self.program.emit(instr)
    }

    fn load_const(&mut self, dst: u8, v: Value) {
        let idx = self.program.add_const(v);
        self.emit(Instr::dx(Op::LoadConst, dst, idx));
    }

    fn compile_expr(&mut self, expr: &Expr, dst: u8) -> Result<(), CompileError> {
        match expr {
            Expr::IntLit(n) => {
                self.load_const(dst, Value::Int(*n));
            }
            Expr::FloatLit(f) => {
                self.load_const(dst, Value::Float(*f));
            }
            Expr::StrLit(s) => {
                self.load_const(dst, Value::str(s));
            }
            Expr::BoolLit(b) => {
                self.load_const(dst, Value::Bool(*b));
            }
            Expr::Nil => {
                self.load_const(dst, Value::Nil);
            }
            Expr::Ident(name) => {
                let idx = self.program.add_name(name);
                self.emit(Instr::dx(Op::GetGlobal, dst, idx));
            }
            Expr::Prefix { op, rhs } => self.compile_prefix(*op, rhs, dst)?,
            Expr::Infix { op: InfixOp::And, lhs, rhs } => self.compile_and(lhs, rhs, dst)?,
            Expr::Infix { op: InfixOp::Or, lhs, rhs } => self.compile_or(lhs, rhs, dst)?,
            Expr::Infix { op, lhs, rhs } => {
                let t1 = self.regs.alloc()?;
                self.compile_expr(lhs, t1)?;
                let t2 = self.regs.alloc()?;
                self.compile_expr(rhs, t2)?;
                self.emit(Instr::abc(binary_op(*op), dst, t1, t2));
                self.regs.free(t2);
                self.regs.free(t1);
            }
            Expr::If {
                cond,
                conseq,
                alt,
                simple,
                then_form: _,
            } => self.compile_if(cond, conseq.as_deref(), alt.as_deref(), *simple, dst)?,
            Expr::Assign { name, value } => {
                self.compile_expr(value, dst)?;
                let idx = self.program.add_name(name);
                self.emit(Instr::sx(Op::SetGlobal, dst, idx));
            }
            Expr::Call { name, args } => self.compile_call(name, args, dst)?,
        }
        Ok(())
    }

    /// `-x` lowers as `0 - x`; integer operands stay integer. `!x` is Not.
    fn compile_prefix(&mut self, op: PrefixOp, rhs: &Expr, dst: u8) -> Result<(), CompileError> {
        match op {
            PrefixOp::Not => {
                let t = self.regs.alloc()?;
                self.compile_expr(rhs, t)?;
                self.emit(Instr::abc(Op::Not, dst, t, 0));
                self.regs.free(t);
            }
            PrefixOp::Neg => {
                let tz = self.regs.alloc()?;
                self.load_const(tz, Value::Int(0));
                let t = self.regs.alloc()?;
                self.compile_expr(rhs, t)?;
                self.emit(Instr::abc(Op::Sub, dst, tz, t));
                self.regs.free(t);
                self.regs.free(tz);
            }
        }
        Ok(())
    }

    /// `lhs && rhs`:
    ///   evaluate lhs; if falsy, jump to the false arm and load `false`;
    ///   otherwise evaluate rhs and materialize its truthy coercion.
    /// The lhs register is dead once the jump has been emitted.
    fn compile_and(&mut self, lhs: &Expr, rhs: &Expr, dst: u8) -> Result<(), CompileError> {
        let t1 = self.regs.alloc()?;
        self.compile_expr(lhs, t1)?;
        let jf = self.program.emit_jump(Op::JumpIfFalse, t1);
        self.regs.free(t1);

        let t2 = self.regs.alloc()?;
        self.compile_expr(rhs, t2)?;
        self.emit(Instr::abc(Op::And, dst, t2, t2));
        self.regs.free(t2);
        let jend = self.program.emit_jump(Op::Jump, 0);

        self.program.patch_jump(jf);
        self.load_const(dst, Value::Bool(false));
        self.program.patch_jump(jend);
        Ok(())
    }

    fn compile_or(&mut self, lhs: &Expr, rhs: &Expr, dst: u8) -> Result<(), CompileError> {
        let t1 = self.regs.alloc()?;
        self.compile_expr(lhs, t1)?;
        let jt = self.program.emit_jump(Op::JumpIfTrue, t1);
        self.regs.free(t1);

        let t2 = self.regs.alloc()?;
        self.compile_expr(rhs, t2)?;
        self.emit(Instr::abc(Op::Or, dst, t2, t2));
        self.regs.free(t2);
        let jend = self.program.emit_jump(Op::Jump, 0);

        self.program.patch_jump(jt);
        self.load_const(dst, Value::Bool(true));
        self.program.patch_jump(jend);
        Ok(())
    }

    /// All three `if` forms lower to a two-arm diamond. The value forms put
    /// an expression (or Nil) in each arm; the simple form loads the
    /// condition's boolean.
    fn compile_if(
        &mut self,
        cond: &Expr,
        conseq: Option<&Expr>,
        alt: Option<&Expr>,
        simple: bool,
        dst: u8,
    ) -> Result<(), CompileError> {
        let t = self.regs.alloc()?;
        self.compile_expr(cond, t)?;
        let jf = self.program.emit_jump(Op::JumpIfFalse, t);
        self.regs.free(t);

        if simple {
            self.load_const(dst, Value::Bool(true));
            let jend = self.program.emit_jump(Op::Jump, 0);
            self.program.patch_jump(jf);
            self.load_const(dst, Value::Bool(false));
            self.program.patch_jump(jend);
            return Ok(());
        }

        match conseq {
            Some(c) => self.compile_expr(c, dst)?,
            None => self.load_const(dst, Value::Nil),
        }
        let jend = self.program.emit_jump(Op::Jump, 0);

        self.program.patch_jump(jf);
        match alt {
            Some(a) => self.compile_expr(a, dst)?,
            None => self.load_const(dst, Value::Nil),
        }
        self.program.patch_jump(jend);
        Ok(())
    }

    /// Arguments go into consecutive temporaries. `concat` gets its own
    /// opcode; every other name dispatches through the builtin registry at
    /// runtime.
    fn compile_call(&mut self, name: &str, args: &[Expr], dst: u8) -> Result<(), CompileError> {
        let base = self.regs.mark() as u8;
        let mut arg_regs = Vec::with_capacity(args.len());
        for arg in args {
            let t = self.regs.alloc()?;
            self.compile_expr(arg, t)?;
            arg_regs.push(t);
        }
        let argc = args.len() as u8;
        if name == "concat" {
            self.emit(Instr::abc(Op::Concat, dst, base, argc));
        } else {
            let idx = self.program.add_name(name);
            self.emit(Instr::call(dst, base, argc, idx));
        }
        for r in arg_regs.into_iter().rev() {
            self.regs.free(r);
        }
        Ok(())
    }
}

fn binary_op(op: InfixOp) -> Op {
    match op {
        InfixOp::Add => Op::Add,
        InfixOp::Sub => Op::Sub,
        InfixOp::Mul => Op::Mul,
        InfixOp::Div => Op::Div,
        InfixOp::Mod => Op::Mod,
        InfixOp::Eq => Op::Eq,
        InfixOp::Ne => Op::Ne,
        InfixOp::Lt => Op::Lt,
        InfixOp::Gt => Op::Gt,
        InfixOp::Le => Op::Le,
        InfixOp::Ge => Op::Ge,
        // And/Or never reach here; they lower to jump diamonds.
        InfixOp::And => Op::And,
        InfixOp::Or => Op::Or,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn compile(source: &str) -> Program {
        let expr = Parser::new(source).parse().expect("parse");
        Compiler::compile(&expr).expect("compile")
    }

    fn ops(p: &Program) -> Vec<Op> {
        p.instructions.iter().map(|i| i.op).collect()
    }

    #[test]
    fn literal_is_load_then_return() {
        let p = compile("42");
        assert_eq!(ops(&p), vec![Op::LoadConst, Op::Return]);
        assert_eq!(p.constants, vec![Value::Int(42)]);
    }

    #[test]
    fn global_plus_const_shape() {
        let p = compile("a + 1");
        assert_eq!(ops(&p), vec![Op::GetGlobal, Op::LoadConst, Op::Add, Op::Return]);
        let add = p.instructions[2];
        assert_eq!((add.src1, add.src2), (1, 2));
    }

    #[test]
    fn and_lowers_to_diamond() {
        let p = compile("a && b");
        assert_eq!(
            ops(&p),
            vec![
                Op::GetGlobal,
                Op::JumpIfFalse,
                Op::GetGlobal,
                Op::And,
                Op::Jump,
                Op::LoadConst,
                Op::Return,
            ]
        );
        // JumpIfFalse lands on the false-arm LoadConst; Jump lands after it.
        assert_eq!(p.instructions[1].jump_target(), Some(5));
        assert_eq!(p.instructions[4].jump_target(), Some(6));
        // The materialization reads only the right-hand side.
        let and = p.instructions[3];
        assert_eq!(and.src1, and.src2);
    }

    #[test]
    fn if_is_else_lowers_to_diamond() {
        let p = compile(r#"if a is "x" else is "y""#);
        assert_eq!(
            ops(&p),
            vec![
                Op::GetGlobal,
                Op::JumpIfFalse,
                Op::LoadConst,
                Op::Jump,
                Op::LoadConst,
                Op::Return,
            ]
        );
        assert_eq!(p.instructions[1].jump_target(), Some(4));
        assert_eq!(p.instructions[3].jump_target(), Some(5));
    }

    #[test]
    fn then_form_false_arm_loads_nil() {
        let p = compile("if a then b = 1");
        // cond, jf, value, setglobal, jump, loadnil, return
        assert_eq!(p.instructions[5].op, Op::LoadConst);
        assert_eq!(p.constants[p.instructions[5].arg as usize], Value::Nil);
    }

    #[test]
    fn concat_uses_dedicated_opcode() {
        let p = compile(r#"concat(a, "x")"#);
        let concat = p.instructions.iter().find(|i| i.op == Op::Concat).unwrap();
        assert_eq!(concat.src2, 2);
        assert!(ops(&p).iter().all(|o| *o != Op::Call));
    }

    #[test]
    fn unknown_call_goes_through_registry() {
        let p = compile("foo(1, 2)");
        let call = p.instructions.iter().find(|i| i.op == Op::Call).unwrap();
        assert_eq!(call.src2, 2);
        assert_eq!(p.constants[call.arg as usize], Value::str("foo"));
    }

    #[test]
    fn assignment_stores_and_keeps_value() {
        let p = compile("a = 2");
        assert_eq!(ops(&p), vec![Op::LoadConst, Op::SetGlobal, Op::Return]);
        // Result register of the assignment is what Return reads.
        assert_eq!(p.instructions[1].src1, p.instructions[2].src1);
    }

    #[test]
    fn names_are_interned_once() {
        let p = compile("a + a");
        assert_eq!(p.constants.len(), 1);
        assert_eq!(p.constants[0], Value::str("a"));
    }

    #[test]
    fn register_limit_is_enforced() {
        // Left-leaning chain keeps every intermediate alive: a+(a+(a+...))
        let mut src = String::from("a");
        for _ in 0..300 {
            src = format!("a + ({src})");
        }
        let expr = Parser::new(&src).parse().expect("parse");
        match Compiler::compile(&expr) {
            Err(CompileError::RegisterLimitExceeded { limit }) => assert_eq!(limit, REG_LIMIT),
            other => panic!("expected register limit failure, got {other:?}"),
        }
    }
}
