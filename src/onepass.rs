/// One-pass compiler: token stream → byte-code, no tree.
///
/// A Pratt loop where every sub-expression yields an `Operand` — either a
/// compile-time constant or a register. Constants stay out of the
/// instruction stream and fold on the fly (with the same `fold_binary` /
/// `fold_prefix` rules as the tree optimizer, so the two lowerings stay
/// observably equivalent). A constant forced against a register operand
/// materializes as a fused `*Const` opcode where the operator has one, or
/// as a plain constant load otherwise.
///
/// Emission keeps a strict invariant: a sub-expression entered with the
/// register stack at T either returns `Const` (stack unchanged) or returns
/// `Reg(T)` with the stack at T+1. That is what makes call arguments land
/// in consecutive registers and diamond arms merge in the same slot
/// without a move instruction.
///
/// Dead branches of compile-time-known conditions and short-circuits are
/// still parsed — their emissions are rolled back afterwards, matching the
/// tree pipeline, where folding drops the same code. Static findings made
/// inside a rolled-back branch are kept, also matching the tree pipeline.

use tracing::debug;

use crate::ast::{InfixOp, PrefixOp};
use crate::bytecode::{Instr, Op, Program};
use crate::compiler::RegAlloc;
use crate::errors::{CompileError, ParseError, StaticError};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::optimizer::{fold_binary, fold_prefix, FoldOutcome};
use crate::parser::Precedence;
use crate::value::Value;

#[derive(Debug, Clone)]
enum Operand {
    Const(Value),
    Reg(u8),
}

struct Mark {
    pos: usize,
    instructions: usize,
    constants: usize,
    regs: u16,
}

pub struct OnePass {
    tokens: Vec<Token>,
    pos: usize,
    program: Program,
    regs: RegAlloc,
    parse_errors: Vec<ParseError>,
    static_errors: Vec<StaticError>,
}

impl OnePass {
    pub fn compile(source: &str) -> Result<Program, CompileError> {
        let mut c = OnePass {
            tokens: Lexer::new(source).tokenize(),
            pos: 0,
            program: Program::new(),
            regs: RegAlloc::new(),
            parse_errors: Vec::new(),
            static_errors: Vec::new(),
        };

        let operand = c.parse_expr(Precedence::Lowest)?;
        if c.cur().kind != TokenKind::Eof {
            c.parse_errors.push(ParseError::TrailingToken {
                found: c.cur().literal.clone(),
            });
        }
        if !c.parse_errors.is_empty() {
            return Err(CompileError::Syntax(c.parse_errors));
        }
        if !c.static_errors.is_empty() {
            return Err(CompileError::Static(c.static_errors));
        }

        let r = c.force_reg(operand)?;
        c.program.emit(Instr::sx(Op::Return, r, 0));
        c.program.max_registers = c.regs.high_water();
        debug!(
            instructions = c.program.instructions.len(),
            constants = c.program.constants.len(),
            "one-pass lowering complete"
        );
        Ok(c.program)
    }

    // -----------------------------------------------------------------------
    // Token cursor
    // -----------------------------------------------------------------------

    #[inline]
    fn cur(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    #[inline]
    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, kind: TokenKind) {
        if self.cur().kind == kind {
            self.advance();
        } else {
            self.parse_errors.push(ParseError::UnexpectedToken {
                expected: kind.describe().to_string(),
                found: self.cur().literal.clone(),
            });
        }
    }

    // -----------------------------------------------------------------------
    // Emission helpers
    // -----------------------------------------------------------------------

    fn force_reg(&mut self, operand: Operand) -> Result<u8, CompileError> {
        match operand {
            Operand::Reg(r) => Ok(r),
            Operand::Const(v) => {
                let idx = self.program.add_const(v);
                let r = self.regs.alloc()?;
                self.program.emit(Instr::dx(Op::LoadConst, r, idx));
                Ok(r)
            }
        }
    }

    /// Snapshot for dead-branch rollback. Instructions emitted before the
    /// mark can only reference constants interned before the mark, so the
    /// constant pool truncates safely together with the instructions.
    fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            instructions: self.program.instructions.len(),
            constants: self.program.constants.len(),
            regs: self.regs.mark(),
        }
    }

    /// Drop everything emitted since the mark, keeping the token cursor.
    fn drop_emitted(&mut self, mark: &Mark) {
        self.program.instructions.truncate(mark.instructions);
        self.program.constants.truncate(mark.constants);
        self.regs.reset_to(mark.regs);
    }

    /// Drop everything emitted since the mark and rewind the token cursor.
    fn rollback(&mut self, mark: &Mark) {
        self.pos = mark.pos;
        self.drop_emitted(mark);
    }

    /// Parse a branch that can never run, dropping whatever it emitted.
    fn parse_discarded(&mut self, prec: Precedence) -> Result<(), CompileError> {
        let mark = self.mark();
        let _ = self.parse_expr(prec)?;
        self.drop_emitted(&mark);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pratt loop
    // -----------------------------------------------------------------------

    fn parse_expr(&mut self, prec: Precedence) -> Result<Operand, CompileError> {
        let mut left = self.parse_prefix(prec)?;
        loop {
            let next = match infix_precedence(self.cur().kind) {
                Some(p) if prec < p => p,
                _ => break,
            };
            left = self.parse_infix(left, next)?;
        }
        Ok(left)
    }

    fn parse_prefix(&mut self, prec: Precedence) -> Result<Operand, CompileError> {
        let token = self.cur().clone();
        match token.kind {
            TokenKind::Number => {
                self.advance();
                Ok(Operand::Const(self.number_literal(&token.literal)))
            }
            TokenKind::Str => {
                self.advance();
                Ok(Operand::Const(Value::str(&token.literal)))
            }
            TokenKind::True => {
                self.advance();
                Ok(Operand::Const(Value::Bool(true)))
            }
            TokenKind::False => {
                self.advance();
                Ok(Operand::Const(Value::Bool(false)))
            }
            TokenKind::Ident => {
                self.advance();
                // Assignment binds only at the lowest levels and only to a
                // bare identifier; otherwise this is a read or a call.
                if self.cur().kind == TokenKind::Assign && prec <= Precedence::Assign {
                    self.advance();
                    return self.compile_assign(&token.literal);
                }
                if self.cur().kind == TokenKind::LParen {
                    self.advance();
                    return self.compile_call(&token.literal);
                }
                let idx = self.program.add_name(&token.literal);
                let r = self.regs.alloc()?;
                self.program.emit(Instr::dx(Op::GetGlobal, r, idx));
                Ok(Operand::Reg(r))
            }
            TokenKind::Minus => {
                self.advance();
                let rhs = self.parse_expr(Precedence::Prefix)?;
                self.compile_neg(rhs)
            }
            TokenKind::Bang => {
                self.advance();
                let rhs = self.parse_expr(Precedence::Prefix)?;
                self.compile_not(rhs)
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr(Precedence::Lowest)?;
                self.expect(TokenKind::RParen);
                Ok(inner)
            }
            TokenKind::If => self.compile_if(),
            TokenKind::Illegal => {
                self.parse_errors.push(ParseError::IllegalToken {
                    literal: token.literal,
                });
                self.advance();
                Ok(Operand::Const(Value::Nil))
            }
            _ => {
                self.parse_errors.push(ParseError::NoPrefixRule {
                    found: token.literal,
                });
                self.advance();
                Ok(Operand::Const(Value::Nil))
            }
        }
    }

    fn number_literal(&mut self, literal: &str) -> Value {
        if literal.contains('.') {
            match literal.parse::<f64>() {
                Ok(f) => Value::Float(f),
                Err(_) => {
                    self.parse_errors.push(ParseError::InvalidNumber {
                        literal: literal.to_string(),
                    });
                    Value::Nil
                }
            }
        } else {
            match literal.parse::<i64>() {
                Ok(n) => Value::Int(n),
                Err(_) => {
                    self.parse_errors.push(ParseError::InvalidNumber {
                        literal: literal.to_string(),
                    });
                    Value::Nil
                }
            }
        }
    }

    fn parse_infix(&mut self, left: Operand, prec: Precedence) -> Result<Operand, CompileError> {
        let kind = self.cur().kind;
        match kind {
            TokenKind::Assign => {
                // Only reachable when the left side was not a bare
                // identifier (those consume `=` in parse_prefix).
                self.parse_errors.push(ParseError::InvalidAssignTarget);
                self.advance();
                let _ = self.parse_expr(Precedence::Lowest)?;
                Ok(Operand::Const(Value::Nil))
            }
            TokenKind::LParen => {
                self.parse_errors.push(ParseError::InvalidCallTarget);
                self.advance();
                let _ = self.compile_call("")?;
                Ok(Operand::Const(Value::Nil))
            }
            TokenKind::And => {
                self.advance();
                self.compile_and(left)
            }
            TokenKind::Or => {
                self.advance();
                self.compile_or(left)
            }
            _ => {
                let op = infix_op(kind);
                self.advance();
                let right = self.parse_expr(prec)?;
                self.emit_binary(op, left, right)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Binary operators: fold, fuse, or materialize
    // -----------------------------------------------------------------------

    fn emit_binary(
        &mut self,
        op: InfixOp,
        left: Operand,
        right: Operand,
    ) -> Result<Operand, CompileError> {
        if let (Operand::Const(a), Operand::Const(b)) = (&left, &right) {
            match fold_binary(op, a, b) {
                FoldOutcome::Folded(v) => return Ok(Operand::Const(v)),
                FoldOutcome::DivisionByZero => {
                    if !self.static_errors.contains(&StaticError::DivisionByZero) {
                        self.static_errors.push(StaticError::DivisionByZero);
                    }
                    // Materialize the doomed expression anyway; compilation
                    // fails before the program can escape.
                }
                FoldOutcome::Skip => {}
            }
        }

        // Const against register: emit the const-in-immediate fused form
        // when the operator has one.
        match (&left, &right) {
            (Operand::Reg(lr), Operand::Const(c)) => {
                if let Some(fused) = const_right_op(op) {
                    let idx = self.program.add_const(c.clone());
                    let lr = *lr;
                    self.regs.free(lr);
                    let dst = self.regs.alloc()?;
                    self.program.emit(Instr {
                        op: fused,
                        dest: dst,
                        src1: lr,
                        src2: 0,
                        arg: idx,
                    });
                    return Ok(Operand::Reg(dst));
                }
            }
            (Operand::Const(c), Operand::Reg(rr)) => {
                if let Some(fused) = const_left_op(op) {
                    let idx = self.program.add_const(c.clone());
                    let rr = *rr;
                    self.regs.free(rr);
                    let dst = self.regs.alloc()?;
                    self.program.emit(Instr {
                        op: fused,
                        dest: dst,
                        src1: rr,
                        src2: 0,
                        arg: idx,
                    });
                    return Ok(Operand::Reg(dst));
                }
            }
            _ => {}
        }

        // Plain materialization.
        let (lr, rr, frees) = match (left, right) {
            (Operand::Reg(a), Operand::Reg(b)) => (a, b, (b, a)),
            (Operand::Reg(a), Operand::Const(c)) => {
                let t = self.load_temp(c)?;
                (a, t, (t, a))
            }
            (Operand::Const(c), Operand::Reg(b)) => {
                let t = self.load_temp(c)?;
                (t, b, (t, b))
            }
            (Operand::Const(c1), Operand::Const(c2)) => {
                let t1 = self.load_temp(c1)?;
                let t2 = self.load_temp(c2)?;
                (t1, t2, (t2, t1))
            }
        };
        self.regs.free(frees.0);
        self.regs.free(frees.1);
        let dst = self.regs.alloc()?;
        self.program.emit(Instr::abc(binary_op(op), dst, lr, rr));
        Ok(Operand::Reg(dst))
    }

    fn load_temp(&mut self, v: Value) -> Result<u8, CompileError> {
        let idx = self.program.add_const(v);
        let r = self.regs.alloc()?;
        self.program.emit(Instr::dx(Op::LoadConst, r, idx));
        Ok(r)
    }

    // -----------------------------------------------------------------------
    // Prefix operators
    // -----------------------------------------------------------------------

    fn compile_neg(&mut self, rhs: Operand) -> Result<Operand, CompileError> {
        if let Operand::Const(v) = &rhs {
            if let Some(folded) = fold_prefix(PrefixOp::Neg, v) {
                return Ok(Operand::Const(folded));
            }
        }
        // `-x` is `0 - x`; the subtraction keeps integers integer.
        self.emit_binary(InfixOp::Sub, Operand::Const(Value::Int(0)), rhs)
    }

    fn compile_not(&mut self, rhs: Operand) -> Result<Operand, CompileError> {
        match rhs {
            Operand::Const(v) => Ok(Operand::Const(Value::Bool(!v.truthy()))),
            Operand::Reg(r) => {
                self.regs.free(r);
                let dst = self.regs.alloc()?;
                self.program.emit(Instr::abc(Op::Not, dst, r, 0));
                Ok(Operand::Reg(dst))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Assignment
    // -----------------------------------------------------------------------

    fn compile_assign(&mut self, name: &str) -> Result<Operand, CompileError> {
        let value = self.parse_expr(Precedence::Lowest)?;
        let r = self.force_reg(value)?;
        let idx = self.program.add_name(name);
        self.program.emit(Instr::sx(Op::SetGlobal, r, idx));
        Ok(Operand::Reg(r))
    }

    // -----------------------------------------------------------------------
    // Short-circuit logic
    // -----------------------------------------------------------------------

    fn compile_and(&mut self, left: Operand) -> Result<Operand, CompileError> {
        match left {
            Operand::Const(lv) => {
                if !lv.truthy() {
                    // Right side can never run; parse it and drop the code.
                    self.parse_discarded(Precedence::And)?;
                    return Ok(Operand::Const(Value::Bool(false)));
                }
                let right = self.parse_expr(Precedence::And)?;
                self.coerce_bool(right)
            }
            Operand::Reg(lr) => {
                let jf = self.program.emit_jump(Op::JumpIfFalse, lr);
                self.regs.free(lr);

                let right = self.parse_expr(Precedence::And)?;
                let rr = self.force_reg(right)?;
                self.regs.free(rr);
                let dst = self.regs.alloc()?;
                self.program.emit(Instr::abc(Op::And, dst, rr, rr));
                let jend = self.program.emit_jump(Op::Jump, 0);

                self.program.patch_jump(jf);
                let idx = self.program.add_const(Value::Bool(false));
                self.program.emit(Instr::dx(Op::LoadConst, dst, idx));
                self.program.patch_jump(jend);
                Ok(Operand::Reg(dst))
            }
        }
    }

    fn compile_or(&mut self, left: Operand) -> Result<Operand, CompileError> {
        match left {
            Operand::Const(lv) => {
                if lv.truthy() {
                    self.parse_discarded(Precedence::Or)?;
                    return Ok(Operand::Const(Value::Bool(true)));
                }
                let right = self.parse_expr(Precedence::Or)?;
                self.coerce_bool(right)
            }
            Operand::Reg(lr) => {
                let jt = self.program.emit_jump(Op::JumpIfTrue, lr);
                self.regs.free(lr);

                let right = self.parse_expr(Precedence::Or)?;
                let rr = self.force_reg(right)?;
                self.regs.free(rr);
                let dst = self.regs.alloc()?;
                self.program.emit(Instr::abc(Op::Or, dst, rr, rr));
                let jend = self.program.emit_jump(Op::Jump, 0);

                self.program.patch_jump(jt);
                let idx = self.program.add_const(Value::Bool(true));
                self.program.emit(Instr::dx(Op::LoadConst, dst, idx));
                self.program.patch_jump(jend);
                Ok(Operand::Reg(dst))
            }
        }
    }

    /// Materialize the truthy coercion of an operand (the surviving side of
    /// a short-circuit whose other side was a known constant).
    fn coerce_bool(&mut self, operand: Operand) -> Result<Operand, CompileError> {
        match operand {
            Operand::Const(v) => Ok(Operand::Const(Value::Bool(v.truthy()))),
            Operand::Reg(r) => {
                self.regs.free(r);
                let dst = self.regs.alloc()?;
                self.program.emit(Instr::abc(Op::And, dst, r, r));
                Ok(Operand::Reg(dst))
            }
        }
    }

    // -----------------------------------------------------------------------
    // If forms
    // -----------------------------------------------------------------------

    fn compile_if(&mut self) -> Result<Operand, CompileError> {
        self.advance(); // 'if'
        let cond = self.parse_expr(Precedence::Lowest)?;

        match self.cur().kind {
            TokenKind::Is => {
                self.advance();
                self.compile_if_is(cond)
            }
            TokenKind::Then => {
                self.advance();
                self.compile_if_then(cond)
            }
            _ => self.coerce_bool(cond), // simple if
        }
    }

    fn compile_if_is(&mut self, cond: Operand) -> Result<Operand, CompileError> {
        match cond {
            Operand::Const(cv) => {
                if cv.truthy() {
                    let conseq = self.parse_expr(Precedence::Lowest)?;
                    if self.cur().kind == TokenKind::Else {
                        self.advance();
                        self.discard_else_arm()?;
                    }
                    Ok(conseq)
                } else {
                    self.parse_discarded(Precedence::Lowest)?;
                    if self.cur().kind == TokenKind::Else {
                        self.advance();
                        self.parse_else_arm()
                    } else {
                        Ok(Operand::Const(Value::Nil))
                    }
                }
            }
            Operand::Reg(cr) => {
                let jf = self.program.emit_jump(Op::JumpIfFalse, cr);
                self.regs.free(cr);

                let conseq = self.parse_expr(Precedence::Lowest)?;
                let c = self.force_reg(conseq)?;
                self.regs.free(c);
                let jend = self.program.emit_jump(Op::Jump, 0);
                self.program.patch_jump(jf);

                if self.cur().kind == TokenKind::Else {
                    self.advance();
                    let alt = self.parse_else_arm()?;
                    let a = self.force_reg(alt)?;
                    self.regs.free(a);
                } else {
                    let t = self.load_temp(Value::Nil)?;
                    self.regs.free(t);
                }
                self.program.patch_jump(jend);
                Ok(Operand::Reg(self.regs.alloc()?))
            }
        }
    }

    /// After `else`: either `is <expr>` or a nested `if`.
    fn parse_else_arm(&mut self) -> Result<Operand, CompileError> {
        match self.cur().kind {
            TokenKind::If => self.compile_if(),
            TokenKind::Is => {
                self.advance();
                self.parse_expr(Precedence::Lowest)
            }
            _ => {
                self.parse_errors.push(ParseError::UnexpectedToken {
                    expected: "'is' or 'if'".to_string(),
                    found: self.cur().literal.clone(),
                });
                Ok(Operand::Const(Value::Nil))
            }
        }
    }

    fn discard_else_arm(&mut self) -> Result<(), CompileError> {
        let mark = self.mark();
        let _ = self.parse_else_arm()?;
        self.drop_emitted(&mark);
        Ok(())
    }

    fn compile_if_then(&mut self, cond: Operand) -> Result<Operand, CompileError> {
        match cond {
            Operand::Const(cv) => {
                if cv.truthy() {
                    self.parse_expr(Precedence::Lowest)
                } else {
                    self.parse_discarded(Precedence::Lowest)?;
                    Ok(Operand::Const(Value::Nil))
                }
            }
            Operand::Reg(cr) => {
                let jf = self.program.emit_jump(Op::JumpIfFalse, cr);
                self.regs.free(cr);

                let conseq = self.parse_expr(Precedence::Lowest)?;
                let c = self.force_reg(conseq)?;
                self.regs.free(c);
                let jend = self.program.emit_jump(Op::Jump, 0);

                self.program.patch_jump(jf);
                let t = self.load_temp(Value::Nil)?;
                self.regs.free(t);
                self.program.patch_jump(jend);
                Ok(Operand::Reg(self.regs.alloc()?))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    /// Arguments stay constants as long as possible. The first non-constant
    /// argument forces every held constant into a register, in argument
    /// order, re-parsing the current argument so the registers stay
    /// consecutive. All-constant `concat` folds away completely.
    fn compile_call(&mut self, name: &str) -> Result<Operand, CompileError> {
        let base = self.regs.mark();
        let mut held: Vec<Value> = Vec::new();
        let mut reg_mode = false;
        let mut argc: u8 = 0;

        if self.cur().kind != TokenKind::RParen {
            loop {
                if reg_mode {
                    let arg = self.parse_expr(Precedence::Lowest)?;
                    let _ = self.force_reg(arg)?;
                    argc += 1;
                } else {
                    let mark = self.mark();
                    let arg = self.parse_expr(Precedence::Lowest)?;
                    match arg {
                        Operand::Const(v) => {
                            held.push(v);
                            argc += 1;
                        }
                        Operand::Reg(_) => {
                            // Materialization point: rewind, flush the held
                            // constants, then take this argument again.
                            self.rollback(&mark);
                            for v in held.drain(..) {
                                let _ = self.load_temp(v)?;
                            }
                            reg_mode = true;
                            let arg = self.parse_expr(Precedence::Lowest)?;
                            let _ = self.force_reg(arg)?;
                            argc += 1;
                        }
                    }
                }
                if self.cur().kind == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen);

        if !reg_mode && name == "concat" {
            let mut out = String::new();
            for v in &held {
                v.push_display(&mut out);
            }
            return Ok(Operand::Const(Value::from(out)));
        }
        if !reg_mode {
            for v in held.drain(..) {
                let _ = self.load_temp(v)?;
            }
        }

        for r in (base..base + argc as u16).rev() {
            self.regs.free(r as u8);
        }
        let dst = self.regs.alloc()?;
        if name == "concat" {
            self.program
                .emit(Instr::abc(Op::Concat, dst, base as u8, argc));
        } else {
            let idx = self.program.add_name(name);
            self.program.emit(Instr::call(dst, base as u8, argc, idx));
        }
        Ok(Operand::Reg(dst))
    }
}

// ---------------------------------------------------------------------------
// Token → operator tables (mirroring the tree parser)
// ---------------------------------------------------------------------------

fn infix_precedence(kind: TokenKind) -> Option<Precedence> {
    match kind {
        TokenKind::Assign => Some(Precedence::Assign),
        TokenKind::Or => Some(Precedence::Or),
        TokenKind::And => Some(Precedence::And),
        TokenKind::Eq | TokenKind::NotEq => Some(Precedence::Equality),
        TokenKind::Lt | TokenKind::Gt | TokenKind::LtEq | TokenKind::GtEq => {
            Some(Precedence::Relational)
        }
        TokenKind::Plus | TokenKind::Minus => Some(Precedence::Additive),
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Some(Precedence::Multiplicative),
        TokenKind::LParen => Some(Precedence::Call),
        _ => None,
    }
}

fn infix_op(kind: TokenKind) -> InfixOp {
    match kind {
        TokenKind::Plus => InfixOp::Add,
        TokenKind::Minus => InfixOp::Sub,
        TokenKind::Star => InfixOp::Mul,
        TokenKind::Slash => InfixOp::Div,
        TokenKind::Percent => InfixOp::Mod,
        TokenKind::Eq => InfixOp::Eq,
        TokenKind::NotEq => InfixOp::Ne,
        TokenKind::Lt => InfixOp::Lt,
        TokenKind::Gt => InfixOp::Gt,
        TokenKind::LtEq => InfixOp::Le,
        TokenKind::GtEq => InfixOp::Ge,
        _ => InfixOp::Add, // unreachable behind infix_precedence
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
        InfixOp::And => Op::And,
        InfixOp::Or => Op::Or,
    }
}

fn const_right_op(op: InfixOp) -> Option<Op> {
    match op {
        InfixOp::Add => Some(Op::AddConst),
        InfixOp::Sub => Some(Op::SubConst),
        InfixOp::Mul => Some(Op::MulConst),
        InfixOp::Div => Some(Op::DivConst),
        InfixOp::Eq => Some(Op::EqConst),
        InfixOp::Gt => Some(Op::GtConst),
        InfixOp::Lt => Some(Op::LtConst),
        _ => None,
    }
}

/// Constant on the left: commutative ops reuse the right-hand form, the
/// strict comparisons flip. Subtraction and division materialize instead.
fn const_left_op(op: InfixOp) -> Option<Op> {
    match op {
        InfixOp::Add => Some(Op::AddConst),
        InfixOp::Mul => Some(Op::MulConst),
        InfixOp::Eq => Some(Op::EqConst),
        InfixOp::Gt => Some(Op::LtConst),
        InfixOp::Lt => Some(Op::GtConst),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Op;

    fn compile(source: &str) -> Program {
        OnePass::compile(source).expect("one-pass compile")
    }

    fn ops(p: &Program) -> Vec<Op> {
        p.instructions.iter().map(|i| i.op).collect()
    }

    #[test]
    fn constants_fold_on_the_fly() {
        let p = compile("1 + 2 * 3");
        assert_eq!(ops(&p), vec![Op::LoadConst, Op::Return]);
        assert_eq!(p.constants, vec![Value::Int(7)]);
    }

    #[test]
    fn const_operand_emits_fused_op() {
        let p = compile("a + 1");
        assert_eq!(ops(&p), vec![Op::GetGlobal, Op::AddConst, Op::Return]);

        // Constant on the left of a subtraction has no immediate form.
        let p = compile("10 - a");
        assert_eq!(
            ops(&p),
            vec![Op::GetGlobal, Op::LoadConst, Op::Sub, Op::Return]
        );

        // Constant on the left of a commutative op reuses the fused form.
        let p = compile("3 * a");
        assert_eq!(ops(&p), vec![Op::GetGlobal, Op::MulConst, Op::Return]);

        // Flipped comparison.
        let p = compile("10 > a");
        assert_eq!(ops(&p), vec![Op::GetGlobal, Op::LtConst, Op::Return]);
    }

    #[test]
    fn false_and_drops_the_right_side() {
        let p = compile("false && (a = 2)");
        assert_eq!(ops(&p), vec![Op::LoadConst, Op::Return]);
        assert_eq!(p.constants, vec![Value::Bool(false)]);
    }

    #[test]
    fn true_or_drops_the_right_side() {
        let p = compile("true || (a = 2)");
        assert_eq!(ops(&p), vec![Op::LoadConst, Op::Return]);
        assert_eq!(p.constants, vec![Value::Bool(true)]);
    }

    #[test]
    fn known_condition_keeps_one_arm() {
        let p = compile(r#"if 1 < 2 is "a" else is "b""#);
        assert_eq!(ops(&p), vec![Op::LoadConst, Op::Return]);
        assert_eq!(p.constants, vec![Value::str("a")]);

        let p = compile("if false then a = 1");
        assert_eq!(ops(&p), vec![Op::LoadConst, Op::Return]);
        assert_eq!(p.constants, vec![Value::Nil]);
    }

    #[test]
    fn all_literal_concat_folds() {
        let p = compile(r#"concat("a", 1, true)"#);
        assert_eq!(ops(&p), vec![Op::LoadConst, Op::Return]);
        assert_eq!(p.constants, vec![Value::str("a1true")]);
    }

    #[test]
    fn mixed_concat_arguments_land_consecutively() {
        let p = compile(r#"concat("hello", " ", name)"#);
        let concat = p.instructions.iter().find(|i| i.op == Op::Concat).unwrap();
        assert_eq!(concat.src2, 3);
        // Two constant loads then the global, all below the concat's base+3.
        let loads = p
            .instructions
            .iter()
            .filter(|i| i.op == Op::LoadConst)
            .count();
        assert_eq!(loads, 2);
    }

    #[test]
    fn literal_zero_divisor_is_a_static_error() {
        match OnePass::compile("1 / 0") {
            Err(CompileError::Static(errors)) => {
                assert_eq!(errors, vec![StaticError::DivisionByZero])
            }
            other => panic!("expected static failure, got {other:?}"),
        }
    }

    #[test]
    fn dead_branch_static_errors_are_kept() {
        // Matches the tree pipeline: folding still sees the doomed literal.
        assert!(matches!(
            OnePass::compile("true || (1 / 0)"),
            Err(CompileError::Static(_))
        ));
    }

    #[test]
    fn parse_errors_accumulate() {
        match OnePass::compile("a & b") {
            Err(CompileError::Syntax(errors)) => {
                assert!(matches!(errors[0], ParseError::IllegalToken { .. }))
            }
            other => panic!("expected syntax failure, got {other:?}"),
        }
    }

    #[test]
    fn assignment_result_is_the_value() {
        let p = compile("a = 2");
        assert_eq!(ops(&p), vec![Op::LoadConst, Op::SetGlobal, Op::Return]);
        assert_eq!(p.instructions[1].src1, p.instructions[2].src1);
    }
}
