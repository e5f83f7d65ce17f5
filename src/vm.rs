/// Register virtual machine.
///
/// 256 registers live in a per-call vector; dispatch is instruction-at-a-
/// time over an immutable `Program`. Variable access is abstracted behind
/// the small `Vars` trait with two implementations: direct `HashMap`
/// access — the specialized fast path, monomorphized so the map is read
/// and written with no dynamic dispatch — and a `&mut dyn Environment`
/// adapter for caller-supplied environments. Both run the same `run` body
/// and are semantically identical.
///
/// Runtime failures abort execution immediately with no partial value.
/// Reading an absent variable is not a failure; it yields Nil.

use std::collections::HashMap;

use tracing::trace;

use crate::builtins;
use crate::bytecode::{cmp_name, cmp_target, cmp_value, pair_hi, pair_lo, Op, Program};
use crate::env::Environment;
use crate::errors::RuntimeError;
use crate::value::Value;

/// Number of registers in the VM register file. Compilation caps usage
/// below this, so 8-bit operands can never index out of bounds.
pub const REGISTER_COUNT: usize = 256;

// ---------------------------------------------------------------------------
// Variable access — the specialization seam
// ---------------------------------------------------------------------------

pub trait Vars {
    fn load(&mut self, name: &str) -> Value;
    fn store(&mut self, name: &str, value: Value) -> Result<(), RuntimeError>;
}

/// Direct map access; the default-environment fast path.
pub struct MapVars<'a>(pub &'a mut HashMap<String, Value>);

impl Vars for MapVars<'_> {
    #[inline]
    fn load(&mut self, name: &str) -> Value {
        self.0.get(name).cloned().unwrap_or(Value::Nil)
    }

    #[inline]
    fn store(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        self.0.insert(name.to_string(), value);
        Ok(())
    }
}

/// Trait-object path for caller-supplied environments.
pub struct EnvVars<'a>(pub &'a mut dyn Environment);

impl Vars for EnvVars<'_> {
    #[inline]
    fn load(&mut self, name: &str) -> Value {
        self.0.get(name).unwrap_or(Value::Nil)
    }

    #[inline]
    fn store(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        self.0.set(name, value)
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Execute a program against the given variable store.
pub fn run<V: Vars>(program: &Program, vars: &mut V) -> Result<Value, RuntimeError> {
    trace!(
        instructions = program.instructions.len(),
        "executing byte-code"
    );
    let code = &program.instructions;
    let consts = &program.constants;
    let mut regs: Vec<Value> = vec![Value::Nil; REGISTER_COUNT];
    let mut ip = 0usize;

    while ip < code.len() {
        let instr = code[ip];
        ip += 1;

        let dest = instr.dest as usize;
        let src1 = instr.src1 as usize;
        let src2 = instr.src2 as usize;

        match instr.op {
            // ── Loads and globals ───────────────────────────────────────────
            Op::LoadConst => {
                regs[dest] = const_at(consts, instr.arg);
            }
            Op::GetGlobal => {
                regs[dest] = vars.load(name_at(consts, instr.arg)?);
            }
            Op::SetGlobal => {
                let v = regs[src1].clone();
                vars.store(name_at(consts, instr.arg)?, v)?;
            }

            // ── Arithmetic and comparison ───────────────────────────────────
            Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Mod => {
                regs[dest] = arith(instr.op, &regs[src1], &regs[src2])?;
            }
            Op::Eq | Op::Ne | Op::Lt | Op::Gt | Op::Le | Op::Ge => {
                regs[dest] = compare(instr.op, &regs[src1], &regs[src2]);
            }

            // ── Logic ───────────────────────────────────────────────────────
            Op::And => {
                regs[dest] = Value::Bool(regs[src1].truthy() && regs[src2].truthy());
            }
            Op::Or => {
                regs[dest] = Value::Bool(regs[src1].truthy() || regs[src2].truthy());
            }
            Op::Not => {
                regs[dest] = Value::Bool(!regs[src1].truthy());
            }

            // ── Control flow ────────────────────────────────────────────────
            Op::Jump => {
                ip = instr.arg as usize;
            }
            Op::JumpIfFalse => {
                if !regs[src1].truthy() {
                    ip = instr.arg as usize;
                }
            }
            Op::JumpIfTrue => {
                if regs[src1].truthy() {
                    ip = instr.arg as usize;
                }
            }

            // ── Calls and return ────────────────────────────────────────────
            Op::Call => {
                let name = name_at(consts, instr.arg)?;
                let f = builtins::lookup(name).ok_or_else(|| RuntimeError::UnknownFunction {
                    name: name.to_string(),
                })?;
                regs[dest] = f(&regs[src1..src1 + src2])?;
            }
            Op::Concat => {
                regs[dest] = builtins::concat_values(&regs[src1..src1 + src2]);
            }
            Op::Return => {
                return Ok(std::mem::replace(&mut regs[src1], Value::Nil));
            }

            // ── Fused: global load + conditional jump ───────────────────────
            // The loaded value is consumed by the branch test; no register
            // is written.
            Op::GetGlobalJumpIfFalse => {
                let v = vars.load(name_at(consts, pair_hi(instr.arg))?);
                if !v.truthy() {
                    ip = pair_lo(instr.arg) as usize;
                }
            }
            Op::GetGlobalJumpIfTrue => {
                let v = vars.load(name_at(consts, pair_hi(instr.arg))?);
                if v.truthy() {
                    ip = pair_lo(instr.arg) as usize;
                }
            }

            // ── Fused: global == const + conditional jump ───────────────────
            Op::EqGlobalConstJumpIfFalse => {
                let g = vars.load(name_at(consts, cmp_name(instr.arg))?);
                let k = const_at(consts, cmp_value(instr.arg));
                if !g.eq_val(&k) {
                    ip = cmp_target(instr.arg) as usize;
                }
            }

            // ── Fused: global ⊗ const ───────────────────────────────────────
            Op::AddGlobalConst
            | Op::SubGlobalConst
            | Op::MulGlobalConst
            | Op::DivGlobalConst
            | Op::EqGlobalConst
            | Op::GtGlobalConst
            | Op::LtGlobalConst => {
                let g = vars.load(name_at(consts, pair_hi(instr.arg))?);
                let k = const_at(consts, pair_lo(instr.arg));
                regs[dest] = match instr.op {
                    Op::AddGlobalConst => arith(Op::Add, &g, &k)?,
                    Op::SubGlobalConst => arith(Op::Sub, &g, &k)?,
                    Op::MulGlobalConst => arith(Op::Mul, &g, &k)?,
                    Op::DivGlobalConst => arith(Op::Div, &g, &k)?,
                    Op::EqGlobalConst => compare(Op::Eq, &g, &k),
                    Op::GtGlobalConst => compare(Op::Gt, &g, &k),
                    _ => compare(Op::Lt, &g, &k),
                };
            }

            // ── Fused: const ⊗ global (name still in the high half) ─────────
            Op::SubConstGlobal | Op::DivConstGlobal => {
                let g = vars.load(name_at(consts, pair_hi(instr.arg))?);
                let k = const_at(consts, pair_lo(instr.arg));
                regs[dest] = match instr.op {
                    Op::SubConstGlobal => arith(Op::Sub, &k, &g)?,
                    _ => arith(Op::Div, &k, &g)?,
                };
            }

            // ── Fused: global ⊗ global ──────────────────────────────────────
            Op::AddGlobalGlobal | Op::SubGlobalGlobal | Op::MulGlobalGlobal => {
                let l = vars.load(name_at(consts, pair_hi(instr.arg))?);
                let r = vars.load(name_at(consts, pair_lo(instr.arg))?);
                regs[dest] = match instr.op {
                    Op::AddGlobalGlobal => arith(Op::Add, &l, &r)?,
                    Op::SubGlobalGlobal => arith(Op::Sub, &l, &r)?,
                    _ => arith(Op::Mul, &l, &r)?,
                };
            }

            // ── Fused: register ⊗ const-in-immediate ────────────────────────
            Op::AddConst | Op::SubConst | Op::MulConst | Op::DivConst => {
                let k = const_at(consts, instr.arg);
                let base = match instr.op {
                    Op::AddConst => Op::Add,
                    Op::SubConst => Op::Sub,
                    Op::MulConst => Op::Mul,
                    _ => Op::Div,
                };
                regs[dest] = arith(base, &regs[src1], &k)?;
            }
            Op::EqConst | Op::GtConst | Op::LtConst => {
                let k = const_at(consts, instr.arg);
                let base = match instr.op {
                    Op::EqConst => Op::Eq,
                    Op::GtConst => Op::Gt,
                    _ => Op::Lt,
                };
                regs[dest] = compare(base, &regs[src1], &k);
            }
        }
    }

    // Fell off the end without a Return.
    Ok(Value::Nil)
}

#[inline]
fn const_at(consts: &[Value], idx: u32) -> Value {
    consts.get(idx as usize).cloned().unwrap_or(Value::Nil)
}

#[inline]
fn name_at(consts: &[Value], idx: u32) -> Result<&str, RuntimeError> {
    match consts.get(idx as usize) {
        Some(Value::Str(s)) => Ok(s),
        other => Err(RuntimeError::InvalidOperation {
            message: format!("malformed byte-code: expected a name constant, got {other:?}"),
        }),
    }
}

// ---------------------------------------------------------------------------
// Operator semantics
// ---------------------------------------------------------------------------

/// Int/Int stays Int; mixed numeric promotes to Float; `+` on two strings
/// concatenates. Division and modulo by zero fail; modulo requires
/// integers on both sides.
fn arith(op: Op, l: &Value, r: &Value) -> Result<Value, RuntimeError> {
    use Value::*;
    match op {
        Op::Add => match (l, r) {
            (Int(a), Int(b)) => Ok(Int(a.wrapping_add(*b))),
            (Str(a), Str(b)) => {
                let mut s = String::with_capacity(a.len() + b.len());
                s.push_str(a);
                s.push_str(b);
                Ok(Value::from(s))
            }
            _ => numeric(op, l, r, |a, b| a + b),
        },
        Op::Sub => match (l, r) {
            (Int(a), Int(b)) => Ok(Int(a.wrapping_sub(*b))),
            _ => numeric(op, l, r, |a, b| a - b),
        },
        Op::Mul => match (l, r) {
            (Int(a), Int(b)) => Ok(Int(a.wrapping_mul(*b))),
            _ => numeric(op, l, r, |a, b| a * b),
        },
        Op::Div => match (l, r) {
            (Int(_), Int(0)) => Err(RuntimeError::DivisionByZero),
            (Int(a), Int(b)) => Ok(Int(a.wrapping_div(*b))),
            _ => match (l.to_float(), r.to_float()) {
                (Some(_), Some(b)) if b == 0.0 => Err(RuntimeError::DivisionByZero),
                (Some(a), Some(b)) => Ok(Float(a / b)),
                _ => Err(invalid(op, l, r)),
            },
        },
        Op::Mod => match (l, r) {
            (Int(_), Int(0)) => Err(RuntimeError::DivisionByZero),
            (Int(a), Int(b)) => Ok(Int(a.wrapping_rem(*b))),
            _ => Err(RuntimeError::ModuloNonInteger),
        },
        _ => Err(invalid(op, l, r)),
    }
}

fn numeric(
    op: Op,
    l: &Value,
    r: &Value,
    f: fn(f64, f64) -> f64,
) -> Result<Value, RuntimeError> {
    match (l.to_float(), r.to_float()) {
        (Some(a), Some(b)) => Ok(Value::Float(f(a, b))),
        _ => Err(invalid(op, l, r)),
    }
}

fn invalid(op: Op, l: &Value, r: &Value) -> RuntimeError {
    let symbol = match op {
        Op::Add => "+",
        Op::Sub => "-",
        Op::Mul => "*",
        Op::Div => "/",
        Op::Mod => "%",
        _ => "?",
    };
    RuntimeError::InvalidOperation {
        message: format!("{} {} {}", l.type_name(), symbol, r.type_name()),
    }
}

/// Equality widens Int↔Float; ordering is defined on numeric pairs only
/// and yields false for anything else.
fn compare(op: Op, l: &Value, r: &Value) -> Value {
    let b = match op {
        Op::Eq => l.eq_val(r),
        Op::Ne => !l.eq_val(r),
        Op::Lt => l.lt(r),
        Op::Gt => r.lt(l),
        Op::Le => l.le(r),
        Op::Ge => r.le(l),
        _ => false,
    };
    Value::Bool(b)
}
