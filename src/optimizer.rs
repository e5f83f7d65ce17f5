/// Tree-level optimization pipeline.
///
/// Two passes composed: constant folding (bottom-up rewrite) and algebraic
/// simplification (identity rewrites, guarded so nothing impure is dropped
/// or duplicated), plus static checks that record errors without rewriting.
/// Findings accumulate; the engine aborts compilation when any exist.
///
/// `fold_binary` / `fold_prefix` are the single source of truth for
/// compile-time evaluation — the one-pass compiler folds with the same
/// functions, which keeps the two lowerings observably equivalent.

use tracing::debug;

use crate::ast::{Expr, InfixOp, PrefixOp};
use crate::errors::StaticError;
use crate::value::Value;

/// Outcome of a compile-time binary evaluation attempt.
pub(crate) enum FoldOutcome {
    Folded(Value),
    DivisionByZero,
    Skip,
}

/// Evaluate `l op r` over literal values, mirroring the VM's arithmetic
/// and comparison rules. `Skip` means the node must survive to runtime.
pub(crate) fn fold_binary(op: InfixOp, l: &Value, r: &Value) -> FoldOutcome {
    use FoldOutcome::*;
    use Value::*;
    match op {
        InfixOp::Add => match (l, r) {
            (Int(a), Int(b)) => Folded(Int(a.wrapping_add(*b))),
            (Str(a), Str(b)) => {
                let mut s = String::with_capacity(a.len() + b.len());
                s.push_str(a);
                s.push_str(b);
                Folded(Value::from(s))
            }
            _ => match (l.to_float(), r.to_float()) {
                (Some(a), Some(b)) => Folded(Float(a + b)),
                _ => Skip,
            },
        },
        InfixOp::Sub => match (l, r) {
            (Int(a), Int(b)) => Folded(Int(a.wrapping_sub(*b))),
            _ => match (l.to_float(), r.to_float()) {
                (Some(a), Some(b)) => Folded(Float(a - b)),
                _ => Skip,
            },
        },
        InfixOp::Mul => match (l, r) {
            (Int(a), Int(b)) => Folded(Int(a.wrapping_mul(*b))),
            _ => match (l.to_float(), r.to_float()) {
                (Some(a), Some(b)) => Folded(Float(a * b)),
                _ => Skip,
            },
        },
        InfixOp::Div => match (l, r) {
            (Int(_), Int(0)) => DivisionByZero,
            (Int(a), Int(b)) => Folded(Int(a.wrapping_div(*b))),
            _ => match (l.to_float(), r.to_float()) {
                (Some(_), Some(b)) if b == 0.0 => DivisionByZero,
                (Some(a), Some(b)) => Folded(Float(a / b)),
                _ => Skip,
            },
        },
        InfixOp::Mod => match (l, r) {
            (Int(_), Int(0)) => DivisionByZero,
            (Int(a), Int(b)) => Folded(Int(a.wrapping_rem(*b))),
            // Non-integer modulo is a runtime error; leave it there.
            _ => Skip,
        },
        InfixOp::Eq => Folded(Bool(l.eq_val(r))),
        InfixOp::Ne => Folded(Bool(!l.eq_val(r))),
        InfixOp::Lt if l.is_numeric() && r.is_numeric() => Folded(Bool(l.lt(r))),
        InfixOp::Gt if l.is_numeric() && r.is_numeric() => Folded(Bool(r.lt(l))),
        InfixOp::Le if l.is_numeric() && r.is_numeric() => Folded(Bool(l.le(r))),
        InfixOp::Ge if l.is_numeric() && r.is_numeric() => Folded(Bool(r.le(l))),
        _ => Skip,
    }
}

/// Evaluate a prefix operator over a literal value.
pub(crate) fn fold_prefix(op: PrefixOp, v: &Value) -> Option<Value> {
    match (op, v) {
        (PrefixOp::Neg, Value::Int(n)) => Some(Value::Int(n.wrapping_neg())),
        (PrefixOp::Neg, Value::Float(f)) => Some(Value::Float(-f)),
        (PrefixOp::Not, v) => Some(Value::Bool(!v.truthy())),
        _ => None,
    }
}

/// Literal node → runtime value, if the node is a literal.
pub(crate) fn literal_value(e: &Expr) -> Option<Value> {
    match e {
        Expr::IntLit(n) => Some(Value::Int(*n)),
        Expr::FloatLit(f) => Some(Value::Float(*f)),
        Expr::StrLit(s) => Some(Value::str(s)),
        Expr::BoolLit(b) => Some(Value::Bool(*b)),
        Expr::Nil => Some(Value::Nil),
        _ => None,
    }
}

fn literal_expr(v: Value) -> Expr {
    match v {
        Value::Nil => Expr::Nil,
        Value::Int(n) => Expr::IntLit(n),
        Value::Float(f) => Expr::FloatLit(f),
        Value::Bool(b) => Expr::BoolLit(b),
        Value::Str(s) => Expr::StrLit(s.to_string()),
        // Maps never appear as literals.
        Value::Map(_) => Expr::Nil,
    }
}

pub struct Optimizer {
    errors: Vec<StaticError>,
}

impl Optimizer {
    pub fn new() -> Self {
        Optimizer { errors: Vec::new() }
    }

    pub fn finish(self) -> Vec<StaticError> {
        self.errors
    }

    // -----------------------------------------------------------------------
    // Pass 1: constant folding
    // -----------------------------------------------------------------------

    /// Bottom-up rewrite. Anything whose operands are literals becomes a
    /// literal; division by a literal zero refuses to fold and records an
    /// error instead.
    pub fn fold(&mut self, e: Expr) -> Expr {
        match e {
            Expr::Prefix { op, rhs } => {
                let rhs = self.fold(*rhs);
                if let Some(v) = literal_value(&rhs) {
                    if let Some(folded) = fold_prefix(op, &v) {
                        return literal_expr(folded);
                    }
                }
                Expr::Prefix {
                    op,
                    rhs: Box::new(rhs),
                }
            }
            Expr::Infix { op: InfixOp::And, lhs, rhs } => self.fold_logical(InfixOp::And, *lhs, *rhs),
            Expr::Infix { op: InfixOp::Or, lhs, rhs } => self.fold_logical(InfixOp::Or, *lhs, *rhs),
            Expr::Infix { op, lhs, rhs } => {
                let lhs = self.fold(*lhs);
                let rhs = self.fold(*rhs);
                if let (Some(lv), Some(rv)) = (literal_value(&lhs), literal_value(&rhs)) {
                    match fold_binary(op, &lv, &rv) {
                        FoldOutcome::Folded(v) => return literal_expr(v),
                        FoldOutcome::DivisionByZero => self.record(StaticError::DivisionByZero),
                        FoldOutcome::Skip => {}
                    }
                }
                Expr::Infix {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                }
            }
            Expr::If {
                cond,
                conseq,
                alt,
                simple,
                then_form,
            } => {
                let cond = self.fold(*cond);
                let conseq = conseq.map(|c| Box::new(self.fold(*c)));
                let alt = alt.map(|a| Box::new(self.fold(*a)));
                if let Some(cv) = literal_value(&cond) {
                    if simple {
                        return Expr::BoolLit(cv.truthy());
                    }
                    return if cv.truthy() {
                        conseq.map(|c| *c).unwrap_or(Expr::Nil)
                    } else {
                        alt.map(|a| *a).unwrap_or(Expr::Nil)
                    };
                }
                Expr::If {
                    cond: Box::new(cond),
                    conseq,
                    alt,
                    simple,
                    then_form,
                }
            }
            Expr::Assign { name, value } => Expr::Assign {
                name,
                value: Box::new(self.fold(*value)),
            },
            Expr::Call { name, args } => {
                let args: Vec<Expr> = args.into_iter().map(|a| self.fold(a)).collect();
                if name == "concat" {
                    if let Some(values) = args
                        .iter()
                        .map(literal_value)
                        .collect::<Option<Vec<Value>>>()
                    {
                        let mut out = String::new();
                        for v in &values {
                            v.push_display(&mut out);
                        }
                        return Expr::StrLit(out);
                    }
                }
                Expr::Call { name, args }
            }
            leaf => leaf,
        }
    }

    /// `&&` with a falsy literal left side folds to false; with a truthy
    /// literal left side, the result is the right side's truthy coercion —
    /// taken only when the right side itself folded to a literal, because
    /// the materialized result of `&&`/`||` is always Bool. `||` symmetric.
    fn fold_logical(&mut self, op: InfixOp, lhs: Expr, rhs: Expr) -> Expr {
        let lhs = self.fold(lhs);
        let rhs = self.fold(rhs);
        if let Some(lv) = literal_value(&lhs) {
            let short = if op == InfixOp::And {
                !lv.truthy()
            } else {
                lv.truthy()
            };
            if short {
                return Expr::BoolLit(op == InfixOp::Or);
            }
            if let Some(rv) = literal_value(&rhs) {
                return Expr::BoolLit(rv.truthy());
            }
        }
        Expr::Infix {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    // -----------------------------------------------------------------------
    // Pass 2: algebraic simplification
    // -----------------------------------------------------------------------

    /// Identity rewrites. Only applies where the subtree being dropped or
    /// duplicated has no side effects.
    pub fn simplify(&mut self, e: Expr) -> Expr {
        match e {
            Expr::Infix { op, lhs, rhs } => {
                let lhs = self.simplify(*lhs);
                let rhs = self.simplify(*rhs);
                if let Some(out) = simplify_infix(op, &lhs, &rhs) {
                    return out;
                }
                Expr::Infix {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                }
            }
            Expr::Prefix { op, rhs } => Expr::Prefix {
                op,
                rhs: Box::new(self.simplify(*rhs)),
            },
            Expr::If {
                cond,
                conseq,
                alt,
                simple,
                then_form,
            } => Expr::If {
                cond: Box::new(self.simplify(*cond)),
                conseq: conseq.map(|c| Box::new(self.simplify(*c))),
                alt: alt.map(|a| Box::new(self.simplify(*a))),
                simple,
                then_form,
            },
            Expr::Assign { name, value } => Expr::Assign {
                name,
                value: Box::new(self.simplify(*value)),
            },
            Expr::Call { name, args } => Expr::Call {
                name,
                args: args.into_iter().map(|a| self.simplify(a)).collect(),
            },
            leaf => leaf,
        }
    }

    // -----------------------------------------------------------------------
    // Pass 3: static checks (errors, not rewrites)
    // -----------------------------------------------------------------------

    pub fn check(&mut self, e: &Expr) {
        match e {
            Expr::Prefix { op, rhs } => {
                if *op == PrefixOp::Neg && matches!(**rhs, Expr::StrLit(_)) {
                    self.record(StaticError::InvalidOperation(
                        "unary minus on a string literal".to_string(),
                    ));
                }
                self.check(rhs);
            }
            Expr::Infix { op, lhs, rhs } => {
                let lhs_str = matches!(**lhs, Expr::StrLit(_));
                let rhs_str = matches!(**rhs, Expr::StrLit(_));
                let lhs_num = matches!(**lhs, Expr::IntLit(_) | Expr::FloatLit(_));
                let rhs_num = matches!(**rhs, Expr::IntLit(_) | Expr::FloatLit(_));

                match op {
                    InfixOp::Sub
                    | InfixOp::Mul
                    | InfixOp::Div
                    | InfixOp::Mod
                    | InfixOp::Gt
                    | InfixOp::Lt
                    | InfixOp::Ge
                    | InfixOp::Le
                        if lhs_str || rhs_str =>
                    {
                        self.record(StaticError::InvalidOperation(format!(
                            "operator '{}' cannot be applied to a string literal",
                            op.symbol()
                        )));
                    }
                    InfixOp::Add if (lhs_str && rhs_num) || (lhs_num && rhs_str) => {
                        self.record(StaticError::InvalidOperation(
                            "cannot add a string literal and a numeric literal".to_string(),
                        ));
                    }
                    _ => {}
                }
                if matches!(op, InfixOp::Div | InfixOp::Mod)
                    && matches!(**rhs, Expr::IntLit(0))
                {
                    self.record(StaticError::DivisionByZero);
                }
                if matches!(op, InfixOp::Div | InfixOp::Mod) {
                    if let Expr::FloatLit(f) = **rhs {
                        if f == 0.0 {
                            self.record(StaticError::DivisionByZero);
                        }
                    }
                }
                self.check(lhs);
                self.check(rhs);
            }
            Expr::If {
                cond, conseq, alt, ..
            } => {
                self.check(cond);
                if let Some(c) = conseq {
                    self.check(c);
                }
                if let Some(a) = alt {
                    self.check(a);
                }
            }
            Expr::Assign { value, .. } => self.check(value),
            Expr::Call { args, .. } => {
                for a in args {
                    self.check(a);
                }
            }
            _ => {}
        }
    }

    fn record(&mut self, err: StaticError) {
        if !self.errors.contains(&err) {
            self.errors.push(err);
        } else {
            debug!("suppressing duplicate static diagnostic: {err}");
        }
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Optimizer::new()
    }
}

fn simplify_infix(op: InfixOp, lhs: &Expr, rhs: &Expr) -> Option<Expr> {
    let int = |e: &Expr, n: i64| matches!(e, Expr::IntLit(v) if *v == n);
    match op {
        InfixOp::Add if int(rhs, 0) && lhs.is_pure() => Some(lhs.clone()),
        InfixOp::Add if int(lhs, 0) && rhs.is_pure() => Some(rhs.clone()),
        InfixOp::Sub if int(rhs, 0) && lhs.is_pure() => Some(lhs.clone()),
        InfixOp::Sub if lhs == rhs && lhs.is_pure() => Some(Expr::IntLit(0)),
        InfixOp::Mul if (int(rhs, 0) || int(lhs, 0)) && lhs.is_pure() && rhs.is_pure() => {
            Some(Expr::IntLit(0))
        }
        InfixOp::Mul if int(rhs, 1) && lhs.is_pure() => Some(lhs.clone()),
        InfixOp::Mul if int(lhs, 1) && rhs.is_pure() => Some(rhs.clone()),
        InfixOp::Div if int(rhs, 1) && lhs.is_pure() => Some(lhs.clone()),
        InfixOp::Div if lhs == rhs && lhs.is_pure() => Some(Expr::IntLit(1)),
        InfixOp::Eq if lhs == rhs && lhs.is_pure() => Some(Expr::BoolLit(true)),
        InfixOp::Ne if lhs == rhs && lhs.is_pure() => Some(Expr::BoolLit(false)),
        _ => None,
    }
}
