/// Expression tree produced by the Pratt parser.
///
/// Invariants: `simple` implies both arms are absent; `then_form` implies a
/// present consequence. `Nil` never comes out of the parser — it is produced
/// only by the optimizer when an `if … then` form folds away.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    Neg,
    Not,
}

impl PrefixOp {
    pub fn symbol(self) -> &'static str {
        match self {
            PrefixOp::Neg => "-",
            PrefixOp::Not => "!",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

impl InfixOp {
    pub fn symbol(self) -> &'static str {
        match self {
            InfixOp::Add => "+",
            InfixOp::Sub => "-",
            InfixOp::Mul => "*",
            InfixOp::Div => "/",
            InfixOp::Mod => "%",
            InfixOp::Eq => "==",
            InfixOp::Ne => "!=",
            InfixOp::Lt => "<",
            InfixOp::Gt => ">",
            InfixOp::Le => "<=",
            InfixOp::Ge => ">=",
            InfixOp::And => "&&",
            InfixOp::Or => "||",
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            InfixOp::Add | InfixOp::Sub | InfixOp::Mul | InfixOp::Div | InfixOp::Mod
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            InfixOp::Eq | InfixOp::Ne | InfixOp::Lt | InfixOp::Gt | InfixOp::Le | InfixOp::Ge
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(String),
    IntLit(i64),
    FloatLit(f64),
    StrLit(String),
    BoolLit(bool),
    Nil,
    Prefix {
        op: PrefixOp,
        rhs: Box<Expr>,
    },
    Infix {
        op: InfixOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    If {
        cond: Box<Expr>,
        conseq: Option<Box<Expr>>,
        alt: Option<Box<Expr>>,
        simple: bool,
        then_form: bool,
    },
    Assign {
        name: String,
        value: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// True when evaluating this subtree cannot mutate the environment or
    /// invoke a builtin. The algebraic simplifier refuses to drop or
    /// duplicate anything impure.
    pub fn is_pure(&self) -> bool {
        match self {
            Expr::Ident(_)
            | Expr::IntLit(_)
            | Expr::FloatLit(_)
            | Expr::StrLit(_)
            | Expr::BoolLit(_)
            | Expr::Nil => true,
            Expr::Prefix { rhs, .. } => rhs.is_pure(),
            Expr::Infix { lhs, rhs, .. } => lhs.is_pure() && rhs.is_pure(),
            Expr::If {
                cond, conseq, alt, ..
            } => {
                cond.is_pure()
                    && conseq.as_deref().map_or(true, Expr::is_pure)
                    && alt.as_deref().map_or(true, Expr::is_pure)
            }
            Expr::Assign { .. } | Expr::Call { .. } => false,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expr::IntLit(_) | Expr::FloatLit(_) | Expr::StrLit(_) | Expr::BoolLit(_) | Expr::Nil
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purity_sees_through_nesting() {
        let pure = Expr::Infix {
            op: InfixOp::Add,
            lhs: Box::new(Expr::Ident("a".into())),
            rhs: Box::new(Expr::IntLit(1)),
        };
        assert!(pure.is_pure());

        let impure = Expr::Infix {
            op: InfixOp::Add,
            lhs: Box::new(Expr::IntLit(1)),
            rhs: Box::new(Expr::Assign {
                name: "a".into(),
                value: Box::new(Expr::IntLit(2)),
            }),
        };
        assert!(!impure.is_pure());
    }
}
