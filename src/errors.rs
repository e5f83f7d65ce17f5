/// Uwasa error taxonomy.
///
/// Four layers, matching the pipeline stages:
///   ParseError   — lexer/parser diagnostics, accumulated per compilation
///   StaticError  — optimizer findings on literal operands
///   CompileError — aggregate of the above plus code-generation limits
///   RuntimeError — execution failures; abort the call, no partial value
///
/// Instruction-fusion width overflow is deliberately absent: an overflowing
/// fusion is skipped and the unfused sequence retained.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Parser diagnostics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("illegal token '{literal}'")]
    IllegalToken { literal: String },

    #[error("expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("no parse rule for token '{found}'")]
    NoPrefixRule { found: String },

    #[error("invalid number literal '{literal}'")]
    InvalidNumber { literal: String },

    #[error("assignment target must be an identifier")]
    InvalidAssignTarget,

    #[error("call target must be an identifier")]
    InvalidCallTarget,

    #[error("unexpected trailing token '{found}'")]
    TrailingToken { found: String },
}

// ---------------------------------------------------------------------------
// Optimizer findings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StaticError {
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("division by zero")]
    DivisionByZero,
}

// ---------------------------------------------------------------------------
// Compilation failures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("syntax error: {}", join_messages(.0))]
    Syntax(Vec<ParseError>),

    #[error("static error: {}", join_messages(.0))]
    Static(Vec<StaticError>),

    #[error("register limit exceeded: expression requires more than {limit} registers")]
    RegisterLimitExceeded { limit: u16 },
}

impl CompileError {
    /// All accumulated parser diagnostics, if this was a syntax failure.
    pub fn syntax_diagnostics(&self) -> &[ParseError] {
        match self {
            CompileError::Syntax(list) => list,
            _ => &[],
        }
    }

    /// All accumulated static-analysis diagnostics, if this was a static failure.
    pub fn static_diagnostics(&self) -> &[StaticError] {
        match self {
            CompileError::Static(list) => list,
            _ => &[],
        }
    }
}

fn join_messages<E: std::fmt::Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Execution failures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("modulo operator supports only integers")]
    ModuloNonInteger,

    #[error("builtin function not found: {name}")]
    UnknownFunction { name: String },

    #[error("{builtin}: {message}")]
    BuiltinMisuse {
        builtin: &'static str,
        message: String,
    },

    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },
}

// ---------------------------------------------------------------------------
// Top-level wrapper for one-shot evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
