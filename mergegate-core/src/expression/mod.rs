// Skip Predicate Module
// A small boolean expression language evaluated against the run context

pub mod evaluator;
pub mod lexer;
pub mod parser;

pub use evaluator::{Evaluator, RunContext, SkipPredicate, Value};
pub use lexer::{Lexer, Token};
pub use parser::{BinaryOp, ContextPath, Expr, ExprParser, Function, ValueType};

use thiserror::Error;

/// Error raised while compiling a skip predicate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredicateError {
    #[error("syntax error at position {position}: {message}")]
    Syntax { message: String, position: usize },

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{name}' expects {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("unknown context reference '{0}'")]
    UnknownReference(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),
}

impl PredicateError {
    pub fn syntax(message: impl Into<String>, position: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            position,
        }
    }
}
