//! The expression language used in `${...}`, `c:if` and `c:for`.
//! Evaluation is behind the `Evaluator` trait, so hosts can plug in
//! their own language; `ExprEvaluator` is the default.

pub mod lexer;
pub mod parser;
pub mod eval;

use kstring::KString;
use thiserror::Error;

use crate::value::{Value, Vars};

pub use eval::ExprEvaluator;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("syntax error in {expr:?} at offset {offset}: {message}")]
    Syntax { expr: String, offset: usize, message: String },
    #[error("unknown identifier {0:?}")]
    UnknownIdent(KString),
    #[error("unknown function {0:?}")]
    UnknownFunction(KString),
    #[error("{name}(): {message}")]
    Call { name: KString, message: String },
    #[error("{0}")]
    Type(String),
}

pub trait Evaluator: std::fmt::Debug + Send + Sync {
    /// Evaluate `expr` with `env` as the only variables in scope.
    fn evaluate(&self, expr: &str, env: &Vars) -> anyhow::Result<Value>;
}
