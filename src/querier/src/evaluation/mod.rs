//! Request-scoped evaluation of materialized targets.

mod context;
mod error;
mod evaluator;

pub use context::{EvaluationContext, QueryWindow};
pub use error::{EvalResult, EvaluationError};
pub use evaluator::Evaluator;
