use common::index::IndexError;
use common::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("Unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("Invalid arguments to {function}: {reason}")]
    InvalidArguments { function: String, reason: String },

    #[error("Precondition failed in {function}: {reason}")]
    PreconditionFailed { function: String, reason: String },

    #[error("Expression '{expression}' cannot be evaluated on its own")]
    NotEvaluable { expression: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Evaluation cancelled: request deadline passed")]
    Cancelled,
}

impl EvaluationError {
    /// Collaborator failures, as opposed to problems with the request itself.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            EvaluationError::Storage(_) | EvaluationError::Index(IndexError::Unavailable(_))
        )
    }
}

pub type EvalResult<T> = Result<T, EvaluationError>;
