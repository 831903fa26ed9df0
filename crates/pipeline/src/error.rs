use recordport_core::error::CoreError;
use recordport_core::store::StoreError;
use recordport_core::tabular::ParseError;
use recordport_core::validation::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{} validation error(s) in the uploaded file", .errors.len())]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Migration task failed: {0}")]
    Task(String),
}

impl From<ParseError> for PipelineError {
    fn from(err: ParseError) -> Self {
        Self::Core(CoreError::Parse(err))
    }
}
