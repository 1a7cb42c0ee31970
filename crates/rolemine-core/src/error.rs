use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoleMineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("LLM retries exhausted: {0}")]
    RetryExhausted(String),

    #[error("Malformed model response: {0}")]
    ResponseParse(String),

    #[error("LLM error: {0}")]
    Llm(String),
}

impl RoleMineError {
    /// Machine-readable kind carried in HTTP error bodies and per-cluster
    /// batch failures.
    pub fn kind(&self) -> &'static str {
        match self {
            RoleMineError::Io(_) => "io",
            RoleMineError::Serialization(_) => "serialization",
            RoleMineError::Validation(_) => "validation",
            RoleMineError::NotFound(_) => "not_found",
            RoleMineError::InvalidOperation(_) => "invalid_operation",
            RoleMineError::RetryExhausted(_) => "retry_exhausted",
            RoleMineError::ResponseParse(_) => "parse_error",
            RoleMineError::Llm(_) => "llm",
        }
    }
}

pub type Result<T> = std::result::Result<T, RoleMineError>;
