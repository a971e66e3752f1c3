use thiserror::Error;

/// Main error type for routetrace operations
#[derive(Error, Debug)]
pub enum RoutetraceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parser error: {0}")]
    Parser(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("{operation} failed: {message}")]
    Collaborator { operation: String, message: String },

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("{operation} was cancelled")]
    Cancelled { operation: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl RoutetraceError {
    pub fn collaborator(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Collaborator {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

pub type Result<T> = std::result::Result<T, RoutetraceError>;
