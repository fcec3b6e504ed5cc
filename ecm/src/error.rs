use thiserror::Error;

/// Error taxonomy for the memory engine. Variants map onto CLI exit codes
/// and maintenance task failure records rather than any HTTP surface.
#[derive(Error, Debug)]
pub enum EcmError {
    #[error("input error: {0}")]
    Input(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] libsql::Error),

    #[error("embedding error: {0}")]
    Embed(String),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(String),
}

impl EcmError {
    /// Exit code surfaced by the CLI for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            EcmError::Input(_) => 2,
            EcmError::NotFound(_) => 1,
            EcmError::Cancelled => 130,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, EcmError>;
