/// Shared error type used across all seed crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("path escape: {path} is outside scope root {scope_root}")]
    PathEscape { path: String, scope_root: String },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("lock timeout: {0}")]
    LockTimeout(String),

    #[error("aborted: {0}")]
    Aborted(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("transport: {0}")]
    Transport(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
