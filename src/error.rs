use std::path::PathBuf;

use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Error during file I/O operations
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Error during JSON serialization or deserialization
    #[error("json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    /// Error when user input fails.
    #[error("inquire error: {0}")]
    Inquire(#[from] inquire::InquireError),
    /// Key generator missing or exited non-zero
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
    /// Something other than a usable keypair sits at the key path
    #[error("path conflict at '{}': {reason}", path.display())]
    PathConflict { path: PathBuf, reason: String },
    /// SSH client config could not be read or written
    #[error("cannot access ssh config '{}': {source}", path.display())]
    ConfigAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Git could not be invoked or refused the change
    #[error("git unavailable: {0}")]
    GitUnavailable(String),
    /// Account store unreadable, corrupt or unwritable
    #[error("account store error: {0}")]
    Store(String),
    /// Error when a specific account id is not found.
    #[error("account not found: {0}")]
    NotFound(u64),
    /// Backup archive missing, malformed or not writable
    #[error("backup error: {0}")]
    Backup(String),
    /// Error during input validation.
    #[error("validation error: {0}")]
    Validation(String),
    /// Error during UTF-8 conversion.
    #[error("UTF-8 error: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),
}

impl AppError {
    /// Wraps an io error raised while touching the ssh config file
    pub fn config_access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::ConfigAccess {
            path: path.into(),
            source,
        }
    }

    /// Short name of the error kind, used in activation reports
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::KeyGeneration(_) => "KeyGenerationError",
            AppError::PathConflict { .. } => "PathConflictError",
            AppError::ConfigAccess { .. } => "ConfigAccessError",
            AppError::GitUnavailable(_) => "GitUnavailableError",
            AppError::Store(_) | AppError::SerdeJson(_) => "StoreError",
            AppError::NotFound(_) => "NotFound",
            AppError::Backup(_) => "BackupError",
            AppError::Validation(_) => "ValidationError",
            AppError::Io(_) | AppError::Utf8Error(_) => "IoError",
            AppError::Inquire(_) => "InputError",
        }
    }
}
