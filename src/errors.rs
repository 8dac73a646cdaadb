use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("FORMAT_INVALID: {0}")]
    Format(String),
    #[error("VALIDATION_FAILED: {0}")]
    Validation(String),
    #[error("STORE_CORRUPT: {0}")]
    CorruptStore(String),
    #[error("NOTIFY_FAILED: {0}")]
    Notification(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    /// Errors the user can fix by correcting their input; nothing was written.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::Format(_) | Self::Validation(_))
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
