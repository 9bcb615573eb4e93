use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Application error: {0}")]
    Application(#[from] ApplicationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("Application not found")]
    NotFound,

    #[error("Users quota of {quota} reached")]
    QuotaExceeded { quota: u64 },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Storage operation timed out: {0}")]
    Timeout(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Application(ApplicationError::NotFound))
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Error::Application(ApplicationError::QuotaExceeded { .. }))
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn is_storage_error(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}
