//! Validation errors for deposit status operations

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Activity ID is required")]
    MissingActivityId,

    #[error("{0} must be a boolean")]
    NotBoolean(&'static str),

    #[error("Request body must be a JSON object: {0}")]
    InvalidBody(String),
}

pub type Result<T> = std::result::Result<T, Error>;
