use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Expired: {0}")]
    Expired(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Machine-readable error kind for the dispatch surface. Callers branch on
    /// this, never on the display text.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Storage(_) => "storage",
            Error::NotFound(_) => "not_found",
            Error::InvalidState(_) => "invalid_state",
            Error::Unauthorized(_) => "unauthorized",
            Error::Expired(_) => "expired",
            Error::Validation(_) => "validation",
            Error::Tool(_) => "tool",
            Error::Channel(_) => "channel",
            Error::Other(_) => "other",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_stable() {
        assert_eq!(Error::NotFound("x".into()).kind(), "not_found");
        assert_eq!(Error::InvalidState("x".into()).kind(), "invalid_state");
        assert_eq!(Error::Unauthorized("x".into()).kind(), "unauthorized");
        assert_eq!(Error::Expired("x".into()).kind(), "expired");
    }
}
