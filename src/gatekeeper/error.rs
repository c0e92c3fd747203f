//! Error types for the gatekeeper

use thiserror::Error;

use crate::protocol::{ERR_DUPLICATE, ERR_MAX_200};

/// Failures caught before anything is sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LocalValidationError {
    #[error("Please enter an extension.")]
    EmptyInput,

    #[error("Extensions must be 20 characters or fewer.")]
    TooLong,

    #[error("This extension is already registered.")]
    DuplicateLocal,
}

impl LocalValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            LocalValidationError::EmptyInput => "EMPTY_INPUT",
            LocalValidationError::TooLong => "TOO_LONG",
            LocalValidationError::DuplicateLocal => "DUPLICATE_LOCAL",
        }
    }
}

/// Failures reported by the server in a well-formed response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Up to 200 custom extensions can be registered.")]
    LimitReached,

    #[error("This extension is already registered.")]
    Duplicate,

    #[error("The server refused the request.")]
    Unknown(Option<String>),
}

impl RemoteError {
    /// Maps a server error code, falling back to `Unknown` for anything unrecognised.
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some(ERR_MAX_200) => RemoteError::LimitReached,
            Some(ERR_DUPLICATE) => RemoteError::Duplicate,
            other => RemoteError::Unknown(other.map(str::to_string)),
        }
    }
}

#[derive(Debug, Error)]
pub enum GatekeeperError {
    #[error(transparent)]
    Validation(#[from] LocalValidationError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Server returned status {0}")]
    Status(u16),
}

impl From<reqwest::Error> for GatekeeperError {
    fn from(err: reqwest::Error) -> Self {
        GatekeeperError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_from_code() {
        assert_eq!(RemoteError::from_code(Some("MAX_200")), RemoteError::LimitReached);
        assert_eq!(RemoteError::from_code(Some("DUPLICATE")), RemoteError::Duplicate);
        assert_eq!(
            RemoteError::from_code(Some("INVALID_LENGTH")),
            RemoteError::Unknown(Some("INVALID_LENGTH".to_string()))
        );
        assert_eq!(RemoteError::from_code(None), RemoteError::Unknown(None));
        assert_eq!(
            RemoteError::from_code(Some("UNKNOWN_FIXED_EXT")).to_string(),
            "The server refused the request."
        );
    }

    #[test]
    fn test_validation_codes() {
        assert_eq!(LocalValidationError::EmptyInput.code(), "EMPTY_INPUT");
        assert_eq!(LocalValidationError::TooLong.code(), "TOO_LONG");
        assert_eq!(LocalValidationError::DuplicateLocal.code(), "DUPLICATE_LOCAL");
    }
}
