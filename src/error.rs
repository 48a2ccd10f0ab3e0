//! Define the error taxonomy shared by the mount driver and dome controller.

use std::{fmt, io, result};

use thiserror::Error;

pub type ObservatoryResult<T> = result::Result<T, ObservatoryError>;

/// Distinguish a reply that never started from one that never finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    NoReply,
    MissingTerminator,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutKind::NoReply => write!(f, "no bytes received"),
            TimeoutKind::MissingTerminator => write!(f, "missing terminator '#'"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ObservatoryError {
    #[error("not connected to mount")]
    NotConnected,

    #[error("timeout waiting for response to '{command}': {kind}")]
    Timeout { command: String, kind: TimeoutKind },

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("dome is already moving")]
    AlreadyMoving,

    #[error("malformed angle string: {0}")]
    Format(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ObservatoryError {
    pub fn timeout(command: &str, kind: TimeoutKind) -> ObservatoryError {
        ObservatoryError::Timeout {
            command: command.to_owned(),
            kind,
        }
    }

    pub fn protocol(err_msg: impl Into<String>) -> ObservatoryError {
        ObservatoryError::Protocol(err_msg.into())
    }

    pub fn validation(err_msg: impl Into<String>) -> ObservatoryError {
        ObservatoryError::Validation(err_msg.into())
    }

    pub fn format(err_msg: impl Into<String>) -> ObservatoryError {
        ObservatoryError::Format(err_msg.into())
    }

    /// HTTP status class a request layer should answer with.
    pub fn http_status_class(&self) -> u16 {
        match self {
            ObservatoryError::NotConnected
            | ObservatoryError::Timeout { .. }
            | ObservatoryError::Transport(_) => 503,
            ObservatoryError::Validation(_) | ObservatoryError::Format(_) => 400,
            ObservatoryError::AlreadyMoving => 409,
            ObservatoryError::Protocol(_) | ObservatoryError::Config(_) => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ObservatoryError::Timeout { .. })
    }
}

impl From<toml::de::Error> for ObservatoryError {
    fn from(item: toml::de::Error) -> ObservatoryError {
        ObservatoryError::Config(item.to_string())
    }
}

impl From<toml::ser::Error> for ObservatoryError {
    fn from(item: toml::ser::Error) -> ObservatoryError {
        ObservatoryError::Config(item.to_string())
    }
}

impl From<regex::Error> for ObservatoryError {
    fn from(item: regex::Error) -> ObservatoryError {
        ObservatoryError::Protocol(item.to_string())
    }
}
