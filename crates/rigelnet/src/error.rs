//! Net transport error vocabulary.

use engine_common::CoreError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("illegal message: {0}")]
    IllegalMessage(String),

    #[error("bad passphrase")]
    BadPassphrase,

    #[error("connection timed out")]
    TimedOut,

    #[error("not connected")]
    NotConnected,

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for NetError {
    fn from(e: std::io::Error) -> Self {
        NetError::Io(e.to_string())
    }
}
