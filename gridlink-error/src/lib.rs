use anyhow::Error as AnyhowError;
use config::ConfigError;
use std::{error::Error as StdError, io::Error as IoError, num::TryFromIntError};
use thiserror::Error;
use tokio::task::JoinError;

pub type GwResult<T, E = GatewayError> = Result<T, E>;

#[derive(Error, Debug, Default)]
pub enum GatewayError {
    #[error("service unavailable")]
    #[default]
    ServiceUnavailable,
    #[error("{0}")]
    JoinError(#[from] JoinError),
    #[error("{0}")]
    StdError(#[from] Box<dyn StdError + Send + Sync>),
    #[error("{0}")]
    IoError(#[from] IoError),
    #[error("{0}")]
    Msg(String),
    #[error("{0}")]
    Anyhow(#[from] AnyhowError),
    #[error("{0}")]
    ConfigError(#[from] ConfigError),
    #[error("{0}")]
    TryFromIntError(#[from] TryFromIntError),
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    #[error("Encoding error: {0}")]
    EncodingError(String),
    #[error("Initialization error: {0}")]
    InitializationError(String),
    #[error("Shutdown error: {0}")]
    ShutdownError(String),
    #[error("Invalid state error: {0}")]
    InvalidStateError(String),
}

impl From<String> for GatewayError {
    #[inline]
    fn from(e: String) -> Self {
        GatewayError::Msg(e)
    }
}

impl From<&str> for GatewayError {
    #[inline]
    fn from(e: &str) -> Self {
        GatewayError::Msg(e.to_string())
    }
}
