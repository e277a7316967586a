use super::frame::asdu::{CauseOfTransmission, TypeID};
use std::result::Result as StdResult;
use thiserror::Error;

pub type Result<T> = StdResult<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("asdu: [type identifier: {0:?}] doesn't match call or time tag")]
    ErrTypeIDNotMatch(TypeID),

    #[error("asdu: [cause of transmission: {0:?}] for command not standard requirement")]
    ErrCmdCause(CauseOfTransmission),

    #[error("invalid frame")]
    ErrInvalidFrame,

    #[error("connection is closed")]
    ErrUseClosedConnection,

    #[error("send queue is full")]
    ErrSendQueueFull,

    #[error("anyhow error: {0}")]
    ErrAnyHow(#[from] anyhow::Error),
}
