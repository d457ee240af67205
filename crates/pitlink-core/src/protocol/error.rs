//! Protocol errors

use thiserror::Error;

/// Errors raised by the connection manager and the transports beneath it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Not connected to smoker")]
    NotConnected,

    #[error("Smoker not found: {0}")]
    DeviceNotFound(String),

    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Connection attempt aborted by disconnect")]
    ConnectAborted,

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),
}

/// Errors raised while decoding bytes received from (or destined for) the controller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Short frame: need {expected} bytes, got {actual}")]
    ShortFrame { expected: usize, actual: usize },

    #[error("Invalid frame: {field} is not a finite temperature")]
    InvalidFrame { field: &'static str },

    #[error("Unknown opcode {0}")]
    UnknownOpcode(u8),
}
