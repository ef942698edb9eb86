use crate::command::Command;
use papilio_hal::{ConfigError, HalError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("data byte {byte:#04x} at index {index} collides with the {command:?} command")]
    ReservedByte {
        index: usize,
        byte: u8,
        command: Command,
    },
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link not initialized")]
    NotInitialized,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("value {value:#x} does not fit in a {bits}-bit word")]
    WordOutOfRange { value: u32, bits: u8 },
    #[error("buffer holds {actual} bytes but the transfer is {expected} bytes")]
    BufferLength { expected: usize, actual: usize },
    #[error("{0} needs a status channel the wire protocol does not have")]
    Unsupported(&'static str),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Hal(#[from] HalError),
    #[error("shared link lock poisoned")]
    Poisoned,
}
