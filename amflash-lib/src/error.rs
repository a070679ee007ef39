use crate::command::Opcode;
use thiserror::Error;

/// Convenient result type for `amflash-lib`.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serial(#[from] serialport::Error),

    #[error("framing mismatch: sent {sent}, device answered 0x{received:02X}")]
    FramingMismatch { sent: Opcode, received: u8 },

    #[error("short payload for {opcode}: expected {expected} bytes, got {actual}")]
    ShortPayload {
        opcode: Opcode,
        expected: usize,
        actual: usize,
    },

    #[error("too many command arguments: {0} (at most 255)")]
    TooManyArguments(usize),

    #[error("identification failed: {0}")]
    Identification(#[from] IdentificationError),

    #[error("sector index {0} out of range (SA0..SA10)")]
    SectorIndexOutOfRange(usize),

    #[error("invalid range: start 0x{start:05X}, size 0x{size:05X}")]
    InvalidRange { start: u32, size: u32 },

    #[error("size mismatch: target range is {expected} bytes, source has {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("full chip read returned only zero bytes, the interface probably sent no data")]
    SuspiciousEmptyRead,

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IdentificationError {
    #[error("identify response carried {0} bytes instead of 2")]
    MissingResponse(usize),

    #[error("expected 0x01 for manufacturer ID, got 0x{0:02X}")]
    UnexpectedManufacturer(u8),

    #[error("expected 0x23 or 0xAB for device ID, got 0x{0:02X}")]
    UnexpectedDevice(u8),
}

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Transport or framing failures that terminate the running operation.
    pub fn is_channel_error(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Serial(_)
                | Self::FramingMismatch { .. }
                | Self::ShortPayload { .. }
                | Self::TooManyArguments(_)
        )
    }
}
