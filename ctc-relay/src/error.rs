//! Common error types for ctc-relay.
//!
//! Every failure the core can report has its own variant so the CLI shell
//! can map each one to a distinct message and exit code. Nothing here is
//! retried; a failed exchange is reported as soon as it happens.

use thiserror::Error;

use crate::types::ChainTable;

/// Why a reply from a board was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Malformed {
    /// Wrong number of bytes for one frame
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    /// XOR checksum does not cover the frame
    #[error("checksum mismatch: frame carries 0x{received:02x}, computed 0x{computed:02x}")]
    Checksum { received: u8, computed: u8 },

    /// Reply opcode does not answer the request
    #[error("unexpected reply opcode {actual} (expected {expected})")]
    UnexpectedOpcode { expected: u8, actual: u8 },

    /// Reply came from a different board than the one addressed
    #[error("reply echoes address {actual}, request went to {expected}")]
    AddressMismatch { expected: u8, actual: u8 },
}

/// Main error type for ctc-relay operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Caller supplied a relay index, port value or address out of range.
    /// Raised before any byte reaches the transport.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The codec was handed a value validation should have caught
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Link absent, closed, or silent until the read timeout expired
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Bytes arrived but do not answer the request that was sent
    #[error("Malformed response: {0}")]
    MalformedResponse(#[from] Malformed),

    /// The board answered with the generic failure opcode
    #[error("Board {address} rejected command (opcode {opcode})")]
    Rejected { address: u8, opcode: u8 },

    /// Chain discovery got no acknowledgment for the first claim
    #[error("No relay board found on the chain")]
    NoBoardFound,

    /// More boards acknowledged than there are usable addresses
    #[error("Chain overflow: {} boards assigned, more are still unassigned", .assigned.len())]
    ChainOverflow { assigned: ChainTable },
}

impl From<tokio_serial::Error> for Error {
    fn from(e: tokio_serial::Error) -> Self {
        Error::Transport(e.into())
    }
}

impl Error {
    /// Whether the error means the hardware never answered, as opposed to
    /// answering incorrectly.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
