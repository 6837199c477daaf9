//! Transfer error taxonomy.
//!
//! Per-block faults (`MalformedBlock`, `ChecksumMismatch`,
//! `UnrecognizedControl`, `Timeout`) are retried by the engine and only
//! surface folded into `RetryLimitExceeded`. Everything else ends the session.

use std::io;

use thiserror::Error;

/// Errors produced by the transfer engine.
#[derive(Error, Debug)]
pub enum ModemError {
    /// Peer never started the transfer within the handshake bound.
    #[error("Handshake timed out: no response from peer")]
    HandshakeTimeout,

    /// Complement byte does not match the sequence byte.
    #[error("Malformed block: sequence {sequence:#04x}, complement {complement:#04x}")]
    MalformedBlock { sequence: u8, complement: u8 },

    /// Trailer does not match the payload.
    #[error("Checksum mismatch in block {sequence}")]
    ChecksumMismatch { sequence: u8 },

    /// Byte that is neither a block marker, EOT nor CAN.
    #[error("Unrecognized control byte {0:#04x}")]
    UnrecognizedControl(u8),

    /// A per-block wait expired.
    #[error("Timed out waiting for peer")]
    Timeout,

    /// Block sequence is neither the expected nor the previously accepted one.
    #[error("Synchronization lost: expected block {expected}, got {actual}")]
    SynchronizationLost { expected: u8, actual: u8 },

    /// EOT arrived where a file header block was required.
    #[error("End of transmission received before file header")]
    UnexpectedEndOfTransmission,

    /// Consecutive per-block errors reached the configured maximum.
    #[error("Transmission aborted after {errors} consecutive errors")]
    RetryLimitExceeded { errors: u32 },

    #[error("Transfer cancelled by peer")]
    PeerCancelled,

    #[error("Transfer cancelled locally")]
    LocallyCancelled,

    /// Chunk does not fit into the largest block.
    #[error("Payload of {len} bytes exceeds block size {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// Header block content could not be parsed.
    #[error("Invalid file header: {0}")]
    InvalidHeader(String),

    /// File name unusable for sending or unsafe for receiving.
    #[error("Invalid file name {name:?}: {reason}")]
    InvalidFileName { name: String, reason: &'static str },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ModemError {
    /// True for faults that only cost a retry of the current block.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MalformedBlock { .. }
                | Self::ChecksumMismatch { .. }
                | Self::UnrecognizedControl(_)
                | Self::Timeout
        )
    }

    /// True when the peer must be told the session is abandoned.
    pub fn notifies_peer(&self) -> bool {
        !self.is_recoverable() && !matches!(self, Self::PeerCancelled)
    }
}

pub type Result<T> = std::result::Result<T, ModemError>;
