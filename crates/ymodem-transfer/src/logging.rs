//! Structured transfer logging.
//!
//! The engine reports what it does as `TransferEvent`s; a `TransferLogger`
//! decides where they go.

use std::fmt;

use crate::edc::Edc;

/// Structured log entry for a transfer operation.
#[derive(Debug, Clone)]
pub struct TransferLog {
    pub component: &'static str,
    pub event: TransferEvent,
}

/// Transfer events that can be logged.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    /// Error-detection mode agreed
    HandshakeComplete { edc: Edc },
    /// Sender: block written to the line
    BlockSent { sequence: u8, size: usize },
    /// Sender: block NAKed or unacknowledged, resending
    BlockRetry { sequence: u8, attempt: u32 },
    /// Receiver: new block delivered to the sink
    BlockAccepted { sequence: u8 },
    /// Receiver: resend of the last accepted block, ACKed again
    DuplicateBlock { sequence: u8 },
    /// Receiver: damaged, missing or unexpected input
    ReceiveError { error_count: u32, reason: String },
    /// Batch header block sent or received
    FileHeader { name: String, size: Option<u64> },
    /// Empty header block ending a batch
    BatchEnd,
    /// Transfer complete
    TransferComplete {
        blocks: u64,
        bytes: u64,
        retransmits: u64,
        duration_ms: u64,
    },
    /// Session abandoned
    Aborted { reason: String },
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HandshakeComplete { edc } => write!(f, "handshake_complete edc={}", edc),
            Self::BlockSent { sequence, size } => {
                write!(f, "block_sent seq={} size={}", sequence, size)
            }
            Self::BlockRetry { sequence, attempt } => {
                write!(f, "block_retry seq={} attempt={}", sequence, attempt)
            }
            Self::BlockAccepted { sequence } => write!(f, "block_accepted seq={}", sequence),
            Self::DuplicateBlock { sequence } => write!(f, "duplicate_block seq={}", sequence),
            Self::ReceiveError { error_count, reason } => {
                write!(f, "receive_error count={} reason={}", error_count, reason)
            }
            Self::FileHeader { name, size } => match size {
                Some(size) => write!(f, "file_header name={} size={}", name, size),
                None => write!(f, "file_header name={}", name),
            },
            Self::BatchEnd => write!(f, "batch_end"),
            Self::TransferComplete {
                blocks,
                bytes,
                retransmits,
                duration_ms,
            } => write!(
                f,
                "transfer_complete blocks={} bytes={} retransmits={} duration_ms={}",
                blocks, bytes, retransmits, duration_ms
            ),
            Self::Aborted { reason } => write!(f, "aborted: {}", reason),
        }
    }
}

/// Trait for transfer logging. Implementations can write to tracing,
/// collect entries for inspection, or discard them.
pub trait TransferLogger: Send + Sync {
    fn log(&self, entry: TransferLog);
}

/// Logger that uses the `tracing` crate.
pub struct TracingLogger;

impl TransferLogger for TracingLogger {
    fn log(&self, entry: TransferLog) {
        // Lifecycle at info, per-block chatter at debug
        match &entry.event {
            TransferEvent::HandshakeComplete { .. }
            | TransferEvent::FileHeader { .. }
            | TransferEvent::BatchEnd
            | TransferEvent::TransferComplete { .. } => {
                tracing::info!(component = entry.component, "{}", entry.event);
            }
            TransferEvent::Aborted { .. } => {
                tracing::warn!(component = entry.component, "{}", entry.event);
            }
            _ => {
                tracing::debug!(component = entry.component, "{}", entry.event);
            }
        }
    }
}

/// No-op logger that discards all log entries.
pub struct NullLogger;

impl TransferLogger for NullLogger {
    fn log(&self, _entry: TransferLog) {}
}
