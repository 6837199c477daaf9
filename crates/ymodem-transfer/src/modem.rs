//! Transfer engine core: bounded I/O against the link, cancellation and
//! fatal-path handling shared by the handshake, sender and receiver phases.
//!
//! One `Modem` drives one direction of one link at a time. All reads and
//! writes are synchronous; every wait is bounded by a deadline and sliced by
//! `poll_interval` so a `CancelToken` is noticed between slices.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::clock::Deadline;
use crate::config::ModemConfig;
use crate::error::{ModemError, Result};
use crate::logging::{TracingLogger, TransferEvent, TransferLog, TransferLogger};
use crate::port::ByteSource;
use crate::protocol::CAN;

pub(crate) const SENDER: &str = "sender";
pub(crate) const RECEIVER: &str = "receiver";

/// Totals reported by a finished transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSummary {
    /// Blocks acknowledged (sender) or delivered (receiver).
    pub blocks: u64,
    /// Payload bytes sent or delivered to the sink.
    pub bytes: u64,
    /// Blocks sent again (sender) or duplicates re-acknowledged (receiver).
    pub retransmits: u64,
    pub elapsed: Duration,
}

/// Running totals for one transfer.
pub(crate) struct Tally {
    started: Instant,
    pub blocks: u64,
    pub bytes: u64,
    pub retransmits: u64,
}

impl Tally {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            blocks: 0,
            bytes: 0,
            retransmits: 0,
        }
    }

    pub fn summary(&self) -> TransferSummary {
        TransferSummary {
            blocks: self.blocks,
            bytes: self.bytes,
            retransmits: self.retransmits,
            elapsed: self.started.elapsed(),
        }
    }
}

/// Block-transfer engine bound to one readable and one writable channel.
pub struct Modem<I, O> {
    input: I,
    output: O,
    pub(crate) config: ModemConfig,
    cancel: CancelToken,
    logger: Arc<dyn TransferLogger>,
}

impl<I: ByteSource, O: Write> Modem<I, O> {
    pub fn new(input: I, output: O, config: ModemConfig) -> Self {
        Self {
            input,
            output,
            config,
            cancel: CancelToken::new(),
            logger: Arc::new(TracingLogger),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn TransferLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Token that cancels this engine when triggered from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    pub fn into_inner(self) -> (I, O) {
        (self.input, self.output)
    }

    pub(crate) fn log(&self, component: &'static str, event: TransferEvent) {
        self.logger.log(TransferLog { component, event });
    }

    pub(crate) fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ModemError::LocallyCancelled);
        }
        Ok(())
    }

    /// Wait up to `timeout` for one byte. `Ok(None)` once the wait expires.
    pub(crate) fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        let deadline = Deadline::start(timeout);
        loop {
            self.check_cancelled()?;
            let slice = deadline.remaining().min(self.config.poll_interval);
            if let Some(byte) = self.input.read_byte(slice)? {
                return Ok(Some(byte));
            }
            if deadline.is_expired() {
                return Ok(None);
            }
        }
    }

    /// Fill `buf` completely, or fail with `Timeout` once the line stays
    /// silent for `gap` between two bytes. A slow link may take longer than
    /// `gap` for the whole buffer.
    pub(crate) fn read_exact(&mut self, buf: &mut [u8], gap: Duration) -> Result<()> {
        for slot in buf.iter_mut() {
            *slot = self.read_byte(gap)?.ok_or(ModemError::Timeout)?;
        }
        Ok(())
    }

    pub(crate) fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.output.write_all(bytes)?;
        self.output.flush()?;
        Ok(())
    }

    pub(crate) fn write_control(&mut self, byte: u8) -> Result<()> {
        self.write_all(&[byte])
    }

    /// Discard input until the line stays quiet for `purge_quiet`, bounded by
    /// `block_timeout`. Two consecutive CANs seen while purging are honoured.
    pub(crate) fn purge(&mut self) -> Result<()> {
        let bound = Deadline::start(self.config.block_timeout);
        let quiet = self.config.purge_quiet;
        let mut last = None;
        while !bound.is_expired() {
            match self.read_byte(quiet)? {
                Some(CAN) if last == Some(CAN) => return Err(ModemError::PeerCancelled),
                Some(byte) => last = Some(byte),
                None => break,
            }
        }
        Ok(())
    }

    /// Best-effort burst of CAN bytes telling the peer the session is over.
    pub(crate) fn cancel_burst(&mut self) {
        let burst = vec![CAN; self.config.cancel_burst];
        if let Err(e) = self.output.write_all(&burst).and_then(|_| self.output.flush()) {
            tracing::debug!("cancel burst not delivered: {}", e);
        }
    }

    /// Single exit for every public operation: on a fatal error, notify the
    /// peer unless it cancelled first, then hand the error back unchanged.
    pub(crate) fn finish<T>(&mut self, component: &'static str, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.notifies_peer() {
                self.cancel_burst();
            }
            self.log(
                component,
                TransferEvent::Aborted {
                    reason: err.to_string(),
                },
            );
        }
        result
    }

    pub(crate) fn log_complete(&self, component: &'static str, summary: &TransferSummary) {
        self.log(
            component,
            TransferEvent::TransferComplete {
                blocks: summary.blocks,
                bytes: summary.bytes,
                retransmits: summary.retransmits,
                duration_ms: summary.elapsed.as_millis() as u64,
            },
        );
    }
}
