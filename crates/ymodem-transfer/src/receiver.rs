//! Receive loop: accept blocks strictly in order, each payload delivered once.
//!
//! ```text
//! read control byte (block_timeout)
//!   EOT        -> ACK, done
//!   CAN        -> PeerCancelled
//!   SOH / STX  -> decode
//!                   expected seq      -> deliver, ACK
//!                   last accepted seq -> ACK again, no delivery
//!                   anything else     -> SynchronizationLost
//!   timeout, noise, bad block -> purge, NAK (until max_errors)
//! ```

use std::io::Write;

use crate::block::Block;
use crate::edc::Edc;
use crate::error::{ModemError, Result};
use crate::logging::TransferEvent;
use crate::modem::{Modem, RECEIVER, Tally, TransferSummary};
use crate::port::ByteSource;
use crate::protocol::{ACK, CAN, EOT, NAK};
use crate::session::{Arrival, Session};

/// One unit read off the line by the receiver.
#[derive(Debug)]
pub(crate) enum Frame {
    Block(Block),
    End,
}

impl<I: ByteSource, O: Write> Modem<I, O> {
    /// Receive one transfer into `sink`: handshake, then blocks from
    /// sequence 1 until EOT. Payloads are written whole, padding included.
    pub fn receive<W: Write>(&mut self, sink: &mut W) -> Result<TransferSummary> {
        let result = self.run_receive(sink);
        self.finish(RECEIVER, result)
    }

    fn run_receive<W: Write>(&mut self, sink: &mut W) -> Result<TransferSummary> {
        let (edc, first) = self.request_start()?;
        self.log(RECEIVER, TransferEvent::HandshakeComplete { edc });

        let mut tally = Tally::start();
        let mut session = Session::new(edc, 1, self.config.max_errors);
        self.receive_blocks(&mut session, Some(first), sink, &mut tally)?;

        let summary = tally.summary();
        self.log_complete(RECEIVER, &summary);
        Ok(summary)
    }

    /// Drive the data phase until EOT. `pending` is a control byte already
    /// taken off the line by the handshake.
    pub(crate) fn receive_blocks<W: Write>(
        &mut self,
        session: &mut Session,
        mut pending: Option<u8>,
        sink: &mut W,
        tally: &mut Tally,
    ) -> Result<()> {
        loop {
            let block = match self.next_frame(session, pending.take())? {
                Frame::End => {
                    self.write_control(ACK)?;
                    break;
                }
                Frame::Block(block) => block,
            };

            match session.classify(block.sequence) {
                Arrival::Next => {
                    sink.write_all(&block.payload)?;
                    session.accept();
                    tally.blocks += 1;
                    tally.bytes += block.payload.len() as u64;
                    self.log(
                        RECEIVER,
                        TransferEvent::BlockAccepted {
                            sequence: block.sequence,
                        },
                    );
                    self.write_control(ACK)?;
                }
                Arrival::Duplicate => {
                    tally.retransmits += 1;
                    self.log(
                        RECEIVER,
                        TransferEvent::DuplicateBlock {
                            sequence: block.sequence,
                        },
                    );
                    self.write_control(ACK)?;
                }
                Arrival::OutOfSequence => {
                    return Err(ModemError::SynchronizationLost {
                        expected: session.expected_sequence(),
                        actual: block.sequence,
                    });
                }
            }
        }
        sink.flush()?;
        Ok(())
    }

    /// Read the next valid frame, absorbing per-block faults with NAK until
    /// the session's error limit.
    pub(crate) fn next_frame(
        &mut self,
        session: &mut Session,
        mut pending: Option<u8>,
    ) -> Result<Frame> {
        loop {
            let err = match self.read_frame(session.edc(), pending.take()) {
                Ok(frame) => return Ok(frame),
                Err(err) if err.is_recoverable() => err,
                Err(err) => return Err(err),
            };

            let exhausted = session.record_error();
            self.log(
                RECEIVER,
                TransferEvent::ReceiveError {
                    error_count: session.error_count(),
                    reason: err.to_string(),
                },
            );
            if exhausted {
                return Err(ModemError::RetryLimitExceeded {
                    errors: session.error_count(),
                });
            }
            self.purge()?;
            self.write_control(NAK)?;
        }
    }

    fn read_frame(&mut self, edc: Edc, pending: Option<u8>) -> Result<Frame> {
        let timeout = self.config.block_timeout;
        let marker = match pending {
            Some(byte) => byte,
            None => self.read_byte(timeout)?.ok_or(ModemError::Timeout)?,
        };
        match marker {
            EOT => Ok(Frame::End),
            CAN => Err(ModemError::PeerCancelled),
            _ => Block::decode(marker, edc, |buf| self.read_exact(buf, timeout)).map(Frame::Block),
        }
    }
}
