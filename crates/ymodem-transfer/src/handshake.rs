//! Start-of-transfer negotiation of the error-detection mode.
//!
//! The receiver probes with `'C'` (CRC-16) every `probe_interval`; after
//! `crc_probes` unanswered probes it switches to the legacy NAK probe
//! (checksum). The sender answers the first probe it sees by starting to
//! send. Both sides give up after `handshake_timeout`.

use std::io::Write;
use std::time::Duration;

use crate::clock::Deadline;
use crate::edc::Edc;
use crate::error::{ModemError, Result};
use crate::modem::Modem;
use crate::port::ByteSource;
use crate::protocol::{CAN, EOT, SOH, STX};

impl<I: ByteSource, O: Write> Modem<I, O> {
    /// Receiver side: probe until the sender responds. Returns the mode of
    /// the probe that was answered and the sender's first byte.
    pub(crate) fn request_start(&mut self) -> Result<(Edc, u8)> {
        let deadline = Deadline::start(self.config.handshake_timeout);
        let mut probes = 0u32;

        while !deadline.is_expired() {
            let edc = if probes < self.config.crc_probes {
                Edc::Crc16
            } else {
                Edc::Checksum
            };
            self.write_control(edc.probe())?;
            probes += 1;

            let window = Deadline::start(self.config.probe_interval.min(deadline.remaining()));
            while !window.is_expired() {
                match self.read_byte(window.remaining())? {
                    Some(byte @ (SOH | STX | EOT)) => return Ok((edc, byte)),
                    Some(CAN) => return Err(ModemError::PeerCancelled),
                    // line noise
                    Some(_) => {}
                    None => break,
                }
            }
        }

        Err(ModemError::HandshakeTimeout)
    }

    /// Sender side: wait for a receiver probe and return the mode it asks for.
    ///
    /// Probes already queued behind the first one are drained and the latest
    /// wins, so stale CRC probes cannot override a receiver that has since
    /// fallen back to checksum.
    pub(crate) fn await_request(&mut self) -> Result<Edc> {
        let deadline = Deadline::start(self.config.handshake_timeout);

        loop {
            let byte = self
                .read_byte(deadline.remaining())?
                .ok_or(ModemError::HandshakeTimeout)?;
            if byte == CAN {
                return Err(ModemError::PeerCancelled);
            }
            let Some(mut edc) = Edc::from_probe(byte) else {
                continue;
            };

            while let Some(next) = self.read_byte(Duration::ZERO)? {
                if next == CAN {
                    return Err(ModemError::PeerCancelled);
                }
                if let Some(requested) = Edc::from_probe(next) {
                    edc = requested;
                }
            }
            return Ok(edc);
        }
    }
}
