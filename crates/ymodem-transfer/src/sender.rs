//! Send loop: one block in flight, resent unchanged until acknowledged.
//!
//! ```text
//! for each chunk:  write block --> wait ACK/NAK/CAN (ack_timeout)
//!                     ^                |
//!                     +--- NAK/timeout-+  (until max_errors)
//! then:            write EOT  --> wait ACK, same retry policy
//! ```

use std::io::{Read, Write};

use crate::block::Block;
use crate::clock::Deadline;
use crate::error::{ModemError, Result};
use crate::logging::TransferEvent;
use crate::modem::{Modem, SENDER, Tally, TransferSummary};
use crate::port::ByteSource;
use crate::protocol::{ACK, CAN, CPMEOF, EOT, LONG_BLOCK_SIZE, NAK};
use crate::session::Session;

/// Iterator over up-to-1024-byte chunks of a reader. Chunks are filled
/// completely except the last one.
pub struct ChunkReader<R> {
    reader: R,
    done: bool,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
        }
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = std::io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut chunk = vec![0u8; LONG_BLOCK_SIZE];
        let mut filled = 0;
        while filled < chunk.len() {
            match self.reader.read(&mut chunk[filled..]) {
                Ok(0) => {
                    self.done = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        if filled == 0 {
            return None;
        }
        chunk.truncate(filled);
        Some(Ok(chunk))
    }
}

/// Peer's answer to a transmitted block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Response {
    Ack,
    Nak,
    Cancel,
    Silence,
}

impl<I: ByteSource, O: Write> Modem<I, O> {
    /// Send `chunks` as one transfer: handshake, blocks from sequence 1, EOT.
    ///
    /// Each chunk goes out in the smallest block that holds it (128 or 1024
    /// bytes, padded with CPMEOF); a chunk over 1024 bytes is an error.
    pub fn send<C, T>(&mut self, chunks: C) -> Result<TransferSummary>
    where
        C: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let result = self.run_send(chunks.into_iter().map(Ok));
        self.finish(SENDER, result)
    }

    /// Send everything `reader` yields as one transfer.
    pub fn send_reader<R: Read>(&mut self, reader: R) -> Result<TransferSummary> {
        let chunks = ChunkReader::new(reader).map(|chunk| chunk.map_err(ModemError::from));
        let result = self.run_send(chunks);
        self.finish(SENDER, result)
    }

    fn run_send<C, T>(&mut self, chunks: C) -> Result<TransferSummary>
    where
        C: Iterator<Item = Result<T>>,
        T: AsRef<[u8]>,
    {
        let edc = self.await_request()?;
        self.log(SENDER, TransferEvent::HandshakeComplete { edc });

        let mut tally = Tally::start();
        let mut session = Session::new(edc, 1, self.config.max_errors);
        self.send_chunks(&mut session, chunks, &mut tally)?;
        self.send_eot(&mut session, &mut tally)?;

        let summary = tally.summary();
        self.log_complete(SENDER, &summary);
        Ok(summary)
    }

    /// Send each chunk at the session's next sequence number.
    pub(crate) fn send_chunks<C, T>(
        &mut self,
        session: &mut Session,
        chunks: C,
        tally: &mut Tally,
    ) -> Result<()>
    where
        C: Iterator<Item = Result<T>>,
        T: AsRef<[u8]>,
    {
        for chunk in chunks {
            let chunk = chunk?;
            let data = chunk.as_ref();
            let block = Block::fitting(session.expected_sequence(), data, CPMEOF)?;
            self.send_block(session, &block, tally)?;
            tally.bytes += data.len() as u64;
        }
        Ok(())
    }

    /// Transmit one block until acknowledged, then advance the session.
    pub(crate) fn send_block(
        &mut self,
        session: &mut Session,
        block: &Block,
        tally: &mut Tally,
    ) -> Result<()> {
        let wire = block.encode(session.edc());
        self.transmit(session, &wire, block.sequence, tally)?;
        session.accept();
        tally.blocks += 1;
        Ok(())
    }

    pub(crate) fn send_eot(&mut self, session: &mut Session, tally: &mut Tally) -> Result<()> {
        let sequence = session.expected_sequence();
        self.transmit(session, &[EOT], sequence, tally)
    }

    fn transmit(
        &mut self,
        session: &mut Session,
        wire: &[u8],
        sequence: u8,
        tally: &mut Tally,
    ) -> Result<()> {
        session.reset_errors();
        loop {
            self.check_cancelled()?;
            self.write_all(wire)?;
            self.log(
                SENDER,
                TransferEvent::BlockSent {
                    sequence,
                    size: wire.len(),
                },
            );

            match self.await_response()? {
                Response::Ack => {
                    session.reset_errors();
                    return Ok(());
                }
                Response::Cancel => return Err(ModemError::PeerCancelled),
                Response::Nak | Response::Silence => {
                    if session.record_error() {
                        return Err(ModemError::RetryLimitExceeded {
                            errors: session.error_count(),
                        });
                    }
                    tally.retransmits += 1;
                    self.log(
                        SENDER,
                        TransferEvent::BlockRetry {
                            sequence,
                            attempt: session.error_count(),
                        },
                    );
                }
            }
        }
    }

    /// Wait for ACK, NAK or CAN; anything else on the line is ignored.
    fn await_response(&mut self) -> Result<Response> {
        let deadline = Deadline::start(self.config.ack_timeout);
        while !deadline.is_expired() {
            match self.read_byte(deadline.remaining())? {
                Some(ACK) => return Ok(Response::Ack),
                Some(NAK) => return Ok(Response::Nak),
                Some(CAN) => return Ok(Response::Cancel),
                Some(_) => {}
                None => break,
            }
        }
        Ok(Response::Silence)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::config::ModemConfig;
    use crate::logging::NullLogger;
    use crate::port::{PortReader, PortWriter, pipe};
    use crate::protocol::{CRC_REQUEST, SOH, STX};

    #[test]
    fn chunk_reader_fills_blocks() {
        let data = vec![7u8; 2500];
        let chunks: Vec<Vec<u8>> = ChunkReader::new(Cursor::new(data))
            .map(|c| c.unwrap())
            .collect();
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![1024, 1024, 452]);
    }

    #[test]
    fn chunk_reader_empty_input() {
        assert_eq!(ChunkReader::new(Cursor::new(Vec::new())).count(), 0);
    }

    fn config() -> ModemConfig {
        ModemConfig {
            handshake_timeout: Duration::from_millis(200),
            ack_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(5),
            max_errors: 3,
            ..ModemConfig::default()
        }
    }

    fn modem() -> (PortWriter, Modem<PortReader, Vec<u8>>) {
        let (tx, rx) = pipe();
        let modem = Modem::new(rx, Vec::new(), config()).with_logger(Arc::new(NullLogger));
        (tx, modem)
    }

    #[test]
    fn unanswered_block_hits_retry_limit() {
        let (mut tx, mut modem) = modem();
        tx.write_all(&[CRC_REQUEST]).unwrap();

        let err = modem.send([b"abc".as_slice()]).unwrap_err();
        assert!(matches!(err, ModemError::RetryLimitExceeded { errors: 3 }));

        let (_, written) = modem.into_inner();
        let block_len = 3 + 128 + 2;
        assert_eq!(written.len(), 3 * block_len + 2);
        assert_eq!(written[0], SOH);
        assert_eq!(&written[3 * block_len..], &[CAN, CAN]);
    }

    #[test]
    fn peer_cancel_stops_without_burst() {
        let (mut tx, mut modem) = modem();
        tx.write_all(&[CRC_REQUEST, CAN]).unwrap();

        let err = modem.send([vec![1u8; 1024]]).unwrap_err();
        assert!(matches!(err, ModemError::PeerCancelled));

        // the CAN queued behind the probe is drained by the handshake
        let (_, written) = modem.into_inner();
        assert!(written.is_empty());
    }

    #[test]
    fn acked_blocks_then_eot() {
        let (mut tx, mut modem) = modem();
        tx.write_all(&[NAK]).unwrap();
        // queued after the handshake has drained its probes
        let peer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            tx.write_all(&[ACK, ACK, ACK]).unwrap();
            tx
        });

        let summary = modem.send([vec![9u8; 1000], vec![9u8; 10]]).unwrap();
        assert_eq!(summary.blocks, 2);
        assert_eq!(summary.bytes, 1010);
        assert_eq!(summary.retransmits, 0);

        let (_, written) = modem.into_inner();
        let long = 3 + 1024 + 1;
        let short = 3 + 128 + 1;
        assert_eq!(written.len(), long + short + 1);
        assert_eq!(&written[..3], &[STX, 1, 0xFE]);
        assert_eq!(&written[long..long + 3], &[SOH, 2, 0xFD]);
        assert_eq!(written[long + short], EOT);
        drop(peer.join().unwrap());
    }

    #[test]
    fn oversized_chunk_aborts_with_burst() {
        let (mut tx, mut modem) = modem();
        tx.write_all(&[CRC_REQUEST]).unwrap();

        let err = modem.send([vec![0u8; 1025]]).unwrap_err();
        assert!(matches!(err, ModemError::PayloadTooLarge { .. }));
        let (_, written) = modem.into_inner();
        assert_eq!(written, vec![CAN, CAN]);
    }
}
