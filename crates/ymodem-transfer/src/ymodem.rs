//! YMODEM batch transfer: each file is announced by a block-0 header, and an
//! empty header ends the batch.
//!
//! ```text
//! sender                        receiver
//!                     <-- C
//! block 0 (header)    -->
//!                     <-- ACK, C
//! blocks 1..n         -->       (ACK each)
//! EOT                 -->
//!                     <-- ACK
//! ... next file, or:
//!                     <-- C
//! block 0 (all NUL)   -->
//!                     <-- ACK
//! ```

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::block::Block;
use crate::config::ModemConfig;
use crate::edc::Edc;
use crate::error::{ModemError, Result};
use crate::header::{FileHeader, validate_dos_name, validate_file_name};
use crate::logging::TransferEvent;
use crate::modem::{Modem, RECEIVER, SENDER, Tally, TransferSummary};
use crate::port::ByteSource;
use crate::protocol::{ACK, BlockKind, EOT, HEADER_FILLER};
use crate::receiver::Frame;
use crate::sender::ChunkReader;
use crate::session::{Arrival, Session};

/// A file stored by a directory receive.
#[derive(Debug, Clone)]
pub struct ReceivedFile {
    pub path: PathBuf,
    pub header: FileHeader,
    pub summary: TransferSummary,
}

/// Passes through at most `remaining` bytes and silently drops the rest,
/// so block padding past the declared file size never reaches the file.
struct Truncate<W> {
    inner: W,
    remaining: Option<u64>,
    written: u64,
}

impl<W: Write> Truncate<W> {
    fn new(inner: W, limit: Option<u64>) -> Self {
        Self {
            inner,
            remaining: limit,
            written: 0,
        }
    }
}

impl<W: Write> Write for Truncate<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let take = match self.remaining {
            Some(remaining) => remaining.min(buf.len() as u64) as usize,
            None => buf.len(),
        };
        self.inner.write_all(&buf[..take])?;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= take as u64;
        }
        self.written += take as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// A file checked and opened before its session starts.
struct Outgoing {
    header: FileHeader,
    header_block: Block,
    file: File,
}

/// YMODEM endpoint.
pub struct YModem<I, O> {
    modem: Modem<I, O>,
    dos_names: bool,
}

impl<I: ByteSource, O: Write> YModem<I, O> {
    pub fn new(input: I, output: O, config: ModemConfig) -> Self {
        Self::from_modem(Modem::new(input, output, config))
    }

    pub fn from_modem(modem: Modem<I, O>) -> Self {
        Self {
            modem,
            dos_names: false,
        }
    }

    /// Refuse to send names that are not DOS 8.3, for receivers that
    /// cannot store anything else.
    pub fn with_dos_names(mut self, enabled: bool) -> Self {
        self.dos_names = enabled;
        self
    }

    pub fn modem(&mut self) -> &mut Modem<I, O> {
        &mut self.modem
    }

    pub fn into_inner(self) -> Modem<I, O> {
        self.modem
    }

    // ── Sending ────────────────────────────────────────────────────────
    //
    // Local problems (unreadable file, unusable name) are reported before
    // the handshake and put nothing on the line.

    /// Send one file: header, data, EOT.
    pub fn send_file(&mut self, path: &Path) -> Result<TransferSummary> {
        let outgoing = self.open(path)?;
        let result = self.run_send(
            &outgoing.header,
            &outgoing.header_block,
            BufReader::new(outgoing.file),
        );
        self.modem.finish(SENDER, result)
    }

    /// Send `reader` under an explicit header.
    pub fn send_reader<R: Read>(&mut self, header: &FileHeader, reader: R) -> Result<TransferSummary> {
        let header_block = self.header_block(header)?;
        let result = self.run_send(header, &header_block, reader);
        self.modem.finish(SENDER, result)
    }

    /// Send every file, then the empty header that ends the batch. All files
    /// are opened up front.
    pub fn send_batch<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<Vec<TransferSummary>> {
        let batch = paths
            .iter()
            .map(|path| self.open(path.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let result = self.run_send_batch(batch);
        self.modem.finish(SENDER, result)
    }

    /// Send only the batch stop block.
    pub fn send_batch_stop(&mut self) -> Result<()> {
        let result = self.run_send_stop();
        self.modem.finish(SENDER, result)
    }

    fn header_block(&self, header: &FileHeader) -> Result<Block> {
        if self.dos_names {
            validate_dos_name(&header.name)?;
        }
        let encoded = header.encode()?;
        Block::new(FileHeader::block_kind(&encoded), 0, &encoded, HEADER_FILLER)
    }

    fn open(&self, path: &Path) -> Result<Outgoing> {
        let file = File::open(path)?;
        let metadata = file.metadata()?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ModemError::InvalidFileName {
                name: path.display().to_string(),
                reason: "no UTF-8 file name",
            })?;
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs());

        let header = FileHeader::new(name, Some(metadata.len()), modified);
        let header_block = self.header_block(&header)?;
        Ok(Outgoing {
            header,
            header_block,
            file,
        })
    }

    fn run_send_batch(&mut self, batch: Vec<Outgoing>) -> Result<Vec<TransferSummary>> {
        let mut summaries = Vec::with_capacity(batch.len());
        for outgoing in batch {
            summaries.push(self.run_send(
                &outgoing.header,
                &outgoing.header_block,
                BufReader::new(outgoing.file),
            )?);
        }
        self.run_send_stop()?;
        Ok(summaries)
    }

    fn run_send<R: Read>(
        &mut self,
        header: &FileHeader,
        header_block: &Block,
        reader: R,
    ) -> Result<TransferSummary> {
        let edc = self.modem.await_request()?;
        self.modem
            .log(SENDER, TransferEvent::HandshakeComplete { edc });

        let mut session = Session::new(edc, 0, self.modem.config.max_errors);
        let mut header_tally = Tally::start();
        self.modem
            .send_block(&mut session, header_block, &mut header_tally)?;
        self.modem.log(
            SENDER,
            TransferEvent::FileHeader {
                name: header.name.clone(),
                size: header.size,
            },
        );

        // receiver asks again before data; the mode stays as negotiated
        let requested = self.modem.await_request()?;
        if requested != edc {
            tracing::debug!("data start requested {} while session uses {}", requested, edc);
        }

        let mut tally = Tally::start();
        tally.retransmits = header_tally.retransmits;
        let chunks = ChunkReader::new(reader).map(|chunk| chunk.map_err(ModemError::from));
        self.modem.send_chunks(&mut session, chunks, &mut tally)?;
        self.modem.send_eot(&mut session, &mut tally)?;

        let summary = tally.summary();
        self.modem.log_complete(SENDER, &summary);
        Ok(summary)
    }

    fn run_send_stop(&mut self) -> Result<()> {
        let edc = self.modem.await_request()?;
        let mut session = Session::new(edc, 0, self.modem.config.max_errors);
        let stop = Block::new(BlockKind::Short, 0, &[], HEADER_FILLER)?;
        self.modem
            .send_block(&mut session, &stop, &mut Tally::start())?;
        self.modem.log(SENDER, TransferEvent::BatchEnd);
        Ok(())
    }

    // ── Receiving ──────────────────────────────────────────────────────

    /// Receive one file into `path`, whatever name the sender announced.
    /// `Ok(None)` if the sender ended the batch instead.
    pub fn receive_file(&mut self, path: &Path) -> Result<Option<TransferSummary>> {
        let received = self.receive_with(|_| Ok(BufWriter::new(File::create(path)?)))?;
        Ok(received.map(|(_, summary)| summary))
    }

    /// Receive one file into `dir` under the announced name.
    /// `Ok(None)` on the batch stop block, with nothing created.
    pub fn receive_into_directory(&mut self, dir: &Path) -> Result<Option<ReceivedFile>> {
        let received = self.receive_with(|header| {
            validate_file_name(&header.name)?;
            Ok(BufWriter::new(File::create(dir.join(&header.name))?))
        })?;
        Ok(received.map(|(header, summary)| ReceivedFile {
            path: dir.join(&header.name),
            header,
            summary,
        }))
    }

    /// Receive files into `dir` until the batch stop block.
    pub fn receive_batch(&mut self, dir: &Path) -> Result<Vec<ReceivedFile>> {
        let mut files = Vec::new();
        while let Some(file) = self.receive_into_directory(dir)? {
            files.push(file);
        }
        Ok(files)
    }

    /// Receive one file into the sink returned by `open`, which is called
    /// once the header has been validated and before it is acknowledged.
    pub fn receive_with<F, W>(&mut self, open: F) -> Result<Option<(FileHeader, TransferSummary)>>
    where
        F: FnOnce(&FileHeader) -> Result<W>,
        W: Write,
    {
        let result = self.run_receive(open);
        self.modem.finish(RECEIVER, result)
    }

    fn run_receive<F, W>(&mut self, open: F) -> Result<Option<(FileHeader, TransferSummary)>>
    where
        F: FnOnce(&FileHeader) -> Result<W>,
        W: Write,
    {
        let (edc, first) = self.request_header()?;
        self.modem
            .log(RECEIVER, TransferEvent::HandshakeComplete { edc });

        let mut header_session = Session::new(edc, 0, self.modem.config.max_errors);
        let block = match self.modem.next_frame(&mut header_session, Some(first))? {
            Frame::End => return Err(ModemError::UnexpectedEndOfTransmission),
            Frame::Block(block) => block,
        };
        if header_session.classify(block.sequence) != Arrival::Next {
            return Err(ModemError::SynchronizationLost {
                expected: 0,
                actual: block.sequence,
            });
        }

        let Some(header) = FileHeader::decode(&block.payload)? else {
            self.modem.write_control(ACK)?;
            self.modem.log(RECEIVER, TransferEvent::BatchEnd);
            return Ok(None);
        };
        self.modem.log(
            RECEIVER,
            TransferEvent::FileHeader {
                name: header.name.clone(),
                size: header.size,
            },
        );

        let mut sink = Truncate::new(open(&header)?, header.size);
        self.modem.write_control(ACK)?;
        self.modem.write_control(edc.probe())?;

        let mut tally = Tally::start();
        let mut session = Session::new(edc, 1, self.modem.config.max_errors);
        self.modem
            .receive_blocks(&mut session, None, &mut sink, &mut tally)?;

        let mut summary = tally.summary();
        summary.bytes = sink.written;
        self.modem.log_complete(RECEIVER, &summary);
        Ok(Some((header, summary)))
    }

    /// Ask for the next header. An EOT in answer is the previous file's EOT
    /// resent because its ACK was lost: acknowledge it and ask again.
    fn request_header(&mut self) -> Result<(Edc, u8)> {
        let mut resent = 0;
        loop {
            let (edc, first) = self.modem.request_start()?;
            if first != EOT {
                return Ok((edc, first));
            }
            resent += 1;
            if resent >= self.modem.config.max_errors {
                return Err(ModemError::UnexpectedEndOfTransmission);
            }
            tracing::debug!("acknowledging resent EOT ({}) before header", resent);
            self.modem.write_control(ACK)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::logging::NullLogger;
    use crate::port::{PortReader, PortWriter, pipe};

    fn ymodem() -> (PortWriter, YModem<PortReader, Vec<u8>>) {
        let (tx, rx) = pipe();
        let modem = Modem::new(rx, Vec::new(), ModemConfig::default()).with_logger(Arc::new(NullLogger));
        (tx, YModem::from_modem(modem))
    }

    fn written(ymodem: YModem<PortReader, Vec<u8>>) -> Vec<u8> {
        let (_, output) = ymodem.into_inner().into_inner();
        output
    }

    #[test]
    fn missing_file_fails_before_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, mut ymodem) = ymodem();

        let err = ymodem.send_file(&dir.path().join("absent.bin")).unwrap_err();
        assert!(matches!(err, ModemError::Io(_)));
        assert!(written(ymodem).is_empty());
    }

    #[test]
    fn unusable_name_fails_before_handshake() {
        let (_tx, mut ymodem) = ymodem();
        let err = ymodem
            .send_reader(&FileHeader::new("", Some(1), None), io::empty())
            .unwrap_err();
        assert!(matches!(err, ModemError::InvalidFileName { .. }));
        assert!(written(ymodem).is_empty());
    }

    #[test]
    fn batch_with_one_missing_file_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("a.bin");
        std::fs::write(&present, b"data").unwrap();
        let (_tx, mut ymodem) = ymodem();

        let err = ymodem
            .send_batch(&[present, dir.path().join("b.bin")])
            .unwrap_err();
        assert!(matches!(err, ModemError::Io(_)));
        assert!(written(ymodem).is_empty());
    }

    #[test]
    fn dos_names_are_enforced_when_enabled() {
        let (_tx, ymodem) = ymodem();
        let mut ymodem = ymodem.with_dos_names(true);
        let err = ymodem
            .send_reader(&FileHeader::new("firmware-v2.hex", Some(1), None), io::empty())
            .unwrap_err();
        assert!(matches!(
            err,
            ModemError::InvalidFileName {
                reason: "not an 8.3 name",
                ..
            }
        ));
        assert!(written(ymodem).is_empty());
    }

    #[test]
    fn truncate_drops_padding() {
        let mut sink = Truncate::new(Vec::new(), Some(5));
        sink.write_all(b"abc").unwrap();
        sink.write_all(b"defgh").unwrap();
        assert_eq!(sink.written, 5);
        assert_eq!(sink.inner, b"abcde");
    }

    #[test]
    fn truncate_without_limit_passes_everything() {
        let mut sink = Truncate::new(Vec::new(), None);
        sink.write_all(&[1u8; 300]).unwrap();
        assert_eq!(sink.written, 300);
    }
}
