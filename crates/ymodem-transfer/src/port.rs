//! Byte channel plumbing between the engine and a link.
//!
//! ```text
//! [Link reader] --pump thread--> crossbeam channel --> [PortReader] --> engine
//! engine --> [PortWriter or any io::Write] --> link
//! ```
//!
//! The pump thread lets the engine wait on the link with a timeout even when
//! the underlying reader (a tty, stdin) only offers blocking reads.

use std::io::{self, Read, Write};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::{Buf, Bytes};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

/// Read buffer size for the pump thread.
const PUMP_BUFFER: usize = 4096;

/// Source of single bytes with a bounded wait.
pub trait ByteSource {
    /// Wait up to `timeout` for the next byte. `Ok(None)` means the wait expired.
    fn read_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>>;
}

/// Receiving end of a byte channel.
pub struct PortReader {
    rx: Receiver<Bytes>,
    pending: Bytes,
}

impl PortReader {
    pub fn new(rx: Receiver<Bytes>) -> Self {
        Self {
            rx,
            pending: Bytes::new(),
        }
    }

    /// Start a pump thread copying everything `reader` yields into a new
    /// `PortReader`. The thread exits at end of stream, on a read error, or
    /// once the `PortReader` is dropped and the next read completes.
    pub fn spawn<R>(mut reader: R) -> io::Result<(Self, JoinHandle<io::Result<()>>)>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = unbounded::<Bytes>();
        let handle = thread::Builder::new()
            .name("modem-rx".into())
            .spawn(move || -> io::Result<()> {
                let mut buf = vec![0u8; PUMP_BUFFER];
                loop {
                    let n = match reader.read(&mut buf) {
                        Ok(0) => return Ok(()),
                        Ok(n) => n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            tracing::debug!("link read failed: {}", e);
                            return Err(e);
                        }
                    };
                    if tx.send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                        return Ok(());
                    }
                }
            })?;
        Ok((Self::new(rx), handle))
    }
}

impl ByteSource for PortReader {
    fn read_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        while !self.pending.has_remaining() {
            match self.rx.recv_timeout(timeout) {
                Ok(chunk) => self.pending = chunk,
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "link closed"));
                }
            }
        }
        Ok(Some(self.pending.get_u8()))
    }
}

/// Sending end of an in-memory byte channel.
#[derive(Clone)]
pub struct PortWriter {
    tx: Sender<Bytes>,
}

impl Write for PortWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .send(Bytes::copy_from_slice(buf))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "link closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// In-memory one-way link.
pub fn pipe() -> (PortWriter, PortReader) {
    let (tx, rx) = unbounded::<Bytes>();
    (PortWriter { tx }, PortReader::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_arrive_in_order_across_writes() {
        let (mut tx, mut rx) = pipe();
        tx.write_all(b"ab").unwrap();
        tx.write_all(b"c").unwrap();

        let timeout = Duration::from_millis(10);
        assert_eq!(rx.read_byte(timeout).unwrap(), Some(b'a'));
        assert_eq!(rx.read_byte(timeout).unwrap(), Some(b'b'));
        assert_eq!(rx.read_byte(timeout).unwrap(), Some(b'c'));
        assert_eq!(rx.read_byte(timeout).unwrap(), None);
    }

    #[test]
    fn closed_link_reports_eof_after_draining() {
        let (mut tx, mut rx) = pipe();
        tx.write_all(b"z").unwrap();
        drop(tx);

        let timeout = Duration::from_millis(10);
        assert_eq!(rx.read_byte(timeout).unwrap(), Some(b'z'));
        let err = rx.read_byte(timeout).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn pump_thread_forwards_reader() {
        let source = io::Cursor::new(b"serial".to_vec());
        let (mut rx, handle) = PortReader::spawn(source).unwrap();

        let mut got = Vec::new();
        while let Ok(Some(b)) = rx.read_byte(Duration::from_millis(200)) {
            got.push(b);
        }
        assert_eq!(got, b"serial");
        handle.join().unwrap().unwrap();
    }
}
