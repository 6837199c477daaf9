#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ymodem_transfer::protocol::BLOCK_PREFIX;
use ymodem_transfer::{
    Modem, ModemConfig, NullLogger, PortReader, PortWriter, TransferEvent, TransferLog,
    TransferLogger, pipe,
};

/// Timings short enough for tests, with the same ratios as the defaults.
pub fn fast_config() -> ModemConfig {
    ModemConfig {
        handshake_timeout: Duration::from_secs(2),
        probe_interval: Duration::from_millis(50),
        crc_probes: 3,
        block_timeout: Duration::from_millis(100),
        ack_timeout: Duration::from_millis(300),
        max_errors: 5,
        poll_interval: Duration::from_millis(5),
        purge_quiet: Duration::from_millis(10),
        ..ModemConfig::default()
    }
}

/// Known byte pattern.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Line damage applied to one direction of a link.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    None,
    /// Swallow the `nth` (1-based) single-byte write equal to `byte`.
    DropControl { byte: u8, nth: usize },
    /// Flip a payload byte of the `nth` (1-based) block written.
    CorruptBlock { nth: usize },
    /// Flip a payload byte of every block.
    CorruptAllBlocks,
}

/// Writer that damages selected writes before they reach the link. The
/// engine issues one write per block or control byte.
pub struct FaultyWriter {
    inner: PortWriter,
    fault: Fault,
    controls: usize,
    blocks: usize,
}

impl FaultyWriter {
    pub fn new(inner: PortWriter, fault: Fault) -> Self {
        Self {
            inner,
            fault,
            controls: 0,
            blocks: 0,
        }
    }
}

impl Write for FaultyWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut frame = buf.to_vec();
        if let [byte] = buf {
            if let Fault::DropControl { byte: target, nth } = self.fault {
                if *byte == target {
                    self.controls += 1;
                    if self.controls == nth {
                        return Ok(buf.len());
                    }
                }
            }
        } else if buf.len() > BLOCK_PREFIX {
            self.blocks += 1;
            let corrupt = match self.fault {
                Fault::CorruptBlock { nth } => nth == self.blocks,
                Fault::CorruptAllBlocks => true,
                _ => false,
            };
            if corrupt {
                frame[BLOCK_PREFIX] ^= 0xFF;
            }
        }
        self.inner.write_all(&frame)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

pub type Endpoint = Modem<PortReader, FaultyWriter>;

/// Two engines wired back to back: `(sender, receiver)`.
pub fn link(sender_fault: Fault, receiver_fault: Fault) -> (Endpoint, Endpoint) {
    link_with(fast_config(), fast_config(), sender_fault, receiver_fault)
}

pub fn link_with(
    sender_config: ModemConfig,
    receiver_config: ModemConfig,
    sender_fault: Fault,
    receiver_fault: Fault,
) -> (Endpoint, Endpoint) {
    let (to_receiver, receiver_in) = pipe();
    let (to_sender, sender_in) = pipe();
    let sender = Modem::new(sender_in, FaultyWriter::new(to_receiver, sender_fault), sender_config)
        .with_logger(Arc::new(NullLogger));
    let receiver = Modem::new(
        receiver_in,
        FaultyWriter::new(to_sender, receiver_fault),
        receiver_config,
    )
    .with_logger(Arc::new(NullLogger));
    (sender, receiver)
}

/// Logger that keeps every event for inspection.
#[derive(Default)]
pub struct RecordingLogger {
    entries: Mutex<Vec<TransferLog>>,
}

impl RecordingLogger {
    pub fn events(&self) -> Vec<TransferEvent> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|entry| entry.event.clone())
            .collect()
    }
}

impl TransferLogger for RecordingLogger {
    fn log(&self, entry: TransferLog) {
        self.entries.lock().unwrap().push(entry);
    }
}
