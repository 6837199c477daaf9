//! XMODEM-1K: one file per session, no header block.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::config::ModemConfig;
use crate::error::Result;
use crate::modem::{Modem, TransferSummary};
use crate::port::ByteSource;

/// XMODEM-1K endpoint. The received file keeps the block padding, since
/// the protocol does not carry the file length.
pub struct XModem<I, O> {
    modem: Modem<I, O>,
}

impl<I: ByteSource, O: Write> XModem<I, O> {
    pub fn new(input: I, output: O, config: ModemConfig) -> Self {
        Self::from_modem(Modem::new(input, output, config))
    }

    pub fn from_modem(modem: Modem<I, O>) -> Self {
        Self { modem }
    }

    pub fn modem(&mut self) -> &mut Modem<I, O> {
        &mut self.modem
    }

    pub fn send_file(&mut self, path: &Path) -> Result<TransferSummary> {
        let file = File::open(path)?;
        self.modem.send_reader(file)
    }

    pub fn send_reader<R: Read>(&mut self, reader: R) -> Result<TransferSummary> {
        self.modem.send_reader(reader)
    }

    pub fn receive_file(&mut self, path: &Path) -> Result<TransferSummary> {
        let mut sink = BufWriter::new(File::create(path)?);
        self.modem.receive(&mut sink)
    }

    pub fn receive<W: Write>(&mut self, sink: &mut W) -> Result<TransferSummary> {
        self.modem.receive(sink)
    }
}
