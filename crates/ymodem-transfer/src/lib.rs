/// YMODEM Transfer: XMODEM-1K / YMODEM block transfer over byte links.
///
/// Provides a synchronous, deadline-bounded transfer engine with:
/// - CRC-16 or 8-bit checksum blocks of 128 or 1024 bytes
/// - Receiver-driven start handshake with checksum fallback
/// - Stop-and-wait retransmission with a bounded error count
/// - Duplicate suppression and exact-once, in-order delivery
/// - Cooperative cancellation and a CAN burst on fatal errors
/// - YMODEM batch headers (name, size, modification time)

pub mod block;
pub mod cancel;
pub mod clock;
pub mod config;
pub mod edc;
pub mod error;
mod handshake;
pub mod header;
pub mod logging;
pub mod modem;
pub mod port;
pub mod protocol;
mod receiver;
pub mod sender;
mod session;
pub mod xmodem;
pub mod ymodem;

// Re-export key types for convenience.
pub use block::Block;
pub use cancel::CancelToken;
pub use config::ModemConfig;
pub use edc::Edc;
pub use error::{ModemError, Result};
pub use header::{FileHeader, validate_dos_name, validate_file_name};
pub use logging::{NullLogger, TracingLogger, TransferEvent, TransferLog, TransferLogger};
pub use modem::{Modem, TransferSummary};
pub use port::{ByteSource, PortReader, PortWriter, pipe};
pub use protocol::{BlockKind, LONG_BLOCK_SIZE, SHORT_BLOCK_SIZE};
pub use sender::ChunkReader;
pub use xmodem::XModem;
pub use ymodem::{ReceivedFile, YModem};
