//! Wire format for XMODEM-1K / YMODEM blocks.
//!
//! ```text
//! [0]        Block marker (SOH = 128-byte payload, STX = 1024-byte payload)
//! [1]        Sequence number (u8, wraps at 256)
//! [2]        255 - sequence
//! [3..3+N]   Payload, padded to N = 128 or 1024 bytes
//! [3+N..]    Trailer: 1-byte checksum or 2-byte CRC-16 (high byte first)
//! ```
//!
//! Every other byte on the line is a single-byte control signal.

/// Start of a 128-byte block.
pub const SOH: u8 = 0x01;

/// Start of a 1024-byte block.
pub const STX: u8 = 0x02;

/// End of transmission.
pub const EOT: u8 = 0x04;

/// Acknowledge.
pub const ACK: u8 = 0x06;

/// Not-acknowledge. Doubles as the legacy "send with checksum" probe.
pub const NAK: u8 = 0x15;

/// Cancel. Sent as a short burst.
pub const CAN: u8 = 0x18;

/// Receiver probe asking for CRC-16 trailers.
pub const CRC_REQUEST: u8 = b'C';

/// Filler for the unused tail of a data block (CP/M end-of-file).
pub const CPMEOF: u8 = 0x1A;

/// Filler for the unused tail of a header block.
pub const HEADER_FILLER: u8 = 0x00;

/// Bytes before the payload: marker, sequence, complement.
pub const BLOCK_PREFIX: usize = 3;

/// Payload size of a short block.
pub const SHORT_BLOCK_SIZE: usize = 128;

/// Payload size of a long block.
pub const LONG_BLOCK_SIZE: usize = 1024;

/// Consecutive errors tolerated on a single block before the transfer is aborted.
pub const MAX_ERRORS: u32 = 10;

/// Number of CAN bytes in a cancellation burst.
pub const CANCEL_BURST: usize = 2;

/// Overall bound on waiting for the peer to start a transfer.
pub const WAIT_FOR_RECEIVER_TIMEOUT_MS: u64 = 60_000;

/// Interval between receiver start probes.
pub const REQUEST_TIMEOUT_MS: u64 = 3_000;

/// CRC probes sent before the receiver falls back to checksum probes.
pub const CRC_PROBES: u32 = 3;

/// Receiver wait for the next block.
pub const BLOCK_TIMEOUT_MS: u64 = 1_000;

/// Sender wait for the acknowledgement of a block.
pub const SEND_BLOCK_TIMEOUT_MS: u64 = 10_000;

/// Slice length for blocking reads, so cancellation is noticed between slices.
pub const POLL_INTERVAL_MS: u64 = 100;

/// A purge ends once the line has been quiet this long.
pub const PURGE_QUIET_MS: u64 = 100;

/// Block size on the wire, selected per block by the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// 128-byte payload, marker SOH.
    Short,
    /// 1024-byte payload, marker STX.
    Long,
}

impl BlockKind {
    /// Payload length for this kind.
    pub const fn size(self) -> usize {
        match self {
            Self::Short => SHORT_BLOCK_SIZE,
            Self::Long => LONG_BLOCK_SIZE,
        }
    }

    /// Marker byte that opens a block of this kind.
    pub const fn marker(self) -> u8 {
        match self {
            Self::Short => SOH,
            Self::Long => STX,
        }
    }

    /// Kind announced by a marker byte, if it is one.
    pub fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            SOH => Some(Self::Short),
            STX => Some(Self::Long),
            _ => None,
        }
    }

    /// Smallest kind that holds `len` bytes.
    pub fn fitting(len: usize) -> Option<Self> {
        if len <= SHORT_BLOCK_SIZE {
            Some(Self::Short)
        } else if len <= LONG_BLOCK_SIZE {
            Some(Self::Long)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_map_back_to_kinds() {
        for kind in [BlockKind::Short, BlockKind::Long] {
            assert_eq!(BlockKind::from_marker(kind.marker()), Some(kind));
        }
        assert_eq!(BlockKind::from_marker(EOT), None);
        assert_eq!(BlockKind::from_marker(CAN), None);
    }

    #[test]
    fn fitting_picks_smallest_kind() {
        assert_eq!(BlockKind::fitting(0), Some(BlockKind::Short));
        assert_eq!(BlockKind::fitting(128), Some(BlockKind::Short));
        assert_eq!(BlockKind::fitting(129), Some(BlockKind::Long));
        assert_eq!(BlockKind::fitting(1024), Some(BlockKind::Long));
        assert_eq!(BlockKind::fitting(1025), None);
    }
}
