//! Error-detection codes carried in the block trailer.
//!
//! The mode is chosen once per transfer by the receiver's start probe and is
//! only ever passed into the codec, never looked up per block.

use crc::{CRC_16_XMODEM, Crc};

use crate::protocol::{CRC_REQUEST, NAK};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Trailer algorithm for one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edc {
    /// 8-bit wrapping sum of the payload bytes.
    Checksum,
    /// CRC-16/XMODEM (poly 0x1021, init 0), high byte first.
    Crc16,
}

/// Computed trailer bytes, 1 or 2 long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    bytes: [u8; 2],
    len: usize,
}

impl Trailer {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl AsRef<[u8]> for Trailer {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl Edc {
    pub const fn trailer_len(self) -> usize {
        match self {
            Self::Checksum => 1,
            Self::Crc16 => 2,
        }
    }

    pub fn compute(self, payload: &[u8]) -> Trailer {
        match self {
            Self::Checksum => {
                let sum = payload.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
                Trailer {
                    bytes: [sum, 0],
                    len: 1,
                }
            }
            Self::Crc16 => Trailer {
                bytes: CRC16.checksum(payload).to_be_bytes(),
                len: 2,
            },
        }
    }

    pub fn verify(self, payload: &[u8], trailer: &[u8]) -> bool {
        self.compute(payload).as_bytes() == trailer
    }

    /// Probe byte a receiver sends to request this mode.
    pub const fn probe(self) -> u8 {
        match self {
            Self::Checksum => NAK,
            Self::Crc16 => CRC_REQUEST,
        }
    }

    /// Mode requested by a probe byte.
    pub fn from_probe(byte: u8) -> Option<Self> {
        match byte {
            CRC_REQUEST => Some(Self::Crc16),
            NAK => Some(Self::Checksum),
            _ => None,
        }
    }
}

impl std::fmt::Display for Edc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Checksum => write!(f, "checksum"),
            Self::Crc16 => write!(f, "crc16"),
        }
    }
}
