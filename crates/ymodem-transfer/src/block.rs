//! Block framing and unframing.

use crate::edc::Edc;
use crate::error::{ModemError, Result};
use crate::protocol::{BLOCK_PREFIX, BlockKind};

/// One block: a sequence number and a payload padded to the kind's size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub sequence: u8,
    pub payload: Vec<u8>,
}

impl Block {
    /// Build a block from `data`, padding the tail with `filler`.
    pub fn new(kind: BlockKind, sequence: u8, data: &[u8], filler: u8) -> Result<Self> {
        let size = kind.size();
        if data.len() > size {
            return Err(ModemError::PayloadTooLarge {
                len: data.len(),
                max: size,
            });
        }
        let mut payload = Vec::with_capacity(size);
        payload.extend_from_slice(data);
        payload.resize(size, filler);
        Ok(Self {
            kind,
            sequence,
            payload,
        })
    }

    /// Build a block of the smallest kind that holds `data`.
    pub fn fitting(sequence: u8, data: &[u8], filler: u8) -> Result<Self> {
        let kind = BlockKind::fitting(data.len()).ok_or(ModemError::PayloadTooLarge {
            len: data.len(),
            max: BlockKind::Long.size(),
        })?;
        Self::new(kind, sequence, data, filler)
    }

    /// Total bytes on the wire for this block under `edc`.
    pub fn wire_len(&self, edc: Edc) -> usize {
        BLOCK_PREFIX + self.kind.size() + edc.trailer_len()
    }

    /// Serialize: marker, sequence, complement, payload, trailer.
    pub fn encode(&self, edc: Edc) -> Vec<u8> {
        debug_assert_eq!(self.payload.len(), self.kind.size());
        let mut buf = Vec::with_capacity(self.wire_len(edc));
        buf.push(self.kind.marker());
        buf.push(self.sequence);
        buf.push(!self.sequence);
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(edc.compute(&self.payload).as_bytes());
        buf
    }

    /// Parse the rest of a block whose marker byte has already been read.
    ///
    /// `read_exact` must fill the whole buffer or fail. The full body is read
    /// before any check, so a rejected block never leaves its tail on the line.
    pub fn decode<F>(marker: u8, edc: Edc, mut read_exact: F) -> Result<Self>
    where
        F: FnMut(&mut [u8]) -> Result<()>,
    {
        let kind = BlockKind::from_marker(marker).ok_or(ModemError::UnrecognizedControl(marker))?;
        let size = kind.size();

        let mut body = vec![0u8; 2 + size + edc.trailer_len()];
        read_exact(&mut body)?;

        let sequence = body[0];
        let complement = body[1];
        if complement != !sequence {
            return Err(ModemError::MalformedBlock {
                sequence,
                complement,
            });
        }

        let (payload, trailer) = body[2..].split_at(size);
        if !edc.verify(payload, trailer) {
            return Err(ModemError::ChecksumMismatch { sequence });
        }

        Ok(Self {
            kind,
            sequence,
            payload: payload.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CPMEOF, EOT, SOH, STX};

    fn reader(bytes: &[u8]) -> impl FnMut(&mut [u8]) -> Result<()> + '_ {
        let mut pos = 0;
        move |buf: &mut [u8]| {
            let end = pos + buf.len();
            if end > bytes.len() {
                return Err(ModemError::Timeout);
            }
            buf.copy_from_slice(&bytes[pos..end]);
            pos = end;
            Ok(())
        }
    }

    #[test]
    fn encode_layout() {
        let block = Block::new(BlockKind::Short, 1, b"hello", CPMEOF).unwrap();
        let wire = block.encode(Edc::Crc16);

        assert_eq!(wire.len(), 3 + 128 + 2);
        assert_eq!(&wire[..3], &[SOH, 0x01, 0xFE]);
        assert_eq!(&wire[3..8], b"hello");
        assert!(wire[8..131].iter().all(|&b| b == CPMEOF));
        assert_eq!(&wire[131..], Edc::Crc16.compute(&block.payload).as_bytes());
    }

    #[test]
    fn long_block_with_checksum() {
        let data = vec![0xA5u8; 1000];
        let block = Block::fitting(7, &data, CPMEOF).unwrap();
        assert_eq!(block.kind, BlockKind::Long);

        let wire = block.encode(Edc::Checksum);
        assert_eq!(wire[0], STX);
        assert_eq!(wire.len(), 3 + 1024 + 1);

        let decoded = Block::decode(wire[0], Edc::Checksum, reader(&wire[1..])).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn oversized_payload_rejected() {
        let err = Block::fitting(1, &[0u8; 1025], CPMEOF).unwrap_err();
        assert!(matches!(err, ModemError::PayloadTooLarge { len: 1025, max: 1024 }));

        let err = Block::new(BlockKind::Short, 1, &[0u8; 129], CPMEOF).unwrap_err();
        assert!(matches!(err, ModemError::PayloadTooLarge { len: 129, max: 128 }));
    }

    #[test]
    fn bad_complement_is_malformed() {
        let mut wire = Block::new(BlockKind::Short, 4, b"x", CPMEOF)
            .unwrap()
            .encode(Edc::Crc16);
        wire[2] = 0x00;

        let err = Block::decode(wire[0], Edc::Crc16, reader(&wire[1..])).unwrap_err();
        assert!(matches!(
            err,
            ModemError::MalformedBlock {
                sequence: 4,
                complement: 0
            }
        ));
    }

    #[test]
    fn corrupted_payload_fails_edc() {
        for edc in [Edc::Checksum, Edc::Crc16] {
            let mut wire = Block::new(BlockKind::Short, 9, b"payload", CPMEOF)
                .unwrap()
                .encode(edc);
            wire[10] ^= 0x40;

            let err = Block::decode(wire[0], edc, reader(&wire[1..])).unwrap_err();
            assert!(matches!(err, ModemError::ChecksumMismatch { sequence: 9 }));
        }
    }

    #[test]
    fn unknown_marker_is_unrecognized() {
        let err = Block::decode(EOT, Edc::Crc16, reader(&[])).unwrap_err();
        assert!(matches!(err, ModemError::UnrecognizedControl(EOT)));
    }

    #[test]
    fn truncated_body_propagates_read_error() {
        let wire = Block::new(BlockKind::Short, 2, b"abc", CPMEOF)
            .unwrap()
            .encode(Edc::Crc16);
        let err = Block::decode(wire[0], Edc::Crc16, reader(&wire[1..50])).unwrap_err();
        assert!(matches!(err, ModemError::Timeout));
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;
        use proptest::prelude::prop;

        proptest! {
            #[test]
            fn roundtrip_any_payload(
                data in prop::collection::vec(any::<u8>(), 0..=1024),
                sequence in any::<u8>(),
                filler in any::<u8>(),
                crc in any::<bool>(),
            ) {
                let edc = if crc { Edc::Crc16 } else { Edc::Checksum };
                let block = Block::fitting(sequence, &data, filler).unwrap();
                let wire = block.encode(edc);
                prop_assert_eq!(wire.len(), block.wire_len(edc));

                let decoded = Block::decode(wire[0], edc, reader(&wire[1..])).unwrap();
                prop_assert_eq!(decoded.sequence, sequence);
                prop_assert_eq!(&decoded.payload[..data.len()], &data[..]);
                prop_assert!(decoded.payload[data.len()..].iter().all(|&b| b == filler));
            }
        }
    }
}
