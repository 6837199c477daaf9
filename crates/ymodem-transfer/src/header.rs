//! YMODEM block-0 file header.
//!
//! ```text
//! name NUL size SP mtime-octal NUL... (padded with NUL to 128 or 1024 bytes)
//! ```
//!
//! A header whose first byte is NUL (an empty name) ends the batch.

use std::path::{Component, Path};

use regex::Regex;

use crate::error::{ModemError, Result};
use crate::protocol::{BlockKind, LONG_BLOCK_SIZE};

/// File metadata carried in block 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub name: String,
    /// Exact file length; the receiver drops block padding beyond it.
    pub size: Option<u64>,
    /// Modification time, seconds since the Unix epoch.
    pub modified: Option<u64>,
}

impl FileHeader {
    pub fn new(name: impl Into<String>, size: Option<u64>, modified: Option<u64>) -> Self {
        Self {
            name: name.into(),
            size,
            modified,
        }
    }

    /// Serialize into the header payload (unpadded).
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.name.is_empty() || self.name.contains('\0') {
            return Err(ModemError::InvalidFileName {
                name: self.name.clone(),
                reason: "empty or contains NUL",
            });
        }

        let mut record = self.name.as_bytes().to_vec();
        record.push(0);
        if let Some(size) = self.size {
            record.extend_from_slice(size.to_string().as_bytes());
            if let Some(modified) = self.modified {
                record.extend_from_slice(format!(" {:o}", modified).as_bytes());
            }
        }

        if record.len() > LONG_BLOCK_SIZE {
            return Err(ModemError::PayloadTooLarge {
                len: record.len(),
                max: LONG_BLOCK_SIZE,
            });
        }
        Ok(record)
    }

    /// Block kind needed to carry the encoded header.
    pub fn block_kind(encoded: &[u8]) -> BlockKind {
        BlockKind::fitting(encoded.len()).unwrap_or(BlockKind::Long)
    }

    /// Parse a received block-0 payload. `Ok(None)` marks the end of a batch.
    pub fn decode(payload: &[u8]) -> Result<Option<Self>> {
        if payload.first().is_none_or(|&b| b == 0) {
            return Ok(None);
        }

        let name_end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
        let name = std::str::from_utf8(&payload[..name_end])
            .map_err(|_| ModemError::InvalidHeader("file name is not UTF-8".into()))?
            .to_string();

        let rest = payload.get(name_end + 1..).unwrap_or_default();
        let info_end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let info = std::str::from_utf8(&rest[..info_end])
            .map_err(|_| ModemError::InvalidHeader("file info is not ASCII".into()))?;

        let mut fields = info.split_ascii_whitespace();
        let size = fields
            .next()
            .map(|f| {
                f.parse::<u64>()
                    .map_err(|_| ModemError::InvalidHeader(format!("bad file size {:?}", f)))
            })
            .transpose()?;
        let modified = fields
            .next()
            .map(|f| {
                u64::from_str_radix(f, 8)
                    .map_err(|_| ModemError::InvalidHeader(format!("bad modification time {:?}", f)))
            })
            .transpose()?;

        Ok(Some(Self {
            name,
            size,
            modified,
        }))
    }
}

/// Check that a received name is a single plain file name, safe to join
/// onto a target directory.
pub fn validate_file_name(name: &str) -> Result<()> {
    let reject = |reason| {
        Err(ModemError::InvalidFileName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return reject("empty");
    }
    if name.contains('\0') {
        return reject("contains NUL");
    }
    if name.contains('/') || name.contains('\\') {
        return reject("contains a path separator");
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => reject("not a plain file name"),
    }
}

/// Eight-dot-three names as accepted by DOS-era receivers.
const DOS_NAME: &str = r"^[A-Za-z0-9_]{1,8}\.[A-Za-z0-9_]{1,3}$";

/// Check that `name` is a DOS 8.3 file name, for peers that cannot store
/// anything longer.
pub fn validate_dos_name(name: &str) -> Result<()> {
    if Regex::new(DOS_NAME).is_ok_and(|re| re.is_match(name)) {
        Ok(())
    } else {
        Err(ModemError::InvalidFileName {
            name: name.to_string(),
            reason: "not an 8.3 name",
        })
    }
}
