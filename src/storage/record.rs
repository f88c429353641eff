//! Storage frame and record formats
//!
//! Every value persisted by this crate goes through one frame format:
//!
//! ```text
//! +------------------+
//! | Frame Length     | (u32 LE, includes this field and the checksum)
//! +------------------+
//! | Body             | (variable)
//! +------------------+
//! | Checksum         | (u32 LE, CRC32 over length field + body)
//! +------------------+
//! ```
//!
//! Two record bodies are defined:
//! - `SlotRecord` - one (index, value) slot of a long-keyed index
//! - `PairRecord` - one length-prefixed (key, value) byte pair of an
//!   archive
//!
//! The concrete byte layout is an implementation detail of this crate, not
//! an interchange format.

use std::io::{self, Read};

use super::checksum::{compute_checksum, verify_checksum};
use super::errors::{StorageError, StorageResult};

/// Frame overhead: length field plus checksum.
const FRAME_OVERHEAD: usize = 8;

/// Largest body accepted by the reader. Anything bigger is framing
/// corruption, not data.
const MAX_BODY_LEN: usize = 64 * 1024 * 1024;

/// Wraps a record body into a checksummed frame.
pub fn encode_frame(body: &[u8]) -> Vec<u8> {
    let total = body.len() + FRAME_OVERHEAD;
    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&(total as u32).to_le_bytes());
    frame.extend_from_slice(body);
    let checksum = compute_checksum(&frame);
    frame.extend_from_slice(&checksum.to_le_bytes());
    frame
}

/// Reads the next frame body from `reader`.
///
/// Returns `Ok(None)` on a clean end of stream. A truncated frame, an
/// implausible length, or a checksum mismatch is fatal corruption reported
/// with the byte offset of the frame.
pub fn read_frame(reader: &mut dyn Read, offset: u64) -> StorageResult<Option<Vec<u8>>> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(StorageError::read_failed("failed to read frame length", e)),
    }

    let total = u32::from_le_bytes(len_bytes) as usize;
    if total < FRAME_OVERHEAD || total - FRAME_OVERHEAD > MAX_BODY_LEN {
        return Err(StorageError::corruption_at_offset(
            offset,
            format!("implausible frame length {}", total),
        ));
    }

    let mut rest = vec![0u8; total - 4];
    reader.read_exact(&mut rest).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            StorageError::corruption_at_offset(offset, "truncated frame")
        } else {
            StorageError::read_failed("failed to read frame body", e)
        }
    })?;

    let body_len = total - FRAME_OVERHEAD;
    let stored = u32::from_le_bytes(
        rest[body_len..]
            .try_into()
            .map_err(|_| StorageError::corruption_at_offset(offset, "truncated checksum"))?,
    );

    let mut checked = Vec::with_capacity(total - 4);
    checked.extend_from_slice(&len_bytes);
    checked.extend_from_slice(&rest[..body_len]);
    if !verify_checksum(&checked, stored) {
        return Err(StorageError::corruption_at_offset(
            offset,
            "frame checksum mismatch",
        ));
    }

    rest.truncate(body_len);
    Ok(Some(rest))
}

/// One persisted slot of a long-keyed index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRecord {
    /// Slot index.
    pub index: u64,
    /// Slot value.
    pub value: i64,
}

impl SlotRecord {
    /// Serialize to a checksummed frame.
    pub fn to_frame(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(16);
        body.extend_from_slice(&self.index.to_le_bytes());
        body.extend_from_slice(&self.value.to_le_bytes());
        encode_frame(&body)
    }

    /// Decode from a frame body.
    pub fn from_body(body: &[u8], offset: u64) -> StorageResult<Self> {
        if body.len() != 16 {
            return Err(StorageError::corruption_at_offset(
                offset,
                format!("slot record body must be 16 bytes, got {}", body.len()),
            ));
        }
        let index = u64::from_le_bytes(body[..8].try_into().expect("sized above"));
        let value = i64::from_le_bytes(body[8..].try_into().expect("sized above"));
        Ok(Self { index, value })
    }
}

/// One persisted (key, value) pair of an archive. Both sides are opaque
/// encoded bytes; the archive sink chose the encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairRecord {
    /// Encoded key bytes.
    pub key: Vec<u8>,
    /// Encoded value bytes.
    pub value: Vec<u8>,
}

impl PairRecord {
    /// Serialize to a checksummed frame.
    pub fn to_frame(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(8 + self.key.len() + self.value.len());
        body.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        body.extend_from_slice(&self.key);
        body.extend_from_slice(&(self.value.len() as u32).to_le_bytes());
        body.extend_from_slice(&self.value);
        encode_frame(&body)
    }

    /// Decode from a frame body.
    pub fn from_body(body: &[u8], offset: u64) -> StorageResult<Self> {
        let corrupt = |reason: &str| StorageError::corruption_at_offset(offset, reason);

        if body.len() < 4 {
            return Err(corrupt("pair record too short for key length"));
        }
        let key_len = u32::from_le_bytes(body[..4].try_into().expect("sized above")) as usize;
        let value_len_at = 4 + key_len;
        if body.len() < value_len_at + 4 {
            return Err(corrupt("pair record too short for key"));
        }
        let key = body[4..value_len_at].to_vec();
        let value_len = u32::from_le_bytes(
            body[value_len_at..value_len_at + 4]
                .try_into()
                .expect("sized above"),
        ) as usize;
        let value_at = value_len_at + 4;
        if body.len() != value_at + value_len {
            return Err(corrupt("pair record length mismatch"));
        }
        let value = body[value_at..].to_vec();
        Ok(Self { key, value })
    }
}
