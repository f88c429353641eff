//! Checksummed frame storage
//!
//! The persistence substrate shared by index snapshots and archives:
//! length-prefixed frames with trailing CRC32 checksums, an append-only
//! writer with explicit fsync, and a sequential reader that treats any
//! checksum failure as fatal corruption.

mod checksum;
mod errors;
mod reader;
mod record;
mod writer;

pub use checksum::{compute_checksum, verify_checksum};
pub use errors::{Severity, StorageError, StorageErrorCode, StorageResult};
pub use reader::FrameReader;
pub use record::{encode_frame, read_frame, PairRecord, SlotRecord};
pub use writer::FrameWriter;
