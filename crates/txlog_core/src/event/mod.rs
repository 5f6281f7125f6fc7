//! Typed event model and streaming I/O for transactional log files.
//!
//! A log file is a fixed header followed by a sequence of self-describing
//! event records:
//!
//! ```text
//! file   | magic (4) | version (2) | flags (2) | events...
//! event  | magic (4) | version (2) | kind (1) | flags (1)
//!        | source_pos (8) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! Multi-byte fields are big-endian. `source_pos` is the event's own
//! log-position field: the offset of the event's end on the server that
//! produced it. Event flag bit 0 marks events that originated on the
//! remote source server rather than locally.
//!
//! ## Recovery Policy
//!
//! The reader distinguishes between **tolerated** and **fatal** conditions
//! during recovery:
//!
//! ### Tolerated (scan simply stops here)
//!
//! - **Truncated header or payload**: a crash mid-write left an incomplete
//!   record at the tail → status [`StreamStatus::Truncated`]
//! - **CRC mismatch, bad magic, unknown kind**: damage at the read point →
//!   status [`StreamStatus::Corrupted`]
//!
//! Whatever safe boundary was confirmed before the stop still stands.
//!
//! ### Fatal (no destructive action may follow)
//!
//! - **Oversized payload**: a record claiming more than the configured
//!   maximum → [`StreamStatus::ExceedsMaxSize`]
//! - **Allocation failure** while materializing a payload →
//!   [`StreamStatus::OutOfMemory`]

mod reader;
mod record;
mod writer;

pub(crate) use record::decode_log_header;

pub use reader::{EventReader, StreamStatus};
pub use record::{
    compute_crc32, EventBody, EventKind, EventOrigin, LogEvent, EVENT_HEADER_SIZE, EVENT_MAGIC,
    EVENT_VERSION, LOG_HEADER_SIZE, LOG_IN_USE_FLAG, LOG_MAGIC, LOG_VERSION,
};
pub use writer::LogWriter;
