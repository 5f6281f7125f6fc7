//! Streaming event reader.
//!
//! Reads event records one-by-one from a storage backend, keeping memory
//! usage constant regardless of log size. This is essential for scanning
//! large logs during recovery without risking out-of-memory conditions.

use crate::error::{CoreError, CoreResult};
use crate::event::record::{
    compute_crc32, decode_log_header, EventKind, EventOrigin, LogEvent, EVENT_FLAG_FROM_SOURCE,
    EVENT_HEADER_SIZE, EVENT_MAGIC, EVENT_VERSION, LOG_HEADER_SIZE, LOG_IN_USE_FLAG,
};
use txlog_codec::read_uint_be;
use txlog_storage::{FileBackend, StorageBackend};
use std::path::Path;

/// CRC size.
const CRC_SIZE: usize = 4;

/// Read buffer size for streaming iteration.
/// We read in chunks to minimize I/O syscalls while keeping memory bounded.
const READ_BUFFER_SIZE: usize = 64 * 1024; // 64 KB

/// Stream-level status of an [`EventReader`].
///
/// The scan treats `Truncated` and `Corrupted` as soft stops (the log
/// simply ends there as far as recovery is concerned), while
/// `OutOfMemory` and `ExceedsMaxSize` are fatal: no destructive action
/// may be taken on the strength of such a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// The reader has not yet hit the end of the stream.
    Active,
    /// Clean end of the readable stream.
    End,
    /// An incomplete record at the tail (crash mid-write).
    Truncated,
    /// Structural damage at the read point (bad magic, CRC, payload).
    Corrupted,
    /// A payload could not be materialized in memory.
    OutOfMemory,
    /// A record claimed a payload above the configured maximum.
    ExceedsMaxSize,
}

impl StreamStatus {
    /// Whether this status must gate destructive recovery actions.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::OutOfMemory | Self::ExceedsMaxSize)
    }

    /// Whether the stream stopped early for a non-fatal reason.
    #[must_use]
    pub const fn is_soft_stop(self) -> bool {
        matches!(self, Self::Truncated | Self::Corrupted)
    }
}

/// A streaming reader over the event records of one log file.
///
/// # Design
///
/// - Uses a fixed-size read buffer to minimize I/O operations
/// - Parses records incrementally from the buffer
/// - Refills the buffer only when needed
/// - `position()` is always the offset just after the last fully decoded
///   event, never inside a record
///
/// Dropping the reader closes the underlying backend.
pub struct EventReader {
    /// Storage backend being read.
    backend: Box<dyn StorageBackend>,
    /// Total size of the log file.
    total_size: u64,
    /// Offset just after the last fully decoded event.
    position: u64,
    /// Read buffer for reducing I/O syscalls.
    buffer: Vec<u8>,
    /// Current position within the buffer.
    buffer_pos: usize,
    /// Number of valid bytes in the buffer.
    buffer_len: usize,
    /// Stream status, updated when reading stops.
    status: StreamStatus,
    /// Human-readable description of why reading stopped, if abnormal.
    error_message: Option<String>,
    /// Maximum accepted payload size.
    max_event_size: u64,
    /// Flag bits from the log file header.
    header_flags: u16,
    /// Whether reading has stopped.
    finished: bool,
}

impl EventReader {
    /// Opens a reader over an existing log file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its header is
    /// missing or invalid.
    pub fn open(path: &Path, max_event_size: u64) -> CoreResult<Self> {
        let backend = FileBackend::open_existing(path)?;
        Self::from_backend(Box::new(backend), max_event_size)
    }

    /// Creates a reader over an already-open storage backend.
    ///
    /// The backend must contain a complete log file image, header included.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is missing or invalid.
    pub fn from_backend(
        backend: Box<dyn StorageBackend>,
        max_event_size: u64,
    ) -> CoreResult<Self> {
        let total_size = backend.size()?;
        if total_size < LOG_HEADER_SIZE as u64 {
            return Err(CoreError::invalid_format(
                "log file shorter than its header",
            ));
        }

        let header = backend.read_at(0, LOG_HEADER_SIZE)?;
        let header_flags = decode_log_header(&header)?;

        Ok(Self {
            backend,
            total_size,
            position: LOG_HEADER_SIZE as u64,
            buffer: vec![0u8; READ_BUFFER_SIZE],
            buffer_pos: 0,
            buffer_len: 0,
            status: StreamStatus::Active,
            error_message: None,
            max_event_size,
            header_flags,
            finished: false,
        })
    }

    /// Returns the offset just after the last fully decoded event.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns the total size of the log file being read.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.total_size
    }

    /// Returns the current stream status.
    #[must_use]
    pub fn status(&self) -> StreamStatus {
        self.status
    }

    /// Returns a description of why the stream stopped, if abnormal.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Whether the file header carries the in-use marker.
    #[must_use]
    pub fn is_marked_in_use(&self) -> bool {
        self.header_flags & LOG_IN_USE_FLAG != 0
    }

    /// Reads the next event, or `None` when the stream has stopped.
    ///
    /// All stop reasons - clean end, truncated tail, corruption, fatal
    /// size or allocation limits - are reported through [`Self::status`]
    /// rather than as errors, so the scan can decide how much to trust
    /// what it has read so far.
    pub fn read_next(&mut self) -> Option<LogEvent> {
        if self.finished {
            return None;
        }

        match self.try_read_next() {
            Ok(event) => event,
            Err(stop) => {
                self.finished = true;
                self.status = stop.status;
                self.error_message = stop.message;
                None
            }
        }
    }

    fn try_read_next(&mut self) -> Result<Option<LogEvent>, ReadStop> {
        let record_start = self.position;
        let remaining = self.total_size - record_start;

        if remaining == 0 {
            return Err(ReadStop::clean_end());
        }
        if remaining < EVENT_HEADER_SIZE as u64 {
            return Err(ReadStop::truncated(format!(
                "incomplete event header at offset {record_start}"
            )));
        }

        self.ensure_buffered(EVENT_HEADER_SIZE)?;
        let header = &self.buffer[self.buffer_pos..self.buffer_pos + EVENT_HEADER_SIZE];

        if header[0..4] != EVENT_MAGIC {
            return Err(ReadStop::corrupted(format!(
                "invalid event magic at offset {record_start}"
            )));
        }

        let version = u16::from_be_bytes([header[4], header[5]]);
        if version > EVENT_VERSION {
            return Err(ReadStop::corrupted(format!(
                "unsupported event version {version} at offset {record_start}"
            )));
        }

        let kind = EventKind::from_byte(header[6]).ok_or_else(|| {
            ReadStop::corrupted(format!(
                "unknown event kind {} at offset {record_start}",
                header[6]
            ))
        })?;

        let origin = if header[7] & EVENT_FLAG_FROM_SOURCE != 0 {
            EventOrigin::Source
        } else {
            EventOrigin::Local
        };

        // Header layout is validated above; these reads cannot fail.
        let source_pos = read_uint_be(&header[8..16], 8).unwrap_or(0);
        let payload_len = read_uint_be(&header[16..20], 4).unwrap_or(0);

        if payload_len > self.max_event_size {
            return Err(ReadStop {
                status: StreamStatus::ExceedsMaxSize,
                message: Some(format!(
                    "event at offset {record_start} claims {payload_len} byte payload, \
                     maximum is {}",
                    self.max_event_size
                )),
            });
        }

        let payload_len = payload_len as usize;
        let total_len = EVENT_HEADER_SIZE + payload_len + CRC_SIZE;
        if remaining < total_len as u64 {
            return Err(ReadStop::truncated(format!(
                "incomplete event payload at offset {record_start}"
            )));
        }

        self.ensure_buffered(total_len)?;

        let payload_start = self.buffer_pos + EVENT_HEADER_SIZE;
        let payload_end = payload_start + payload_len;
        let crc_start = payload_end;

        let stored_crc = read_uint_be(&self.buffer[crc_start..crc_start + CRC_SIZE], 4)
            .unwrap_or(0) as u32;
        let computed_crc = compute_crc32(&self.buffer[self.buffer_pos..payload_end]);
        if stored_crc != computed_crc {
            return Err(ReadStop::corrupted(format!(
                "checksum mismatch at offset {record_start}: \
                 expected {stored_crc:08x}, got {computed_crc:08x}"
            )));
        }

        let payload = &self.buffer[payload_start..payload_end];
        let event = LogEvent::decode_payload(kind, payload, origin, source_pos)
            .map_err(|e| ReadStop::corrupted(format!("bad {kind:?} payload: {e}")))?;

        self.buffer_pos += total_len;
        self.position += total_len as u64;

        Ok(Some(event))
    }

    /// Ensures at least `min_bytes` are available in the buffer from the
    /// current position.
    ///
    /// The caller has already verified the file holds `min_bytes` beyond
    /// `position`, so a short read here is an I/O-level problem, not a
    /// truncated log.
    fn ensure_buffered(&mut self, min_bytes: usize) -> Result<(), ReadStop> {
        let available = self.buffer_len - self.buffer_pos;
        if available >= min_bytes {
            return Ok(());
        }

        // Move any remaining data to the start of the buffer.
        if self.buffer_pos > 0 && available > 0 {
            self.buffer.copy_within(self.buffer_pos..self.buffer_len, 0);
        }
        self.buffer_len = available;
        self.buffer_pos = 0;

        // If the record is larger than the buffer, grow it.
        if min_bytes > self.buffer.len() {
            let new_size = min_bytes.next_power_of_two();
            if self
                .buffer
                .try_reserve_exact(new_size - self.buffer.len())
                .is_err()
            {
                return Err(ReadStop {
                    status: StreamStatus::OutOfMemory,
                    message: Some(format!(
                        "could not allocate {new_size} byte buffer for event at offset {}",
                        self.position
                    )),
                });
            }
            self.buffer.resize(new_size, 0);
        }

        let remaining_in_file =
            (self.total_size - self.position) as usize - available;
        let bytes_to_read = std::cmp::min(self.buffer.len() - self.buffer_len, remaining_in_file);

        if bytes_to_read > 0 {
            let read_offset = self.position + self.buffer_len as u64;
            let data = self
                .backend
                .read_at(read_offset, bytes_to_read)
                .map_err(|e| {
                    ReadStop::corrupted(format!("read failed at offset {read_offset}: {e}"))
                })?;
            self.buffer[self.buffer_len..self.buffer_len + data.len()].copy_from_slice(&data);
            self.buffer_len += data.len();
        }

        if self.buffer_len - self.buffer_pos < min_bytes {
            return Err(ReadStop::truncated(format!(
                "log ended inside an event record at offset {}",
                self.position
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for EventReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReader")
            .field("position", &self.position)
            .field("total_size", &self.total_size)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Why reading stopped.
struct ReadStop {
    status: StreamStatus,
    message: Option<String>,
}

impl ReadStop {
    fn clean_end() -> Self {
        Self {
            status: StreamStatus::End,
            message: None,
        }
    }

    fn truncated(message: String) -> Self {
        Self {
            status: StreamStatus::Truncated,
            message: Some(message),
        }
    }

    fn corrupted(message: String) -> Self {
        Self {
            status: StreamStatus::Corrupted,
            message: Some(message),
        }
    }
}
