//! Log file writer.
//!
//! Used by the server side to produce log files, and by recovery tests to
//! build log images with known byte offsets.

use crate::error::{CoreError, CoreResult};
use crate::event::record::{
    compute_crc32, decode_log_header, encode_log_header, LogEvent, EVENT_HEADER_SIZE,
    EVENT_MAGIC, EVENT_VERSION, LOG_HEADER_SIZE, LOG_IN_USE_FLAG,
};
use parking_lot::Mutex;
use txlog_codec::append_uint_be;
use txlog_storage::StorageBackend;
use std::sync::Arc;

/// CRC size.
const CRC_SIZE: usize = 4;

/// Appends event records to a log file.
///
/// A freshly created log file carries the in-use header flag; a clean
/// close clears it with [`LogWriter::mark_closed`]. A file that still
/// carries the flag on startup was not closed cleanly and is a candidate
/// for sanitization.
pub struct LogWriter {
    /// Storage backend for log data.
    backend: Arc<Mutex<Box<dyn StorageBackend>>>,
    /// Whether to sync after each write.
    sync_on_write: bool,
}

impl LogWriter {
    /// Creates a writer over a backend.
    ///
    /// An empty backend gets a fresh file header with the in-use flag
    /// set; a non-empty backend must already start with a valid header.
    ///
    /// # Errors
    ///
    /// Returns an error if the existing header is invalid or I/O fails.
    pub fn create(mut backend: Box<dyn StorageBackend>, sync_on_write: bool) -> CoreResult<Self> {
        if backend.size()? == 0 {
            backend.append(&encode_log_header(LOG_IN_USE_FLAG))?;
            if sync_on_write {
                backend.sync()?;
            }
        } else {
            let header = backend.read_at(0, LOG_HEADER_SIZE)?;
            decode_log_header(&header)?;
        }

        Ok(Self {
            backend: Arc::new(Mutex::new(backend)),
            sync_on_write,
        })
    }

    /// Appends an event record.
    ///
    /// Returns the offset just after the record - the event's log
    /// position, as recovery understands it.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be encoded or I/O fails.
    pub fn append_event(&self, event: &LogEvent) -> CoreResult<u64> {
        let payload = event.encode_payload()?;

        let mut data = Vec::with_capacity(EVENT_HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&EVENT_MAGIC);
        append_uint_be(&mut data, u64::from(EVENT_VERSION), 2)?;
        data.push(event.kind().as_byte());
        data.push(event.flags());
        append_uint_be(&mut data, event.source_pos, 8)?;

        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::invalid_operation("event payload too large"))?;
        append_uint_be(&mut data, u64::from(len), 4)?;
        data.extend_from_slice(&payload);

        // CRC32 over everything before it.
        let crc = compute_crc32(&data);
        append_uint_be(&mut data, u64::from(crc), 4)?;

        let mut backend = self.backend.lock();
        let start = backend.append(&data)?;

        if self.sync_on_write {
            backend.flush()?;
        }

        Ok(start + data.len() as u64)
    }

    /// Flushes all pending writes to durable storage.
    pub fn flush(&self) -> CoreResult<()> {
        self.backend.lock().flush()?;
        Ok(())
    }

    /// Syncs data and metadata to durable storage.
    pub fn sync(&self) -> CoreResult<()> {
        self.backend.lock().sync()?;
        Ok(())
    }

    /// Returns the current log size.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Clears the in-use header flag, marking the file cleanly closed.
    pub fn mark_closed(&self) -> CoreResult<()> {
        let mut backend = self.backend.lock();
        let header = backend.read_at(0, LOG_HEADER_SIZE)?;
        let flags = decode_log_header(&header)? & !LOG_IN_USE_FLAG;
        backend.write_at(6, &flags.to_be_bytes())?;
        backend.sync()?;
        Ok(())
    }

    /// Consumes the writer and returns the full log image.
    ///
    /// Intended for tests that build a log in memory and hand the bytes
    /// to a reader or a damage harness.
    pub fn into_data(self) -> CoreResult<Vec<u8>> {
        let backend = self.backend.lock();
        let size = backend.size()?;
        Ok(backend.read_at(0, size as usize)?)
    }
}

impl std::fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWriter")
            .field("sync_on_write", &self.sync_on_write)
            .finish_non_exhaustive()
    }
}
