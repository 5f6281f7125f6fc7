//! Log directory fixtures and event-stream builders.
//!
//! Provides convenience helpers for setting up test log directories and
//! building log files with known per-event byte offsets, which is what
//! most sanitizer assertions are written against.

use tempfile::TempDir;
use txlog_core::event::{EventBody, EventOrigin, LogEvent, LogWriter};
use txlog_core::{LogDir, LogIndex, XaTransactionId};
use txlog_storage::FileBackend;

/// A temporary log directory with automatic cleanup.
pub struct TestLogDir {
    /// The opened, locked log directory.
    pub dir: LogDir,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TestLogDir {
    /// Creates a fresh locked log directory under a temp dir.
    #[must_use]
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let dir = LogDir::open(temp_dir.path(), true).expect("failed to open log directory");
        Self {
            dir,
            _temp_dir: temp_dir,
        }
    }

    /// Starts building a log file with the given name.
    ///
    /// The file is created immediately; call [`LogBuilder::finish`] to
    /// sync it and collect the per-event end offsets.
    #[must_use]
    pub fn build_log(&self, name: &str) -> LogBuilder {
        let backend = FileBackend::open(&self.dir.log_file_path(name))
            .expect("failed to create log file");
        let writer =
            LogWriter::create(Box::new(backend), false).expect("failed to initialize log file");
        LogBuilder {
            writer,
            ends: Vec::new(),
        }
    }

    /// Writes an index listing the given files, oldest first.
    pub fn save_index(&self, names: &[&str]) {
        let mut index = LogIndex::new();
        for name in names {
            index.add(*name);
        }
        self.dir.save_index(&index).expect("failed to save index");
    }
}

impl Default for TestLogDir {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestLogDir {
    type Target = LogDir;

    fn deref(&self) -> &Self::Target {
        &self.dir
    }
}

/// Builds one log file event by event, recording each event's end offset.
///
/// Events default to source origin, since recovery scenarios are mostly
/// relay-shaped; use [`LogBuilder::local_event`] for locally-written
/// events.
pub struct LogBuilder {
    writer: LogWriter,
    ends: Vec<u64>,
}

impl LogBuilder {
    /// Appends an arbitrary event.
    #[must_use]
    pub fn event(mut self, event: LogEvent) -> Self {
        let end = self
            .writer
            .append_event(&event)
            .expect("failed to append event");
        self.ends.push(end);
        self
    }

    /// Appends a source-origin event with the given body and log position.
    #[must_use]
    pub fn source_event(self, body: EventBody, source_pos: u64) -> Self {
        self.event(LogEvent::new(body, EventOrigin::Source, source_pos))
    }

    /// Appends a locally-written event.
    #[must_use]
    pub fn local_event(self, body: EventBody, source_pos: u64) -> Self {
        self.event(LogEvent::new(body, EventOrigin::Local, source_pos))
    }

    /// Appends a `BEGIN` statement.
    #[must_use]
    pub fn begin(self) -> Self {
        self.query("BEGIN", 0)
    }

    /// Appends a query statement.
    #[must_use]
    pub fn query(self, text: &str, source_pos: u64) -> Self {
        self.source_event(
            EventBody::Query {
                text: text.to_string(),
                ddl_xid: None,
            },
            source_pos,
        )
    }

    /// Appends an atomic DDL statement carrying its own XID.
    #[must_use]
    pub fn ddl(self, text: &str, xid: u64, source_pos: u64) -> Self {
        self.source_event(
            EventBody::Query {
                text: text.to_string(),
                ddl_xid: Some(xid),
            },
            source_pos,
        )
    }

    /// Appends an internal commit (XID) event.
    #[must_use]
    pub fn xid(self, xid: u64, source_pos: u64) -> Self {
        self.source_event(EventBody::Xid { xid }, source_pos)
    }

    /// Appends an XA prepare event.
    #[must_use]
    pub fn xa_prepare(self, xid: XaTransactionId, one_phase: bool, source_pos: u64) -> Self {
        self.source_event(EventBody::XaPrepare { xid, one_phase }, source_pos)
    }

    /// Appends a source-side rotation to the named file.
    #[must_use]
    pub fn rotate_from_source(self, next_file: &str, position: u64) -> Self {
        self.source_event(
            EventBody::Rotate {
                next_file: next_file.to_string(),
                position,
            },
            0,
        )
    }

    /// Appends a GTID marker.
    #[must_use]
    pub fn gtid(self, sequence: u64, source_pos: u64) -> Self {
        self.source_event(EventBody::Gtid { sequence }, source_pos)
    }

    /// End offsets of the events appended so far.
    #[must_use]
    pub fn end_offsets(&self) -> &[u64] {
        &self.ends
    }

    /// Syncs the file and returns the per-event end offsets.
    pub fn finish(self) -> Vec<u64> {
        self.writer.sync().expect("failed to sync log file");
        self.ends
    }

    /// Like [`Self::finish`], but clears the in-use header flag first,
    /// simulating a cleanly closed file.
    pub fn finish_closed(self) -> Vec<u64> {
        self.writer.mark_closed().expect("failed to close log file");
        self.ends
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txlog_core::event::{EventReader, StreamStatus};

    #[test]
    fn builder_produces_readable_log() {
        let fixture = TestLogDir::new();
        let ends = fixture
            .build_log("log-000001.bin")
            .begin()
            .query("INSERT INTO t VALUES (1)", 40)
            .xid(1, 60)
            .finish();

        let mut reader = EventReader::open(
            &fixture.log_file_path("log-000001.bin"),
            64 * 1024 * 1024,
        )
        .unwrap();

        for end in &ends {
            assert!(reader.read_next().is_some());
            assert_eq!(reader.position(), *end);
        }
        assert!(reader.read_next().is_none());
        assert_eq!(reader.status(), StreamStatus::End);
    }

    #[test]
    fn finish_closed_clears_in_use() {
        let fixture = TestLogDir::new();
        fixture
            .build_log("log-000001.bin")
            .begin()
            .xid(1, 20)
            .finish_closed();

        let reader = EventReader::open(
            &fixture.log_file_path("log-000001.bin"),
            64 * 1024 * 1024,
        )
        .unwrap();
        assert!(!reader.is_marked_in_use());
    }

    #[test]
    fn save_index_round_trips() {
        let fixture = TestLogDir::new();
        fixture.save_index(&["log-000001.bin", "log-000002.bin"]);

        let index = fixture.load_index().unwrap();
        assert_eq!(index.file_names(), &["log-000001.bin", "log-000002.bin"]);
    }
}
