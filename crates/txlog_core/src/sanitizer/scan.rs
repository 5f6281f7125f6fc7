//! Single-file log scan.
//!
//! Drives an event reader end-to-end, feeding every event into the
//! boundary tracker and advancing the last confirmed safe position each
//! time an event ends a well-formed region.

use crate::config::Config;
use crate::dir::LogDir;
use crate::event::{
    EventBody, EventKind, EventOrigin, EventReader, LogEvent, StreamStatus, LOG_HEADER_SIZE,
};
use crate::sanitizer::tracker::BoundaryTracker;
use tracing::{info, warn};

/// Which kind of log is being recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// A primary log: every file begins at a clean boundary, so
    /// validation starts immediately.
    Primary,
    /// A relay log: a file may begin mid-transaction, so validation
    /// waits for a reliable boundary marker.
    Relay,
}

/// Scans log files for the last safe truncation point.
///
/// One sanitizer instance covers one recovery attempt. Within a
/// multi-file scan the per-file fields are re-initialized for each file,
/// while the tracker's XID tables persist across files.
///
/// # Guarantees
///
/// - `valid_pos()` never points inside a transaction: it is the offset
///   just after a fully-confirmed boundary event, or the scan's starting
///   offset if nothing was confirmed.
/// - `valid_pos()` only moves forward within one file scan.
/// - No destructive action is suggested once a fatal error is recorded.
#[derive(Debug)]
pub struct LogSanitizer {
    mode: ScanMode,
    max_event_size: u64,
    tracker: BoundaryTracker,
    /// Offset of the last confirmed safe boundary.
    pub(crate) valid_pos: u64,
    /// File the boundary belongs to.
    pub(crate) valid_file: Option<String>,
    /// Whether any boundary was confirmed.
    pub(crate) has_valid_pos: bool,
    /// Position on the origin server corresponding to `valid_pos`.
    pub(crate) valid_source_pos: u64,
    /// Whether `valid_source_pos` was actually derived from an event.
    pub(crate) has_valid_source_pos: bool,
    /// Origin-server file implied by the most recent source rotation.
    pub(crate) valid_source_file: Option<String>,
    /// Whether the scanned file confirmed at least one finished region.
    pub(crate) contains_finished_transaction: bool,
    /// Whether the scanned file has trailing bytes to cut.
    pub(crate) is_log_truncation_needed: bool,
    /// Set on open failure, index failure, or a fatal stream status.
    pub(crate) is_fatal_error: bool,
    /// Sanitizer-level failure description (fatal paths).
    pub(crate) failure_message: Option<String>,
    /// Size of the scanned file, for the truncation routine.
    pub(crate) last_file_size: u64,
}

impl LogSanitizer {
    /// Creates a sanitizer for one recovery attempt.
    #[must_use]
    pub fn new(mode: ScanMode, config: &Config) -> Self {
        Self {
            mode,
            max_event_size: config.max_event_size,
            tracker: BoundaryTracker::new(),
            valid_pos: LOG_HEADER_SIZE as u64,
            valid_file: None,
            has_valid_pos: false,
            valid_source_pos: LOG_HEADER_SIZE as u64,
            has_valid_source_pos: false,
            valid_source_file: None,
            contains_finished_transaction: false,
            is_log_truncation_needed: false,
            is_fatal_error: false,
            failure_message: None,
            last_file_size: 0,
        }
    }

    /// Offset of the last confirmed safe boundary in `valid_file`.
    #[must_use]
    pub fn valid_pos(&self) -> u64 {
        self.valid_pos
    }

    /// The file the confirmed boundary belongs to.
    #[must_use]
    pub fn valid_file(&self) -> Option<&str> {
        self.valid_file.as_deref()
    }

    /// Whether any boundary was confirmed.
    #[must_use]
    pub fn has_valid_pos(&self) -> bool {
        self.has_valid_pos
    }

    /// The origin-server position for the boundary, if one was derivable.
    #[must_use]
    pub fn valid_source_pos(&self) -> Option<u64> {
        self.has_valid_source_pos.then_some(self.valid_source_pos)
    }

    /// The origin-server file from the most recent source rotation, if any.
    #[must_use]
    pub fn valid_source_file(&self) -> Option<&str> {
        self.valid_source_file.as_deref()
    }

    /// Whether the last scanned file confirmed a finished transaction.
    #[must_use]
    pub fn contains_finished_transaction(&self) -> bool {
        self.contains_finished_transaction
    }

    /// Whether the scanned file needs truncating to `valid_pos`.
    #[must_use]
    pub fn is_log_truncation_needed(&self) -> bool {
        self.is_log_truncation_needed
    }

    /// Whether a boundary invariant violation was detected.
    #[must_use]
    pub fn is_log_malformed(&self) -> bool {
        self.tracker.is_malformed() || self.failure_message.is_some()
    }

    /// Whether recovery hit an error that forbids destructive action.
    #[must_use]
    pub fn is_fatal_error(&self) -> bool {
        self.is_fatal_error
    }

    /// Description of the first failure, if any.
    #[must_use]
    pub fn failure_message(&self) -> Option<&str> {
        self.failure_message
            .as_deref()
            .or_else(|| self.tracker.failure_message())
    }

    /// Size of the last scanned file.
    #[must_use]
    pub fn last_file_size(&self) -> u64 {
        self.last_file_size
    }

    /// Access to the boundary tracker (for the multi-file driver and tests).
    #[must_use]
    pub fn tracker(&self) -> &BoundaryTracker {
        &self.tracker
    }

    pub(crate) fn record_fatal(&mut self, message: String) {
        warn!(reason = %message, "fatal recovery error");
        self.is_fatal_error = true;
        if self.failure_message.is_none() {
            self.failure_message = Some(message);
        }
    }

    /// Analyzes a single log file by name: primary-log crash recovery.
    ///
    /// Open failure is fatal (the caller must not truncate anything);
    /// everything else is reported through the accessors.
    ///
    /// Returns whether the file confirmed at least one finished
    /// transaction boundary.
    pub fn analyze_file(&mut self, dir: &LogDir, filename: &str) -> bool {
        let path = dir.log_file_path(filename);
        match EventReader::open(&path, self.max_event_size) {
            Ok(mut reader) => self.scan_reader(&mut reader, filename),
            Err(e) => {
                self.record_fatal(format!("cannot open {filename} for recovery: {e}"));
                false
            }
        }
    }

    /// Scans one already-open reader end-to-end.
    ///
    /// Returns whether the file confirmed at least one finished
    /// transaction boundary.
    pub fn scan_reader(&mut self, reader: &mut EventReader, filename: &str) -> bool {
        self.begin_file(reader, filename);

        while let Some(event) = reader.read_next() {
            self.process_event(&event, reader.position());
            if self.tracker.is_malformed() {
                // Do not try to recover mid-corruption: whatever boundary
                // stands is the verdict for this file.
                break;
            }
        }

        match reader.status() {
            StreamStatus::OutOfMemory | StreamStatus::ExceedsMaxSize => {
                self.record_fatal(
                    reader
                        .error_message()
                        .unwrap_or("log stream hit a fatal limit")
                        .to_string(),
                );
            }
            _ => {}
        }

        self.last_file_size = reader.file_size();

        let stopped_early = reader.status().is_soft_stop();
        if (reader.position() != self.valid_pos || stopped_early)
            && self.contains_finished_transaction
            && !self.is_fatal_error
        {
            self.is_log_truncation_needed = true;
            info!(
                file = filename,
                valid_pos = self.valid_pos,
                file_size = self.last_file_size,
                "log has an unfinished tail and needs truncation"
            );
        }

        self.contains_finished_transaction
    }

    /// Re-initializes the per-file scan state.
    fn begin_file(&mut self, reader: &EventReader, filename: &str) {
        self.valid_pos = reader.position();
        self.valid_file = Some(filename.to_string());
        self.has_valid_pos = false;
        self.valid_source_pos = LOG_HEADER_SIZE as u64;
        self.has_valid_source_pos = false;
        self.valid_source_file = None;
        self.contains_finished_transaction = false;
        self.is_log_truncation_needed = false;

        self.tracker.reset_for_next_file();
        if self.mode == ScanMode::Primary {
            self.tracker.start_validation();
        }
    }

    /// Dispatches one event to the tracker and updates the safe position.
    fn process_event(&mut self, event: &LogEvent, end_pos: u64) {
        match &event.body {
            EventBody::Query { text, ddl_xid } => {
                self.tracker.process_query_event(text, *ddl_xid);
            }
            EventBody::Xid { xid } => {
                self.tracker.process_xid_event(*xid);
            }
            EventBody::XaPrepare { xid, one_phase } => {
                self.tracker.process_xa_prepare_event(xid, *one_phase);
            }
            EventBody::Rotate { .. } if event.origin == EventOrigin::Source => {
                // A rotation written by the source server is a reliable
                // boundary marker: validation may begin here.
                self.tracker.start_validation();
            }
            _ => {}
        }

        let kind = event.kind();
        let is_marker = matches!(kind, EventKind::Gtid | EventKind::SessionControl);

        if self.tracker.is_malformed()
            || self.tracker.in_transaction()
            || is_marker
            || !self.tracker.validation_started()
        {
            return;
        }

        // This event ends a safe region.
        self.valid_pos = end_pos;
        self.has_valid_pos = true;
        self.contains_finished_transaction = true;

        if let EventBody::Rotate {
            next_file,
            position,
        } = &event.body
        {
            if event.origin == EventOrigin::Source && !next_file.is_empty() {
                self.valid_source_file = Some(next_file.clone());
                self.valid_source_pos = (*position).max(LOG_HEADER_SIZE as u64);
                self.has_valid_source_pos = true;
            }
        } else if !matches!(kind, EventKind::Stop | EventKind::FormatDescription) {
            self.valid_source_pos = event.source_pos.max(LOG_HEADER_SIZE as u64);
            self.has_valid_source_pos = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::LogWriter;
    use txlog_storage::InMemoryBackend;

    fn sanitizer(mode: ScanMode) -> LogSanitizer {
        LogSanitizer::new(mode, &Config::default())
    }

    struct StreamBuilder {
        writer: LogWriter,
        ends: Vec<u64>,
    }

    impl StreamBuilder {
        fn new() -> Self {
            Self {
                writer: LogWriter::create(Box::new(InMemoryBackend::new()), false).unwrap(),
                ends: Vec::new(),
            }
        }

        fn push(mut self, body: EventBody, origin: EventOrigin, source_pos: u64) -> Self {
            let end = self
                .writer
                .append_event(&LogEvent::new(body, origin, source_pos))
                .unwrap();
            self.ends.push(end);
            self
        }

        fn query(self, text: &str, source_pos: u64) -> Self {
            self.push(
                EventBody::Query {
                    text: text.to_string(),
                    ddl_xid: None,
                },
                EventOrigin::Source,
                source_pos,
            )
        }

        fn xid(self, xid: u64, source_pos: u64) -> Self {
            self.push(EventBody::Xid { xid }, EventOrigin::Source, source_pos)
        }

        fn finish(self) -> (Vec<u8>, Vec<u64>) {
            let data = self.writer.into_data().unwrap();
            (data, self.ends)
        }
    }

    fn scan(sanitizer: &mut LogSanitizer, data: Vec<u8>) -> (bool, StreamStatus) {
        let mut reader =
            EventReader::from_backend(Box::new(InMemoryBackend::with_data(data)), u64::MAX)
                .unwrap();
        let found = sanitizer.scan_reader(&mut reader, "log-000001.bin");
        (found, reader.status())
    }

    #[test]
    fn clean_transaction_confirms_final_boundary() {
        let (data, ends) = StreamBuilder::new()
            .query("BEGIN", 10)
            .query("INSERT INTO t VALUES (1)", 40)
            .query("COMMIT", 60)
            .finish();

        let mut s = sanitizer(ScanMode::Primary);
        let (found, _) = scan(&mut s, data);

        assert!(found);
        assert!(!s.is_log_malformed());
        assert_eq!(s.valid_pos(), *ends.last().unwrap());
        assert_eq!(s.valid_source_pos(), Some(60));
        assert!(!s.is_log_truncation_needed());
    }

    #[test]
    fn double_begin_keeps_pre_transaction_boundary() {
        let (data, ends) = StreamBuilder::new()
            .query("CREATE DATABASE app", 20)
            .query("BEGIN", 30)
            .query("BEGIN", 40)
            .finish();

        let mut s = sanitizer(ScanMode::Primary);
        let (found, _) = scan(&mut s, data);

        // The standalone statement before the malformed nesting is the
        // last good boundary.
        assert!(found);
        assert!(s.is_log_malformed());
        assert_eq!(s.valid_pos(), ends[0]);
        assert!(s.is_log_truncation_needed());
    }

    #[test]
    fn malformed_from_first_event_confirms_nothing() {
        let (data, _) = StreamBuilder::new()
            .query("BEGIN", 10)
            .query("BEGIN", 20)
            .finish();

        let mut s = sanitizer(ScanMode::Primary);
        let (found, _) = scan(&mut s, data);

        assert!(!found);
        assert!(s.is_log_malformed());
        assert_eq!(s.valid_pos(), LOG_HEADER_SIZE as u64);
        // Nothing confirmed, so nothing to truncate to.
        assert!(!s.is_log_truncation_needed());
    }

    #[test]
    fn open_transaction_at_eof_needs_truncation() {
        let (data, ends) = StreamBuilder::new()
            .query("BEGIN", 10)
            .xid(1, 30)
            .query("BEGIN", 40)
            .query("INSERT INTO t VALUES (2)", 70)
            .finish();

        let mut s = sanitizer(ScanMode::Primary);
        let (found, status) = scan(&mut s, data);

        assert!(found);
        assert_eq!(status, StreamStatus::End);
        assert!(!s.is_log_malformed());
        assert_eq!(s.valid_pos(), ends[1]);
        assert!(s.is_log_truncation_needed());
    }

    #[test]
    fn truncated_tail_keeps_last_boundary() {
        let (mut data, ends) = StreamBuilder::new()
            .query("BEGIN", 10)
            .xid(1, 30)
            .query("BEGIN", 40)
            .finish();
        data.truncate(data.len() - 7);

        let mut s = sanitizer(ScanMode::Primary);
        let (found, status) = scan(&mut s, data);

        assert!(found);
        assert_eq!(status, StreamStatus::Truncated);
        assert_eq!(s.valid_pos(), ends[1]);
        assert!(s.is_log_truncation_needed());
        assert!(!s.is_fatal_error());
    }

    #[test]
    fn corrupted_record_is_soft_stop() {
        let (mut data, ends) = StreamBuilder::new()
            .query("BEGIN", 10)
            .xid(1, 30)
            .xid(2, 50)
            .finish();
        // Damage the last record's payload.
        let len = data.len();
        data[len - 6] ^= 0x55;

        let mut s = sanitizer(ScanMode::Primary);
        let (found, status) = scan(&mut s, data);

        assert!(found);
        assert_eq!(status, StreamStatus::Corrupted);
        // Last record damaged: hold the boundary after the first XID.
        // The second XID event would have been malformed (outside a
        // transaction) anyway, but the reader stops before decoding it.
        assert_eq!(s.valid_pos(), ends[1]);
        assert!(s.is_log_truncation_needed());
        assert!(!s.is_fatal_error());
    }

    #[test]
    fn oversized_event_is_fatal() {
        let (data, _) = StreamBuilder::new()
            .query("BEGIN", 10)
            .query("COMMIT", 20)
            .finish();

        let mut s = sanitizer(ScanMode::Primary);
        let mut reader =
            EventReader::from_backend(Box::new(InMemoryBackend::with_data(data)), 4).unwrap();
        let found = s.scan_reader(&mut reader, "log-000001.bin");

        assert!(!found);
        assert!(s.is_fatal_error());
        assert!(s.is_log_malformed());
        assert!(!s.is_log_truncation_needed());
    }

    #[test]
    fn gtid_marker_is_not_a_boundary() {
        let (data, ends) = StreamBuilder::new()
            .query("BEGIN", 10)
            .xid(1, 30)
            .push(EventBody::Gtid { sequence: 9 }, EventOrigin::Source, 50)
            .finish();

        let mut s = sanitizer(ScanMode::Primary);
        let (found, _) = scan(&mut s, data);

        assert!(found);
        // The GTID marker after the XID does not advance the boundary.
        assert_eq!(s.valid_pos(), ends[1]);
        assert!(s.is_log_truncation_needed());
    }

    #[test]
    fn monotonic_valid_pos_across_transactions() {
        let (data, ends) = StreamBuilder::new()
            .query("BEGIN", 10)
            .xid(1, 30)
            .query("BEGIN", 40)
            .xid(2, 60)
            .finish();

        let mut s = sanitizer(ScanMode::Primary);
        let (found, _) = scan(&mut s, data);

        assert!(found);
        assert_eq!(s.valid_pos(), *ends.last().unwrap());
        assert_eq!(s.valid_source_pos(), Some(60));
    }

    #[test]
    fn stop_event_is_boundary_without_source_pos() {
        let (data, ends) = StreamBuilder::new()
            .query("BEGIN", 10)
            .xid(1, 30)
            .push(EventBody::Stop, EventOrigin::Source, 99)
            .finish();

        let mut s = sanitizer(ScanMode::Primary);
        let (found, _) = scan(&mut s, data);

        assert!(found);
        assert_eq!(s.valid_pos(), *ends.last().unwrap());
        // The STOP event's own log position is not a usable source
        // coordinate; the XID's position stands.
        assert_eq!(s.valid_source_pos(), Some(30));
    }

    #[test]
    fn relay_scan_waits_for_reliable_marker() {
        // Tail of a transaction the previous file started, then a source
        // rotation, then a clean transaction.
        let (data, ends) = StreamBuilder::new()
            .query("INSERT INTO t VALUES (0)", 20)
            .xid(7, 25)
            .push(
                EventBody::Rotate {
                    next_file: "source-bin.000004".to_string(),
                    position: 4,
                },
                EventOrigin::Source,
                0,
            )
            .query("BEGIN", 40)
            .xid(8, 60)
            .finish();

        let mut s = sanitizer(ScanMode::Relay);
        let (found, _) = scan(&mut s, data);

        assert!(found);
        assert!(!s.is_log_malformed());
        assert_eq!(s.valid_pos(), *ends.last().unwrap());
        // The rotation supplied the source file; the final XID updated
        // the source position.
        assert_eq!(s.valid_source_file(), Some("source-bin.000004"));
        assert_eq!(s.valid_source_pos(), Some(60));
    }

    #[test]
    fn relay_scan_without_marker_confirms_nothing() {
        let (data, _) = StreamBuilder::new()
            .query("INSERT INTO t VALUES (0)", 20)
            .xid(7, 25)
            .finish();

        let mut s = sanitizer(ScanMode::Relay);
        let (found, _) = scan(&mut s, data);

        assert!(!found);
        assert!(!s.is_log_malformed());
        assert_eq!(s.valid_pos(), LOG_HEADER_SIZE as u64);
        assert!(!s.is_log_truncation_needed());
    }

    #[test]
    fn source_rotation_position_is_clamped_to_header() {
        let (data, _) = StreamBuilder::new()
            .push(
                EventBody::Rotate {
                    next_file: "source-bin.000002".to_string(),
                    position: 0,
                },
                EventOrigin::Source,
                0,
            )
            .finish();

        let mut s = sanitizer(ScanMode::Relay);
        let (found, _) = scan(&mut s, data);

        assert!(found);
        assert_eq!(s.valid_source_pos(), Some(LOG_HEADER_SIZE as u64));
    }

    #[test]
    fn local_rotation_does_not_start_relay_validation() {
        let (data, _) = StreamBuilder::new()
            .push(
                EventBody::Rotate {
                    next_file: "log-000002.bin".to_string(),
                    position: 8,
                },
                EventOrigin::Local,
                0,
            )
            .finish();

        let mut s = sanitizer(ScanMode::Relay);
        let (found, _) = scan(&mut s, data);

        assert!(!found);
        assert!(!s.tracker().validation_started());
    }

    #[test]
    fn truncation_roundtrip_is_stable() {
        // Truncate to valid_pos, re-scan, expect the same verdict with no
        // further truncation needed.
        let (data, ends) = StreamBuilder::new()
            .query("BEGIN", 10)
            .xid(1, 30)
            .query("BEGIN", 40)
            .finish();

        let mut s = sanitizer(ScanMode::Primary);
        let (_, _) = scan(&mut s, data.clone());
        assert!(s.is_log_truncation_needed());
        let cut = s.valid_pos();
        assert_eq!(cut, ends[1]);

        let mut truncated = data;
        truncated.truncate(cut as usize);

        let mut s2 = sanitizer(ScanMode::Primary);
        let (found, status) = scan(&mut s2, truncated);

        assert!(found);
        assert_eq!(status, StreamStatus::End);
        assert_eq!(s2.valid_pos(), cut);
        assert!(!s2.is_log_truncation_needed());
    }
}
