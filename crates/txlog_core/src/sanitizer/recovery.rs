//! Multi-file recovery driver and truncation applier.
//!
//! Relay-style logs span many files. The driver scans them newest to
//! oldest until one yields a confirmed boundary, then deletes every file
//! newer than the chosen one - those files hold nothing but the unfinished
//! tail the boundary supersedes. If no file yields a boundary, everything
//! is retained: relay data is never deleted on a guess.

use crate::config::Config;
use crate::dir::LogDir;
use crate::error::{CoreError, CoreResult};
use crate::event::LOG_HEADER_SIZE;
use crate::sanitizer::scan::{LogSanitizer, ScanMode};
use tracing::{info, warn};

impl LogSanitizer {
    /// Analyzes a whole log set: relay-log crash recovery.
    ///
    /// Scans the indexed files newest to oldest until one contains a
    /// confirmed transaction boundary, then trims the index to end at
    /// that file and deletes the newer files (newest first, each deletion
    /// logged). A file that cannot be opened counts as "no boundary here"
    /// but also records a fatal error, which gates all deletions and the
    /// later truncation.
    ///
    /// Returns whether any file confirmed a finished transaction.
    pub fn analyze_logs(&mut self, dir: &LogDir) -> bool {
        let mut index = match dir.load_index() {
            Ok(index) => index,
            Err(e) => {
                self.record_fatal(format!("cannot read log index: {e}"));
                return false;
            }
        };

        let files = index.file_names().to_vec();
        if files.is_empty() {
            return false;
        }

        let mut found_at = None;
        for i in (0..files.len()).rev() {
            if self.analyze_file(dir, &files[i]) {
                found_at = Some(i);
                break;
            }
        }

        let Some(chosen) = found_at else {
            info!("no finished transaction in any log file; retaining all files");
            return false;
        };

        if self.has_valid_pos && chosen + 1 < files.len() && !self.is_fatal_error {
            self.drop_files_newer_than(dir, &mut index, &files, chosen);
        }

        self.contains_finished_transaction
    }

    /// Shrinks the index to `[oldest, chosen]` and deletes the removed
    /// (newer) files, newest first.
    ///
    /// The index is persisted before any file is unlinked, so a crash
    /// here leaves unreferenced files rather than index entries pointing
    /// at nothing.
    fn drop_files_newer_than(
        &mut self,
        dir: &LogDir,
        index: &mut crate::index::LogIndex,
        files: &[String],
        chosen: usize,
    ) {
        let removed = match index.remove_outside_range(&files[0], &files[chosen]) {
            Ok(removed) => removed,
            Err(e) => {
                self.record_fatal(format!("cannot trim log index: {e}"));
                return;
            }
        };

        if let Err(e) = dir.save_index(index) {
            self.record_fatal(format!("cannot update log index: {e}"));
            return;
        }

        for name in removed.iter().rev() {
            match dir.delete_log_file(name) {
                Ok(()) => {
                    info!(file = %name, "deleted log file superseded by recovery");
                }
                Err(e) => {
                    self.record_fatal(format!("cannot delete {name}: {e}"));
                    return;
                }
            }
        }
    }

    /// Applies the scan verdict: truncates the chosen file to the last
    /// confirmed boundary.
    ///
    /// Does nothing (and reports it) when a fatal error was recorded.
    /// `active_file` names the current write target, if any - the in-use
    /// header flag is only cleared when the truncated file is not it.
    ///
    /// Returns `Ok(true)` when the log is in a good state afterwards
    /// (truncated, or nothing to do) and `Ok(false)` when sanitization
    /// was skipped because of a fatal error.
    ///
    /// # Errors
    ///
    /// Returns an error if the truncation itself fails.
    pub fn sanitize(&mut self, dir: &LogDir, active_file: Option<&str>) -> CoreResult<bool> {
        if self.is_fatal_error {
            warn!(
                reason = self.failure_message().unwrap_or("unknown"),
                "log sanitization skipped"
            );
            return Ok(false);
        }

        if !self.is_log_truncation_needed {
            return Ok(true);
        }

        let Some(file) = self.valid_file.clone() else {
            return Err(CoreError::invalid_operation(
                "truncation requested but no file was scanned",
            ));
        };

        let clear_in_use = active_file != Some(file.as_str());
        dir.truncate_log_file(&file, self.valid_pos, self.last_file_size, clear_in_use)?;
        info!(
            file = %file,
            valid_pos = self.valid_pos,
            dropped = self.last_file_size - self.valid_pos,
            "truncated log to last finished transaction"
        );

        self.is_log_truncation_needed = false;
        self.last_file_size = self.valid_pos;
        Ok(true)
    }
}

/// Relay-log recovery: the multi-file scan plus source-position
/// bookkeeping.
///
/// After sanitization the relay client must know where to resume on the
/// source server. The rules, in order of preference:
/// 1. a source rotation captured during the scan names both file and
///    position;
/// 2. a boundary event's own log position updates the position under the
///    previously known source file;
/// 3. otherwise the durable coordinates the caller supplied stand.
///
/// The position never falls below the log header size.
#[derive(Debug)]
pub struct RelayRecovery {
    sanitizer: LogSanitizer,
    source_file: Option<String>,
    source_pos: u64,
}

impl RelayRecovery {
    /// Creates a relay recovery run.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            sanitizer: LogSanitizer::new(ScanMode::Relay, config),
            source_file: None,
            source_pos: LOG_HEADER_SIZE as u64,
        }
    }

    /// Seeds the durable source coordinates recovery falls back to.
    #[must_use]
    pub fn with_source_position(mut self, file: Option<String>, pos: u64) -> Self {
        self.source_file = file;
        self.source_pos = pos.max(LOG_HEADER_SIZE as u64);
        self
    }

    /// Runs the multi-file scan and applies the truncation verdict.
    ///
    /// # Errors
    ///
    /// Returns an error if applying the truncation fails.
    pub fn recover(&mut self, dir: &LogDir, active_file: Option<&str>) -> CoreResult<bool> {
        self.sanitizer.analyze_logs(dir);
        let ok = self.sanitizer.sanitize(dir, active_file)?;
        if ok {
            self.apply_source_position();
        }
        Ok(ok)
    }

    /// Access to the underlying sanitizer's verdict.
    #[must_use]
    pub fn sanitizer(&self) -> &LogSanitizer {
        &self.sanitizer
    }

    /// Source file to resume from, if known.
    #[must_use]
    pub fn source_file(&self) -> Option<&str> {
        self.source_file.as_deref()
    }

    /// Source position to resume from.
    #[must_use]
    pub fn source_pos(&self) -> u64 {
        self.source_pos
    }

    fn apply_source_position(&mut self) {
        let floor = LOG_HEADER_SIZE as u64;

        if let Some(file) = self.sanitizer.valid_source_file() {
            self.source_file = Some(file.to_string());
            self.source_pos = self.sanitizer.valid_source_pos().unwrap_or(floor).max(floor);
        } else if let Some(pos) = self.sanitizer.valid_source_pos() {
            self.source_pos = pos.max(floor);
        } else {
            self.source_pos = self.source_pos.max(floor);
        }
    }
}
