//! Transaction boundary tracking.
//!
//! The tracker consumes one event at a time and decides whether the log is
//! well-formed with respect to transaction nesting. It records the XIDs of
//! completed internally-coordinated transactions and the state of
//! externally-coordinated (XA) transactions, so duplicates and impossible
//! state transitions surface as malformation.
//!
//! Malformation is recorded, never thrown: the scan that drives the
//! tracker stops at the last good position and reports from there.

use crate::types::XaTransactionId;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Last observed state of an XA transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XaState {
    /// Prepared in the storage engine, awaiting commit or rollback.
    Prepared,
    /// Committed by an `XA COMMIT` statement.
    Committed,
    /// Rolled back by an `XA ROLLBACK` statement.
    RolledBack,
    /// Committed in one phase at prepare time.
    CommittedOnePhase,
}

/// The transaction boundary state machine.
///
/// Two states: outside a transaction (initial, safe to truncate at) and
/// inside one. Every rule violation sets the malformed flag with a
/// human-readable reason and leaves the state machine in the position the
/// transition table prescribes.
///
/// In relay mode, validation does not start until the first
/// boundary-relevant statement (`BEGIN`, `XA START`, or an atomic DDL) is
/// seen - a relay log may legitimately begin mid-transaction, and the
/// leading tail of such a transaction is ignored rather than flagged.
#[derive(Debug, Default)]
pub struct BoundaryTracker {
    /// True strictly between a transaction start and its matching end.
    in_transaction: bool,
    /// Whether boundary validation has begun for the current file.
    validation_started: bool,
    /// Set once any invariant violation is detected; never cleared within
    /// one file scan.
    is_malformed: bool,
    /// Reason for the first violation.
    failure_message: Option<String>,
    /// XIDs of completed internally-coordinated transactions.
    internal_xids: HashSet<u64>,
    /// Last observed state per XA transaction.
    external_xids: HashMap<XaTransactionId, XaState>,
}

impl BoundaryTracker {
    /// Creates a tracker with validation not yet started.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the stream is currently inside an open transaction.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Whether boundary validation has begun.
    #[must_use]
    pub fn validation_started(&self) -> bool {
        self.validation_started
    }

    /// Whether an invariant violation has been detected.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        self.is_malformed
    }

    /// Reason for the first violation, if any.
    #[must_use]
    pub fn failure_message(&self) -> Option<&str> {
        self.failure_message.as_deref()
    }

    /// Last observed state of an XA transaction.
    #[must_use]
    pub fn external_xid_state(&self, xid: &XaTransactionId) -> Option<XaState> {
        self.external_xids.get(xid).copied()
    }

    /// Whether an internal XID has been recorded as completed.
    #[must_use]
    pub fn has_internal_xid(&self, xid: u64) -> bool {
        self.internal_xids.contains(&xid)
    }

    /// Begins boundary validation.
    ///
    /// Called by the scan when a reliable boundary marker is observed (a
    /// source-side rotation), and internally when a transaction start or
    /// atomic DDL is seen. Primary-log scans call this up front, since
    /// every primary log begins at a clean boundary.
    pub fn start_validation(&mut self) {
        self.validation_started = true;
    }

    /// Re-initializes the per-file state for the next file of a
    /// multi-file scan.
    ///
    /// The XID tables persist: XIDs must stay unique across the whole
    /// recovered log history, so a duplicate appearing in an older file is
    /// still a corruption signal.
    pub fn reset_for_next_file(&mut self) {
        self.in_transaction = false;
        self.validation_started = false;
        self.is_malformed = false;
        self.failure_message = None;
    }

    /// Processes a query event: transaction control statements, atomic
    /// DDL markers, and textual XA termination statements.
    pub fn process_query_event(&mut self, text: &str, ddl_xid: Option<u64>) {
        if let Some(xid) = ddl_xid {
            self.start_validation();
            if self.in_transaction {
                self.mark_malformed(format!(
                    "atomic DDL (xid {xid}) inside an open transaction"
                ));
                return;
            }
            self.record_internal_xid(xid, "atomic DDL");
            return;
        }

        match classify_query(text) {
            QueryClass::Begin | QueryClass::XaStart => {
                self.start_validation();
                if self.in_transaction {
                    self.mark_malformed(
                        "transaction start while a transaction is already open".to_string(),
                    );
                } else {
                    self.in_transaction = true;
                }
            }

            QueryClass::Commit | QueryClass::Rollback => {
                if !self.validation_started {
                    return;
                }
                if self.in_transaction {
                    self.in_transaction = false;
                } else {
                    self.mark_malformed(
                        "COMMIT or ROLLBACK outside any open transaction".to_string(),
                    );
                }
            }

            QueryClass::XaCommit(rest) => {
                self.process_xa_termination(rest, XaState::Committed);
            }

            QueryClass::XaRollback(rest) => {
                self.process_xa_termination(rest, XaState::RolledBack);
            }

            QueryClass::Other => {}
        }
    }

    /// Processes an internal two-phase commit terminal event.
    pub fn process_xid_event(&mut self, xid: u64) {
        if !self.validation_started {
            return;
        }
        if !self.in_transaction {
            self.mark_malformed(format!("XID event (xid {xid}) outside any transaction"));
            return;
        }
        self.in_transaction = false;
        self.record_internal_xid(xid, "XID event");
    }

    /// Processes an XA prepare event.
    pub fn process_xa_prepare_event(&mut self, xid: &XaTransactionId, one_phase: bool) {
        if !self.validation_started {
            return;
        }
        if !self.in_transaction {
            self.mark_malformed(format!("XA prepare for {xid} outside any transaction"));
            return;
        }
        self.in_transaction = false;

        if self.external_xids.get(xid) == Some(&XaState::Prepared) {
            self.mark_malformed(format!("XA prepare for {xid} which is already prepared"));
            return;
        }
        let state = if one_phase {
            XaState::CommittedOnePhase
        } else {
            XaState::Prepared
        };
        self.external_xids.insert(xid.clone(), state);
    }

    /// Handles `XA COMMIT <xid>` / `XA ROLLBACK <xid>` statement text.
    fn process_xa_termination(&mut self, rest: &str, target: XaState) {
        if !self.validation_started {
            return;
        }
        let verb = match target {
            XaState::Committed => "XA COMMIT",
            _ => "XA ROLLBACK",
        };

        if self.in_transaction {
            // Termination may not appear before the matching prepare
            // completed the open transaction.
            self.in_transaction = false;
            self.mark_malformed(format!("{verb} while a transaction is still open"));
            return;
        }

        let Some(xid) = XaTransactionId::extract(rest, 1).into_iter().next() else {
            self.mark_malformed(format!("no XID literal in {verb} statement"));
            return;
        };

        match self.external_xids.get(&xid) {
            Some(XaState::Prepared) => {
                self.external_xids.insert(xid, target);
            }
            Some(state) => {
                self.mark_malformed(format!("{verb} for XID {xid} already in state {state:?}"));
            }
            None => {
                self.mark_malformed(format!("{verb} for unknown XID {xid}"));
            }
        }
    }

    fn record_internal_xid(&mut self, xid: u64, context: &str) {
        if !self.internal_xids.insert(xid) {
            self.mark_malformed(format!("duplicate internal XID {xid} from {context}"));
        }
    }

    fn mark_malformed(&mut self, message: String) {
        if !self.is_malformed {
            warn!(reason = %message, "transaction boundary violation");
            self.is_malformed = true;
            self.failure_message = Some(message);
        }
    }
}

/// Classification of a query statement's transaction-boundary role.
enum QueryClass<'a> {
    Begin,
    Commit,
    Rollback,
    XaStart,
    XaCommit(&'a str),
    XaRollback(&'a str),
    Other,
}

/// Classifies query text by exact/prefix match against the canonical
/// boundary keywords. Anything else is an ordinary statement.
fn classify_query(text: &str) -> QueryClass<'_> {
    let trimmed = text.trim_start();

    if let Some(after_xa) = strip_keyword(trimmed, "XA") {
        let after_xa = after_xa.trim_start();
        if strip_keyword(after_xa, "START").is_some() {
            return QueryClass::XaStart;
        }
        if let Some(rest) = strip_keyword(after_xa, "COMMIT") {
            return QueryClass::XaCommit(rest);
        }
        if let Some(rest) = strip_keyword(after_xa, "ROLLBACK") {
            return QueryClass::XaRollback(rest);
        }
        return QueryClass::Other;
    }

    if strip_keyword(trimmed, "BEGIN").is_some() {
        return QueryClass::Begin;
    }
    if strip_keyword(trimmed, "COMMIT").is_some() {
        return QueryClass::Commit;
    }
    if strip_keyword(trimmed, "ROLLBACK").is_some() {
        return QueryClass::Rollback;
    }
    QueryClass::Other
}

/// Strips a leading keyword (ASCII case-insensitive) followed by a word
/// boundary, returning the remainder.
fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    if text.len() < keyword.len() {
        return None;
    }
    let (head, rest) = text.split_at(keyword.len());
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if !c.is_ascii_alphanumeric() && c != '_' => Some(rest),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_tracker() -> BoundaryTracker {
        let mut tracker = BoundaryTracker::new();
        tracker.start_validation();
        tracker
    }

    #[test]
    fn simple_transaction_is_clean() {
        let mut tracker = active_tracker();
        tracker.process_query_event("BEGIN", None);
        assert!(tracker.in_transaction());
        tracker.process_query_event("INSERT INTO t VALUES (1)", None);
        assert!(tracker.in_transaction());
        tracker.process_query_event("COMMIT", None);
        assert!(!tracker.in_transaction());
        assert!(!tracker.is_malformed());
    }

    #[test]
    fn nested_begin_is_malformed() {
        let mut tracker = active_tracker();
        tracker.process_query_event("BEGIN", None);
        tracker.process_query_event("BEGIN", None);
        assert!(tracker.is_malformed());
        // The transition table keeps the machine inside the transaction.
        assert!(tracker.in_transaction());
    }

    #[test]
    fn commit_outside_transaction_is_malformed() {
        let mut tracker = active_tracker();
        tracker.process_query_event("COMMIT", None);
        assert!(tracker.is_malformed());
        assert!(!tracker.in_transaction());
    }

    #[test]
    fn rollback_ends_transaction() {
        let mut tracker = active_tracker();
        tracker.process_query_event("begin", None);
        tracker.process_query_event("rollback", None);
        assert!(!tracker.in_transaction());
        assert!(!tracker.is_malformed());
    }

    #[test]
    fn keyword_matching_respects_word_boundaries() {
        let mut tracker = active_tracker();
        // Not boundary statements: the keyword continues into an identifier.
        tracker.process_query_event("BEGINNING OF TIME", None);
        tracker.process_query_event("COMMITTED_WORK", None);
        assert!(!tracker.in_transaction());
        assert!(!tracker.is_malformed());
    }

    #[test]
    fn xid_event_completes_transaction() {
        let mut tracker = active_tracker();
        tracker.process_query_event("BEGIN", None);
        tracker.process_xid_event(42);
        assert!(!tracker.in_transaction());
        assert!(!tracker.is_malformed());
        assert!(tracker.has_internal_xid(42));
    }

    #[test]
    fn duplicate_internal_xid_is_malformed() {
        let mut tracker = active_tracker();
        tracker.process_query_event("BEGIN", None);
        tracker.process_xid_event(42);
        tracker.process_query_event("BEGIN", None);
        tracker.process_xid_event(42);
        assert!(tracker.is_malformed());
        assert!(tracker.failure_message().unwrap().contains("duplicate"));
    }

    #[test]
    fn xid_event_outside_transaction_is_malformed() {
        let mut tracker = active_tracker();
        tracker.process_xid_event(7);
        assert!(tracker.is_malformed());
    }

    #[test]
    fn atomic_ddl_records_xid() {
        let mut tracker = active_tracker();
        tracker.process_query_event("CREATE TABLE t (a INT)", Some(9));
        assert!(!tracker.in_transaction());
        assert!(!tracker.is_malformed());
        assert!(tracker.has_internal_xid(9));
    }

    #[test]
    fn atomic_ddl_inside_transaction_is_malformed() {
        let mut tracker = active_tracker();
        tracker.process_query_event("BEGIN", None);
        tracker.process_query_event("CREATE TABLE t (a INT)", Some(9));
        assert!(tracker.is_malformed());
        assert!(tracker.in_transaction());
    }

    #[test]
    fn duplicate_ddl_and_xid_share_namespace() {
        let mut tracker = active_tracker();
        tracker.process_query_event("CREATE TABLE t (a INT)", Some(5));
        tracker.process_query_event("BEGIN", None);
        tracker.process_xid_event(5);
        assert!(tracker.is_malformed());
    }

    #[test]
    fn xa_full_lifecycle() {
        let mut tracker = active_tracker();
        let xid = XaTransactionId::new("42", "", 1);

        tracker.process_query_event("XA START '42'", None);
        assert!(tracker.in_transaction());
        tracker.process_query_event("INSERT INTO t VALUES (1)", None);
        tracker.process_xa_prepare_event(&xid, false);
        assert!(!tracker.in_transaction());
        assert_eq!(tracker.external_xid_state(&xid), Some(XaState::Prepared));

        tracker.process_query_event("XA COMMIT '42'", None);
        assert_eq!(tracker.external_xid_state(&xid), Some(XaState::Committed));
        assert!(!tracker.is_malformed());
    }

    #[test]
    fn xa_commit_for_unknown_xid_is_malformed() {
        let mut tracker = active_tracker();
        tracker.process_query_event("XA COMMIT 'ghost'", None);
        assert!(tracker.is_malformed());
        assert!(tracker.failure_message().unwrap().contains("unknown XID"));
    }

    #[test]
    fn xa_double_commit_is_malformed() {
        let mut tracker = active_tracker();
        let xid = XaTransactionId::new("g", "", 1);

        tracker.process_query_event("XA START 'g'", None);
        tracker.process_xa_prepare_event(&xid, false);
        tracker.process_query_event("XA COMMIT 'g'", None);
        assert!(!tracker.is_malformed());

        tracker.process_query_event("XA COMMIT 'g'", None);
        assert!(tracker.is_malformed());
    }

    #[test]
    fn xa_rollback_transitions_to_rolled_back() {
        let mut tracker = active_tracker();
        let xid = XaTransactionId::new("g", "b", 1);

        tracker.process_query_event("XA START 'g','b'", None);
        tracker.process_xa_prepare_event(&xid, false);
        tracker.process_query_event("XA ROLLBACK 'g','b'", None);
        assert_eq!(tracker.external_xid_state(&xid), Some(XaState::RolledBack));
        assert!(!tracker.is_malformed());
    }

    #[test]
    fn xa_one_phase_prepare_is_terminal() {
        let mut tracker = active_tracker();
        let xid = XaTransactionId::new("op", "", 1);

        tracker.process_query_event("XA START 'op'", None);
        tracker.process_xa_prepare_event(&xid, true);
        assert_eq!(
            tracker.external_xid_state(&xid),
            Some(XaState::CommittedOnePhase)
        );

        // A later XA COMMIT for a one-phase XID is malformed.
        tracker.process_query_event("XA COMMIT 'op'", None);
        assert!(tracker.is_malformed());
    }

    #[test]
    fn xa_double_prepare_is_malformed() {
        let mut tracker = active_tracker();
        let xid = XaTransactionId::new("p", "", 1);

        tracker.process_query_event("XA START 'p'", None);
        tracker.process_xa_prepare_event(&xid, false);
        tracker.process_query_event("XA START 'p'", None);
        tracker.process_xa_prepare_event(&xid, false);
        assert!(tracker.is_malformed());
        assert!(tracker.failure_message().unwrap().contains("already prepared"));
    }

    #[test]
    fn xa_prepare_outside_transaction_is_malformed() {
        let mut tracker = active_tracker();
        let xid = XaTransactionId::new("q", "", 1);
        tracker.process_xa_prepare_event(&xid, false);
        assert!(tracker.is_malformed());
    }

    #[test]
    fn xa_commit_without_xid_literal_is_malformed() {
        let mut tracker = active_tracker();
        tracker.process_query_event("XA COMMIT", None);
        assert!(tracker.is_malformed());
        assert!(tracker.failure_message().unwrap().contains("no XID"));
    }

    #[test]
    fn xa_commit_inside_transaction_is_malformed() {
        let mut tracker = active_tracker();
        tracker.process_query_event("XA START 'x'", None);
        tracker.process_query_event("XA COMMIT 'x'", None);
        assert!(tracker.is_malformed());
        assert!(!tracker.in_transaction());
    }

    #[test]
    fn leading_tail_ignored_until_validation_starts() {
        // A relay log that begins mid-transaction: the dangling tail must
        // not be flagged.
        let mut tracker = BoundaryTracker::new();
        tracker.process_query_event("INSERT INTO t VALUES (1)", None);
        tracker.process_xid_event(3);
        tracker.process_query_event("COMMIT", None);
        assert!(!tracker.is_malformed());
        assert!(!tracker.validation_started());

        // The first BEGIN starts validation; checking is strict from here.
        tracker.process_query_event("BEGIN", None);
        assert!(tracker.validation_started());
        tracker.process_xid_event(4);
        assert!(!tracker.is_malformed());
    }

    #[test]
    fn reset_keeps_xid_tables() {
        let mut tracker = active_tracker();
        tracker.process_query_event("BEGIN", None);
        tracker.process_xid_event(11);

        tracker.reset_for_next_file();
        assert!(!tracker.validation_started());
        assert!(!tracker.is_malformed());

        tracker.start_validation();
        tracker.process_query_event("BEGIN", None);
        tracker.process_xid_event(11);
        // Same XID in an older file of the same run is still a duplicate.
        assert!(tracker.is_malformed());
    }

    #[test]
    fn reset_clears_malformed_state() {
        let mut tracker = active_tracker();
        tracker.process_query_event("COMMIT", None);
        assert!(tracker.is_malformed());

        tracker.reset_for_next_file();
        assert!(!tracker.is_malformed());
        assert!(tracker.failure_message().is_none());
    }
}
