//! Log sanitization: find the last safe truncation point in a
//! crash-damaged log and apply it.
//!
//! The pieces, leaf to root:
//!
//! - [`BoundaryTracker`] - the per-event transaction boundary state
//!   machine, including XA two-phase bookkeeping
//! - [`LogSanitizer`] - drives one file (or, via `analyze_logs`, a whole
//!   newest-to-oldest file set) through the tracker and records the last
//!   confirmed safe position
//! - [`RelayRecovery`] - the relay-log specialization that also resolves
//!   the source-server coordinates to resume replication from
//!
//! The invariant everything here serves: truncating to the reported
//! position never discards a committed transaction and never leaves a
//! partial one in the file.

mod recovery;
mod scan;
mod tracker;

pub use recovery::RelayRecovery;
pub use scan::{LogSanitizer, ScanMode};
pub use tracker::{BoundaryTracker, XaState};
