//! # txlog Testkit
//!
//! Test utilities for txlog.
//!
//! This crate provides:
//! - Log directory fixtures and event-stream builders
//! - Crash/damage harnesses for recovery testing
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use txlog_testkit::prelude::*;
//!
//! #[test]
//! fn recovers_from_torn_tail() {
//!     let fixture = TestLogDir::new();
//!     let ends = fixture
//!         .build_log("log-000001.bin")
//!         .begin()
//!         .xid(1, 100)
//!         .finish();
//!     // ... damage the tail, run recovery, assert the verdict
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
