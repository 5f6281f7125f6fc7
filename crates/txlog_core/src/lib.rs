//! # txlog Core
//!
//! Transactional log sanitization and recovery engine.
//!
//! This crate provides:
//! - A typed event model for transactional log files
//! - Streaming event reader/writer over pluggable storage backends
//! - A transaction boundary tracker (including XA two-phase state)
//! - A log sanitizer that finds the last safe truncation point in a
//!   crash-damaged log
//! - A multi-file recovery driver for relay-style log sets
//! - Log directory and index management
//!
//! ## Recovery Model
//!
//! Recovery runs once, single-threaded, before the log is reopened for
//! writing. The sanitizer replays events through the boundary tracker and
//! records the position just after the last well-formed transaction
//! boundary. Truncating to that position never cuts into the middle of a
//! transaction; when the sanitizer is not confident, it leaves the file
//! untouched.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod error;
pub mod event;
mod index;
pub mod sanitizer;
mod types;

pub use config::Config;
pub use dir::LogDir;
pub use error::{CoreError, CoreResult};
pub use index::LogIndex;
pub use types::XaTransactionId;
