//! # txlog Codec
//!
//! Byte-exact binary codecs for txlog.
//!
//! This crate provides deterministic encoding of the fixed-layout binary
//! values referenced by log records and key buffers:
//!
//! - Fixed-width big-endian integers (1-8 bytes)
//! - Packed TIME, DATE, DATETIME and TIMESTAMP layouts whose raw bytes
//!   compare in value order
//! - Key-segment comparison over encoded key buffers
//!
//! ## Byte-Comparable Ordering
//!
//! The packed temporal layouts store a biased, big-endian quantity so that
//! `memcmp` on the encoded bytes orders values the same way as comparing
//! the logical values. This is what allows key buffers containing temporal
//! columns to be compared without decoding.
//!
//! ## Usage
//!
//! ```
//! use txlog_codec::{encode_time, decode_time, Time};
//!
//! let t = Time::new(false, 10, 30, 15, 500_000);
//! let bytes = encode_time(&t, 6).unwrap();
//! assert_eq!(bytes.len(), 6);
//! assert_eq!(decode_time(&bytes, 6).unwrap(), t);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod int;
mod key;
mod temporal;

pub use error::{CodecError, CodecResult};
pub use int::{append_uint_be, read_uint_be, write_uint_be};
pub use key::{compare_keys, KeySegment, SegmentType};
pub use temporal::{
    date_binary_size, datetime_binary_size, decode_date, decode_datetime, decode_time,
    decode_timestamp, encode_date, encode_datetime, encode_time, encode_timestamp, frac_bytes,
    time_binary_size, timestamp_binary_size, Date, DateTime, Time, Timestamp,
};
