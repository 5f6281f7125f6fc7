//! Property-based test generators using proptest.
//!
//! Strategies for the packed temporal values and key-segment descriptors,
//! constrained to their documented ranges so properties exercise the full
//! valid domain and nothing else.

use proptest::prelude::*;
use txlog_codec::{Date, DateTime, KeySegment, SegmentType, Time, Timestamp};

/// Strategy over valid fractional precisions.
pub fn precision() -> impl Strategy<Value = u8> {
    0u8..=6
}

/// Strategy over valid TIME values at full microsecond resolution.
pub fn time() -> impl Strategy<Value = Time> {
    (
        any::<bool>(),
        0u16..=1023,
        0u8..=59,
        0u8..=59,
        0u32..=999_999,
    )
        .prop_map(|(negative, hour, minute, second, microsecond)| {
            Time::new(negative, hour, minute, second, microsecond)
        })
}

/// Strategy over valid DATE values.
pub fn date() -> impl Strategy<Value = Date> {
    (0u16..=9999, 1u8..=12, 0u8..=31).prop_map(|(year, month, day)| Date::new(year, month, day))
}

/// Strategy over valid DATETIME values.
pub fn datetime() -> impl Strategy<Value = DateTime> {
    (
        0u16..=9999,
        1u8..=12,
        0u8..=31,
        0u8..=23,
        0u8..=59,
        0u8..=59,
        0u32..=999_999,
    )
        .prop_map(|(year, month, day, hour, minute, second, microsecond)| {
            DateTime::new(false, year, month, day, hour, minute, second, microsecond)
        })
}

/// Strategy over valid TIMESTAMP values.
pub fn timestamp() -> impl Strategy<Value = Timestamp> {
    (any::<u32>(), 0u32..=999_999)
        .prop_map(|(seconds, microsecond)| Timestamp::new(seconds, microsecond))
}

/// Truncates a microsecond count to what the given precision stores.
#[must_use]
pub fn truncate_to_precision(microsecond: u32, dec: u8) -> u32 {
    let divisor = 10u32.pow(6 - u32::from(dec));
    microsecond / divisor * divisor
}

/// Strategy over fixed-width key segment types.
pub fn fixed_segment_type() -> impl Strategy<Value = SegmentType> {
    prop_oneof![
        Just(SegmentType::Int8),
        Just(SegmentType::UInt8),
        Just(SegmentType::Int16),
        Just(SegmentType::UInt16),
        Just(SegmentType::Int24),
        Just(SegmentType::UInt24),
        Just(SegmentType::Int32),
        Just(SegmentType::UInt32),
        Just(SegmentType::Int64),
        Just(SegmentType::UInt64),
    ]
}

/// Byte width of a fixed-width integer segment type.
#[must_use]
pub fn segment_width(seg_type: SegmentType) -> usize {
    match seg_type {
        SegmentType::Int8 | SegmentType::UInt8 => 1,
        SegmentType::Int16 | SegmentType::UInt16 => 2,
        SegmentType::Int24 | SegmentType::UInt24 => 3,
        SegmentType::Int32 | SegmentType::UInt32 => 4,
        SegmentType::Int64 | SegmentType::UInt64 => 8,
        _ => panic!("not a fixed-width integer segment type"),
    }
}

/// Strategy over a fixed-width integer segment and a pair of encoded
/// bodies for it.
pub fn int_segment_with_bodies() -> impl Strategy<Value = (KeySegment, Vec<u8>, Vec<u8>)> {
    fixed_segment_type().prop_flat_map(|seg_type| {
        let width = segment_width(seg_type);
        (
            Just(KeySegment::new(seg_type, width)),
            proptest::collection::vec(any::<u8>(), width),
            proptest::collection::vec(any::<u8>(), width),
        )
    })
}
