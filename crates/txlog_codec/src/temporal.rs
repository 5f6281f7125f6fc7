//! Packed temporal layouts.
//!
//! TIME, DATE, DATETIME and TIMESTAMP values are stored as biased,
//! big-endian bit-packed quantities. The bias places the sign bit at the
//! top of the encoding, so raw byte comparison of two encoded values of
//! the same type and precision orders them by logical value.
//!
//! ## Bit layouts
//!
//! ```text
//! TIME      intpart (3 bytes): hour(10) | minute(6) | second(6), bias 1 << (23 + 8f)
//! DATETIME  intpart (5 bytes): (year*13+month)(17) | day(5) | hour(5)
//!                              | minute(6) | second(6), bias 1 << (39 + 8f)
//! DATE      the DATETIME layout with the time fields zero, precision 0
//! TIMESTAMP seconds (4 bytes, unbiased) | fraction
//! ```
//!
//! `f` is the fraction width in bytes for the requested decimal precision:
//! precisions 1-2 share a 1-byte field, 3-4 a 2-byte field, 5-6 a 3-byte
//! field. The fraction is the microsecond count truncated to the requested
//! precision. For negative TIME/DATETIME values the whole biased quantity
//! is arithmetically negated before the bias is applied, which makes the
//! raw fraction bytes appear in reversed order; decoding undoes this.

use crate::error::{CodecError, CodecResult};
use crate::int::{append_uint_be, read_uint_be};

/// A TIME value: a signed duration-of-day with microsecond resolution.
///
/// A zero duration is canonically non-negative: encoding a "negative
/// zero" produces the same bytes as zero, and decoding yields the
/// non-negative form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Time {
    /// Whether the value is negative.
    pub negative: bool,
    /// Hours, 0..=1023.
    pub hour: u16,
    /// Minutes, 0..=59.
    pub minute: u8,
    /// Seconds, 0..=59.
    pub second: u8,
    /// Microseconds, 0..=999_999.
    pub microsecond: u32,
}

impl Time {
    /// Creates a new TIME value.
    #[must_use]
    pub const fn new(negative: bool, hour: u16, minute: u8, second: u8, microsecond: u32) -> Self {
        Self {
            negative,
            hour,
            minute,
            second,
            microsecond,
        }
    }
}

/// A DATE value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date {
    /// Year, 0..=9999.
    pub year: u16,
    /// Month, 1..=12.
    pub month: u8,
    /// Day of month, 0..=31.
    pub day: u8,
}

impl Date {
    /// Creates a new DATE value.
    #[must_use]
    pub const fn new(year: u16, month: u8, day: u8) -> Self {
        Self { year, month, day }
    }
}

/// A DATETIME value with microsecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    /// Whether the value is negative (before the epoch of the calendar).
    pub negative: bool,
    /// Year, 0..=9999.
    pub year: u16,
    /// Month, 1..=12.
    pub month: u8,
    /// Day of month, 0..=31.
    pub day: u8,
    /// Hours, 0..=23.
    pub hour: u8,
    /// Minutes, 0..=59.
    pub minute: u8,
    /// Seconds, 0..=59.
    pub second: u8,
    /// Microseconds, 0..=999_999.
    pub microsecond: u32,
}

impl DateTime {
    /// Creates a new DATETIME value.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub const fn new(
        negative: bool,
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        microsecond: u32,
    ) -> Self {
        Self {
            negative,
            year,
            month,
            day,
            hour,
            minute,
            second,
            microsecond,
        }
    }
}

/// A TIMESTAMP value: Unix seconds plus a fractional part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    /// Seconds since the Unix epoch.
    pub seconds: u32,
    /// Microseconds, 0..=999_999.
    pub microsecond: u32,
}

impl Timestamp {
    /// Creates a new TIMESTAMP value.
    #[must_use]
    pub const fn new(seconds: u32, microsecond: u32) -> Self {
        Self {
            seconds,
            microsecond,
        }
    }
}

/// Returns the fraction-field width in bytes for a decimal precision.
///
/// Precisions 1-2 share a 1-byte field, 3-4 a 2-byte field, 5-6 a 3-byte
/// field; precision 0 stores no fraction.
///
/// # Errors
///
/// Returns an error if `dec > 6`.
pub fn frac_bytes(dec: u8) -> CodecResult<usize> {
    match dec {
        0 => Ok(0),
        1 | 2 => Ok(1),
        3 | 4 => Ok(2),
        5 | 6 => Ok(3),
        _ => Err(CodecError::InvalidPrecision { dec }),
    }
}

/// Divisor that truncates a microsecond count to `dec` digits.
fn frac_divisor(dec: u8) -> u32 {
    10u32.pow(6 - u32::from(dec))
}

/// Returns the encoded size in bytes of a TIME at the given precision.
///
/// # Errors
///
/// Returns an error if `dec > 6`.
pub fn time_binary_size(dec: u8) -> CodecResult<usize> {
    Ok(3 + frac_bytes(dec)?)
}

/// Returns the encoded size in bytes of a DATETIME at the given precision.
///
/// # Errors
///
/// Returns an error if `dec > 6`.
pub fn datetime_binary_size(dec: u8) -> CodecResult<usize> {
    Ok(5 + frac_bytes(dec)?)
}

/// Returns the encoded size in bytes of a DATE (always 5).
#[must_use]
pub const fn date_binary_size() -> usize {
    5
}

/// Returns the encoded size in bytes of a TIMESTAMP at the given precision.
///
/// # Errors
///
/// Returns an error if `dec > 6`.
pub fn timestamp_binary_size(dec: u8) -> CodecResult<usize> {
    Ok(4 + frac_bytes(dec)?)
}

fn check_ms(minute: u8, second: u8, microsecond: u32) -> CodecResult<()> {
    if minute > 59 || second > 59 {
        return Err(CodecError::value_out_of_range(format!(
            "minute {minute} or second {second} exceeds 59"
        )));
    }
    if microsecond > 999_999 {
        return Err(CodecError::value_out_of_range(format!(
            "microsecond {microsecond} exceeds 999999"
        )));
    }
    Ok(())
}

/// Encodes a TIME at the given precision.
///
/// # Errors
///
/// Returns an error if any field is outside its documented range or
/// `dec > 6`.
pub fn encode_time(time: &Time, dec: u8) -> CodecResult<Vec<u8>> {
    let f = frac_bytes(dec)?;
    if time.hour > 1023 {
        return Err(CodecError::value_out_of_range(format!(
            "hour {} exceeds 1023",
            time.hour
        )));
    }
    check_ms(time.minute, time.second, time.microsecond)?;

    let intpart = (i64::from(time.hour) << 12)
        | (i64::from(time.minute) << 6)
        | i64::from(time.second);
    let frac = i64::from(time.microsecond / frac_divisor(dec));

    let magnitude = (intpart << (8 * f)) | frac;
    let signed = if time.negative { -magnitude } else { magnitude };
    let biased = (signed + (1i64 << (23 + 8 * f))) as u64;

    let mut buf = Vec::with_capacity(3 + f);
    append_uint_be(&mut buf, biased, 3 + f)?;
    Ok(buf)
}

/// Decodes a TIME at the given precision.
///
/// # Errors
///
/// Returns an error if the buffer is too short, `dec > 6`, or the decoded
/// fields are outside their documented ranges.
pub fn decode_time(buf: &[u8], dec: u8) -> CodecResult<Time> {
    let f = frac_bytes(dec)?;
    let biased = read_uint_be(buf, 3 + f)? as i64;
    let signed = biased - (1i64 << (23 + 8 * f));

    let negative = signed < 0;
    let magnitude = signed.unsigned_abs();
    let frac = if f == 0 {
        0
    } else {
        magnitude & ((1u64 << (8 * f)) - 1)
    };
    let intpart = magnitude >> (8 * f);

    let time = Time {
        negative,
        hour: ((intpart >> 12) & 0x3FF) as u16,
        minute: ((intpart >> 6) & 0x3F) as u8,
        second: (intpart & 0x3F) as u8,
        microsecond: (frac as u32) * frac_divisor(dec),
    };
    if intpart >> 22 != 0 {
        return Err(CodecError::value_out_of_range(
            "time integer part exceeds 22 bits".to_string(),
        ));
    }
    check_ms(time.minute, time.second, time.microsecond)?;
    Ok(time)
}

fn datetime_intpart(dt: &DateTime) -> CodecResult<i128> {
    if dt.year > 9999 || dt.month == 0 || dt.month > 12 || dt.day > 31 {
        return Err(CodecError::value_out_of_range(format!(
            "date {}-{}-{} outside supported range",
            dt.year, dt.month, dt.day
        )));
    }
    if dt.hour > 23 {
        return Err(CodecError::value_out_of_range(format!(
            "hour {} exceeds 23",
            dt.hour
        )));
    }
    check_ms(dt.minute, dt.second, dt.microsecond)?;

    let ymd = ((i128::from(dt.year) * 13 + i128::from(dt.month)) << 5) | i128::from(dt.day);
    let hms =
        (i128::from(dt.hour) << 12) | (i128::from(dt.minute) << 6) | i128::from(dt.second);
    Ok((ymd << 17) | hms)
}

/// Encodes a DATETIME at the given precision.
///
/// # Errors
///
/// Returns an error if any field is outside its documented range or
/// `dec > 6`.
pub fn encode_datetime(dt: &DateTime, dec: u8) -> CodecResult<Vec<u8>> {
    let f = frac_bytes(dec)?;
    let intpart = datetime_intpart(dt)?;
    let frac = i128::from(dt.microsecond / frac_divisor(dec));

    let magnitude = (intpart << (8 * f)) | frac;
    let signed = if dt.negative { -magnitude } else { magnitude };
    let biased = (signed + (1i128 << (39 + 8 * f))) as u64;

    let mut buf = Vec::with_capacity(5 + f);
    append_uint_be(&mut buf, biased, 5 + f)?;
    Ok(buf)
}

/// Decodes a DATETIME at the given precision.
///
/// # Errors
///
/// Returns an error if the buffer is too short, `dec > 6`, or the decoded
/// fields are outside their documented ranges.
pub fn decode_datetime(buf: &[u8], dec: u8) -> CodecResult<DateTime> {
    let f = frac_bytes(dec)?;
    let biased = i128::from(read_uint_be(buf, 5 + f)?);
    let signed = biased - (1i128 << (39 + 8 * f));

    let negative = signed < 0;
    let magnitude = signed.unsigned_abs();
    let frac = if f == 0 {
        0
    } else {
        magnitude & ((1u128 << (8 * f)) - 1)
    };
    let intpart = (magnitude >> (8 * f)) as u64;

    if intpart >> 39 != 0 {
        return Err(CodecError::value_out_of_range(
            "datetime integer part exceeds 39 bits".to_string(),
        ));
    }

    let hms = intpart & 0x1FFFF;
    let ymd = intpart >> 17;
    let day = ymd & 0x1F;
    let year_month = ymd >> 5;

    let dt = DateTime {
        negative,
        year: (year_month / 13) as u16,
        month: (year_month % 13) as u8,
        day: day as u8,
        hour: ((hms >> 12) & 0x1F) as u8,
        minute: ((hms >> 6) & 0x3F) as u8,
        second: (hms & 0x3F) as u8,
        microsecond: (frac as u32) * frac_divisor(dec),
    };
    if dt.year > 9999 || dt.month == 0 || dt.month > 12 {
        return Err(CodecError::value_out_of_range(format!(
            "decoded date {}-{}-{} outside supported range",
            dt.year, dt.month, dt.day
        )));
    }
    check_ms(dt.minute, dt.second, dt.microsecond)?;
    Ok(dt)
}

/// Encodes a DATE (the precision-0 DATETIME layout with a zero time part).
///
/// # Errors
///
/// Returns an error if any field is outside its documented range.
pub fn encode_date(date: &Date) -> CodecResult<Vec<u8>> {
    let dt = DateTime::new(false, date.year, date.month, date.day, 0, 0, 0, 0);
    encode_datetime(&dt, 0)
}

/// Decodes a DATE.
///
/// # Errors
///
/// Returns an error if the buffer is too short or the decoded fields are
/// outside their documented ranges.
pub fn decode_date(buf: &[u8]) -> CodecResult<Date> {
    let dt = decode_datetime(buf, 0)?;
    Ok(Date {
        year: dt.year,
        month: dt.month,
        day: dt.day,
    })
}

/// Encodes a TIMESTAMP at the given precision.
///
/// # Errors
///
/// Returns an error if `microsecond > 999_999` or `dec > 6`.
pub fn encode_timestamp(ts: &Timestamp, dec: u8) -> CodecResult<Vec<u8>> {
    let f = frac_bytes(dec)?;
    if ts.microsecond > 999_999 {
        return Err(CodecError::value_out_of_range(format!(
            "microsecond {} exceeds 999999",
            ts.microsecond
        )));
    }

    let mut buf = Vec::with_capacity(4 + f);
    append_uint_be(&mut buf, u64::from(ts.seconds), 4)?;
    if f > 0 {
        let frac = u64::from(ts.microsecond / frac_divisor(dec));
        append_uint_be(&mut buf, frac, f)?;
    }
    Ok(buf)
}

/// Decodes a TIMESTAMP at the given precision.
///
/// # Errors
///
/// Returns an error if the buffer is too short or `dec > 6`.
pub fn decode_timestamp(buf: &[u8], dec: u8) -> CodecResult<Timestamp> {
    let f = frac_bytes(dec)?;
    if buf.len() < 4 + f {
        return Err(CodecError::Truncated);
    }
    let seconds = read_uint_be(buf, 4)? as u32;
    let frac = if f == 0 {
        0
    } else {
        read_uint_be(&buf[4..], f)? as u32
    };
    Ok(Timestamp {
        seconds,
        microsecond: frac * frac_divisor(dec),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn time_roundtrip_full_precision() {
        let t = Time::new(false, 10, 30, 15, 500_000);
        let bytes = encode_time(&t, 6).unwrap();
        assert_eq!(bytes.len(), 6);
        assert_eq!(decode_time(&bytes, 6).unwrap(), t);
    }

    #[test]
    fn time_sizes_by_precision() {
        let expected = [3usize, 4, 4, 5, 5, 6, 6];
        for (dec, want) in expected.iter().enumerate() {
            assert_eq!(time_binary_size(dec as u8).unwrap(), *want);
        }
        assert!(time_binary_size(7).is_err());
    }

    #[test]
    fn time_truncates_fraction_to_precision() {
        let t = Time::new(false, 1, 2, 3, 987_654);
        let bytes = encode_time(&t, 2).unwrap();
        let decoded = decode_time(&bytes, 2).unwrap();
        assert_eq!(decoded.microsecond, 980_000);
    }

    #[test]
    fn time_bias_at_full_precision() {
        // Zero encodes as exactly the bias constant.
        let t = Time::new(false, 0, 0, 0, 0);
        let bytes = encode_time(&t, 6).unwrap();
        assert_eq!(bytes, [0x80, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn time_byte_order_matches_value_order() {
        let older = encode_time(&Time::new(true, 10, 0, 0, 1), 6).unwrap();
        let neg = encode_time(&Time::new(true, 10, 0, 0, 0), 6).unwrap();
        let zero = encode_time(&Time::new(false, 0, 0, 0, 0), 6).unwrap();
        let small = encode_time(&Time::new(false, 0, 0, 0, 1), 6).unwrap();
        let large = encode_time(&Time::new(false, 10, 0, 0, 0), 6).unwrap();

        // -10:00:00.000001 < -10:00:00.000000 < 0 < 0.000001 < 10:00:00
        assert!(older < neg);
        assert!(neg < zero);
        assert!(zero < small);
        assert!(small < large);
    }

    #[test]
    fn time_negative_roundtrip_every_precision() {
        for dec in 0..=6u8 {
            let divisor = 10u32.pow(6 - u32::from(dec));
            let t = Time::new(true, 838, 59, 59, 999_999 / divisor * divisor);
            let bytes = encode_time(&t, dec).unwrap();
            assert_eq!(decode_time(&bytes, dec).unwrap(), t);
        }
    }

    #[test]
    fn time_invalid_fields_rejected() {
        assert!(encode_time(&Time::new(false, 1024, 0, 0, 0), 0).is_err());
        assert!(encode_time(&Time::new(false, 0, 60, 0, 0), 0).is_err());
        assert!(encode_time(&Time::new(false, 0, 0, 0, 1_000_000), 0).is_err());
        assert!(encode_time(&Time::new(false, 0, 0, 0, 0), 7).is_err());
    }

    #[test]
    fn datetime_roundtrip() {
        let dt = DateTime::new(false, 2024, 2, 29, 23, 59, 59, 123_456);
        let bytes = encode_datetime(&dt, 6).unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(decode_datetime(&bytes, 6).unwrap(), dt);
    }

    #[test]
    fn datetime_bias_at_zero_precision() {
        // The all-zero date has month 1 by construction; check the bias bit
        // lands in the top byte of the 5-byte form.
        let dt = DateTime::new(false, 0, 1, 0, 0, 0, 0, 0);
        let bytes = encode_datetime(&dt, 0).unwrap();
        assert_eq!(bytes.len(), 5);
        assert_eq!(bytes[0] & 0x80, 0x80);
    }

    #[test]
    fn datetime_byte_order_matches_value_order() {
        let a = encode_datetime(&DateTime::new(false, 2023, 12, 31, 23, 59, 59, 999_999), 6)
            .unwrap();
        let b = encode_datetime(&DateTime::new(false, 2024, 1, 1, 0, 0, 0, 0), 6).unwrap();
        assert!(a < b);
    }

    #[test]
    fn datetime_invalid_fields_rejected() {
        assert!(encode_datetime(&DateTime::new(false, 10000, 1, 1, 0, 0, 0, 0), 0).is_err());
        assert!(encode_datetime(&DateTime::new(false, 2024, 0, 1, 0, 0, 0, 0), 0).is_err());
        assert!(encode_datetime(&DateTime::new(false, 2024, 13, 1, 0, 0, 0, 0), 0).is_err());
        assert!(encode_datetime(&DateTime::new(false, 2024, 1, 1, 24, 0, 0, 0), 0).is_err());
    }

    #[test]
    fn date_roundtrip() {
        let d = Date::new(1999, 12, 31);
        let bytes = encode_date(&d).unwrap();
        assert_eq!(bytes.len(), date_binary_size());
        assert_eq!(decode_date(&bytes).unwrap(), d);
    }

    #[test]
    fn timestamp_roundtrip_every_precision() {
        for dec in 0..=6u8 {
            let divisor = 10u32.pow(6 - u32::from(dec));
            let ts = Timestamp::new(1_700_000_000, 654_321 / divisor * divisor);
            let bytes = encode_timestamp(&ts, dec).unwrap();
            assert_eq!(bytes.len(), timestamp_binary_size(dec).unwrap());
            assert_eq!(decode_timestamp(&bytes, dec).unwrap(), ts);
        }
    }

    #[test]
    fn timestamp_seconds_are_big_endian() {
        let ts = Timestamp::new(0x0102_0304, 0);
        let bytes = encode_timestamp(&ts, 0).unwrap();
        assert_eq!(bytes, [1, 2, 3, 4]);
    }

    #[test]
    fn decode_truncated_buffers_rejected() {
        assert_eq!(decode_time(&[0x80, 0], 0), Err(CodecError::Truncated));
        assert_eq!(decode_datetime(&[0x80, 0, 0], 0), Err(CodecError::Truncated));
        assert_eq!(decode_timestamp(&[0, 0], 0), Err(CodecError::Truncated));
    }

    proptest! {
        #[test]
        fn prop_time_roundtrip(
            negative in any::<bool>(),
            hour in 0u16..=1023,
            minute in 0u8..=59,
            second in 0u8..=59,
            microsecond in 0u32..=999_999,
            dec in 0u8..=6,
        ) {
            let divisor = 10u32.pow(6 - u32::from(dec));
            let stored = microsecond / divisor * divisor;
            // Zero is canonically non-negative.
            let is_zero = hour == 0 && minute == 0 && second == 0 && stored == 0;
            let t = Time::new(negative && !is_zero, hour, minute, second, stored);
            let bytes = encode_time(&t, dec).unwrap();
            prop_assert_eq!(decode_time(&bytes, dec).unwrap(), t);
        }

        #[test]
        fn prop_datetime_roundtrip(
            year in 0u16..=9999,
            month in 1u8..=12,
            day in 0u8..=31,
            hour in 0u8..=23,
            minute in 0u8..=59,
            second in 0u8..=59,
            microsecond in 0u32..=999_999,
            dec in 0u8..=6,
        ) {
            let divisor = 10u32.pow(6 - u32::from(dec));
            let stored = microsecond / divisor * divisor;
            let dt = DateTime::new(false, year, month, day, hour, minute, second, stored);
            let bytes = encode_datetime(&dt, dec).unwrap();
            prop_assert_eq!(decode_datetime(&bytes, dec).unwrap(), dt);
        }

        #[test]
        fn prop_time_ordering(
            h1 in 0u16..=838, m1 in 0u8..=59, s1 in 0u8..=59, u1 in 0u32..=999_999,
            h2 in 0u16..=838, m2 in 0u8..=59, s2 in 0u8..=59, u2 in 0u32..=999_999,
        ) {
            let a = Time::new(false, h1, m1, s1, u1);
            let b = Time::new(false, h2, m2, s2, u2);
            let ka = (h1, m1, s1, u1);
            let kb = (h2, m2, s2, u2);
            let ea = encode_time(&a, 6).unwrap();
            let eb = encode_time(&b, 6).unwrap();
            prop_assert_eq!(ea.cmp(&eb), ka.cmp(&kb));
        }
    }
}
