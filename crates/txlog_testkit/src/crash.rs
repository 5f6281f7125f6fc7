//! Crash and damage harness for recovery testing.
//!
//! Recovery behavior is specified against damaged inputs: torn tails from
//! crashes mid-write, flipped bits from storage rot, stomped headers.
//! These helpers inflict that damage on real log files so tests exercise
//! the same code paths startup recovery does.

use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Truncates a file to an absolute length, simulating a crash that lost
/// the tail.
pub fn truncate_to(path: &Path, new_len: u64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(new_len)?;
    file.sync_all()
}

/// Cuts `bytes` off the end of a file, tearing whatever record spans the
/// cut.
pub fn tear_tail(path: &Path, bytes: u64) -> io::Result<()> {
    let len = std::fs::metadata(path)?.len();
    truncate_to(path, len.saturating_sub(bytes))
}

/// Flips every bit of one byte at `offset`, breaking the CRC of the
/// record containing it.
pub fn flip_byte_at(path: &Path, offset: u64) -> io::Result<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let mut byte = [0u8; 1];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut byte)?;
    byte[0] ^= 0xFF;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(&byte)?;
    file.sync_all()
}

/// Flips a byte counted from the end of the file.
///
/// `1` is the last byte. Useful for damaging the final record without
/// knowing its offset.
pub fn flip_byte_from_end(path: &Path, bytes_from_end: u64) -> io::Result<()> {
    let len = std::fs::metadata(path)?.len();
    if bytes_from_end == 0 || bytes_from_end > len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("offset {bytes_from_end} from end outside file of {len} bytes"),
        ));
    }
    flip_byte_at(path, len - bytes_from_end)
}

/// Overwrites bytes at `offset` with garbage, destroying a record magic
/// or header field.
pub fn stomp_bytes(path: &Path, offset: u64, garbage: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(garbage)?;
    file.sync_all()
}
