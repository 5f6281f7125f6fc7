//! Event record types and serialization.

use crate::error::{CoreError, CoreResult};
use crate::types::XaTransactionId;
use txlog_codec::{append_uint_be, read_uint_be};

/// Magic bytes identifying a log file header.
pub const LOG_MAGIC: [u8; 4] = *b"TXLG";

/// Current log file format version.
pub const LOG_VERSION: u16 = 1;

/// Size of the log file header: magic (4) + version (2) + flags (2).
pub const LOG_HEADER_SIZE: usize = 8;

/// Header flag marking the file as the active write target.
pub const LOG_IN_USE_FLAG: u16 = 0x0001;

/// Magic bytes identifying an event record.
pub const EVENT_MAGIC: [u8; 4] = *b"TEVT";

/// Current event record format version.
pub const EVENT_VERSION: u16 = 1;

/// Size of the event record header:
/// magic (4) + version (2) + kind (1) + flags (1) + source_pos (8) + length (4).
pub const EVENT_HEADER_SIZE: usize = 20;

/// Event flag marking an event that originated on the source server.
pub(crate) const EVENT_FLAG_FROM_SOURCE: u8 = 0x01;

/// Kind of log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
    /// A SQL statement, including transaction control statements.
    Query = 1,
    /// Internal two-phase commit terminal record.
    Xid = 2,
    /// XA prepare record.
    XaPrepare = 3,
    /// Rotation to the next log file.
    Rotate = 4,
    /// Global transaction identifier marker.
    Gtid = 5,
    /// Session housekeeping statement.
    SessionControl = 6,
    /// Clean server stop marker.
    Stop = 7,
    /// Log format description, first event of every file.
    FormatDescription = 8,
    /// Any event kind the sanitizer does not classify.
    Other = 9,
}

impl EventKind {
    /// Converts a byte to an event kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Query),
            2 => Some(Self::Xid),
            3 => Some(Self::XaPrepare),
            4 => Some(Self::Rotate),
            5 => Some(Self::Gtid),
            6 => Some(Self::SessionControl),
            7 => Some(Self::Stop),
            8 => Some(Self::FormatDescription),
            9 => Some(Self::Other),
            _ => None,
        }
    }

    /// Converts the event kind to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Where an event originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    /// Written by this server.
    Local,
    /// Copied from the remote source server.
    Source,
}

/// Kind-specific event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventBody {
    /// A SQL statement.
    Query {
        /// The statement text.
        text: String,
        /// Internal XID carried by an atomic DDL statement, if any.
        ddl_xid: Option<u64>,
    },

    /// Internal two-phase commit terminal record.
    Xid {
        /// The internal transaction identifier.
        xid: u64,
    },

    /// XA prepare record.
    XaPrepare {
        /// The external transaction identifier.
        xid: XaTransactionId,
        /// Whether the prepare commits in one phase.
        one_phase: bool,
    },

    /// Rotation to the next log file.
    Rotate {
        /// Name of the next log file.
        next_file: String,
        /// Starting position within the next file.
        position: u64,
    },

    /// Global transaction identifier marker.
    Gtid {
        /// Sequence number of the marked transaction.
        sequence: u64,
    },

    /// Session housekeeping statement.
    SessionControl {
        /// The statement text.
        text: String,
    },

    /// Clean server stop marker.
    Stop,

    /// Log format description.
    FormatDescription {
        /// Format flag bits.
        flags: u16,
    },

    /// Unclassified event payload, carried opaquely.
    Other {
        /// Raw payload bytes.
        data: Vec<u8>,
    },
}

/// A decoded log event: payload plus the envelope fields the sanitizer
/// needs for position bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// The kind-specific payload.
    pub body: EventBody,
    /// Where the event originated.
    pub origin: EventOrigin,
    /// The event's end position on the server that produced it.
    pub source_pos: u64,
}

impl LogEvent {
    /// Creates a new event.
    #[must_use]
    pub fn new(body: EventBody, origin: EventOrigin, source_pos: u64) -> Self {
        Self {
            body,
            origin,
            source_pos,
        }
    }

    /// Returns the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self.body {
            EventBody::Query { .. } => EventKind::Query,
            EventBody::Xid { .. } => EventKind::Xid,
            EventBody::XaPrepare { .. } => EventKind::XaPrepare,
            EventBody::Rotate { .. } => EventKind::Rotate,
            EventBody::Gtid { .. } => EventKind::Gtid,
            EventBody::SessionControl { .. } => EventKind::SessionControl,
            EventBody::Stop => EventKind::Stop,
            EventBody::FormatDescription { .. } => EventKind::FormatDescription,
            EventBody::Other { .. } => EventKind::Other,
        }
    }

    /// Returns the envelope flag byte for this event.
    pub(crate) fn flags(&self) -> u8 {
        match self.origin {
            EventOrigin::Local => 0,
            EventOrigin::Source => EVENT_FLAG_FROM_SOURCE,
        }
    }

    /// Serializes the kind-specific payload (without envelope).
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();

        match &self.body {
            EventBody::Query { text, ddl_xid } => {
                write_string(&mut buf, text)?;
                match ddl_xid {
                    Some(xid) => {
                        buf.push(1);
                        append_uint_be(&mut buf, *xid, 8)?;
                    }
                    None => buf.push(0),
                }
            }

            EventBody::Xid { xid } => {
                append_uint_be(&mut buf, *xid, 8)?;
            }

            EventBody::XaPrepare { xid, one_phase } => {
                buf.push(u8::from(*one_phase));
                write_short_string(&mut buf, &xid.gtrid)?;
                write_short_string(&mut buf, &xid.bqual)?;
                append_uint_be(&mut buf, u64::from(xid.format_id), 4)?;
            }

            EventBody::Rotate {
                next_file,
                position,
            } => {
                append_uint_be(&mut buf, *position, 8)?;
                write_string(&mut buf, next_file)?;
            }

            EventBody::Gtid { sequence } => {
                append_uint_be(&mut buf, *sequence, 8)?;
            }

            EventBody::SessionControl { text } => {
                write_string(&mut buf, text)?;
            }

            EventBody::Stop => {}

            EventBody::FormatDescription { flags } => {
                append_uint_be(&mut buf, u64::from(*flags), 2)?;
            }

            EventBody::Other { data } => {
                buf.extend_from_slice(data);
            }
        }

        Ok(buf)
    }

    /// Deserializes the kind-specific payload.
    pub fn decode_payload(
        kind: EventKind,
        payload: &[u8],
        origin: EventOrigin,
        source_pos: u64,
    ) -> CoreResult<Self> {
        let mut cursor = 0usize;

        let body = match kind {
            EventKind::Query => {
                let text = read_string(payload, &mut cursor)?;
                let ddl_xid = read_optional_u64(payload, &mut cursor)?;
                expect_end(kind, payload, cursor)?;
                EventBody::Query { text, ddl_xid }
            }

            EventKind::Xid => {
                let xid = read_u64(payload, &mut cursor)?;
                expect_end(kind, payload, cursor)?;
                EventBody::Xid { xid }
            }

            EventKind::XaPrepare => {
                let one_phase = read_u8(payload, &mut cursor)? != 0;
                let gtrid = read_short_string(payload, &mut cursor)?;
                let bqual = read_short_string(payload, &mut cursor)?;
                let format_id = read_u32(payload, &mut cursor)?;
                expect_end(kind, payload, cursor)?;
                EventBody::XaPrepare {
                    xid: XaTransactionId::new(gtrid, bqual, format_id),
                    one_phase,
                }
            }

            EventKind::Rotate => {
                let position = read_u64(payload, &mut cursor)?;
                let next_file = read_string(payload, &mut cursor)?;
                expect_end(kind, payload, cursor)?;
                EventBody::Rotate {
                    next_file,
                    position,
                }
            }

            EventKind::Gtid => {
                let sequence = read_u64(payload, &mut cursor)?;
                expect_end(kind, payload, cursor)?;
                EventBody::Gtid { sequence }
            }

            EventKind::SessionControl => {
                let text = read_string(payload, &mut cursor)?;
                expect_end(kind, payload, cursor)?;
                EventBody::SessionControl { text }
            }

            EventKind::Stop => {
                expect_end(kind, payload, cursor)?;
                EventBody::Stop
            }

            EventKind::FormatDescription => {
                let flags = read_u16(payload, &mut cursor)?;
                expect_end(kind, payload, cursor)?;
                EventBody::FormatDescription { flags }
            }

            EventKind::Other => EventBody::Other {
                data: payload.to_vec(),
            },
        };

        Ok(Self {
            body,
            origin,
            source_pos,
        })
    }
}

fn write_string(buf: &mut Vec<u8>, text: &str) -> CoreResult<()> {
    let bytes = text.as_bytes();
    let len = u16::try_from(bytes.len())
        .map_err(|_| CoreError::invalid_operation("string field exceeds 65535 bytes"))?;
    append_uint_be(buf, u64::from(len), 2)?;
    buf.extend_from_slice(bytes);
    Ok(())
}

fn write_short_string(buf: &mut Vec<u8>, text: &str) -> CoreResult<()> {
    let bytes = text.as_bytes();
    let len = u8::try_from(bytes.len())
        .map_err(|_| CoreError::invalid_operation("identifier field exceeds 255 bytes"))?;
    buf.push(len);
    buf.extend_from_slice(bytes);
    Ok(())
}

fn read_u8(payload: &[u8], cursor: &mut usize) -> CoreResult<u8> {
    let byte = *payload
        .get(*cursor)
        .ok_or_else(|| CoreError::corruption("unexpected end of payload"))?;
    *cursor += 1;
    Ok(byte)
}

fn read_uint(payload: &[u8], cursor: &mut usize, width: usize) -> CoreResult<u64> {
    if *cursor + width > payload.len() {
        return Err(CoreError::corruption("unexpected end of payload"));
    }
    let value = read_uint_be(&payload[*cursor..], width)?;
    *cursor += width;
    Ok(value)
}

fn read_u16(payload: &[u8], cursor: &mut usize) -> CoreResult<u16> {
    Ok(read_uint(payload, cursor, 2)? as u16)
}

fn read_u32(payload: &[u8], cursor: &mut usize) -> CoreResult<u32> {
    Ok(read_uint(payload, cursor, 4)? as u32)
}

fn read_u64(payload: &[u8], cursor: &mut usize) -> CoreResult<u64> {
    read_uint(payload, cursor, 8)
}

fn read_optional_u64(payload: &[u8], cursor: &mut usize) -> CoreResult<Option<u64>> {
    if read_u8(payload, cursor)? == 0 {
        Ok(None)
    } else {
        Ok(Some(read_u64(payload, cursor)?))
    }
}

fn read_bytes<'a>(payload: &'a [u8], cursor: &mut usize, len: usize) -> CoreResult<&'a [u8]> {
    if *cursor + len > payload.len() {
        return Err(CoreError::corruption("unexpected end of payload"));
    }
    let bytes = &payload[*cursor..*cursor + len];
    *cursor += len;
    Ok(bytes)
}

fn read_string(payload: &[u8], cursor: &mut usize) -> CoreResult<String> {
    let len = read_u16(payload, cursor)? as usize;
    let bytes = read_bytes(payload, cursor, len)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| CoreError::corruption("string field is not valid UTF-8"))
}

fn read_short_string(payload: &[u8], cursor: &mut usize) -> CoreResult<String> {
    let len = read_u8(payload, cursor)? as usize;
    let bytes = read_bytes(payload, cursor, len)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| CoreError::corruption("identifier field is not valid UTF-8"))
}

fn expect_end(kind: EventKind, payload: &[u8], cursor: usize) -> CoreResult<()> {
    if cursor != payload.len() {
        return Err(CoreError::corruption(format!(
            "trailing bytes in {kind:?} payload: expected {} bytes, got {}",
            cursor,
            payload.len()
        )));
    }
    Ok(())
}

/// Encodes the log file header.
#[must_use]
pub(crate) fn encode_log_header(flags: u16) -> [u8; LOG_HEADER_SIZE] {
    let mut header = [0u8; LOG_HEADER_SIZE];
    header[0..4].copy_from_slice(&LOG_MAGIC);
    header[4..6].copy_from_slice(&LOG_VERSION.to_be_bytes());
    header[6..8].copy_from_slice(&flags.to_be_bytes());
    header
}

/// Decodes and validates the log file header, returning its flag bits.
pub(crate) fn decode_log_header(header: &[u8]) -> CoreResult<u16> {
    if header.len() < LOG_HEADER_SIZE || header[0..4] != LOG_MAGIC {
        return Err(CoreError::invalid_format("invalid log file magic"));
    }
    let version = u16::from_be_bytes([header[4], header[5]]);
    if version > LOG_VERSION {
        return Err(CoreError::invalid_format(format!(
            "unsupported log format version {version}"
        )));
    }
    Ok(u16::from_be_bytes([header[6], header[7]]))
}

/// Computes CRC32 checksum for data.
pub fn compute_crc32(data: &[u8]) -> u32 {
    // CRC32 with the IEEE polynomial, table generated at compile time.
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
