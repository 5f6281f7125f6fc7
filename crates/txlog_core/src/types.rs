//! Core type definitions for txlog.

use std::fmt;

/// Identifier of an externally-coordinated (XA) transaction.
///
/// An XA transaction is identified by the triple (gtrid, bqual, formatID).
/// The components are compared exactly; two XIDs are the same transaction
/// only if all three match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XaTransactionId {
    /// Global transaction identifier.
    pub gtrid: String,
    /// Branch qualifier.
    pub bqual: String,
    /// Format identifier.
    pub format_id: u32,
}

impl XaTransactionId {
    /// Creates a new XA transaction identifier.
    #[must_use]
    pub fn new(gtrid: impl Into<String>, bqual: impl Into<String>, format_id: u32) -> Self {
        Self {
            gtrid: gtrid.into(),
            bqual: bqual.into(),
            format_id,
        }
    }

    /// Extracts up to `max` XID literals from the start of SQL text.
    ///
    /// This is the tokenizer used on the text following an `XA COMMIT` or
    /// `XA ROLLBACK` keyword. An XID literal is
    /// `gtrid [, bqual [, format_id]]` where gtrid and bqual are
    /// single-quoted strings (with `''` escaping) or bare tokens. Missing
    /// components default to an empty branch qualifier and format 1.
    ///
    /// Returns an empty vector when no XID literal is present - the caller
    /// treats that as a malformed statement.
    #[must_use]
    pub fn extract(text: &str, max: usize) -> Vec<Self> {
        let mut found = Vec::new();
        let mut rest = text;

        while found.len() < max {
            let (xid, after) = match parse_xid(rest) {
                Some(parsed) => parsed,
                None => break,
            };
            found.push(xid);
            rest = after;
        }

        found
    }
}

impl fmt::Display for XaTransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}','{}',{}", self.gtrid, self.bqual, self.format_id)
    }
}

/// Parses one XID literal from the start of `text`, returning the XID and
/// the remaining text.
fn parse_xid(text: &str) -> Option<(XaTransactionId, &str)> {
    let (gtrid, rest) = parse_component(text)?;

    let (bqual, rest) = match take_comma(rest).and_then(parse_component) {
        Some((component, after)) => (component, after),
        None => (String::new(), rest),
    };

    let (format_id, rest) = match take_comma(rest).and_then(parse_format_id) {
        Some((id, after)) => (id, after),
        None => (1, rest),
    };

    Some((XaTransactionId::new(gtrid, bqual, format_id), rest))
}

/// Consumes a comma (with surrounding whitespace) if one is next.
fn take_comma(text: &str) -> Option<&str> {
    let trimmed = text.trim_start();
    trimmed.strip_prefix(',')
}

/// Parses one gtrid/bqual component: a quoted string or a bare token.
fn parse_component(text: &str) -> Option<(String, &str)> {
    let trimmed = text.trim_start();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(inner) = trimmed.strip_prefix('\'') {
        return parse_quoted(inner);
    }

    let end = trimmed
        .find(|c: char| c == ',' || c.is_whitespace())
        .unwrap_or(trimmed.len());
    if end == 0 {
        return None;
    }
    Some((trimmed[..end].to_string(), &trimmed[end..]))
}

/// Parses the body of a single-quoted string, handling `''` escapes.
fn parse_quoted(text: &str) -> Option<(String, &str)> {
    let mut value = String::new();
    let mut chars = text.char_indices();

    while let Some((idx, c)) = chars.next() {
        if c != '\'' {
            value.push(c);
            continue;
        }
        // A doubled quote is an escaped quote; a lone quote closes.
        if text[idx + 1..].starts_with('\'') {
            value.push('\'');
            chars.next();
        } else {
            return Some((value, &text[idx + 1..]));
        }
    }

    // Unterminated quote: not a valid literal.
    None
}

/// Parses a numeric format identifier.
fn parse_format_id(text: &str) -> Option<(u32, &str)> {
    let trimmed = text.trim_start();
    let end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    if end == 0 {
        return None;
    }
    let value = trimmed[..end].parse().ok()?;
    Some((value, &trimmed[end..]))
}
