//! Line-oriented text protocol.
//!
//! Requests are single CRLF-terminated lines of space-separated tokens; only
//! `set` carries a data block after its line.
//!
//! ```text
//! rget   LEFT RIGHT LEFTOPEN RIGHTOPEN MAX CRLF
//! get    KEY+ CRLF
//! set    KEY FLAGS EXPTIME BYTES CRLF DATA CRLF
//! delete KEY CRLF
//! quit   CRLF
//! ```
//!
//! Entries come back as
//!
//! ```text
//! (VALUE KEY FLAGS LENGTH CRLF  BYTES{LENGTH}  CRLF)*  END CRLF
//! ```
//!
//! Status replies are `STORED`, `DELETED`, `NOT_FOUND`, `ERROR`,
//! `CLIENT_ERROR <msg>` and `SERVER_ERROR <msg>`.
//!
//! [`ServerCodec`] decodes commands and encodes responses; [`ClientCodec`] is
//! its mirror image. Both are `tokio_util` codecs meant to be used with
//! `Framed`.

mod client;
mod server;

pub use client::ClientCodec;
pub use server::ServerCodec;

use crate::error::ProtocolError;
use crate::index::{Entry, ValueRecord};
use crate::query::RangeDescriptor;
use bytes::{BufMut, Bytes, BytesMut};
use std::str::FromStr;

pub(crate) const CRLF: &[u8] = b"\r\n";

/// A decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Rget(RangeDescriptor),
    Get(Vec<Bytes>),
    Set { key: Bytes, value: ValueRecord },
    Delete(Bytes),
    Quit,
    /// A well-formed line with a command word we do not serve.
    Unknown(String),
}

/// A reply to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Values(Vec<Entry>),
    Stored,
    Deleted,
    NotFound,
    Error,
    ClientError(String),
    ServerError(String),
}

/// Position of the first CRLF in `buf`.
pub(crate) fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Fails once `buffered` bytes without a CRLF can no longer become a line
/// of at most `max_line_len` bytes.
pub(crate) fn check_unterminated(buffered: usize, max_line_len: usize) -> Result<(), ProtocolError> {
    // One extra byte may be the CR of a pending CRLF.
    if buffered > max_line_len + 1 {
        return Err(ProtocolError::LineTooLong {
            limit: max_line_len,
        });
    }
    Ok(())
}

pub(crate) fn tokenize(line: &[u8]) -> Vec<&[u8]> {
    line.split(|b| *b == b' ')
        .filter(|token| !token.is_empty())
        .collect()
}

/// Whether `key` can travel as a single token.
pub fn is_valid_key(key: &[u8], max_key_len: usize) -> bool {
    !key.is_empty()
        && key.len() <= max_key_len
        && key
            .iter()
            .all(|b| !b.is_ascii_whitespace() && !b.is_ascii_control())
}

pub(crate) fn parse_key(
    token: &[u8],
    max_key_len: usize,
    err: fn(String) -> ProtocolError,
) -> Result<Bytes, ProtocolError> {
    if !is_valid_key(token, max_key_len) {
        return Err(err(format!(
            "invalid key {}",
            crate::format::Raw(token)
        )));
    }
    Ok(Bytes::copy_from_slice(token))
}

/// Parses an unsigned decimal field. Signs and empty tokens are rejected.
pub(crate) fn parse_decimal<T: FromStr>(
    token: &[u8],
    field: &str,
    err: fn(String) -> ProtocolError,
) -> Result<T, ProtocolError> {
    let invalid = || err(format!("invalid {field} {}", crate::format::Raw(token)));
    if token.is_empty() || !token.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(invalid)
}

fn parse_flag(token: &[u8], field: &str) -> Result<bool, ProtocolError> {
    match token {
        b"0" => Ok(false),
        b"1" => Ok(true),
        _ => Err(ProtocolError::MalformedRequest(format!(
            "{field} must be 0 or 1, got {}",
            crate::format::Raw(token)
        ))),
    }
}

/// Parses the fields of a range request:
/// `LEFT RIGHT LEFTOPEN RIGHTOPEN MAX`.
pub fn parse_range(fields: &[&[u8]], max_key_len: usize) -> Result<RangeDescriptor, ProtocolError> {
    let [left, right, left_open, right_open, max_results] = fields else {
        return Err(ProtocolError::MalformedRequest(format!(
            "rget takes 5 arguments, got {}",
            fields.len()
        )));
    };

    let malformed = ProtocolError::MalformedRequest;
    Ok(RangeDescriptor {
        left_key: parse_key(left, max_key_len, malformed)?,
        right_key: parse_key(right, max_key_len, malformed)?,
        left_open: parse_flag(left_open, "left_open")?,
        right_open: parse_flag(right_open, "right_open")?,
        max_results: parse_decimal(max_results, "max_results", malformed)?,
    })
}

/// Appends `LEFT RIGHT LEFTOPEN RIGHTOPEN MAX` (without CRLF).
pub fn encode_range(desc: &RangeDescriptor, dst: &mut BytesMut) {
    dst.put_slice(&desc.left_key);
    dst.put_u8(b' ');
    dst.put_slice(&desc.right_key);
    dst.put_slice(
        format!(
            " {} {} {}",
            u8::from(desc.left_open),
            u8::from(desc.right_open),
            desc.max_results
        )
        .as_bytes(),
    );
}

/// Appends one `VALUE` block.
pub(crate) fn encode_entry(entry: &Entry, dst: &mut BytesMut) {
    let data = &entry.value.data;
    dst.reserve(entry.key.len() + data.len() + 32);
    dst.put_slice(b"VALUE ");
    dst.put_slice(&entry.key);
    dst.put_slice(format!(" {} {}\r\n", entry.value.flags, data.len()).as_bytes());
    dst.put_slice(data);
    dst.put_slice(CRLF);
}
