use super::{
    check_unterminated, encode_entry, find_crlf, parse_decimal, parse_key, parse_range, tokenize,
    Command, Response, CRLF,
};
use crate::config::ProtocolLimits;
use crate::error::{Error, ProtocolError};
use crate::index::ValueRecord;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Server side of the text protocol: decodes [`Command`]s, encodes
/// [`Response`]s.
#[derive(Debug, Clone, Default)]
pub struct ServerCodec {
    limits: ProtocolLimits,
}

impl ServerCodec {
    pub fn new(limits: ProtocolLimits) -> Self {
        Self { limits }
    }

    /// Parses everything after the command word except `set`'s data block.
    fn parse_line(&self, line: &[u8]) -> Result<Parsed, ProtocolError> {
        let tokens = tokenize(line);
        let (name, args) = tokens
            .split_first()
            .ok_or_else(|| ProtocolError::MalformedRequest("empty request line".to_string()))?;
        let malformed = ProtocolError::MalformedRequest;
        let max_key_len = self.limits.max_key_len;

        let parsed = match *name {
            b"rget" => Parsed::Complete(Command::Rget(parse_range(args, max_key_len)?)),
            b"get" => {
                if args.is_empty() {
                    return Err(malformed("get requires at least one key".to_string()));
                }
                let keys = args
                    .iter()
                    .map(|key| parse_key(key, max_key_len, malformed))
                    .collect::<Result<Vec<_>, _>>()?;
                Parsed::Complete(Command::Get(keys))
            }
            b"delete" => match args {
                [key] => Parsed::Complete(Command::Delete(parse_key(key, max_key_len, malformed)?)),
                _ => return Err(malformed("delete takes 1 argument".to_string())),
            },
            b"set" => match args {
                // exptime is accepted for compatibility; entries never expire
                [key, flags, exptime, bytes] => {
                    let key = parse_key(key, max_key_len, malformed)?;
                    let flags = parse_decimal::<u32>(flags, "flags", malformed)?;
                    parse_decimal::<u64>(exptime, "exptime", malformed)?;
                    let len = parse_decimal::<usize>(bytes, "bytes", malformed)?;
                    if len > self.limits.max_value_size {
                        return Err(ProtocolError::ValueTooLarge {
                            size: len,
                            limit: self.limits.max_value_size,
                        });
                    }
                    Parsed::AwaitingData { key, flags, len }
                }
                _ => return Err(malformed("set takes 4 arguments".to_string())),
            },
            b"quit" => Parsed::Complete(Command::Quit),
            other => Parsed::Complete(Command::Unknown(
                String::from_utf8_lossy(other).into_owned(),
            )),
        };
        Ok(parsed)
    }
}

enum Parsed {
    Complete(Command),
    AwaitingData {
        key: bytes::Bytes,
        flags: u32,
        len: usize,
    },
}

impl Decoder for ServerCodec {
    type Item = Command;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(line_end) = find_crlf(src) else {
            check_unterminated(src.len(), self.limits.max_line_len)?;
            return Ok(None);
        };
        if line_end > self.limits.max_line_len {
            return Err(ProtocolError::LineTooLong {
                limit: self.limits.max_line_len,
            }
            .into());
        }

        let header_len = line_end + CRLF.len();
        match self.parse_line(&src[..line_end])? {
            Parsed::Complete(command) => {
                src.advance(header_len);
                Ok(Some(command))
            }
            Parsed::AwaitingData { key, flags, len } => {
                // Check if we have the full data block and its terminator
                let total = header_len + len + CRLF.len();
                if src.len() < total {
                    src.reserve(total - src.len());
                    return Ok(None);
                }
                if &src[header_len + len..total] != CRLF {
                    return Err(ProtocolError::MissingTerminator.into());
                }

                src.advance(header_len);
                let data = src.split_to(len).freeze();
                src.advance(CRLF.len());

                Ok(Some(Command::Set {
                    key,
                    value: ValueRecord::new(flags, data),
                }))
            }
        }
    }
}

impl Encoder<Response> for ServerCodec {
    type Error = Error;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Response::Values(entries) => {
                for entry in &entries {
                    encode_entry(entry, dst);
                }
                dst.put_slice(b"END\r\n");
            }
            Response::Stored => dst.put_slice(b"STORED\r\n"),
            Response::Deleted => dst.put_slice(b"DELETED\r\n"),
            Response::NotFound => dst.put_slice(b"NOT_FOUND\r\n"),
            Response::Error => dst.put_slice(b"ERROR\r\n"),
            Response::ClientError(msg) => put_error_line(dst, "CLIENT_ERROR", &msg),
            Response::ServerError(msg) => put_error_line(dst, "SERVER_ERROR", &msg),
        }
        Ok(())
    }
}

/// Error messages are single-line by construction of the reply grammar.
fn put_error_line(dst: &mut BytesMut, kind: &str, msg: &str) {
    let msg = msg.replace(['\r', '\n'], " ");
    dst.put_slice(format!("{kind} {msg}\r\n").as_bytes());
}
