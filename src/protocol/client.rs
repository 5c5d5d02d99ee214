use super::{
    check_unterminated, encode_range, find_crlf, is_valid_key, parse_decimal, tokenize, Command,
    Response, CRLF,
};
use crate::config::ProtocolLimits;
use crate::error::{Error, ProtocolError};
use crate::index::{Entry, ValueRecord};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Client side of the text protocol: encodes [`Command`]s, decodes
/// [`Response`]s.
///
/// A `VALUE` stream is decoded entry by entry as bytes arrive; entries are
/// held until `END` and then returned together as one
/// [`Response::Values`]. Framing errors are fatal: the decoder never tries
/// to resynchronise on a broken stream.
#[derive(Debug, Default)]
pub struct ClientCodec {
    limits: ProtocolLimits,
    values: Vec<Entry>,
}

impl ClientCodec {
    pub fn new(limits: ProtocolLimits) -> Self {
        Self {
            limits,
            values: Vec::new(),
        }
    }

    fn check_key(&self, key: &[u8]) -> Result<(), Error> {
        if is_valid_key(key, self.limits.max_key_len) {
            Ok(())
        } else {
            Err(Error::InvalidKey(crate::format::Raw(key).to_string()))
        }
    }

    /// Parses `VALUE <key> <flags> <length>`.
    fn parse_value_header(&self, line: &[u8]) -> Result<(Bytes, u32, usize), ProtocolError> {
        let malformed =
            || ProtocolError::MalformedHeader(String::from_utf8_lossy(line).into_owned());
        let tokens = tokenize(line);
        let &[b"VALUE", key, flags, length] = tokens.as_slice() else {
            return Err(malformed());
        };
        if !is_valid_key(key, usize::MAX) {
            return Err(malformed());
        }
        let flags = parse_decimal::<u32>(flags, "flags", ProtocolError::MalformedHeader)?;
        let length = parse_decimal::<usize>(length, "length", ProtocolError::MalformedHeader)?;
        if length > self.limits.max_value_size {
            return Err(ProtocolError::ValueTooLarge {
                size: length,
                limit: self.limits.max_value_size,
            });
        }
        Ok((Bytes::copy_from_slice(key), flags, length))
    }
}

impl Decoder for ClientCodec {
    type Item = Response;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
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
            let line = &src[..line_end];

            if line.starts_with(b"VALUE") {
                let (key, flags, len) = self.parse_value_header(line)?;

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
                self.values.push(Entry::new(key, ValueRecord::new(flags, data)));
                continue;
            }

            if line == b"END" {
                src.advance(header_len);
                return Ok(Some(Response::Values(std::mem::take(&mut self.values))));
            }

            // Only VALUE or END may follow a VALUE block
            if !self.values.is_empty() {
                return Err(
                    ProtocolError::MalformedHeader(String::from_utf8_lossy(line).into_owned())
                        .into(),
                );
            }

            let response = match line {
                b"STORED" => Response::Stored,
                b"DELETED" => Response::Deleted,
                b"NOT_FOUND" => Response::NotFound,
                b"ERROR" => Response::Error,
                _ => {
                    if let Some(msg) = line.strip_prefix(b"CLIENT_ERROR ") {
                        Response::ClientError(String::from_utf8_lossy(msg).into_owned())
                    } else if let Some(msg) = line.strip_prefix(b"SERVER_ERROR ") {
                        Response::ServerError(String::from_utf8_lossy(msg).into_owned())
                    } else {
                        return Err(ProtocolError::UnexpectedReply(
                            String::from_utf8_lossy(line).into_owned(),
                        )
                        .into());
                    }
                }
            };
            src.advance(header_len);
            return Ok(Some(response));
        }
    }
}

impl Encoder<Command> for ClientCodec {
    type Error = Error;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Command::Rget(desc) => {
                self.check_key(&desc.left_key)?;
                self.check_key(&desc.right_key)?;
                dst.put_slice(b"rget ");
                encode_range(&desc, dst);
            }
            Command::Get(keys) => {
                if keys.is_empty() {
                    return Err(Error::InvalidKey("get requires at least one key".to_string()));
                }
                for key in &keys {
                    self.check_key(key)?;
                }
                dst.put_slice(b"get");
                for key in &keys {
                    dst.put_u8(b' ');
                    dst.put_slice(key);
                }
            }
            Command::Set { key, value } => {
                self.check_key(&key)?;
                dst.reserve(key.len() + value.data.len() + 32);
                dst.put_slice(b"set ");
                dst.put_slice(&key);
                dst.put_slice(format!(" {} 0 {}\r\n", value.flags, value.data.len()).as_bytes());
                dst.put_slice(&value.data);
            }
            Command::Delete(key) => {
                self.check_key(&key)?;
                dst.put_slice(b"delete ");
                dst.put_slice(&key);
            }
            Command::Quit => dst.put_slice(b"quit"),
            Command::Unknown(line) => {
                if line.contains(['\r', '\n']) {
                    return Err(Error::InvalidState(
                        "raw command line must not contain line breaks".to_string(),
                    ));
                }
                dst.put_slice(line.as_bytes());
            }
        }
        dst.put_slice(CRLF);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerCodec;
    use crate::query::RangeDescriptor;

    fn decode_all(input: &[u8]) -> Result<Vec<Response>, Error> {
        let mut codec = ClientCodec::default();
        let mut buf = BytesMut::from(input);
        let mut responses = Vec::new();
        while let Some(response) = codec.decode(&mut buf)? {
            responses.push(response);
        }
        Ok(responses)
    }

    fn decode_err(input: &[u8]) -> ProtocolError {
        match decode_all(input) {
            Err(Error::Protocol(e)) => e,
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_values_and_status() {
        let responses = decode_all(
            b"VALUE a 0 1\r\n1\r\nVALUE b 7 4\r\n\r\nxy\r\nEND\r\nEND\r\nSTORED\r\nNOT_FOUND\r\n",
        )
        .unwrap();
        assert_eq!(
            responses,
            vec![
                Response::Values(vec![
                    Entry::new("a", ValueRecord::new(0, "1")),
                    Entry::new("b", ValueRecord::new(7, "\r\nxy")),
                ]),
                Response::Values(Vec::new()),
                Response::Stored,
                Response::NotFound,
            ]
        );
    }

    #[test]
    fn test_decode_error_lines() {
        let responses =
            decode_all(b"ERROR\r\nCLIENT_ERROR bad request\r\nSERVER_ERROR out of memory\r\n")
                .unwrap();
        assert_eq!(
            responses,
            vec![
                Response::Error,
                Response::ClientError("bad request".to_string()),
                Response::ServerError("out of memory".to_string()),
            ]
        );
    }

    #[test]
    fn test_decode_incrementally() {
        let input = b"VALUE key 3 5\r\nhello\r\nVALUE key2 0 2\r\nhi\r\nEND\r\n";
        let mut codec = ClientCodec::default();
        let mut buf = BytesMut::new();
        let mut decoded = None;

        // Feed one byte at a time
        for byte in input.iter() {
            buf.put_u8(*byte);
            if let Some(response) = codec.decode(&mut buf).unwrap() {
                assert!(decoded.is_none(), "decoded more than one response");
                decoded = Some(response);
            }
        }

        assert_eq!(
            decoded,
            Some(Response::Values(vec![
                Entry::new("key", ValueRecord::new(3, "hello")),
                Entry::new("key2", ValueRecord::new(0, "hi")),
            ]))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_rejects_malformed_headers() {
        let cases: &[&[u8]] = &[
            b"VALUE a 0\r\n",
            b"VALUE a 0 1 2\r\n",
            b"VALUE a x 1\r\n",
            b"VALUE a 0 -1\r\n",
            b"VALUE a 99999999999 1\r\n",
            b"VALUES a 0 1\r\n",
        ];
        for case in cases {
            assert!(
                matches!(decode_err(case), ProtocolError::MalformedHeader(_)),
                "accepted {:?}",
                String::from_utf8_lossy(case)
            );
        }
    }

    #[test]
    fn test_rejects_missing_terminator() {
        assert_eq!(
            decode_err(b"VALUE a 0 3\r\nabcd\r\nEND\r\n"),
            ProtocolError::MissingTerminator
        );
        assert_eq!(
            decode_err(b"VALUE a 0 1\r\n1\n\rEND\r\n"),
            ProtocolError::MissingTerminator
        );
    }

    #[test]
    fn test_rejects_status_inside_value_stream() {
        assert!(matches!(
            decode_err(b"VALUE a 0 1\r\n1\r\nSTORED\r\n"),
            ProtocolError::MalformedHeader(_)
        ));
    }

    #[test]
    fn test_rejects_long_header_line() {
        let mut codec = ClientCodec::new(ProtocolLimits {
            max_line_len: 16,
            ..ProtocolLimits::default()
        });

        // Terminated, but longer than the limit
        let mut buf = BytesMut::from(&b"VALUE abcdefghijklmnop 0 1\r\nx\r\nEND\r\n"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::Protocol(ProtocolError::LineTooLong { limit: 16 }))
        ));

        let mut buf = BytesMut::from(&b"VALUE abc 0 1\r\nx\r\nEND\r\n"[..]);
        assert!(matches!(codec.decode(&mut buf), Ok(Some(Response::Values(_)))));
    }

    #[test]
    fn test_rejects_unknown_reply() {
        assert!(matches!(
            decode_err(b"HELLO\r\n"),
            ProtocolError::UnexpectedReply(_)
        ));
    }

    #[test]
    fn test_encode_commands() {
        let mut codec = ClientCodec::default();
        let cases = vec![
            (
                Command::Rget(RangeDescriptor::new("a", "goo").right_open(true).max_results(13)),
                &b"rget a goo 0 1 13\r\n"[..],
            ),
            (
                Command::Get(vec![Bytes::from("a"), Bytes::from("b")]),
                &b"get a b\r\n"[..],
            ),
            (
                Command::Set {
                    key: Bytes::from("k"),
                    value: ValueRecord::new(5, "abc"),
                },
                &b"set k 5 0 3\r\nabc\r\n"[..],
            ),
            (Command::Delete(Bytes::from("k")), &b"delete k\r\n"[..]),
            (Command::Quit, &b"quit\r\n"[..]),
            (Command::Unknown("stats".to_string()), &b"stats\r\n"[..]),
        ];
        for (command, expected) in cases {
            let mut buf = BytesMut::new();
            codec.encode(command, &mut buf).unwrap();
            assert_eq!(&buf[..], expected);
        }
    }

    #[test]
    fn test_encode_rejects_invalid_keys() {
        let mut codec = ClientCodec::default();
        let mut buf = BytesMut::new();

        let bad = [
            Command::Rget(RangeDescriptor::new("a b", "c")),
            Command::Rget(RangeDescriptor::new("a", "")),
            Command::Get(Vec::new()),
            Command::Delete(Bytes::from("line\r\nbreak")),
        ];
        for command in bad {
            assert!(matches!(
                codec.encode(command, &mut buf),
                Err(Error::InvalidKey(_))
            ));
        }
        assert!(buf.is_empty(), "nothing may be written for a rejected command");
    }

    #[test]
    fn test_commands_round_trip_through_server_codec() {
        let mut client = ClientCodec::default();
        let mut server = ServerCodec::default();
        let mut buf = BytesMut::new();

        let desc = RangeDescriptor::new("foo", "fop")
            .left_open(true)
            .max_results(1100);
        client.encode(Command::Rget(desc.clone()), &mut buf).unwrap();
        assert_eq!(server.decode(&mut buf).unwrap(), Some(Command::Rget(desc)));

        let entries = vec![
            Entry::new("foo", ValueRecord::new(1, "x".repeat(2000))),
            Entry::new("fop", ValueRecord::new(2, "")),
        ];
        server
            .encode(Response::Values(entries.clone()), &mut buf)
            .unwrap();
        assert_eq!(client.decode(&mut buf).unwrap(), Some(Response::Values(entries)));
    }
}
