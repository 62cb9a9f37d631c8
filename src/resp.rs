/*
 * This file is a part of a RESP3 client library.
 * Licensed under the GNU Affero General Public License, v3 or later.
*/

//! The RESP3 wire codec: encoding commands and decoding any protocol value,
//! including the streaming/aggregate framing rules and attribute prefixes.
//!
//! Only [`encode_command`] and [`decode`] cross the module boundary; every
//! other function here is a dispatch helper keyed off the type byte that
//! opens a frame, built directly against
//! [`crate::buffered_stream::BufferedStream`] rather than a borrowed slice, so
//! a frame that straddles two reads is simply awaited rather than
//! re-parsed from scratch.

use crate::buffered_stream::BufferedStream;
use crate::error::{Error, Result};

/// A decoded RESP3 value, or a command sent to the server.
///
/// Every wire type from the protocol has exactly one variant here. Command
/// errors (`-` and `!` frames) are values, not a side channel: a pipeline
/// slot holding one is indistinguishable, until inspected, from any other
/// slot, which is what lets [`crate::session::Session`] associate the right
/// error with the right request index.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A `+` frame: a short, non-binary status line.
    SimpleString(String),
    /// A `-` or `!` frame: a server-reported error, carrying its
    /// whitespace-delimited code prefix (`WRONGTYPE`, `NOPERM`, ...)
    /// separately from the rest of the message.
    CommandError { code: String, message: String },
    /// A `:` frame: a 64-bit signed integer.
    Integer(i64),
    /// A `$` frame. `None` is the null bulk (`$-1`), distinct from an empty
    /// bulk (`$0\r\n\r\n`).
    Bulk(Option<Vec<u8>>),
    /// A `*` frame. `None` is the null array (`*-1`).
    Array(Option<Vec<Value>>),
    /// A `_` frame: the protocol's own distinct top-level null, separate
    /// from a null bulk or null array.
    Null,
    /// A `,` frame. `inf`, `-inf` and `nan` are recognized on the wire.
    Double(f64),
    /// A `#` frame.
    Boolean(bool),
    /// A `=` frame: a bulk-like string with a three-byte content-type tag.
    Verbatim { format: [u8; 3], data: Vec<u8> },
    /// A `(` frame: an arbitrary-precision integer carried as decimal text.
    BigNumber(String),
    /// A `%` frame. Iteration order is wire order; the codec does not
    /// deduplicate keys.
    Map(Vec<(Value, Value)>),
    /// A `~` frame. The protocol gives this set-semantics, but the wire
    /// order is preserved as received.
    Set(Vec<Value>),
    /// A value preceded by a `|` attribute frame. Attributes attach only to
    /// the value immediately following them and never survive across
    /// frames; callers that don't care about them should use
    /// [`Value::into_inner`].
    WithAttributes {
        attributes: Vec<(Value, Value)>,
        value: Box<Value>,
    },
    /// A `>` frame: an out-of-band server-pushed message. By protocol
    /// convention the first element is an event tag.
    Push(Vec<Value>),
}

impl Value {
    /// Strip any attribute wrapper, recursively, returning the value it
    /// annotates. Two values that differ only in attached attributes compare
    /// equal after this call.
    pub fn into_inner(self) -> Value {
        match self {
            Value::WithAttributes { value, .. } => value.into_inner(),
            other => other,
        }
    }

    /// `true` if this is a [`Value::CommandError`].
    pub fn is_command_error(&self) -> bool {
        matches!(self, Value::CommandError { .. })
    }
}

/// Serialize one command (verb + arguments) as a RESP3 array of bulk
/// strings, appending it to `buf`. Multiple calls against the same `buf`
/// concatenate cleanly into one pipeline payload; nothing here flushes or
/// otherwise talks to a stream.
pub(crate) fn encode_command<I, A>(buf: &mut Vec<u8>, args: I)
where
    I: IntoIterator<Item = A>,
    A: AsRef<[u8]>,
{
    let args: Vec<A> = args.into_iter().collect();
    buf.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in &args {
        let bytes = arg.as_ref();
        buf.extend_from_slice(format!("${}\r\n", bytes.len()).as_bytes());
        buf.extend_from_slice(bytes);
        buf.extend_from_slice(b"\r\n");
    }
}

/// Decode exactly one top-level value (plus any attribute frames that
/// precede it) from `stream`.
pub(crate) fn decode(stream: &mut BufferedStream) -> Result<Value> {
    let line = stream.read_line()?;
    decode_from_line(&line, stream)
}

/// Dispatch on an already-read header line. Split out so the streaming-
/// aggregate loops below can feed back a line they peeked at while looking
/// for the end sentinel, without an extra round trip through [`decode`].
fn decode_from_line(line: &[u8], stream: &mut BufferedStream) -> Result<Value> {
    let (tag, rest) = line
        .split_first()
        .ok_or_else(|| Error::Connection("empty reply header".into()))?;
    match tag {
        b'+' => Ok(Value::SimpleString(lossy(rest))),
        b'-' => Ok(command_error(rest)),
        b':' => parse_i64(rest).map(Value::Integer),
        b'$' => decode_bulk(rest, stream),
        b'*' => decode_array(rest, stream),
        b'_' => Ok(Value::Null),
        b',' => decode_double(rest),
        b'#' => decode_bool(rest),
        b'!' => decode_blob_error(rest, stream),
        b'=' => decode_verbatim(rest, stream),
        b'(' => Ok(Value::BigNumber(lossy(rest))),
        b'%' => decode_map(rest, stream),
        b'~' => decode_set(rest, stream),
        b'|' => decode_attribute(rest, stream),
        b'>' => decode_push(rest, stream),
        other => Err(Error::Connection(format!(
            "unknown protocol type byte '{}'",
            *other as char
        ))),
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Split a `-`/`!` body into its code prefix and message, the same rule
/// [`crate::error::Error::command`] applies.
fn command_error(rest: &[u8]) -> Value {
    let line = lossy(rest);
    match line.split_once(' ') {
        Some((code, message)) => Value::CommandError {
            code: code.to_owned(),
            message: message.to_owned(),
        },
        None => Value::CommandError {
            code: line,
            message: String::new(),
        },
    }
}

fn parse_i64(rest: &[u8]) -> Result<i64> {
    std::str::from_utf8(rest)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Connection("malformed integer frame".into()))
}

fn parse_usize(rest: &[u8]) -> Result<usize> {
    std::str::from_utf8(rest)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Connection("malformed length header".into()))
}

fn decode_bulk(rest: &[u8], stream: &mut BufferedStream) -> Result<Value> {
    if rest == b"?" {
        let mut data = Vec::new();
        loop {
            let line = stream.read_line()?;
            if line.first() != Some(&b';') {
                return Err(Error::Connection("malformed streaming bulk chunk".into()));
            }
            let len = parse_usize(&line[1..])?;
            if len == 0 {
                break;
            }
            let chunk = stream.read_exact(len)?;
            stream.read_exact(2)?;
            data.extend_from_slice(&chunk);
        }
        return Ok(Value::Bulk(Some(data)));
    }
    let len = parse_i64(rest)?;
    if len < 0 {
        return Ok(Value::Bulk(None));
    }
    let bytes = stream.read_exact(len as usize)?;
    stream.read_exact(2)?;
    Ok(Value::Bulk(Some(bytes)))
}

fn decode_array(rest: &[u8], stream: &mut BufferedStream) -> Result<Value> {
    if rest == b"?" {
        let mut items = Vec::new();
        loop {
            let line = stream.read_line()?;
            if is_end_sentinel(&line) {
                break;
            }
            items.push(decode_from_line(&line, stream)?);
        }
        return Ok(Value::Array(Some(items)));
    }
    let len = parse_i64(rest)?;
    if len < 0 {
        return Ok(Value::Array(None));
    }
    let mut items = Vec::with_capacity(len as usize);
    for _ in 0..len {
        items.push(decode(stream)?);
    }
    Ok(Value::Array(Some(items)))
}

fn decode_set(rest: &[u8], stream: &mut BufferedStream) -> Result<Value> {
    if rest == b"?" {
        let mut items = Vec::new();
        loop {
            let line = stream.read_line()?;
            if is_end_sentinel(&line) {
                break;
            }
            items.push(decode_from_line(&line, stream)?);
        }
        return Ok(Value::Set(items));
    }
    let len = parse_usize(rest)?;
    let mut items = Vec::with_capacity(len);
    for _ in 0..len {
        items.push(decode(stream)?);
    }
    Ok(Value::Set(items))
}

fn decode_map(rest: &[u8], stream: &mut BufferedStream) -> Result<Value> {
    if rest == b"?" {
        let mut pairs = Vec::new();
        loop {
            let line = stream.read_line()?;
            if is_end_sentinel(&line) {
                break;
            }
            let key = decode_from_line(&line, stream)?;
            let value = decode(stream)?;
            pairs.push((key, value));
        }
        return Ok(Value::Map(pairs));
    }
    let len = parse_usize(rest)?;
    let mut pairs = Vec::with_capacity(len);
    for _ in 0..len {
        let key = decode(stream)?;
        let value = decode(stream)?;
        pairs.push((key, value));
    }
    Ok(Value::Map(pairs))
}

fn decode_attribute(rest: &[u8], stream: &mut BufferedStream) -> Result<Value> {
    let len = parse_usize(rest)?;
    let mut attributes = Vec::with_capacity(len);
    for _ in 0..len {
        let key = decode(stream)?;
        let value = decode(stream)?;
        attributes.push((key, value));
    }
    let value = Box::new(decode(stream)?);
    Ok(Value::WithAttributes { attributes, value })
}

fn decode_push(rest: &[u8], stream: &mut BufferedStream) -> Result<Value> {
    let len = parse_usize(rest)?;
    let mut items = Vec::with_capacity(len);
    for _ in 0..len {
        items.push(decode(stream)?);
    }
    Ok(Value::Push(items))
}

fn decode_double(rest: &[u8]) -> Result<Value> {
    let s = std::str::from_utf8(rest).map_err(|_| Error::Connection("malformed double".into()))?;
    let value = match s {
        "inf" | "+inf" => f64::INFINITY,
        "-inf" => f64::NEG_INFINITY,
        "nan" => f64::NAN,
        _ => s
            .parse()
            .map_err(|_| Error::Connection("malformed double".into()))?,
    };
    Ok(Value::Double(value))
}

fn decode_bool(rest: &[u8]) -> Result<Value> {
    match rest {
        b"t" => Ok(Value::Boolean(true)),
        b"f" => Ok(Value::Boolean(false)),
        _ => Err(Error::Connection("malformed boolean frame".into())),
    }
}

fn decode_blob_error(rest: &[u8], stream: &mut BufferedStream) -> Result<Value> {
    let len = parse_usize(rest)?;
    let bytes = stream.read_exact(len)?;
    stream.read_exact(2)?;
    Ok(command_error(&bytes))
}

fn decode_verbatim(rest: &[u8], stream: &mut BufferedStream) -> Result<Value> {
    let len = parse_usize(rest)?;
    let bytes = stream.read_exact(len)?;
    stream.read_exact(2)?;
    if bytes.len() < 4 || bytes[3] != b':' {
        return Err(Error::Connection("malformed verbatim string".into()));
    }
    let mut format = [0u8; 3];
    format.copy_from_slice(&bytes[..3]);
    Ok(Value::Verbatim {
        format,
        data: bytes[4..].to_vec(),
    })
}

/// The streaming-aggregate end sentinel: a `.` frame with an empty body.
fn is_end_sentinel(line: &[u8]) -> bool {
    line == b"."
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Transport;
    use std::io::{self, Read, Write};
    use std::time::Duration;

    struct ByteFeed {
        remaining: std::collections::VecDeque<u8>,
    }

    impl ByteFeed {
        fn new(bytes: &[u8]) -> Self {
            Self {
                remaining: bytes.iter().copied().collect(),
            }
        }
    }

    impl Read for ByteFeed {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining.is_empty() {
                return Ok(0);
            }
            let n = buf.len().min(self.remaining.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.remaining.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for ByteFeed {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Transport for ByteFeed {
        fn set_read_timeout(&self, _timeout: Option<Duration>) -> Result<()> {
            Ok(())
        }
        fn set_write_timeout(&self, _timeout: Option<Duration>) -> Result<()> {
            Ok(())
        }
        fn set_nodelay(&self, _nodelay: bool) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) {}
    }

    fn stream(bytes: &[u8]) -> BufferedStream {
        BufferedStream::new(Box::new(ByteFeed::new(bytes)), None, None).unwrap()
    }

    #[test]
    fn decodes_simple_string() {
        let mut s = stream(b"+PONG\r\n");
        assert_eq!(decode(&mut s).unwrap(), Value::SimpleString("PONG".into()));
    }

    #[test]
    fn decodes_null_bulk_distinct_from_empty() {
        let mut s = stream(b"$-1\r\n$0\r\n\r\n");
        assert_eq!(decode(&mut s).unwrap(), Value::Bulk(None));
        assert_eq!(decode(&mut s).unwrap(), Value::Bulk(Some(Vec::new())));
    }

    #[test]
    fn decodes_command_error_with_code_prefix() {
        let mut s = stream(b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n");
        match decode(&mut s).unwrap() {
            Value::CommandError { code, message } => {
                assert_eq!(code, "WRONGTYPE");
                assert_eq!(message, "Operation against a key holding the wrong kind of value");
            }
            other => panic!("expected a command error, got {other:?}"),
        }
    }

    #[test]
    fn decodes_blob_error() {
        let mut s = stream(b"!21\r\nSYNTAX invalid args\r\n");
        match decode(&mut s).unwrap() {
            Value::CommandError { code, message } => {
                assert_eq!(code, "SYNTAX");
                assert_eq!(message, "invalid args");
            }
            other => panic!("expected a command error, got {other:?}"),
        }
    }

    #[test]
    fn decodes_nested_array() {
        let mut s = stream(b"*2\r\n:1\r\n*-1\r\n");
        assert_eq!(
            decode(&mut s).unwrap(),
            Value::Array(Some(vec![Value::Integer(1), Value::Array(None)]))
        );
    }

    #[test]
    fn decodes_doubles_including_special_values() {
        let mut s = stream(b",3.14\r\n,inf\r\n,-inf\r\n,nan\r\n");
        assert_eq!(decode(&mut s).unwrap(), Value::Double(3.14));
        assert_eq!(decode(&mut s).unwrap(), Value::Double(f64::INFINITY));
        assert_eq!(decode(&mut s).unwrap(), Value::Double(f64::NEG_INFINITY));
        assert!(matches!(decode(&mut s).unwrap(), Value::Double(n) if n.is_nan()));
    }

    #[test]
    fn decodes_booleans_and_big_numbers() {
        let mut s = stream(b"#t\r\n#f\r\n(3492890328409238509324850943850943825024385\r\n");
        assert_eq!(decode(&mut s).unwrap(), Value::Boolean(true));
        assert_eq!(decode(&mut s).unwrap(), Value::Boolean(false));
        assert_eq!(
            decode(&mut s).unwrap(),
            Value::BigNumber("3492890328409238509324850943850943825024385".into())
        );
    }

    #[test]
    fn decodes_verbatim_string() {
        let mut s = stream(b"=15\r\ntxt:Some string\r\n");
        assert_eq!(
            decode(&mut s).unwrap(),
            Value::Verbatim {
                format: *b"txt",
                data: b"Some string".to_vec(),
            }
        );
    }

    #[test]
    fn decodes_map_and_set() {
        let mut s = stream(b"%2\r\n+a\r\n:1\r\n+b\r\n:2\r\n~2\r\n:1\r\n:2\r\n");
        assert_eq!(
            decode(&mut s).unwrap(),
            Value::Map(vec![
                (Value::SimpleString("a".into()), Value::Integer(1)),
                (Value::SimpleString("b".into()), Value::Integer(2)),
            ])
        );
        assert_eq!(
            decode(&mut s).unwrap(),
            Value::Set(vec![Value::Integer(1), Value::Integer(2)])
        );
    }

    #[test]
    fn attribute_prefix_is_transparent_modulo_metadata() {
        let mut plain = stream(b"$5\r\nhello\r\n");
        let plain_value = decode(&mut plain).unwrap();

        let mut attributed = stream(b"|1\r\n+ttl\r\n:10\r\n$5\r\nhello\r\n");
        let attributed_value = decode(&mut attributed).unwrap();
        match &attributed_value {
            Value::WithAttributes { attributes, .. } => assert_eq!(attributes.len(), 1),
            other => panic!("expected attributes, got {other:?}"),
        }
        assert_eq!(attributed_value.into_inner(), plain_value);
    }

    #[test]
    fn streaming_bulk_concatenates_chunks_like_a_single_bulk() {
        let mut chunked = stream(b"$?\r\n;4\r\nHell\r\n;1\r\no\r\n;0\r\n");
        let mut plain = stream(b"$5\r\nHello\r\n");
        assert_eq!(decode(&mut chunked).unwrap(), decode(&mut plain).unwrap());
    }

    #[test]
    fn streaming_array_terminates_on_end_sentinel() {
        let mut s = stream(b"*?\r\n:1\r\n:2\r\n:3\r\n.\r\n");
        assert_eq!(
            decode(&mut s).unwrap(),
            Value::Array(Some(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]))
        );
    }

    #[test]
    fn unknown_type_byte_is_a_connection_error() {
        let mut s = stream(b"^nope\r\n");
        let err = decode(&mut s).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Connection);
    }

    #[test]
    fn encode_command_serializes_bulk_array() {
        let mut buf = Vec::new();
        encode_command(&mut buf, ["SET", "k", "v"]);
        assert_eq!(buf, b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n");
    }

    #[test]
    fn encode_command_concatenates_into_one_pipeline_payload() {
        let mut buf = Vec::new();
        encode_command(&mut buf, ["PING"]);
        encode_command(&mut buf, ["PING"]);
        assert_eq!(buf, b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n");
    }

    #[test]
    fn push_frame_decodes_as_tagged_array() {
        let mut s = stream(b">2\r\n+message\r\n+hello\r\n");
        assert_eq!(
            decode(&mut s).unwrap(),
            Value::Push(vec![
                Value::SimpleString("message".into()),
                Value::SimpleString("hello".into()),
            ])
        );
    }
}
