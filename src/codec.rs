use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::Frame;
use crate::parser::{parse_frame_slice, unescape_header_value};

/// STOMP 1.2 forbids escaping in the headers of these frames.
fn skips_escaping(command: &str) -> bool {
    command == "CONNECT" || command == "CONNECTED"
}

/// Escape a header name or value for the wire.
///
/// - backslash → `\\`
/// - carriage return → `\r`
/// - line feed → `\n`
/// - colon → `\c`
fn escape_header(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' => result.push_str("\\\\"),
            '\r' => result.push_str("\\r"),
            '\n' => result.push_str("\\n"),
            ':' => result.push_str("\\c"),
            _ => result.push(ch),
        }
    }
    result
}

fn invalid_data(what: &str, err: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("{}: {}", what, err))
}

fn header_text(raw: Vec<u8>, unescape: bool, what: &str) -> io::Result<String> {
    let raw = if unescape {
        unescape_header_value(&raw).map_err(|e| invalid_data(&format!("invalid escape in {}", what), e))?
    } else {
        raw
    };
    String::from_utf8(raw).map_err(|e| invalid_data(&format!("invalid utf8 in {}", what), e))
}

/// Items produced or consumed by the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StompItem {
    /// A decoded STOMP frame (command + headers + body)
    Frame(Frame),
    /// A single heartbeat pulse (EOL)
    Heartbeat,
}

/// `StompCodec` implements `tokio_util::codec::{Decoder, Encoder}` for the
/// STOMP wire protocol.
///
/// Decoding yields `StompItem::Heartbeat` for every bare EOL between frames
/// and `StompItem::Frame` for complete frames, with header escapes resolved.
/// Encoding writes `content-length` automatically when a body contains NUL
/// bytes or is not valid UTF-8.
#[derive(Debug, Default)]
pub struct StompCodec {}

impl StompCodec {
    pub fn new() -> Self {
        Self {}
    }
}

impl Decoder for StompCodec {
    type Item = StompItem;
    type Error = io::Error;

    /// Decode one item from the front of `src`.
    ///
    /// Returns `Ok(None)` and leaves `src` untouched when the buffer does
    /// not yet hold a complete item.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match src.chunk() {
            [b'\n', ..] => {
                src.advance(1);
                return Ok(Some(StompItem::Heartbeat));
            }
            [b'\r', b'\n', ..] => {
                src.advance(2);
                return Ok(Some(StompItem::Heartbeat));
            }
            [b'\r'] => return Ok(None),
            _ => {}
        }

        let raw = match parse_frame_slice(src.chunk()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(None),
            Err(e) => return Err(invalid_data("parse error", e)),
        };
        src.advance(raw.consumed);

        let command =
            String::from_utf8(raw.command).map_err(|e| invalid_data("invalid utf8 in command", e))?;
        let unescape = !skips_escaping(&command);

        let mut headers = Vec::with_capacity(raw.headers.len());
        for (k, v) in raw.headers {
            headers.push((
                header_text(k, unescape, "header key")?,
                header_text(v, unescape, "header value")?,
            ));
        }

        Ok(Some(StompItem::Frame(Frame {
            command,
            headers,
            body: raw.body,
        })))
    }
}

impl Encoder<StompItem> for StompCodec {
    type Error = io::Error;

    /// Append the wire form of `item` to `dst`.
    fn encode(&mut self, item: StompItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let frame = match item {
            StompItem::Heartbeat => {
                dst.put_u8(b'\n');
                return Ok(());
            }
            StompItem::Frame(frame) => frame,
        };

        dst.extend_from_slice(frame.command.as_bytes());
        dst.put_u8(b'\n');

        let escape = !skips_escaping(&frame.command);
        let mut headers = frame.headers;
        let has_length = headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("content-length"));
        if !has_length && (frame.body.contains(&0) || std::str::from_utf8(&frame.body).is_err()) {
            headers.push(("content-length".to_string(), frame.body.len().to_string()));
        }

        for (k, v) in headers {
            if escape {
                dst.extend_from_slice(escape_header(&k).as_bytes());
                dst.put_u8(b':');
                dst.extend_from_slice(escape_header(&v).as_bytes());
            } else {
                dst.extend_from_slice(k.as_bytes());
                dst.put_u8(b':');
                dst.extend_from_slice(v.as_bytes());
            }
            dst.put_u8(b'\n');
        }

        dst.put_u8(b'\n');
        dst.extend_from_slice(&frame.body);
        dst.put_u8(0);
        Ok(())
    }
}
