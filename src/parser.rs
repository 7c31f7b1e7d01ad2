//! Slice-based STOMP frame parser.
//!
//! The parser works on a borrowed byte slice and never consumes input
//! itself: it reports how many bytes a complete frame occupied so the codec
//! can advance its buffer. Header bytes are returned raw (still escaped).

/// A complete frame lifted out of an input slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub command: Vec<u8>,
    pub headers: Vec<(Vec<u8>, Vec<u8>)>,
    pub body: Vec<u8>,
    /// Number of input bytes the frame occupied, trailing EOL included.
    pub consumed: usize,
}

/// Largest body accepted through `content-length`.
pub const MAX_BODY_LEN: usize = 64 * 1024 * 1024;

/// `Ok(None)` means more input is needed.
pub type ParseResult = Result<Option<RawFrame>, String>;

fn content_length(headers: &[(Vec<u8>, Vec<u8>)]) -> Result<Option<usize>, String> {
    let Some((_, v)) = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(b"content-length"))
    else {
        return Ok(None);
    };
    let s = std::str::from_utf8(v).map_err(|e| format!("content-length not utf8: {}", e))?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err("empty content-length".to_string());
    }
    trimmed
        .parse::<usize>()
        .map(Some)
        .map_err(|e| format!("invalid content-length '{}': {}", trimmed, e))
}

/// Read one line ending in LF (optionally CRLF) starting at `pos`.
/// Returns the line without its terminator and the position after it.
fn line_at(input: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    let end = input[pos..].iter().position(|&b| b == b'\n')?;
    let mut line = &input[pos..pos + end];
    if let Some((&b'\r', rest)) = line.split_last() {
        line = rest;
    }
    Some((line, pos + end + 1))
}

/// Skip the single optional EOL that may follow a frame's NUL.
fn skip_trailing_eol(input: &[u8], mut pos: usize) -> usize {
    if input.get(pos) == Some(&b'\r') && input.get(pos + 1) == Some(&b'\n') {
        pos += 2;
    } else if input.get(pos) == Some(&b'\n') {
        pos += 1;
    }
    pos
}

/// Parse a single STOMP frame from the start of `input`.
///
/// Leading EOLs are skipped (heartbeats are normally peeled off by the
/// codec before this is called). Bodies are delimited by `content-length`
/// when present, otherwise by the first NUL byte.
pub fn parse_frame_slice(input: &[u8]) -> ParseResult {
    let mut pos = 0usize;
    while pos < input.len() && (input[pos] == b'\n' || input[pos] == b'\r') {
        pos += 1;
    }
    if pos == input.len() {
        return Ok(None);
    }

    let Some((command, next)) = line_at(input, pos) else {
        return Ok(None);
    };
    if command.is_empty() {
        return Err("empty command line".to_string());
    }
    let command = command.to_vec();
    pos = next;

    let mut headers: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
    loop {
        let Some((line, next)) = line_at(input, pos) else {
            return Ok(None);
        };
        pos = next;
        if line.is_empty() {
            break;
        }
        let Some(colon) = line.iter().position(|&b| b == b':') else {
            return Err(format!(
                "malformed header line: {:?}",
                String::from_utf8_lossy(line)
            ));
        };
        headers.push((line[..colon].to_vec(), line[colon + 1..].to_vec()));
    }

    let body = match content_length(&headers)? {
        Some(len) => {
            if len > MAX_BODY_LEN {
                return Err(format!(
                    "content-length {} exceeds the {} byte limit",
                    len, MAX_BODY_LEN
                ));
            }
            let end = pos + len;
            if end + 1 > input.len() {
                return Ok(None);
            }
            if input[end] != 0 {
                return Err("missing NUL terminator after content-length body".to_string());
            }
            let body = input[pos..end].to_vec();
            pos = end + 1;
            body
        }
        None => {
            let Some(nul) = input[pos..].iter().position(|&b| b == 0) else {
                return Ok(None);
            };
            let body = input[pos..pos + nul].to_vec();
            pos += nul + 1;
            body
        }
    };

    Ok(Some(RawFrame {
        command,
        headers,
        body,
        consumed: skip_trailing_eol(input, pos),
    }))
}

/// Decode the STOMP 1.2 header escapes `\\`, `\n`, `\r` and `\c`.
///
/// Any other escape sequence, or a trailing lone backslash, is an error.
pub fn unescape_header_value(input: &[u8]) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(input.len());
    let mut bytes = input.iter();
    while let Some(&b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(b'\\') => out.push(b'\\'),
            Some(b'n') => out.push(b'\n'),
            Some(b'r') => out.push(b'\r'),
            Some(b'c') => out.push(b':'),
            Some(other) => return Err(format!("undefined escape sequence \\{}", *other as char)),
            None => return Err("dangling backslash at end of header".to_string()),
        }
    }
    Ok(out)
}
