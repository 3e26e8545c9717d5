/*!
Typed attribute framing for the local service protocols.

A frame is a sequence of `name=value` lines terminated by one empty line.
Names are plain identifiers; values are percent-escaped so newlines, `%`,
and carriage returns survive transport. Both daemons speak this framing on
their client sockets: `scan_attrs` reads one request frame, `print_attrs`
emits one reply frame and flushes.

Frames are bounded (attribute count and line length) so a misbehaving
client cannot grow buffers without limit.
*/

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Name of the attribute that selects the request handler.
pub const ATTR_REQUEST: &str = "request";

/// Upper bound on attributes in one frame.
pub const MAX_FRAME_ATTRS: usize = 64;

/// Upper bound on one encoded `name=value` line, terminator included.
pub const MAX_LINE_BYTES: usize = 8192;

#[derive(Debug, Error)]
pub enum AttrError {
    /// Peer closed the stream at a frame boundary or mid-frame.
    #[error("connection closed")]
    Eof,
    #[error("attribute line exceeds {MAX_LINE_BYTES} bytes")]
    Oversized,
    #[error("frame exceeds {MAX_FRAME_ATTRS} attributes")]
    TooManyAttrs,
    #[error("malformed attribute line {0:?}")]
    Malformed(String),
    #[error("bad escape sequence in {0:?}")]
    BadEscape(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AttrError {
    /// Errors that mean "bad client input", recoverable with a BAD reply.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            AttrError::Oversized
                | AttrError::TooManyAttrs
                | AttrError::Malformed(_)
                | AttrError::BadEscape(_)
        )
    }
}

/// Percent-escape a value for transport.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '\n' => out.push_str("%0A"),
            '\r' => out.push_str("%0D"),
            _ => out.push(ch),
        }
    }
    out
}

fn unescape(encoded: &str) -> Result<String, AttrError> {
    let mut out = String::with_capacity(encoded.len());
    let mut chars = encoded.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        let hi = chars.next();
        let lo = chars.next();
        let (Some(hi), Some(lo)) = (hi, lo) else {
            return Err(AttrError::BadEscape(encoded.to_string()));
        };
        let byte = u8::from_str_radix(&format!("{hi}{lo}"), 16)
            .map_err(|_| AttrError::BadEscape(encoded.to_string()))?;
        out.push(byte as char);
    }
    Ok(out)
}

/// Read one attribute frame from `reader`.
///
/// Returns the attributes in wire order. `AttrError::Eof` means the peer
/// closed the connection; at a frame boundary that is a normal disconnect.
pub async fn scan_attrs<R>(reader: &mut R) -> Result<Vec<(String, String)>, AttrError>
where
    R: AsyncBufRead + Unpin,
{
    let mut attrs = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        // Re-arm the length limit per line so one oversized line cannot
        // make the reader buffer without bound.
        let mut limited = (&mut *reader).take((MAX_LINE_BYTES + 1) as u64);
        let n = match limited.read_line(&mut line).await {
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::InvalidData => {
                return Err(AttrError::Malformed(line));
            }
            Err(err) => return Err(AttrError::Io(err)),
        };
        if n == 0 {
            return Err(AttrError::Eof);
        }
        if n > MAX_LINE_BYTES {
            return Err(AttrError::Oversized);
        }
        let trimmed = line.strip_suffix('\n').unwrap_or(&line);
        let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Ok(attrs);
        }
        if attrs.len() >= MAX_FRAME_ATTRS {
            return Err(AttrError::TooManyAttrs);
        }
        let Some((name, value)) = trimmed.split_once('=') else {
            return Err(AttrError::Malformed(trimmed.to_string()));
        };
        if name.is_empty() {
            return Err(AttrError::Malformed(trimmed.to_string()));
        }
        attrs.push((name.to_string(), unescape(value)?));
    }
}

/// Write one reply frame and flush it.
pub async fn print_attrs<W>(writer: &mut W, attrs: &[(&str, &str)]) -> Result<(), AttrError>
where
    W: AsyncWrite + Unpin,
{
    let mut frame = String::new();
    for (name, value) in attrs {
        frame.push_str(name);
        frame.push('=');
        frame.push_str(&escape(value));
        frame.push('\n');
    }
    frame.push('\n');
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// First value of the named attribute, if present.
pub fn get_attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(n, _)| n.as_str() == name)
        .map(|(_, v)| v.as_str())
}
