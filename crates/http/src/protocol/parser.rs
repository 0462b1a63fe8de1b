//! Incremental zero-copy HTTP/1.1 request parser
//!
//! The parser is stateless: every call re-scans the session buffer from
//! offset zero and either yields a complete request (as offset views written
//! into the caller's scratch structures) together with the exact number of
//! bytes it covers, or reports that more bytes are needed, or rejects the
//! connection. There is no partial commit — a request whose declared body
//! has not fully arrived consumes nothing.
//!
//! Contract, in the shape of a codec `decode`:
//!
//! - `Ok(Some(consumed))` — one complete request parsed; views in
//!   `request`/`headers` address `raw[..consumed]`
//! - `Ok(None)` — incomplete; wait for the next read
//! - `Err(ParseError)` — malformed; the connection must be closed
//!
//! Pipelined requests are drained one at a time by [`drain`], which invokes
//! a callback per parsed request and then compacts the unconsumed tail to
//! the start of the buffer. A read split mid-request survives the same way:
//! the partial bytes stay at offset zero for the next read to append to.
//!
//! Two policies are fixed here rather than inherited silently:
//!
//! - An unrecognized method token is structurally valid. Rejection is the
//!   router's job (routing miss, connection stays alive), never the
//!   parser's.
//! - A `Content-Length` value must be ASCII digits (surrounding whitespace
//!   tolerated). Any other byte rejects the request.

use crate::engine::Session;
use crate::ensure;
use crate::protocol::{HeaderView, MAX_RAW_SIZE, ParseError, RawRequest, View};

const CONTENT_LENGTH: &[u8] = b"content-length";

#[inline]
fn find(raw: &[u8], from: usize, sep: u8) -> Option<usize> {
    raw[from..].iter().position(|&b| b == sep).map(|i| from + i)
}

#[inline]
fn view(start: usize, end: usize) -> View {
    debug_assert!(end <= MAX_RAW_SIZE);
    View::new(start as u16, end as u16)
}

/// Extracts one complete request from `raw`, if present.
///
/// `raw` must be the valid prefix of a session buffer (`buffer[..filled]`,
/// at most [`MAX_RAW_SIZE`] bytes). Views are written into `request` and the
/// first `headers.len()` header lines into `headers`; headers beyond that
/// capacity are still parsed (`Content-Length` detection included) but not
/// stored.
pub fn parse(raw: &[u8], headers: &mut [HeaderView], request: &mut RawRequest) -> Result<Option<usize>, ParseError> {
    request.clear();

    // method token: bytes up to the first space
    let Some(sep) = find(raw, 0, b' ') else {
        return Ok(None);
    };
    request.method = view(0, sep);
    let mut cursor = sep + 1;

    // path token: bytes up to the next space; `?` is split off lazily by
    // the router, not here
    let Some(sep) = find(raw, cursor, b' ') else {
        return Ok(None);
    };
    request.path = view(cursor, sep);
    cursor = sep + 1;

    // protocol token up to CRLF; a bare LF is malformed
    let Some(lf) = find(raw, cursor, b'\n') else {
        return Ok(None);
    };
    ensure!(lf > cursor && raw[lf - 1] == b'\r', ParseError::BareLf);
    request.protocol = view(cursor, lf - 1);
    cursor = lf + 1;

    // header lines until the bare CRLF
    let mut content_length: usize = 0;
    loop {
        if cursor + 1 >= raw.len() {
            return Ok(None);
        }
        if raw[cursor] == b'\r' && raw[cursor + 1] == b'\n' {
            cursor += 2;
            break;
        }

        let Some(lf) = find(raw, cursor, b'\n') else {
            return Ok(None);
        };
        ensure!(lf > cursor && raw[lf - 1] == b'\r', ParseError::BareLf);
        let line_end = lf - 1;

        let colon = match find(raw, cursor, b':') {
            Some(colon) if colon < line_end => colon,
            _ => return Err(ParseError::HeaderMissingColon),
        };

        let mut value_start = colon + 1;
        while value_start < line_end && raw[value_start] == b' ' {
            value_start += 1;
        }

        let key = view(cursor, colon);
        let value = view(value_start, line_end);

        let stored = request.header_count as usize;
        if stored < headers.len() {
            headers[stored] = HeaderView { key, value };
            request.header_count += 1;
        }

        if key.len() == CONTENT_LENGTH.len() && key.slice(raw).eq_ignore_ascii_case(CONTENT_LENGTH) {
            content_length = parse_content_length(value.slice(raw))?;
        }

        cursor = lf + 1;
    }

    // body: exactly content-length bytes, or nothing
    if content_length > 0 {
        if cursor + content_length > raw.len() {
            return Ok(None);
        }
        request.body = view(cursor, cursor + content_length);
        cursor += content_length;
    }

    Ok(Some(cursor))
}

/// Strict `Content-Length` parsing: trimmed ASCII digits only.
fn parse_content_length(value: &[u8]) -> Result<usize, ParseError> {
    let digits = value.trim_ascii();
    ensure!(!digits.is_empty(), ParseError::InvalidContentLength);

    let mut length: usize = 0;
    for &b in digits {
        ensure!(b.is_ascii_digit(), ParseError::InvalidContentLength);
        length = length
            .checked_mul(10)
            .and_then(|n| n.checked_add((b - b'0') as usize))
            .ok_or(ParseError::InvalidContentLength)?;
    }

    // a body that can never fit in a session buffer will never complete
    ensure!(length <= MAX_RAW_SIZE, ParseError::InvalidContentLength);
    Ok(length)
}

/// Drains every complete request currently buffered on the session.
///
/// For each parsed request the callback runs with the request views intact,
/// then the unconsumed tail is shifted to the start of the buffer and the
/// request scratch is cleared before the next round.
///
/// Returns `Ok(true)` when the buffer ended empty (the caller may release
/// it back to the pool), `Ok(false)` when a partial request remains waiting
/// for more bytes, and `Err` when the connection must be closed.
pub fn drain<F>(session: &mut Session, mut on_request: F) -> Result<bool, ParseError>
where
    F: FnMut(&mut Session, usize),
{
    loop {
        let consumed = {
            let Session { buffer, filled, header_views, request, .. } = session;
            let raw: &[u8] = match buffer {
                Some(buf) => &buf[..*filled],
                None => &[],
            };
            match parse(raw, &mut header_views[..], request)? {
                Some(consumed) => consumed,
                None => return Ok(false),
            }
        };

        on_request(session, consumed);
        session.finish_request(consumed);

        if session.filled() == 0 {
            return Ok(true);
        }
    }
}
