//! Allocation-free response assembly
//!
//! The engine itself never interprets status codes or headers; handlers
//! build the wire bytes through these helpers into a pooled output buffer
//! which is then written to the socket in one syscall.

/// Status line text for the supported status codes. Codes outside the
/// table fall back to 500.
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Internal Server Error",
    }
}

fn known_code(code: u16) -> u16 {
    match code {
        100 | 101 | 200 | 201 | 202 | 204 | 301 | 302 | 304 | 400 | 401 | 403 | 404 | 405 | 408 | 413 | 500 | 501
        | 502 | 503 | 504 => code,
        _ => 500,
    }
}

/// Writes the decimal representation of `n` into `dst`, returning the
/// number of bytes written. `dst` must have room for 20 digits.
pub fn write_uint(dst: &mut [u8], mut n: u64) -> usize {
    if n == 0 {
        dst[0] = b'0';
        return 1;
    }

    let mut tmp = [0u8; 20];
    let mut at = tmp.len();
    while n > 0 {
        at -= 1;
        tmp[at] = (n % 10) as u8 + b'0';
        n /= 10;
    }

    let digits = &tmp[at..];
    dst[..digits.len()].copy_from_slice(digits);
    digits.len()
}

#[inline]
fn put(dst: &mut [u8], at: usize, bytes: &[u8]) -> usize {
    dst[at..at + bytes.len()].copy_from_slice(bytes);
    at + bytes.len()
}

/// Assembles a full HTTP/1.1 response into `dst`, returning the byte count:
/// status line, the given header lines, a blank line, then the body.
///
/// The destination buffer is a pooled output buffer sized at the maximum
/// raw message size; callers keep header values and bodies within it.
pub fn build_response(code: u16, headers: &[(&[u8], &[u8])], body: &[u8], dst: &mut [u8]) -> usize {
    let code = known_code(code);

    let mut at = put(dst, 0, b"HTTP/1.1 ");
    at += write_uint(&mut dst[at..], code as u64);
    at = put(dst, at, b" ");
    at = put(dst, at, reason_phrase(code).as_bytes());
    at = put(dst, at, b"\r\n");

    for (key, value) in headers {
        at = put(dst, at, key);
        at = put(dst, at, b": ");
        at = put(dst, at, value);
        at = put(dst, at, b"\r\n");
    }

    at = put(dst, at, b"\r\n");
    if !body.is_empty() {
        at = put(dst, at, body);
    }

    at
}
