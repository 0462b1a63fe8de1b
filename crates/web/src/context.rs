//! Per-request handler context
//!
//! A [`Context`] wraps one parsed request on one connection for the
//! duration of the handler chain. The request side is read-only views into
//! the connection's buffer; the response side accumulates a status and
//! headers until [`Context::send`] assembles the wire bytes and writes them
//! in one syscall.

use std::io;

use pike_http::engine::{Conn, Session};
use pike_http::protocol::response::{build_response, write_uint};

/// A boxed handler. Middleware and endpoints share this shape; middleware
/// is expected to call [`Context::next`], endpoints usually are not.
pub type Handler = Box<dyn Fn(&mut Context<'_>) + Send + Sync>;

pub struct Context<'a> {
    conn: &'a Conn<'a>,
    session: &'a Session,
    chain: &'a [Handler],
    next_at: usize,
    endpoint: Option<&'a Handler>,
    status: u16,
    headers: Vec<(Box<[u8]>, Box<[u8]>)>,
    sent: bool,
    write_failed: bool,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        conn: &'a Conn<'a>,
        session: &'a Session,
        chain: &'a [Handler],
        endpoint: &'a Handler,
    ) -> Self {
        Self {
            conn,
            session,
            chain,
            next_at: 0,
            endpoint: Some(endpoint),
            status: 200,
            headers: Vec::new(),
            sent: false,
            write_failed: false,
        }
    }

    /// Runs the next middleware in the chain, or the endpoint once the
    /// chain is exhausted. Calling it again after the endpoint ran does
    /// nothing.
    pub fn next(&mut self) {
        if self.next_at < self.chain.len() {
            let handler = &self.chain[self.next_at];
            self.next_at += 1;
            handler(self);
        } else if let Some(endpoint) = self.endpoint.take() {
            endpoint(self);
        }
    }

    pub fn method(&self) -> &[u8] {
        self.session.method_bytes()
    }

    pub fn path(&self) -> &[u8] {
        self.session.path_bytes()
    }

    pub fn protocol(&self) -> &[u8] {
        self.session.protocol_bytes()
    }

    pub fn body(&self) -> &[u8] {
        self.session.body_bytes()
    }

    /// The raw query string (bytes after `?`), empty if none.
    pub fn raw_query(&self) -> &[u8] {
        self.session.query_bytes()
    }

    /// All request headers as `(key, value)` byte pairs.
    pub fn headers(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.session.headers()
    }

    /// All bound path parameters as `(name, value)` byte pairs.
    pub fn params(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.session.params()
    }

    /// Request header lookup, case-insensitive on the key.
    pub fn request_header(&self, key: &[u8]) -> Option<&[u8]> {
        self.session.header(key)
    }

    /// Bound path parameter, e.g. `id` for a route `/users/:id`.
    pub fn param(&self, key: &[u8]) -> Option<&[u8]> {
        self.session.param(key)
    }

    /// Query string parameter. The raw query is scanned on demand; a key
    /// present without `=` yields an empty value. No percent-decoding.
    pub fn query(&self, key: &[u8]) -> Option<&[u8]> {
        query_param(self.session.query_bytes(), key)
    }

    /// Sets the response status. Defaults to 200.
    pub fn set_status(&mut self, code: u16) {
        self.status = code;
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Adds a response header line. `Content-Length` is emitted
    /// automatically by [`Context::send`] and must not be set here.
    pub fn set_header(&mut self, key: &[u8], value: &[u8]) {
        debug_assert!(!key.eq_ignore_ascii_case(b"content-length"));
        self.headers.push((Box::from(key), Box::from(value)));
    }

    /// Assembles status line, headers, `Content-Length` and body, and
    /// writes the response to the connection in one syscall.
    pub fn send(&mut self, body: &[u8]) -> io::Result<()> {
        let mut length = [0u8; 20];
        let digits = write_uint(&mut length, body.len() as u64);

        let mut headers: Vec<(&[u8], &[u8])> =
            self.headers.iter().map(|(k, v)| (&**k, &**v)).collect();
        headers.push((b"Content-Length", &length[..digits]));

        let status = self.status;
        let result = self.conn.write_with(|out| build_response(status, &headers, body, out));

        self.sent = true;
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                self.write_failed = true;
                Err(e)
            }
        }
    }

    /// Shorthand for a status-only response with an empty body.
    pub fn send_status(&mut self, code: u16) -> io::Result<()> {
        self.set_status(code);
        self.send(b"")
    }

    pub(crate) fn sent(&self) -> bool {
        self.sent
    }

    pub(crate) fn write_failed(&self) -> bool {
        self.write_failed
    }
}

impl std::fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("status", &self.status)
            .field("sent", &self.sent)
            .finish()
    }
}

/// Finds `key` in a raw `k=v&k2=v2` query string.
fn query_param<'q>(raw: &'q [u8], key: &[u8]) -> Option<&'q [u8]> {
    for pair in raw.split(|&b| b == b'&') {
        match pair.iter().position(|&b| b == b'=') {
            Some(i) if &pair[..i] == key => return Some(&pair[i + 1..]),
            None if pair == key => return Some(&[]),
            _ => {}
        }
    }
    None
}
