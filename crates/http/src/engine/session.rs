//! Per-connection session arena
//!
//! A [`Session`] is the only per-connection state the engine keeps: the
//! descriptor it is bound to, an optionally attached pooled read buffer, the
//! count of valid bytes in it, and the parsed-request scratch (header and
//! parameter views plus the [`RawRequest`]) addressing that buffer.
//!
//! The buffer is attached lazily on first read and detached whenever the
//! parser reports the connection idle (no partial request pending), so
//! keep-alive connections that sit quiet do not pin 64 KiB each.

use std::fmt;
use std::os::fd::RawFd;

use crate::protocol::{HeaderView, MAX_HEADER_VIEWS, MAX_PARAMS, ParamBinding, RawRequest, View};

/// Per-connection state: buffer, fill level and in-flight request scratch.
///
/// Exactly one session is bound to a descriptor at any time; one-shot
/// re-arm guarantees at most one worker touches it.
pub struct Session {
    pub(crate) fd: RawFd,
    pub(crate) buffer: Option<Box<[u8]>>,
    pub(crate) filled: usize,
    pub(crate) header_views: [HeaderView; MAX_HEADER_VIEWS],
    pub(crate) params: [Option<ParamBinding>; MAX_PARAMS],
    pub(crate) request: RawRequest,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self {
            fd: -1,
            buffer: None,
            filled: 0,
            header_views: [HeaderView::default(); MAX_HEADER_VIEWS],
            params: std::array::from_fn(|_| None),
            request: RawRequest::default(),
        }
    }

    /// Clears all per-connection state. Called before the session goes back
    /// to its pool so one connection's data can never leak into another's.
    pub(crate) fn reset(&mut self) {
        self.fd = -1;
        self.filled = 0;
        self.request.clear();
        for slot in &mut self.params {
            *slot = None;
        }
    }

    pub(crate) fn bind(&mut self, fd: RawFd) {
        self.fd = fd;
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub(crate) fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    pub(crate) fn attach_buffer(&mut self, buffer: Box<[u8]>) {
        debug_assert!(self.buffer.is_none());
        self.buffer = Some(buffer);
        self.filled = 0;
    }

    pub(crate) fn detach_buffer(&mut self) -> Option<Box<[u8]>> {
        self.filled = 0;
        self.buffer.take()
    }

    /// The writable region for the next read: `buffer[filled..]`.
    pub(crate) fn read_slot(&mut self) -> &mut [u8] {
        match &mut self.buffer {
            Some(buf) => &mut buf[self.filled..],
            None => &mut [],
        }
    }

    pub(crate) fn advance(&mut self, n: usize) {
        self.filled += n;
        debug_assert!(self.buffer.as_ref().is_some_and(|buf| self.filled <= buf.len()));
    }

    /// True when the buffer holds `filled == capacity` bytes; with a still
    /// incomplete request pending this is the overflow condition.
    pub(crate) fn is_full(&self) -> bool {
        self.buffer.as_ref().is_some_and(|buf| self.filled == buf.len())
    }

    /// Compacts the unconsumed tail to offset zero after a completed
    /// request and clears the request scratch for the next parse.
    pub(crate) fn finish_request(&mut self, consumed: usize) {
        debug_assert!(consumed <= self.filled);
        if consumed < self.filled {
            if let Some(buf) = &mut self.buffer {
                buf.copy_within(consumed..self.filled, 0);
            }
        }
        self.filled -= consumed;
        self.request.clear();
        for slot in &mut self.params {
            *slot = None;
        }
    }

    /// Number of valid bytes currently buffered.
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// The valid buffered bytes, if a buffer is attached.
    pub fn buffer(&self) -> Option<&[u8]> {
        self.buffer.as_deref()
    }

    pub fn request(&self) -> &RawRequest {
        &self.request
    }

    #[inline]
    fn resolve(&self, view: View) -> &[u8] {
        match &self.buffer {
            Some(buf) => view.slice(buf),
            None => &[],
        }
    }

    pub fn method_bytes(&self) -> &[u8] {
        self.resolve(self.request.method)
    }

    pub fn path_bytes(&self) -> &[u8] {
        self.resolve(self.request.path)
    }

    pub fn protocol_bytes(&self) -> &[u8] {
        self.resolve(self.request.protocol)
    }

    /// The raw query string (bytes after `?`), empty if none.
    pub fn query_bytes(&self) -> &[u8] {
        self.resolve(self.request.raw_query)
    }

    pub fn body_bytes(&self) -> &[u8] {
        self.resolve(self.request.body)
    }

    /// Stored header views resolved as `(key, value)` byte pairs.
    pub fn headers(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.header_views[..self.request.header_count as usize]
            .iter()
            .map(|h| (self.resolve(h.key), self.resolve(h.value)))
    }

    /// Looks up a request header, comparing keys case-insensitively.
    pub fn header(&self, key: &[u8]) -> Option<&[u8]> {
        self.header_views[..self.request.header_count as usize]
            .iter()
            .find(|h| self.resolve(h.key).eq_ignore_ascii_case(key))
            .map(|h| self.resolve(h.value))
    }

    /// Bound path parameters as `(name, value)` byte pairs.
    pub fn params(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.params[..self.request.param_count as usize].iter().flatten().map(|p| (&*p.key, self.resolve(p.value)))
    }

    /// Looks up a bound path parameter by name.
    pub fn param(&self, key: &[u8]) -> Option<&[u8]> {
        self.params[..self.request.param_count as usize]
            .iter()
            .flatten()
            .find(|p| &*p.key == key)
            .map(|p| self.resolve(p.value))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("fd", &self.fd)
            .field("filled", &self.filled)
            .field("buffered", &self.buffer.is_some())
            .finish()
    }
}

#[cfg(test)]
impl Session {
    pub(crate) fn with_test_buffer(capacity: usize) -> Self {
        let mut session = Self::new();
        session.attach_buffer(vec![0u8; capacity].into_boxed_slice());
        session
    }

    pub(crate) fn append_for_test(&mut self, bytes: &[u8]) {
        let slot = self.read_slot();
        slot[..bytes.len()].copy_from_slice(bytes);
        self.advance(bytes.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn reset_clears_request_state() {
        let mut session = Session::with_test_buffer(128);
        session.bind(9);
        session.append_for_test(b"GET / HTTP/1.1\r\n\r\n");
        session.request.method = View::new(0, 3);
        session.request.param_count = 1;
        session.params[0] = Some(ParamBinding { key: Arc::from(&b"id"[..]), value: View::new(4, 5) });

        session.reset();

        assert_eq!(session.fd(), -1);
        assert_eq!(session.filled(), 0);
        assert_eq!(session.request().param_count, 0);
        assert!(session.params[0].is_none());
        assert!(session.method_bytes().is_empty());
    }

    #[test]
    fn buffer_attach_detach_cycle() {
        let mut session = Session::new();
        assert!(!session.has_buffer());
        assert!(session.read_slot().is_empty());

        session.attach_buffer(vec![0u8; 64].into_boxed_slice());
        assert!(session.has_buffer());
        assert_eq!(session.read_slot().len(), 64);

        session.append_for_test(b"abc");
        assert_eq!(session.filled(), 3);
        assert_eq!(session.read_slot().len(), 61);

        let buffer = session.detach_buffer().unwrap();
        assert_eq!(buffer.len(), 64);
        assert_eq!(session.filled(), 0);
        assert!(!session.has_buffer());
    }

    #[test]
    fn full_buffer_detected() {
        let mut session = Session::with_test_buffer(4);
        assert!(!session.is_full());
        session.append_for_test(b"abcd");
        assert!(session.is_full());
    }
}
