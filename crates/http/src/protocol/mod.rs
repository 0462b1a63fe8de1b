//! Protocol types and parsing
//!
//! The request data model is built around [`View`]: a `(start, end)` offset
//! pair addressing a byte range inside a session's read buffer. Views never
//! own data — they are resolved against a borrowed buffer via
//! [`View::slice`], so the returned `&[u8]` cannot outlive the buffer
//! borrow, and a view can never be read after its buffer has been released.

pub mod error;
pub mod parser;
pub mod response;

use std::sync::Arc;

pub use error::{EngineError, ParseError};

/// Largest raw request (request line + headers + body) a connection may
/// accumulate. Offsets are `u16`, so this is also the hard upper bound for
/// session buffer capacity.
pub const MAX_RAW_SIZE: usize = u16::MAX as usize;

/// Header views stored per request; headers beyond this are parsed but not
/// retained.
pub const MAX_HEADER_VIEWS: usize = 16;

/// Path parameter bindings stored per request; excess bindings are dropped.
pub const MAX_PARAMS: usize = 8;

/// A zero-copy byte range inside an externally owned buffer.
///
/// Invariant: `start <= end <= buffer.len()` for the buffer the view was
/// derived from. A view is only meaningful until that buffer is compacted
/// or released; the parser re-derives all views on every parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct View {
    pub start: u16,
    pub end: u16,
}

impl View {
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    #[inline]
    pub const fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Resolves the view against its owning buffer.
    #[inline]
    pub fn slice<'b>(&self, buf: &'b [u8]) -> &'b [u8] {
        &buf[self.start as usize..self.end as usize]
    }
}

/// A parsed header line as a pair of views into the session buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderView {
    pub key: View,
    pub value: View,
}

/// A bound path parameter.
///
/// The key is the parameter name from the matched router node (shared, not
/// copied — binding a parameter on the lookup path performs no allocation);
/// the value is a view into the session buffer.
#[derive(Debug, Clone)]
pub struct ParamBinding {
    pub key: Arc<[u8]>,
    pub value: View,
}

/// Scratch area for the request currently being served on a connection.
///
/// All views address the owning session's buffer. Cleared after each
/// completed request and on session reset.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawRequest {
    pub method: View,
    pub path: View,
    pub protocol: View,
    /// Everything after `?` in the request target, left unparsed. Query
    /// lookups scan it lazily on demand.
    pub raw_query: View,
    pub body: View,
    pub header_count: u16,
    pub param_count: u16,
}

impl RawRequest {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_resolves_against_buffer() {
        let buf = b"GET /index HTTP/1.1";
        let v = View::new(4, 10);
        assert_eq!(v.slice(buf), b"/index");
        assert_eq!(v.len(), 6);
        assert!(!v.is_empty());
    }

    #[test]
    fn default_view_is_empty() {
        let v = View::default();
        assert!(v.is_empty());
        assert_eq!(v.slice(b"anything"), b"");
    }
}
