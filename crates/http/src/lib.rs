//! A non-blocking HTTP/1.1 server engine
//!
//! This crate implements the request-serving hot path of a single-process
//! HTTP server: an epoll reactor with one-shot re-arm, a fixed worker pool,
//! a pooled per-connection buffer arena, an incremental zero-copy request
//! parser, and a radix-tree router.
//!
//! # Design
//!
//! Every connection owns at most one [`engine::Session`]: a pooled byte
//! buffer plus a scratch [`protocol::RawRequest`] whose fields are
//! [`protocol::View`] offset pairs into that buffer. No request data is
//! copied out of the read buffer; headers, path and body are addressed by
//! `(start, end)` offsets and resolved against the buffer on demand.
//!
//! Readiness is delivered level-triggered with `EPOLLONESHOT`: a descriptor
//! produces no further notifications until the worker that handled the
//! previous one explicitly re-arms it. That discipline is the only
//! serialization mechanism between workers; no per-connection lock is held
//! during I/O.
//!
//! # Modules
//!
//! - [`engine`]: reactor, worker pool, session arena, pools
//! - [`protocol`]: request views, parser, response builder
//! - [`router`]: radix-tree method+path routing with path parameters
//!
//! # Limitations
//!
//! - HTTP/1.1 only, fixed-length bodies only (no chunked encoding,
//!   no trailers, no expect-continue)
//! - No TLS (use a reverse proxy for HTTPS)
//! - No idle timeouts: a stalled client holds its session until it
//!   closes or overflows the request buffer
//! - Maximum raw request size: 65,535 bytes (offsets are `u16`)

pub mod engine;
pub mod protocol;
pub mod router;

mod utils;
pub(crate) use utils::ensure;
