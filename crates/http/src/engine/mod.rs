//! Connection reactor, worker pool and session arena
//!
//! The engine owns the listening socket, the epoll instance, the
//! descriptor-indexed session table and the session/buffer pools. User
//! code supplies a serve callback that is invoked from worker threads
//! after every successful read; everything else — accept, readiness
//! fan-out, buffer lifecycle, one-shot re-arm, teardown — happens here.

pub mod pool;
pub mod reactor;
pub mod session;
pub(crate) mod sys;
pub(crate) mod table;
pub(crate) mod worker;

use std::fmt;
use std::io;
use std::os::fd::RawFd;

pub use pool::{BufferPool, SessionPool};
pub use reactor::Reactor;
pub use session::Session;

use crate::protocol::{EngineError, MAX_RAW_SIZE};

/// Listen backlog used when none is configured.
pub const DEFAULT_BACKLOG: i32 = 16;

/// Capacity of the ready-descriptor queue between the reactor and the
/// workers. The reactor blocks on a full queue (backpressure, no drops).
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Engine sizing knobs. Everything is a plain parameter; there is no
/// configuration file.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Capacity of every session buffer and the hard cap on one raw
    /// request. Must fit in `u16` offsets, so at most 65,535.
    pub max_raw_size: usize,
    /// Listen backlog.
    pub backlog: i32,
    /// Worker thread count; defaults to the number of available cores.
    pub workers: Option<usize>,
    /// Ready-descriptor queue capacity.
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_raw_size: MAX_RAW_SIZE, backlog: DEFAULT_BACKLOG, workers: None, queue_capacity: DEFAULT_QUEUE_CAPACITY }
    }
}

impl EngineConfig {
    pub(crate) fn validate(&self) -> Result<(), EngineError> {
        if self.max_raw_size == 0 || self.max_raw_size > MAX_RAW_SIZE {
            return Err(EngineError::invalid_config(format!(
                "max_raw_size {} outside 1..={MAX_RAW_SIZE}",
                self.max_raw_size
            )));
        }
        if self.queue_capacity == 0 {
            return Err(EngineError::invalid_config("queue_capacity must be non-zero"));
        }
        Ok(())
    }

    pub(crate) fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1)
    }
}

/// What the serve callback tells the worker about the connection after a
/// read has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    /// Every buffered request was consumed; the buffer may go back to the
    /// pool until the connection has data again.
    Drained,
    /// A partial request remains buffered; keep the buffer and wait for
    /// the next read.
    Partial,
    /// The connection is beyond saving (malformed request); tear it down.
    Close,
}

/// Write access to a connection, handed to the serve callback.
///
/// Responses are assembled in a buffer borrowed from the shared pool and
/// written to the socket in one syscall.
pub struct Conn<'a> {
    fd: RawFd,
    buffers: &'a BufferPool,
}

impl<'a> Conn<'a> {
    pub(crate) fn new(fd: RawFd, buffers: &'a BufferPool) -> Self {
        Self { fd, buffers }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Borrows a pooled output buffer, lets `build` fill it, writes the
    /// filled prefix to the socket and returns the buffer to the pool.
    pub fn write_with<F>(&self, build: F) -> io::Result<usize>
    where
        F: FnOnce(&mut [u8]) -> usize,
    {
        let mut buffer = self.buffers.acquire();
        let len = build(&mut buffer);
        let result = sys::write(self.fd, &buffer[..len]);
        self.buffers.release(buffer);
        result
    }
}

impl fmt::Debug for Conn<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn").field("fd", &self.fd).finish()
    }
}

/// The per-readiness serve callback: runs on a worker thread with
/// exclusive access to the connection's session.
pub type ServeFn = dyn Fn(&Conn<'_>, &mut Session) -> ServeOutcome + Send + Sync;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_rejects_oversized_buffer() {
        let config = EngineConfig { max_raw_size: MAX_RAW_SIZE + 1, ..Default::default() };
        assert!(config.validate().is_err());
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn worker_count_override() {
        let config = EngineConfig { workers: Some(3), ..Default::default() };
        assert_eq!(config.worker_count(), 3);

        let config = EngineConfig { workers: Some(0), ..Default::default() };
        assert_eq!(config.worker_count(), 1);
    }
}
