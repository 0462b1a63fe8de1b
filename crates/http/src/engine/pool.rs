//! Fixed-size object pools for sessions and buffers
//!
//! Unrelated descriptors release and acquire concurrently, so the
//! free-lists are the only engine resources shared without descriptor
//! partitioning. Both pools grow on demand and keep released objects for
//! reuse; sessions are reset on release so a connection can never observe
//! another connection's data.

use std::fmt;

use parking_lot::Mutex;

use crate::engine::session::Session;

/// Free-list of fixed-capacity read/write buffers.
pub struct BufferPool {
    buffer_size: usize,
    free: Mutex<Vec<Box<[u8]>>>,
}

impl BufferPool {
    pub(crate) fn new(buffer_size: usize) -> Self {
        Self { buffer_size, free: Mutex::new(Vec::new()) }
    }

    pub(crate) fn acquire(&self) -> Box<[u8]> {
        match self.free.lock().pop() {
            Some(buffer) => buffer,
            None => vec![0u8; self.buffer_size].into_boxed_slice(),
        }
    }

    pub(crate) fn release(&self, buffer: Box<[u8]>) {
        debug_assert_eq!(buffer.len(), self.buffer_size);
        self.free.lock().push(buffer);
    }

    /// Buffers currently sitting in the free-list.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool").field("buffer_size", &self.buffer_size).field("idle", &self.idle()).finish()
    }
}

/// Free-list of sessions. Release resets the session first.
pub struct SessionPool {
    free: Mutex<Vec<Box<Session>>>,
}

impl SessionPool {
    pub(crate) fn new() -> Self {
        Self { free: Mutex::new(Vec::new()) }
    }

    pub(crate) fn acquire(&self) -> Box<Session> {
        match self.free.lock().pop() {
            Some(session) => session,
            None => Box::new(Session::new()),
        }
    }

    pub(crate) fn release(&self, mut session: Box<Session>) {
        debug_assert!(!session.has_buffer(), "buffer must be returned to its own pool first");
        session.reset();
        self.free.lock().push(session);
    }

    /// Sessions currently sitting in the free-list.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }
}

impl fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPool").field("idle", &self.idle()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_reused() {
        let pool = BufferPool::new(64);
        assert_eq!(pool.idle(), 0);

        let a = pool.acquire();
        let b = pool.acquire();
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.idle(), 2);

        let _c = pool.acquire();
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn teardown_cycle_leaks_nothing() {
        let buffers = BufferPool::new(64);
        let sessions = SessionPool::new();

        // prime the free-lists
        buffers.release(buffers.acquire());
        sessions.release(sessions.acquire());
        let (buffers_idle, sessions_idle) = (buffers.idle(), sessions.idle());

        // a connection's life: acquire, use, tear down
        let mut session = sessions.acquire();
        session.bind(7);
        session.attach_buffer(buffers.acquire());
        session.append_for_test(b"garbage that never completes");

        if let Some(buffer) = session.detach_buffer() {
            buffers.release(buffer);
        }
        sessions.release(session);

        assert_eq!(buffers.idle(), buffers_idle);
        assert_eq!(sessions.idle(), sessions_idle);
    }

    #[test]
    fn released_session_is_reset() {
        let sessions = SessionPool::new();

        let mut session = sessions.acquire();
        session.bind(3);
        sessions.release(session);

        let session = sessions.acquire();
        assert_eq!(session.fd(), -1);
        assert_eq!(session.filled(), 0);
        assert_eq!(session.request().header_count, 0);
    }
}
