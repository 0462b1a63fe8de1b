//! Worker pool: the per-descriptor handling step
//!
//! Workers pull ready descriptors off the bounded queue and run the same
//! loop: take the session out of the table (or create one), make sure it
//! has a buffer, do one non-blocking read, hand the buffered bytes to the
//! serve callback, then either re-arm the descriptor or tear the
//! connection down. Errors never leave this module — a bad connection is
//! closed and the worker keeps going.

use std::io::ErrorKind;
use std::os::fd::RawFd;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use tracing::{trace, warn};

use crate::engine::pool::{BufferPool, SessionPool};
use crate::engine::session::Session;
use crate::engine::sys::Epoll;
use crate::engine::table::SessionTable;
use crate::engine::{Conn, EngineConfig, ServeFn, ServeOutcome, sys};

/// State shared by the reactor and every worker.
pub(crate) struct Shared {
    pub(crate) epoll: Epoll,
    pub(crate) table: SessionTable,
    pub(crate) sessions: SessionPool,
    pub(crate) buffers: BufferPool,
}

impl Shared {
    pub(crate) fn new(epoll: Epoll, config: &EngineConfig) -> Self {
        // table slots beyond the descriptor limit can never be used
        let capacity = sys::max_open_files().min(1 << 20);
        Self {
            epoll,
            table: SessionTable::new(capacity),
            sessions: SessionPool::new(),
            buffers: BufferPool::new(config.max_raw_size),
        }
    }
}

pub(crate) fn spawn(shared: &Arc<Shared>, jobs: Receiver<RawFd>, serve: Arc<ServeFn>, count: usize) {
    for i in 0..count {
        let shared = Arc::clone(shared);
        let jobs = jobs.clone();
        let serve = Arc::clone(&serve);
        let spawned = std::thread::Builder::new()
            .name(format!("pike-worker-{i}"))
            .spawn(move || worker_loop(&shared, &jobs, &*serve));
        if let Err(e) = spawned {
            warn!(cause = %e, "failed to spawn worker thread");
        }
    }
}

fn worker_loop(shared: &Shared, jobs: &Receiver<RawFd>, serve: &ServeFn) {
    while let Ok(fd) = jobs.recv() {
        handle_ready(shared, serve, fd);
    }
}

/// Handles one readiness notification for `fd`. The one-shot discipline
/// guarantees exclusive access to the descriptor's session until re-arm.
fn handle_ready(shared: &Shared, serve: &ServeFn, fd: RawFd) {
    let mut session = match shared.table.take(fd) {
        Some(session) => session,
        None => {
            let mut session = shared.sessions.acquire();
            session.bind(fd);
            session
        }
    };

    // buffers are attached lazily so idle keep-alive connections hold none
    if !session.has_buffer() {
        session.attach_buffer(shared.buffers.acquire());
    }

    let n = match sys::read(fd, session.read_slot()) {
        Ok(0) => {
            trace!(fd, "connection eof");
            return teardown(shared, session, fd);
        }
        Ok(n) => n,
        Err(e) if e.kind() == ErrorKind::WouldBlock => {
            // spurious readiness, wait for the next notification
            shared.table.put(fd, session);
            rearm(shared, fd);
            return;
        }
        Err(e) => {
            trace!(fd, cause = %e, "read failed");
            return teardown(shared, session, fd);
        }
    };
    session.advance(n);

    let conn = Conn::new(fd, &shared.buffers);
    match serve(&conn, &mut session) {
        ServeOutcome::Drained => {
            // connection idle: no partial request pending, free the buffer
            if let Some(buffer) = session.detach_buffer() {
                shared.buffers.release(buffer);
            }
        }
        ServeOutcome::Partial => {
            if session.is_full() {
                // the buffered prefix can never become a complete request
                trace!(fd, "request exceeds buffer capacity");
                return teardown(shared, session, fd);
            }
        }
        ServeOutcome::Close => {
            return teardown(shared, session, fd);
        }
    }

    shared.table.put(fd, session);
    rearm(shared, fd);
}

/// Closes the connection and returns its resources to the pools. The
/// table slot is already empty (the session was taken at step entry).
fn teardown(shared: &Shared, mut session: Box<Session>, fd: RawFd) {
    if let Some(buffer) = session.detach_buffer() {
        shared.buffers.release(buffer);
    }
    shared.sessions.release(session);
    sys::close(fd);
    trace!(fd, "connection closed");
}

fn rearm(shared: &Shared, fd: RawFd) {
    if let Err(e) = shared.epoll.rearm(fd) {
        warn!(fd, cause = %e, "re-arm failed, closing connection");
        if let Some(session) = shared.table.take(fd) {
            teardown(shared, session, fd);
        }
    }
}
