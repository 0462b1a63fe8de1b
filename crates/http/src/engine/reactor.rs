//! Accept loop and readiness fan-out
//!
//! One reactor thread owns the listening socket and the epoll instance.
//! It accepts new connections, registers them read-ready with one-shot
//! semantics, and pushes already-registered descriptors onto the bounded
//! worker queue as they become ready.

use std::net::SocketAddr;
use std::os::fd::{AsRawFd, IntoRawFd, RawFd};
use std::sync::Arc;

use tracing::{error, info, trace, warn};

use crate::engine::sys::Epoll;
use crate::engine::worker::{self, Shared};
use crate::engine::{EngineConfig, ServeFn, sys};
use crate::protocol::EngineError;

const MAX_EVENTS: usize = 128;

/// The engine entry point: binds, then drives readiness forever.
#[derive(Debug)]
pub struct Reactor {
    listener: std::net::TcpListener,
    local_addr: SocketAddr,
    config: EngineConfig,
}

impl Reactor {
    /// Creates the listening socket. Bind/listen failures are fatal and
    /// surface here; everything after [`Reactor::run`] is contained per
    /// connection.
    pub fn bind(addr: SocketAddr, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let listener = sys::listener(addr, config.backlog)?;
        let local_addr = listener.local_addr()?;
        Ok(Self { listener, local_addr, config })
    }

    /// The actually bound address — useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns the worker pool and blocks forever dispatching readiness.
    ///
    /// A failed readiness wait is logged and retried; a failed accept is
    /// logged and skipped. Neither stops the loop.
    pub fn run(self, serve: Arc<ServeFn>) -> Result<(), EngineError> {
        let Self { listener, local_addr, config } = self;

        let epoll = Epoll::new()?;
        let listen_fd = listener.as_raw_fd();
        epoll.register(listen_fd, false)?;

        let shared = Arc::new(Shared::new(epoll, &config));
        let (jobs_tx, jobs_rx) = crossbeam_channel::bounded::<RawFd>(config.queue_capacity);
        worker::spawn(&shared, jobs_rx, serve, config.worker_count());

        info!(addr = %local_addr, workers = config.worker_count(), "engine listening");

        let mut events: Vec<libc::epoll_event> = Vec::with_capacity(MAX_EVENTS);
        loop {
            if let Err(e) = shared.epoll.wait(&mut events) {
                if e.kind() != std::io::ErrorKind::Interrupted {
                    error!(cause = %e, "readiness wait failed, retrying");
                }
                continue;
            }

            for event in &events {
                let fd = { event.u64 } as RawFd;
                if fd == listen_fd {
                    accept_one(&listener, &shared);
                } else if jobs_tx.send(fd).is_err() {
                    // all workers gone; nothing can make progress anymore
                    error!("worker queue disconnected, stopping reactor");
                    return Ok(());
                }
            }
        }
    }
}

fn accept_one(listener: &std::net::TcpListener, shared: &Shared) {
    let (stream, peer) = match listener.accept() {
        Ok(accepted) => accepted,
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
        Err(e) => {
            warn!(cause = %e, "accept failed");
            return;
        }
    };

    if let Err(e) = stream.set_nonblocking(true) {
        warn!(cause = %e, "failed to set non-blocking, dropping connection");
        return;
    }
    let _ = stream.set_nodelay(true);

    let fd = stream.into_raw_fd();
    if fd as usize >= shared.table.capacity() {
        warn!(fd, "descriptor beyond session table, dropping connection");
        sys::close(fd);
        return;
    }

    if let Err(e) = shared.epoll.register(fd, true) {
        warn!(fd, cause = %e, "failed to register connection");
        sys::close(fd);
        return;
    }
    trace!(fd, peer = %peer, "client connected");
}
