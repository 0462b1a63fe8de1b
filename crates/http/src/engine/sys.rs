//! Thin safe wrappers over the epoll and socket syscalls the engine uses.

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::os::fd::RawFd;

use socket2::{Domain, Protocol, Socket, Type};

/// A level-triggered epoll instance.
///
/// Connection descriptors are registered with `EPOLLONESHOT`: after a
/// readiness notification is delivered the descriptor is disarmed until
/// [`Epoll::rearm`] re-enables it. The listening socket is registered
/// without oneshot and keeps firing while connections are pending.
pub(crate) struct Epoll {
    fd: RawFd,
}

impl Epoll {
    pub(crate) fn new() -> io::Result<Self> {
        // SAFETY: no pointer arguments.
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd })
    }

    pub(crate) fn register(&self, fd: RawFd, oneshot: bool) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, oneshot)
    }

    /// Re-enables readiness notifications for a oneshot descriptor. Must
    /// only be called after all buffered work for the descriptor is done.
    pub(crate) fn rearm(&self, fd: RawFd) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, true)
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, oneshot: bool) -> io::Result<()> {
        let mut events = libc::EPOLLIN as u32;
        if oneshot {
            events |= libc::EPOLLONESHOT as u32;
        }
        let mut event = libc::epoll_event { events, u64: fd as u64 };
        // SAFETY: `event` is a valid epoll_event for the duration of the call.
        let rc = unsafe { libc::epoll_ctl(self.fd, op, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Blocks until readiness events arrive, filling `events` up to its
    /// capacity. No timeout: the reactor has nothing else to do.
    pub(crate) fn wait(&self, events: &mut Vec<libc::epoll_event>) -> io::Result<usize> {
        events.clear();
        // SAFETY: the pointer/capacity pair describes the exclusively owned
        // spare capacity of `events`.
        let n = unsafe { libc::epoll_wait(self.fd, events.as_mut_ptr(), events.capacity() as libc::c_int, -1) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: the kernel initialized the first `n` entries.
        unsafe { events.set_len(n as usize) };
        Ok(n as usize)
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        close(self.fd);
    }
}

/// Creates the listening socket: bind, listen with an explicit backlog,
/// non-blocking. Failures here are fatal to startup.
pub(crate) fn listener(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// One non-blocking read into `buf`. `Ok(0)` is end-of-stream.
pub(crate) fn read(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    // SAFETY: `buf` is valid writable memory of `buf.len()` bytes.
    let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

/// One write syscall; may write fewer bytes than given.
pub(crate) fn write(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    // SAFETY: `buf` is valid readable memory of `buf.len()` bytes.
    let n = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

pub(crate) fn close(fd: RawFd) {
    // SAFETY: the caller owns the descriptor and does not use it afterwards.
    unsafe {
        libc::close(fd);
    }
}

/// Soft limit on open descriptors; bounds the session table.
pub(crate) fn max_open_files() -> usize {
    let mut rlim = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
    // SAFETY: `rlim` is a valid out-pointer.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut rlim) };
    if rc != 0 {
        return 1024;
    }
    rlim.rlim_cur as usize
}
