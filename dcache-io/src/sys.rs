//! # Syscall Layer
//!
//! Purpose: Keep every `unsafe` libc call behind thin wrappers so the rest
//! of the engine works with slices and typed flags.
//!
//! ## Design Principles
//! 1. **No Signals**: every send and recv carries the no-signal flag so a
//!    dead peer produces an errno, not SIGPIPE.
//! 2. **Raw Results**: wrappers return the syscall's raw count and leave
//!    errno classification to the caller, which knows its retry policy.

use std::os::fd::RawFd;

#[cfg(not(target_os = "macos"))]
const MSG_BASE: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(target_os = "macos")]
const MSG_BASE: libc::c_int = 0;

#[cfg(target_os = "linux")]
const MSG_COALESCE: libc::c_int = libc::MSG_MORE;
#[cfg(not(target_os = "linux"))]
const MSG_COALESCE: libc::c_int = 0;

/// Raw OS error code of the last failed syscall.
pub(crate) fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

pub(crate) fn is_wouldblock(errno: i32) -> bool {
    errno == libc::EAGAIN || errno == libc::EWOULDBLOCK
}

pub(crate) fn is_restartable(errno: i32) -> bool {
    #[cfg(target_os = "linux")]
    if errno == libc::ERESTART {
        return true;
    }
    errno == libc::EINTR
}

/// Sends `buf`; `more` sets the kernel coalescing hint where available.
pub(crate) fn send(fd: RawFd, buf: &[u8], more: bool) -> isize {
    let mut flags = MSG_BASE;
    if more {
        flags |= MSG_COALESCE;
    }
    unsafe { libc::send(fd, buf.as_ptr() as *const libc::c_void, buf.len(), flags) }
}

pub(crate) fn recv(fd: RawFd, buf: &mut [u8]) -> isize {
    unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), MSG_BASE) }
}

/// Sends a scatter-gather vector as one message.
pub(crate) fn sendmsg(fd: RawFd, iov: &mut [libc::iovec]) -> isize {
    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_iov = iov.as_mut_ptr();
    msg.msg_iovlen = iov.len() as _;
    unsafe { libc::sendmsg(fd, &msg, MSG_BASE) }
}

/// Polls a single descriptor, returning the poll result and the revents.
pub(crate) fn poll_one(fd: RawFd, events: libc::c_short, timeout_ms: i32) -> (i32, libc::c_short) {
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    (rc, pfd.revents)
}

pub(crate) fn poll_many(fds: &mut [libc::pollfd], timeout_ms: i32) -> i32 {
    unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) }
}

/// Reads and clears the socket's pending error. `None` if the lookup
/// itself failed.
pub(crate) fn socket_error(fd: RawFd) -> Option<i32> {
    let mut err: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            &mut err as *mut libc::c_int as *mut libc::c_void,
            &mut len,
        )
    };
    if rc == 0 {
        Some(err)
    } else {
        None
    }
}

pub(crate) fn set_nonblocking(fd: RawFd) -> Result<(), i32> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(last_errno());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(last_errno());
    }
    Ok(())
}

/// Best-effort shutdown; the descriptor is closed separately.
pub(crate) fn shutdown(fd: RawFd, how: libc::c_int) {
    unsafe {
        libc::shutdown(fd, how);
    }
}
