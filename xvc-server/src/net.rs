//! Listening-socket setup (component F), ported from `open_server` in `xvcserver_start`:
//! `socket` → `SO_REUSEADDR` → `bind` → `listen(backlog=4)`. `std::net::TcpListener::bind`
//! doesn't expose a way to set `SO_REUSEADDR` before the bind call, so — same as `xvc-hw`
//! reaching for `libc` to do the `/dev/mem` mmap std can't — the socket is built by hand here
//! and handed to `TcpListener` once it's listening.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::os::unix::io::FromRawFd;

/// `listen()`'s backlog argument (`xvcserver_start` hardcodes this rather than exposing it).
const LISTEN_BACKLOG: i32 = 4;

/// Resolves `host:port` and binds a `SO_REUSEADDR` IPv4 listening socket, matching the
/// original's `PF_INET`-only `getaddrinfo` call.
pub fn bind_listener(host: &str, port: &str) -> io::Result<TcpListener> {
    let lookup_host = if host.is_empty() { "0.0.0.0" } else { host };
    let addr: SocketAddr = format!("{lookup_host}:{port}")
        .to_socket_addrs()?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "hostname resolved to no IPv4 address"))?;

    // SAFETY: a fresh `AF_INET`/`SOCK_STREAM` socket fd is created and checked for failure
    // before any further syscall touches it.
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    let reuse: libc::c_int = 1;
    // SAFETY: `fd` is a valid, just-created socket; `reuse` lives for the duration of the call.
    let result = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            std::ptr::addr_of!(reuse).cast(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if result < 0 {
        let err = io::Error::last_os_error();
        // SAFETY: `fd` was just created by this function and is otherwise unused.
        unsafe { libc::close(fd) };
        return Err(err);
    }

    let sockaddr = socketaddr_to_sockaddr_in(addr);
    // SAFETY: `sockaddr` is a valid, fully-initialized `sockaddr_in` of the correct size.
    let result = unsafe {
        libc::bind(
            fd,
            std::ptr::addr_of!(sockaddr).cast(),
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if result < 0 {
        let err = io::Error::last_os_error();
        // SAFETY: see above.
        unsafe { libc::close(fd) };
        return Err(err);
    }

    // SAFETY: `fd` is bound and still owned by this function.
    let result = unsafe { libc::listen(fd, LISTEN_BACKLOG) };
    if result < 0 {
        let err = io::Error::last_os_error();
        // SAFETY: see above.
        unsafe { libc::close(fd) };
        return Err(err);
    }

    // SAFETY: `fd` is a valid, listening TCP socket; ownership transfers to `TcpListener`,
    // which will close it on drop.
    Ok(unsafe { TcpListener::from_raw_fd(fd) })
}

fn socketaddr_to_sockaddr_in(addr: SocketAddr) -> libc::sockaddr_in {
    let SocketAddr::V4(v4) = addr else {
        unreachable!("caller filtered to IPv4 addresses only")
    };
    libc::sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: v4.port().to_be(),
        sin_addr: libc::in_addr {
            s_addr: u32::from_ne_bytes(v4.ip().octets()),
        },
        sin_zero: [0; 8],
        #[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd"))]
        sin_len: 0,
    }
}
