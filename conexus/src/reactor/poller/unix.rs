use libc::{
    AF_INET, AF_INET6, F_GETFL, F_SETFL, IPPROTO_TCP, MSG_NOSIGNAL, O_NONBLOCK, SHUT_RD,
    SHUT_RDWR, SHUT_WR, SO_KEEPALIVE, SOL_SOCKET, TCP_NODELAY, c_int, fcntl, getpeername,
    getsockname, getsockopt, iovec, msghdr, readv, sendmsg, setsockopt, shutdown, sockaddr,
    sockaddr_in, sockaddr_in6, sockaddr_storage, socklen_t,
};
use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::{io, mem};

pub(crate) use std::os::fd::RawFd;

/// A boolean socket option, as a `(level, name)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SockOpt {
    level: c_int,
    name: c_int,
}

/// `IPPROTO_TCP` / `TCP_NODELAY`.
pub(crate) const NODELAY: SockOpt = SockOpt {
    level: IPPROTO_TCP,
    name: TCP_NODELAY,
};

/// `SOL_SOCKET` / `SO_KEEPALIVE`.
pub(crate) const KEEPALIVE: SockOpt = SockOpt {
    level: SOL_SOCKET,
    name: SO_KEEPALIVE,
};

/// Scatter-reads into `iov`.
///
/// Returns the number of bytes read; `Ok(0)` means the peer closed the
/// stream. The file descriptor **must** be non-blocking.
pub(crate) fn sys_readv(fd: RawFd, iov: &[iovec]) -> io::Result<usize> {
    let n = unsafe { readv(fd, iov.as_ptr(), iov.len() as c_int) };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

/// Gather-writes `iov` with `MSG_NOSIGNAL`, so a broken pipe surfaces as
/// `EPIPE` instead of raising `SIGPIPE`.
///
/// The file descriptor **must** be non-blocking.
pub(crate) fn sys_sendmsg(fd: RawFd, iov: &[iovec]) -> io::Result<usize> {
    let mut hdr: msghdr = unsafe { mem::zeroed() };
    hdr.msg_iov = iov.as_ptr() as *mut iovec;
    hdr.msg_iovlen = iov.len() as _;

    let n = unsafe { sendmsg(fd, &hdr, MSG_NOSIGNAL) };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

/// Sets a file descriptor to non-blocking mode.
pub(crate) fn sys_set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    let rc = unsafe { fcntl(fd, F_SETFL, flags | O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Shuts down a socket.
pub(crate) fn sys_shutdown(fd: RawFd, how: Shutdown) -> io::Result<()> {
    let how = match how {
        Shutdown::Read => SHUT_RD,
        Shutdown::Write => SHUT_WR,
        Shutdown::Both => SHUT_RDWR,
    };

    let rc = unsafe { shutdown(fd, how) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Returns the local address of a socket.
pub(crate) fn sys_sockname(fd: RawFd) -> io::Result<SocketAddr> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    let rc = unsafe { getsockname(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) };

    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        sockaddr_storage_to_socketaddr(&storage)
    }
}

/// Returns the remote address of a connected socket.
pub(crate) fn sys_peername(fd: RawFd) -> io::Result<SocketAddr> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    let rc = unsafe { getpeername(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) };

    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        sockaddr_storage_to_socketaddr(&storage)
    }
}

/// Reads a boolean socket option.
pub(crate) fn sys_get_bool(fd: RawFd, opt: SockOpt) -> io::Result<bool> {
    let mut value: c_int = 0;
    let mut len = mem::size_of::<c_int>() as socklen_t;

    let rc = unsafe {
        getsockopt(
            fd,
            opt.level,
            opt.name,
            &mut value as *mut _ as *mut _,
            &mut len,
        )
    };

    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(value != 0)
    }
}

/// Writes a boolean socket option.
pub(crate) fn sys_set_bool(fd: RawFd, opt: SockOpt, value: bool) -> io::Result<()> {
    let value: c_int = if value { 1 } else { 0 };

    let rc = unsafe {
        setsockopt(
            fd,
            opt.level,
            opt.name,
            &value as *const _ as *const _,
            mem::size_of::<c_int>() as socklen_t,
        )
    };

    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Converts a `sockaddr_storage` to a Rust `SocketAddr`.
pub(crate) fn sockaddr_storage_to_socketaddr(storage: &sockaddr_storage) -> io::Result<SocketAddr> {
    match storage.ss_family as c_int {
        AF_INET => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr));
            let port = u16::from_be(addr.sin_port);

            Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }

        AF_INET6 => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in6) };
            let ip = Ipv6Addr::from(addr.sin6_addr.s6_addr);
            let port = u16::from_be(addr.sin6_port);

            Ok(SocketAddr::V6(SocketAddrV6::new(
                ip,
                port,
                addr.sin6_flowinfo,
                addr.sin6_scope_id,
            )))
        }

        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unsupported address family",
        )),
    }
}
