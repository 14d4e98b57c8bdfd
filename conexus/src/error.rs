//! Portable error codes.
//!
//! Every operation submitted to a connection terminates with either a byte
//! count or exactly one [`Error`]. Platform `errno` values are translated
//! into the portable kinds below; anything without a portable meaning is
//! carried as [`Error::System`].

use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Terminal error of an operation or accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The connection, or its peer, has been closed.
    #[error("object closed")]
    Closed,

    /// The operation was canceled before it completed.
    #[error("operation canceled")]
    Canceled,

    /// The operation did not complete before its deadline.
    #[error("timed out")]
    TimedOut,

    /// The request is malformed, e.g. too many scatter/gather buffers.
    #[error("invalid argument")]
    InvalidArgument,

    /// Memory or kernel buffer space was exhausted.
    #[error("out of memory")]
    NoMemory,

    /// The object is in a state that does not allow the request.
    #[error("incorrect state")]
    InvalidState,

    /// The operation is already in progress.
    #[error("resource busy")]
    Busy,

    /// The option or feature is not supported.
    #[error("not supported")]
    NotSupported,

    /// A value of the wrong type was supplied or requested.
    #[error("incorrect type")]
    BadType,

    /// The option cannot be written.
    #[error("read only resource")]
    ReadOnly,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("connection reset by peer")]
    ConnectionReset,

    #[error("connection aborted")]
    ConnectionAborted,

    #[error("destination unreachable")]
    Unreachable,

    #[error("permission denied")]
    PermissionDenied,

    #[error("address in use")]
    AddressInUse,

    #[error("address invalid")]
    AddressInvalid,

    #[error("protocol error")]
    Protocol,

    #[error("out of files")]
    NoFiles,

    #[error("out of space")]
    NoSpace,

    /// A platform error without a portable equivalent.
    #[error("system error {0}")]
    System(i32),
}

impl Error {
    /// Translates a raw `errno` value into a portable error.
    pub fn from_errno(errno: i32) -> Self {
        match errno {
            libc::EPIPE | libc::EBADF | libc::ENOTCONN | libc::ESHUTDOWN => Error::Closed,
            libc::ECONNRESET => Error::ConnectionReset,
            libc::ECONNREFUSED => Error::ConnectionRefused,
            libc::ECONNABORTED => Error::ConnectionAborted,
            libc::EHOSTUNREACH | libc::ENETUNREACH => Error::Unreachable,
            libc::ETIMEDOUT | libc::ETIME => Error::TimedOut,
            libc::EACCES | libc::EPERM => Error::PermissionDenied,
            libc::EADDRINUSE => Error::AddressInUse,
            libc::EADDRNOTAVAIL => Error::AddressInvalid,
            libc::EINVAL | libc::ENAMETOOLONG | libc::EFBIG | libc::EMSGSIZE => {
                Error::InvalidArgument
            }
            libc::ENOMEM | libc::ENOBUFS => Error::NoMemory,
            libc::ENOPROTOOPT
            | libc::ENOSYS
            | libc::EOPNOTSUPP
            | libc::EAFNOSUPPORT
            | libc::EPROTONOSUPPORT => Error::NotSupported,
            libc::EPROTO => Error::Protocol,
            libc::EMFILE | libc::ENFILE => Error::NoFiles,
            libc::ENOSPC | libc::EDQUOT => Error::NoSpace,
            libc::EBUSY => Error::Busy,
            other => Error::System(other),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        if let Some(errno) = err.raw_os_error() {
            return Error::from_errno(errno);
        }

        match err.kind() {
            io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected => Error::Closed,
            io::ErrorKind::ConnectionReset => Error::ConnectionReset,
            io::ErrorKind::ConnectionRefused => Error::ConnectionRefused,
            io::ErrorKind::ConnectionAborted => Error::ConnectionAborted,
            io::ErrorKind::TimedOut => Error::TimedOut,
            io::ErrorKind::PermissionDenied => Error::PermissionDenied,
            io::ErrorKind::InvalidInput => Error::InvalidArgument,
            io::ErrorKind::OutOfMemory => Error::NoMemory,
            io::ErrorKind::Unsupported => Error::NotSupported,
            _ => Error::System(0),
        }
    }
}
