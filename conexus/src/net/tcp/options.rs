//! Named connection options.
//!
//! Options are looked up by name in a static table. Each entry knows how
//! to read the option and, unless it is read-only, how to write it.
//! Values are exchanged as [`OptionValue`]s and the caller states the
//! [`OptionType`] it expects back.

use super::conn::{ConnInner, TcpConn};
use crate::error::{Error, Result};
use crate::reactor::poller::platform::{
    KEEPALIVE, NODELAY, RawFd, SockOpt, sys_get_bool, sys_peername, sys_set_bool, sys_sockname,
};

use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use tracing::trace;

/// Address of the remote peer. Read-only.
pub const OPT_REMOTE_ADDR: &str = "remote-address";

/// Local address of the socket. Read-only.
pub const OPT_LOCAL_ADDR: &str = "local-address";

/// `TCP_NODELAY`.
pub const OPT_TCP_NODELAY: &str = "tcp-no-delay";

/// `SO_KEEPALIVE`.
pub const OPT_TCP_KEEPALIVE: &str = "tcp-keepalive";

/// Type tag of an option value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OptionType {
    Bool,
    SockAddr,
}

/// A typed option value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OptionValue {
    Bool(bool),
    SockAddr(SocketAddr),
}

impl OptionValue {
    /// The type tag of this value.
    pub fn kind(&self) -> OptionType {
        match self {
            OptionValue::Bool(_) => OptionType::Bool,
            OptionValue::SockAddr(_) => OptionType::SockAddr,
        }
    }

    /// Returns the boolean, or [`Error::BadType`].
    pub fn as_bool(&self) -> Result<bool> {
        match *self {
            OptionValue::Bool(value) => Ok(value),
            _ => Err(Error::BadType),
        }
    }

    /// Returns the address, or [`Error::BadType`].
    pub fn as_sockaddr(&self) -> Result<SocketAddr> {
        match *self {
            OptionValue::SockAddr(addr) => Ok(addr),
            _ => Err(Error::BadType),
        }
    }

    fn copy_out(self, want: OptionType) -> Result<Self> {
        if self.kind() == want {
            Ok(self)
        } else {
            Err(Error::BadType)
        }
    }
}

type Getter = fn(&ConnInner) -> Result<OptionValue>;
type Setter = fn(Option<&ConnInner>, &OptionValue) -> Result<()>;

struct ConnOption {
    name: &'static str,
    get: Getter,
    set: Option<Setter>,
}

static CONN_OPTIONS: &[ConnOption] = &[
    ConnOption {
        name: OPT_REMOTE_ADDR,
        get: get_remote_addr,
        set: None,
    },
    ConnOption {
        name: OPT_LOCAL_ADDR,
        get: get_local_addr,
        set: None,
    },
    ConnOption {
        name: OPT_TCP_NODELAY,
        get: get_nodelay,
        set: Some(set_nodelay),
    },
    ConnOption {
        name: OPT_TCP_KEEPALIVE,
        get: get_keepalive,
        set: Some(set_keepalive),
    },
];

fn lookup(name: &str) -> Result<&'static ConnOption> {
    CONN_OPTIONS
        .iter()
        .find(|opt| opt.name == name)
        .ok_or(Error::NotSupported)
}

fn fd_of(conn: &ConnInner) -> Result<RawFd> {
    conn.pfd.fd().ok_or(Error::Closed)
}

fn get_remote_addr(conn: &ConnInner) -> Result<OptionValue> {
    Ok(OptionValue::SockAddr(sys_peername(fd_of(conn)?)?))
}

fn get_local_addr(conn: &ConnInner) -> Result<OptionValue> {
    Ok(OptionValue::SockAddr(sys_sockname(fd_of(conn)?)?))
}

fn get_nodelay(conn: &ConnInner) -> Result<OptionValue> {
    Ok(OptionValue::Bool(sys_get_bool(fd_of(conn)?, NODELAY)?))
}

fn get_keepalive(conn: &ConnInner) -> Result<OptionValue> {
    Ok(OptionValue::Bool(sys_get_bool(fd_of(conn)?, KEEPALIVE)?))
}

fn set_nodelay(conn: Option<&ConnInner>, value: &OptionValue) -> Result<()> {
    set_bool(conn, NODELAY, value)
}

fn set_keepalive(conn: Option<&ConnInner>, value: &OptionValue) -> Result<()> {
    set_bool(conn, KEEPALIVE, value)
}

/// The value is checked before the target, so a mistyped value reports
/// [`Error::BadType`] even on a torn-down connection.
fn set_bool(conn: Option<&ConnInner>, opt: SockOpt, value: &OptionValue) -> Result<()> {
    let on = value.as_bool()?;
    let conn = conn.ok_or(Error::InvalidState)?;

    sys_set_bool(fd_of(conn)?, opt, on)?;
    trace!(?opt, on, "socket option set");
    Ok(())
}

pub(crate) fn get_opt(conn: Option<&ConnInner>, name: &str, want: OptionType) -> Result<OptionValue> {
    let opt = lookup(name)?;
    let conn = conn.ok_or(Error::InvalidState)?;

    (opt.get)(conn)?.copy_out(want)
}

pub(crate) fn set_opt(conn: Option<&ConnInner>, name: &str, value: &OptionValue) -> Result<()> {
    let opt = lookup(name)?;
    let set = opt.set.ok_or(Error::ReadOnly)?;

    set(conn, value)
}

/// A detached handle to a connection's options.
///
/// The handle does not keep the connection alive. Once the connection is
/// finalized every access fails with [`Error::InvalidState`], after the
/// name and type checks.
#[derive(Clone, Debug)]
pub struct OptionHandle {
    conn: Weak<ConnInner>,
}

impl OptionHandle {
    /// Reads option `name`, which must be of type `want`.
    pub fn get(&self, name: &str, want: OptionType) -> Result<OptionValue> {
        let conn = self.conn.upgrade();
        get_opt(conn.as_deref(), name, want)
    }

    /// Writes option `name`.
    pub fn set(&self, name: &str, value: OptionValue) -> Result<()> {
        let conn = self.conn.upgrade();
        set_opt(conn.as_deref(), name, &value)
    }
}

impl TcpConn {
    /// Returns a handle to this connection's options that outlives it.
    pub fn options(&self) -> OptionHandle {
        OptionHandle {
            conn: Arc::downgrade(&self.inner),
        }
    }

    /// Reads option `name`, which must be of type `want`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotSupported`] for an unknown name,
    /// - [`Error::BadType`] if the option is not of type `want`,
    /// - [`Error::Closed`] once the descriptor is released, or the
    ///   socket error otherwise.
    pub fn get_opt(&self, name: &str, want: OptionType) -> Result<OptionValue> {
        get_opt(Some(self.inner.as_ref()), name, want)
    }

    /// Writes option `name`.
    ///
    /// Read-only options fail with [`Error::ReadOnly`] and mistyped values
    /// with [`Error::BadType`].
    pub fn set_opt(&self, name: &str, value: OptionValue) -> Result<()> {
        set_opt(Some(self.inner.as_ref()), name, &value)
    }

    /// Address of the remote peer.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.get_opt(OPT_REMOTE_ADDR, OptionType::SockAddr)?
            .as_sockaddr()
    }

    /// Local address of the socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.get_opt(OPT_LOCAL_ADDR, OptionType::SockAddr)?
            .as_sockaddr()
    }

    /// Whether Nagle's algorithm is disabled (`TCP_NODELAY`).
    pub fn nodelay(&self) -> Result<bool> {
        self.get_opt(OPT_TCP_NODELAY, OptionType::Bool)?.as_bool()
    }

    /// Enables or disables `TCP_NODELAY`.
    pub fn set_nodelay(&self, on: bool) -> Result<()> {
        self.set_opt(OPT_TCP_NODELAY, OptionValue::Bool(on))
    }

    /// Whether keepalive probes are enabled (`SO_KEEPALIVE`).
    pub fn keepalive(&self) -> Result<bool> {
        self.get_opt(OPT_TCP_KEEPALIVE, OptionType::Bool)?.as_bool()
    }

    /// Enables or disables `SO_KEEPALIVE`.
    pub fn set_keepalive(&self, on: bool) -> Result<()> {
        self.set_opt(OPT_TCP_KEEPALIVE, OptionValue::Bool(on))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_name_is_not_supported() {
        assert_eq!(
            get_opt(None, "tcp-cork", OptionType::Bool),
            Err(Error::NotSupported)
        );
        assert_eq!(
            set_opt(None, "tcp-cork", &OptionValue::Bool(true)),
            Err(Error::NotSupported)
        );
    }

    #[test]
    fn test_addresses_are_read_only() {
        let addr: SocketAddr = "127.0.0.1:80".parse().unwrap();

        assert_eq!(
            set_opt(None, OPT_REMOTE_ADDR, &OptionValue::SockAddr(addr)),
            Err(Error::ReadOnly)
        );
        assert_eq!(
            set_opt(None, OPT_LOCAL_ADDR, &OptionValue::SockAddr(addr)),
            Err(Error::ReadOnly)
        );
    }

    #[test]
    fn test_set_checks_type_before_target() {
        let addr: SocketAddr = "127.0.0.1:80".parse().unwrap();

        assert_eq!(
            set_opt(None, OPT_TCP_NODELAY, &OptionValue::SockAddr(addr)),
            Err(Error::BadType)
        );
        assert_eq!(
            set_opt(None, OPT_TCP_KEEPALIVE, &OptionValue::Bool(true)),
            Err(Error::InvalidState)
        );
    }

    #[test]
    fn test_get_without_target() {
        assert_eq!(
            get_opt(None, OPT_TCP_NODELAY, OptionType::Bool),
            Err(Error::InvalidState)
        );
    }

    #[test]
    fn test_copy_out_checks_type() {
        let value = OptionValue::Bool(true);

        assert_eq!(value.copy_out(OptionType::Bool), Ok(value));
        assert_eq!(value.copy_out(OptionType::SockAddr), Err(Error::BadType));
        assert_eq!(value.as_sockaddr(), Err(Error::BadType));
    }
}
