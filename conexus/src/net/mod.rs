//! TCP networking primitives.
//!
//! [`TcpConn`] wraps an already-connected socket registered with a
//! [`Reactor`](crate::reactor::Reactor) and runs any number of
//! concurrent reads and writes against it, each direction in FIFO order.
//! Establishing connections (dialing, accepting) is left to the caller;
//! `std::net` works fine for that.
mod tcp;

pub use tcp::conn::{ConnConfig, MAX_IOV, TcpConn};
pub use tcp::options::{
    OPT_LOCAL_ADDR, OPT_REMOTE_ADDR, OPT_TCP_KEEPALIVE, OPT_TCP_NODELAY, OptionHandle, OptionType,
    OptionValue,
};
