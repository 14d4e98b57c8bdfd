//! # Conexus
//!
//! **Conexus** is the connection core of a readiness-driven messaging
//! transport: it turns an already-connected TCP socket into a queue of
//! cancellable asynchronous reads and writes.
//!
//! Unlike a general-purpose async runtime, Conexus does not use futures.
//! Work is described by [`Aio`] operations that finish exactly once, either
//! with a byte count or with an [`Error`], and may notify a callback.
//! Readiness comes from an epoll [`Reactor`] running on its own thread.
//!
//! Conexus provides:
//!
//! - **Asynchronous operations** carrying scatter/gather buffers, with
//!   blocking waits, timeouts and cancellation
//! - **A reactor** that arms descriptors one direction at a time
//! - **TCP connections** with FIFO read and write queues, forced close and
//!   named socket options
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use conexus::aio::Aio;
//! use conexus::net::TcpConn;
//! use conexus::reactor::Reactor;
//! use std::net::{TcpListener, TcpStream};
//!
//! let reactor = Reactor::new().unwrap();
//!
//! let listener = TcpListener::bind("127.0.0.1:0").unwrap();
//! let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
//! let (server, _) = listener.accept().unwrap();
//!
//! let client = TcpConn::from_stream(&reactor.handle(), client).unwrap();
//! let server = TcpConn::from_stream(&reactor.handle(), server).unwrap();
//! client.start(true, false);
//! server.start(true, false);
//!
//! let read = Aio::new();
//! read.set_iov(vec![vec![0; 5]]).unwrap();
//! server.recv(&read);
//!
//! let write = Aio::new();
//! write.set_iov(vec![b"hello".to_vec()]).unwrap();
//! client.send(&write);
//!
//! assert_eq!(write.wait(), Ok(5));
//! assert_eq!(read.wait(), Ok(5));
//! ```
//!
//! ## Modules
//!
//! - [`aio`]: Asynchronous operations and completion
//! - [`error`]: Error codes shared by every operation
//! - [`net`]: TCP connections and their options
//! - [`reactor`]: The readiness reactor and registered descriptors
//!
//! ## Platform
//!
//! Conexus is built on epoll and supports Linux only.

pub mod aio;
pub mod error;
pub mod net;
pub mod reactor;

mod utils;

pub use aio::Aio;
pub use error::{Error, Result};
pub use net::{ConnConfig, MAX_IOV, OptionType, OptionValue, TcpConn};
pub use reactor::{Events, Pfd, Reactor, ReactorBuilder, ReactorHandle};
