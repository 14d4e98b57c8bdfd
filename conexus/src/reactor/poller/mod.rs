//! Platform-specific I/O poller abstraction.
//!
//! The poller is used by the reactor to:
//! - register descriptors in a disarmed, one-shot mode,
//! - arm them for read and/or write readiness,
//! - wait for readiness events,
//! - wake the reactor thread when it must stop.
//!
//! The concrete implementation is selected at compile time depending on
//! the target operating system. Only Linux (`epoll`) is provided.

pub(crate) mod common;

pub(crate) use common::Waker;

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(not(target_os = "linux"))]
compile_error!("conexus currently supports Linux (epoll) only");

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;
