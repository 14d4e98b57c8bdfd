//! Readiness reactor.
//!
//! This module implements the poller side of the crate:
//! - [`Reactor`] owns an OS poller and a thread that waits for readiness,
//! - [`Pfd`] is one descriptor registered with a reactor,
//! - [`Events`] is the readiness bitmask exchanged between them.
//!
//! A descriptor is armed per direction and reports at most one event per
//! arming, which is the contract the connection core relies on to re-arm
//! only the directions that still have queued work.

mod builder;
mod core;
mod event;
mod pfd;

pub(crate) mod poller;

pub use builder::ReactorBuilder;
pub use self::core::{Reactor, ReactorHandle};
pub use event::Events;
pub use pfd::{Pfd, PfdCallback};
