use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Readiness bitmask exchanged between the poller and its users.
///
/// `READ` and `WRITE` are both an arming request (see
/// [`Pfd::arm`](super::Pfd::arm)) and a readiness report. `ERROR`,
/// `HANGUP` and `INVALID` are only ever reported; they are delivered
/// whether or not they were asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Events(u32);

impl Events {
    /// Readable.
    pub const READ: Events = Events(1 << 0);
    /// Writable.
    pub const WRITE: Events = Events(1 << 1);
    /// An error is pending on the descriptor.
    pub const ERROR: Events = Events(1 << 2);
    /// The peer hung up.
    pub const HANGUP: Events = Events(1 << 3);
    /// The descriptor is not valid.
    pub const INVALID: Events = Events(1 << 4);

    /// Conditions after which the descriptor can no longer be used.
    pub const FATAL: Events = Events::ERROR.union(Events::HANGUP).union(Events::INVALID);

    /// No events.
    pub const fn empty() -> Self {
        Events(0)
    }

    /// Combines two masks.
    pub const fn union(self, other: Self) -> Self {
        Events(self.0 | other.0)
    }

    /// Returns `true` if every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if any bit of `other` is set.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Events {
    type Output = Events;

    fn bitor(self, rhs: Self) -> Events {
        self.union(rhs)
    }
}

impl BitOrAssign for Events {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Events {
    type Output = Events;

    fn bitand(self, rhs: Self) -> Events {
        Events(self.0 & rhs.0)
    }
}

/// An I/O event reported by the poller.
///
/// The token identifies the registered descriptor inside the reactor
/// registry.
pub(crate) struct Event {
    pub(crate) token: u64,
    pub(crate) events: Events,
}
