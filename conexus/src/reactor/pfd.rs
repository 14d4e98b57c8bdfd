use super::core::{ReactorHandle, ReactorInner};
use super::event::Events;
use super::poller::platform::{sys_set_nonblocking, sys_shutdown};
use crate::error::Result;
use crate::utils::Key;

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::net::Shutdown;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use tracing::{debug, trace};

/// Readiness callback installed on a [`Pfd`].
pub type PfdCallback = Arc<dyn Fn(Events) + Send + Sync>;

/// A descriptor registered with a reactor.
///
/// The `Pfd` owns the descriptor. It starts disarmed: the callback only
/// runs after [`arm`](Self::arm) requested a direction, and each arming
/// yields at most one callback. `ERROR` and `HANGUP` are reported along
/// with any armed direction.
///
/// Dropping the `Pfd` finalizes it: the descriptor is closed, removed
/// from the reactor and, unless the drop happens on the reactor thread
/// itself, any callback still running is waited for first.
pub struct Pfd {
    shared: Arc<PfdShared>,
}

pub(crate) struct PfdShared {
    token: Key,
    reactor: Arc<ReactorInner>,
    state: Mutex<PfdState>,

    /// Signalled when a callback returns.
    idle: Condvar,
}

struct PfdState {
    fd: Option<OwnedFd>,
    armed: Events,
    closed: bool,
    callback: Option<PfdCallback>,
    in_callback: bool,
}

impl Pfd {
    /// Registers `fd` with the reactor behind `handle`.
    ///
    /// The descriptor is switched to non-blocking mode and registered
    /// disarmed.
    pub fn new(handle: &ReactorHandle, fd: OwnedFd) -> Result<Self> {
        let raw = fd.as_raw_fd();
        sys_set_nonblocking(raw)?;

        let reactor = handle.inner.clone();
        let (token, shared) = {
            let mut registry = reactor.registry.lock();
            let (token, shared) = registry.insert_with(|token| {
                Arc::new(PfdShared {
                    token,
                    reactor: handle.inner.clone(),
                    state: Mutex::new(PfdState {
                        fd: Some(fd),
                        armed: Events::empty(),
                        closed: false,
                        callback: None,
                        in_callback: false,
                    }),
                    idle: Condvar::new(),
                })
            });
            (token, shared.clone())
        };

        if let Err(err) = reactor.poller.add(raw, token.to_u64()) {
            reactor.registry.lock().remove(token);
            return Err(err.into());
        }

        debug!(fd = raw, "descriptor registered");
        Ok(Self { shared })
    }

    /// The raw descriptor, or `None` once finalized.
    pub fn fd(&self) -> Option<RawFd> {
        self.shared.fd()
    }

    /// Installs the readiness callback, replacing any previous one.
    pub fn set_callback(&self, callback: PfdCallback) {
        self.shared.state.lock().callback = Some(callback);
    }

    /// Requests a single notification for the given directions.
    ///
    /// Directions armed earlier and not yet reported stay armed. Arming a
    /// closed descriptor does nothing.
    pub fn arm(&self, events: Events) -> Result<()> {
        self.shared.arm(events)
    }

    /// Shuts the descriptor down and stops event delivery.
    ///
    /// Idempotent. Never invokes the readiness callback, so it may be
    /// called while holding a lock that the callback takes.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }
}

impl Drop for Pfd {
    fn drop(&mut self) {
        self.shared.close();

        let (fd, callback) = {
            let mut state = self.shared.state.lock();
            if !self.shared.reactor.is_current_thread() {
                while state.in_callback {
                    self.shared.idle.wait(&mut state);
                }
            }
            (state.fd.take(), state.callback.take())
        };

        self.shared.reactor.registry.lock().remove(self.shared.token);
        drop(callback);

        if let Some(fd) = fd {
            trace!(fd = fd.as_raw_fd(), "descriptor released");
        }
    }
}

impl fmt::Debug for Pfd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Pfd")
            .field("fd", &state.fd.as_ref().map(|fd| fd.as_raw_fd()))
            .field("armed", &state.armed)
            .field("closed", &state.closed)
            .finish()
    }
}

impl PfdShared {
    fn fd(&self) -> Option<RawFd> {
        self.state.lock().fd.as_ref().map(|fd| fd.as_raw_fd())
    }

    fn arm(&self, events: Events) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        let Some(raw) = state.fd.as_ref().map(|fd| fd.as_raw_fd()) else {
            return Ok(());
        };

        state.armed |= events & (Events::READ | Events::WRITE);
        self.reactor
            .poller
            .arm(raw, self.token.to_u64(), state.armed)?;

        Ok(())
    }

    fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.armed = Events::empty();

        if let Some(raw) = state.fd.as_ref().map(|fd| fd.as_raw_fd()) {
            let _ = sys_shutdown(raw, Shutdown::Both);
            let _ = self.reactor.poller.delete(raw);
            debug!(fd = raw, "descriptor closed");
        }
    }

    /// Runs the callback for a readiness report. Called by the reactor
    /// thread only.
    pub(crate) fn dispatch(&self, events: Events) {
        let callback = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }

            // One-shot: the kernel disarmed every direction.
            state.armed = Events::empty();

            let Some(callback) = state.callback.clone() else {
                return;
            };
            state.in_callback = true;
            callback
        };

        callback(events);

        self.state.lock().in_callback = false;
        self.idle.notify_all();
    }
}
