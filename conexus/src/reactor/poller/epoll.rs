//! Linux `epoll`-based poller implementation.
//!
//! Responsibilities:
//! - Register file descriptors in one-shot mode with no interest
//! - Arm registered descriptors for read and/or write readiness
//! - Block waiting for I/O readiness
//! - Wake the reactor when it must stop
//!
//! Every registration uses `EPOLLONESHOT`: once an event is delivered the
//! descriptor stays disarmed until it is explicitly armed again. This is
//! what lets the connection core re-arm only the directions that still
//! have pending work.

use crate::reactor::event::{Event, Events};
use crate::reactor::poller::Waker;

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLHUP, EPOLLIN,
    EPOLLONESHOT, EPOLLOUT, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// Reserved token used internally for the wake-up event.
///
/// Slab keys never reach this value: it would need both the index and
/// the generation to be `u32::MAX`.
const WAKE_TOKEN: u64 = u64::MAX;

/// Linux `epoll` poller.
///
/// This poller owns:
/// - an `epoll` instance,
/// - an internal `eventfd` used as a wake-up signal.
///
/// `epoll_ctl` may be called from any thread while another thread is
/// blocked in `epoll_wait`, so arming needs no extra synchronization.
pub(crate) struct EpollPoller {
    /// Epoll file descriptor.
    epoll: OwnedFd,

    /// Waker wrapping the internal eventfd.
    waker: Waker,
}

impl Waker {
    /// Wake the poller.
    ///
    /// This writes to the internal `eventfd`, causing `epoll_wait`
    /// to return immediately.
    pub(crate) fn wake(&self) {
        let buf: u64 = 1;
        unsafe {
            libc::write(self.0.as_raw_fd(), &buf as *const _ as *const _, 8);
        }
    }

    /// Reset the eventfd counter after a wake-up.
    fn reset(&self) {
        let mut buf = 0u64;
        unsafe {
            libc::read(self.0.as_raw_fd(), &mut buf as *mut _ as *mut _, 8);
        }
    }
}

impl EpollPoller {
    /// Create a new `EpollPoller`.
    ///
    /// This:
    /// - creates the epoll instance,
    /// - creates a non-blocking `eventfd`,
    /// - registers the eventfd into epoll as a persistent wake source.
    pub(crate) fn new() -> io::Result<Self> {
        let raw = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        let epoll = unsafe { OwnedFd::from_raw_fd(raw) };

        let raw = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        let eventfd = unsafe { OwnedFd::from_raw_fd(raw) };

        let mut event = epoll_event {
            events: EPOLLIN as u32,
            u64: WAKE_TOKEN,
        };
        ctl(epoll.as_raw_fd(), EPOLL_CTL_ADD, eventfd.as_raw_fd(), &mut event)?;

        Ok(Self {
            epoll,
            waker: Waker(eventfd),
        })
    }

    /// Interrupts a blocking [`wait`](Self::wait).
    pub(crate) fn wake(&self) {
        self.waker.wake();
    }

    /// Register a file descriptor, initially disarmed.
    pub(crate) fn add(&self, fd: RawFd, token: u64) -> io::Result<()> {
        let mut event = epoll_event {
            events: EPOLLONESHOT as u32,
            u64: token,
        };

        ctl(self.epoll.as_raw_fd(), EPOLL_CTL_ADD, fd, &mut event)
    }

    /// Arm a registered descriptor for a single notification.
    pub(crate) fn arm(&self, fd: RawFd, token: u64, events: Events) -> io::Result<()> {
        let mut flags = EPOLLONESHOT;

        if events.contains(Events::READ) {
            flags |= EPOLLIN;
        }
        if events.contains(Events::WRITE) {
            flags |= EPOLLOUT;
        }

        let mut event = epoll_event {
            events: flags as u32,
            u64: token,
        };

        ctl(self.epoll.as_raw_fd(), EPOLL_CTL_MOD, fd, &mut event)
    }

    /// Remove a file descriptor from the poller.
    pub(crate) fn delete(&self, fd: RawFd) -> io::Result<()> {
        let mut event = epoll_event { events: 0, u64: 0 };
        ctl(self.epoll.as_raw_fd(), EPOLL_CTL_DEL, fd, &mut event)
    }

    /// Poll for I/O readiness events.
    ///
    /// Blocks until at least one descriptor becomes ready or the wake
    /// event is triggered. `buffer` is scratch space whose capacity bounds
    /// the batch size; reported events are written to `events`.
    pub(crate) fn wait(
        &self,
        buffer: &mut Vec<epoll_event>,
        events: &mut Vec<Event>,
    ) -> io::Result<()> {
        events.clear();
        buffer.clear();

        let n = unsafe {
            epoll_wait(
                self.epoll.as_raw_fd(),
                buffer.as_mut_ptr(),
                buffer.capacity() as i32,
                -1,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        unsafe {
            buffer.set_len(n as usize);
        }

        for ev in buffer.iter() {
            // `epoll_event` is packed; copy the fields out before use.
            let (token, flags) = (ev.u64, ev.events);

            // Wake-up event
            if token == WAKE_TOKEN {
                self.waker.reset();
                continue;
            }

            events.push(Event {
                token,
                events: translate(flags),
            });
        }

        Ok(())
    }
}

fn translate(flags: u32) -> Events {
    let mut events = Events::empty();

    if flags & EPOLLIN as u32 != 0 {
        events |= Events::READ;
    }
    if flags & EPOLLOUT as u32 != 0 {
        events |= Events::WRITE;
    }
    if flags & EPOLLERR as u32 != 0 {
        events |= Events::ERROR;
    }
    if flags & EPOLLHUP as u32 != 0 {
        events |= Events::HANGUP;
    }

    events
}

fn ctl(epoll: RawFd, op: i32, fd: RawFd, event: &mut epoll_event) -> io::Result<()> {
    let rc = unsafe { epoll_ctl(epoll, op, fd, event) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}
