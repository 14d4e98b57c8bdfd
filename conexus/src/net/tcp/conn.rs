use crate::aio::{Aio, AioList, Completions};
use crate::error::{Error, Result};
use crate::reactor::poller::platform::{
    KEEPALIVE, NODELAY, RawFd, SockOpt, sys_readv, sys_sendmsg, sys_set_bool,
};
use crate::reactor::{Events, Pfd, ReactorHandle};
use crate::utils::Key;

use arrayvec::ArrayVec;
use libc::iovec;
use parking_lot::Mutex;
use std::io;
use std::net::TcpStream;
use std::os::fd::OwnedFd;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Maximum number of buffers in one scatter/gather transfer.
///
/// Operations carrying more buffers fail with [`Error::InvalidArgument`]
/// when they reach the head of their queue.
pub const MAX_IOV: usize = 16;

/// Initial socket options applied by [`TcpConn::start_with`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnConfig {
    /// Disable Nagle's algorithm (`TCP_NODELAY`).
    pub nodelay: bool,

    /// Enable TCP keepalive probes (`SO_KEEPALIVE`).
    pub keepalive: bool,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            nodelay: true,
            keepalive: false,
        }
    }
}

/// An established TCP connection driven by a reactor.
///
/// Any number of reads and writes may be outstanding at once. Each
/// direction has its own FIFO queue: operations complete in submission
/// order, the head of a queue is served first, and a transfer is
/// attempted immediately when an operation lands at the head of an empty
/// queue. Whatever cannot be done right away waits for readiness.
///
/// Every operation finishes exactly once: with the number of bytes moved
/// by its single transfer, or with an error. A read that sees end of
/// stream finishes with [`Error::Closed`].
///
/// Dropping the `TcpConn` closes it (pending operations finish with
/// [`Error::Closed`]) and releases the descriptor.
///
/// # Examples
///
/// ```rust,no_run
/// use conexus::aio::Aio;
/// use conexus::net::TcpConn;
/// use conexus::reactor::Reactor;
/// use std::net::TcpStream;
///
/// let reactor = Reactor::new().unwrap();
/// let stream = TcpStream::connect("127.0.0.1:9000").unwrap();
///
/// let conn = TcpConn::from_stream(&reactor.handle(), stream).unwrap();
/// conn.start(true, false);
///
/// let aio = Aio::new();
/// aio.set_iov(vec![b"hello".to_vec()]).unwrap();
/// conn.send(&aio);
/// assert_eq!(aio.wait(), Ok(5));
/// ```
pub struct TcpConn {
    pub(crate) inner: Arc<ConnInner>,
}

pub(crate) struct ConnInner {
    state: Mutex<ConnState>,
    pub(crate) pfd: Pfd,
}

struct ConnState {
    closed: bool,
    readq: AioList,
    writeq: AioList,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Read,
    Write,
}

impl Direction {
    fn events(self) -> Events {
        match self {
            Direction::Read => Events::READ,
            Direction::Write => Events::WRITE,
        }
    }
}

impl ConnState {
    fn queue(&self, dir: Direction) -> &AioList {
        match dir {
            Direction::Read => &self.readq,
            Direction::Write => &self.writeq,
        }
    }

    fn queue_mut(&mut self, dir: Direction) -> &mut AioList {
        match dir {
            Direction::Read => &mut self.readq,
            Direction::Write => &mut self.writeq,
        }
    }
}

/// Outcome of one transfer attempt for the head of a queue.
enum Transfer {
    Done(usize),
    WouldBlock,
    PeerClosed,
    Rejected(Error),
    Failed(Error),
}

impl TcpConn {
    /// Takes ownership of a registered, connected socket.
    ///
    /// The connection does not react to readiness until
    /// [`start`](Self::start) installs its callback.
    pub fn new(pfd: Pfd) -> Self {
        Self {
            inner: Arc::new(ConnInner {
                state: Mutex::new(ConnState {
                    closed: false,
                    readq: AioList::new(),
                    writeq: AioList::new(),
                }),
                pfd,
            }),
        }
    }

    /// Registers an already-connected std stream with `reactor` and wraps it.
    pub fn from_stream(reactor: &ReactorHandle, stream: TcpStream) -> Result<Self> {
        let pfd = Pfd::new(reactor, OwnedFd::from(stream))?;
        Ok(Self::new(pfd))
    }

    /// Applies the initial socket options and installs the readiness
    /// callback.
    ///
    /// Failing to apply an option is logged and otherwise ignored.
    pub fn start(&self, nodelay: bool, keepalive: bool) {
        if let Some(fd) = self.inner.pfd.fd() {
            apply_initial(fd, NODELAY, nodelay);
            apply_initial(fd, KEEPALIVE, keepalive);
        }

        let conn = Arc::downgrade(&self.inner);
        self.inner.pfd.set_callback(Arc::new(move |events: Events| {
            if let Some(conn) = conn.upgrade() {
                conn.on_ready(events);
            }
        }));

        debug!(fd = ?self.inner.pfd.fd(), nodelay, keepalive, "connection started");
    }

    /// Same as [`start`](Self::start), with options taken from `config`.
    pub fn start_with(&self, config: &ConnConfig) {
        self.start(config.nodelay, config.keepalive);
    }

    /// Submits a write of the operation's buffers.
    ///
    /// The operation finishes with the number of bytes the socket accepted
    /// in a single gather-write, which may be less than the total buffer
    /// length; resubmit the remainder if needed.
    pub fn send(&self, aio: &Aio) {
        self.submit(aio, Direction::Write);
    }

    /// Submits a read into the operation's buffers.
    ///
    /// The operation finishes with the number of bytes delivered by a
    /// single scatter-read, filling the buffers in order. End of stream
    /// finishes it with [`Error::Closed`].
    ///
    /// A read whose buffers are all empty finishes with `Ok(0)` without
    /// touching the socket, so it never reports end of stream.
    pub fn recv(&self, aio: &Aio) {
        self.submit(aio, Direction::Read);
    }

    /// Closes the connection.
    ///
    /// Every pending operation finishes with [`Error::Closed`], and so does
    /// any operation submitted afterwards. Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Returns `true` once the connection has been closed, locally or by a
    /// hang-up.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Number of reads and writes currently queued.
    pub fn pending(&self) -> (usize, usize) {
        let state = self.inner.state.lock();
        (state.readq.len(), state.writeq.len())
    }

    /// Closes the connection and releases the descriptor.
    pub fn finalize(self) {
        drop(self);
    }

    fn submit(&self, aio: &Aio, dir: Direction) {
        if let Err(err) = aio.begin() {
            warn!(error = %err, ?dir, "operation submitted while still running");
            return;
        }

        let mut done = Completions::new();
        {
            let mut state = self.inner.state.lock();
            self.inner.enqueue(&mut state, aio, dir, &mut done);
        }
        done.dispatch();
    }
}

impl Drop for TcpConn {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl ConnInner {
    fn enqueue(
        self: &Arc<Self>,
        state: &mut ConnState,
        aio: &Aio,
        dir: Direction,
        done: &mut Completions,
    ) {
        if state.closed {
            done.push(aio.finish_error(Error::Closed));
            return;
        }

        let key = state.queue_mut(dir).append(aio.clone());

        let conn = Arc::downgrade(self);
        let scheduled = aio.schedule(Box::new(move |aio: &Aio, reason: Error| {
            if let Some(conn) = conn.upgrade() {
                conn.cancel(dir, key, aio, reason);
            }
        }));

        if let Err(err) = scheduled {
            state.queue_mut(dir).remove(key);
            done.push(aio.finish_error(err));
            return;
        }

        // Only the head may transfer; anything behind it is already
        // covered by the readiness armed for the head.
        if state.queue(dir).first_key() != Some(key) {
            return;
        }

        self.drain(state, dir, done);

        if state.queue(dir).first_key() == Some(key) {
            self.arm(state, dir.events(), done);
        }
    }

    /// Moves as many queued operations of one direction as the socket
    /// currently allows.
    fn drain(&self, state: &mut ConnState, dir: Direction, done: &mut Completions) {
        if state.closed {
            return;
        }
        let Some(fd) = self.pfd.fd() else {
            return;
        };

        while let Some(aio) = state.queue(dir).first().cloned() {
            match transfer(fd, &aio, dir) {
                Transfer::Done(n) => {
                    trace!(fd, ?dir, bytes = n, "transfer complete");
                    aio.bump_count(n);
                    state.queue_mut(dir).pop_front();
                    done.push(aio.finish());
                }
                Transfer::WouldBlock => return,
                Transfer::PeerClosed => {
                    trace!(fd, "peer closed the stream");
                    state.queue_mut(dir).pop_front();
                    done.push(aio.finish_error(Error::Closed));
                }
                Transfer::Rejected(err) => {
                    trace!(fd, ?dir, error = %err, "operation rejected");
                    state.queue_mut(dir).pop_front();
                    done.push(aio.finish_error(err));
                }
                Transfer::Failed(err) => {
                    debug!(fd, ?dir, error = %err, "transfer failed");
                    state.queue_mut(dir).pop_front();
                    done.push(aio.finish_error(err));
                    return;
                }
            }
        }
    }

    fn on_ready(&self, events: Events) {
        let mut done = Completions::new();
        {
            let mut state = self.state.lock();

            if events.intersects(Events::FATAL) {
                trace!(?events, "descriptor failed");
                self.close_locked(&mut state, &mut done);
            } else {
                if events.contains(Events::READ) {
                    self.drain(&mut state, Direction::Read, &mut done);
                }
                if events.contains(Events::WRITE) {
                    self.drain(&mut state, Direction::Write, &mut done);
                }

                let mut rearm = Events::empty();
                if !state.writeq.is_empty() {
                    rearm |= Events::WRITE;
                }
                if !state.readq.is_empty() {
                    rearm |= Events::READ;
                }

                if !state.closed && !rearm.is_empty() {
                    trace!(?rearm, "re-arming");
                    self.arm(&mut state, rearm, &mut done);
                }
            }
        }
        done.dispatch();
    }

    fn cancel(&self, dir: Direction, key: Key, aio: &Aio, reason: Error) {
        let completion = {
            let mut state = self.state.lock();
            state
                .queue_mut(dir)
                .remove_if(key, aio)
                .map(|aio| aio.finish_error(reason))
        };

        if let Some(completion) = completion {
            trace!(?dir, error = %reason, "operation canceled");
            completion.dispatch();
        }
    }

    fn arm(&self, state: &mut ConnState, events: Events, done: &mut Completions) {
        if let Err(err) = self.pfd.arm(events) {
            warn!(error = %err, "failed to arm the poller, closing connection");
            self.close_locked(state, done);
        }
    }

    fn close(&self) {
        let mut done = Completions::new();
        {
            let mut state = self.state.lock();
            self.close_locked(&mut state, &mut done);
        }
        done.dispatch();
    }

    fn close_locked(&self, state: &mut ConnState, done: &mut Completions) {
        if state.closed {
            return;
        }
        state.closed = true;

        for dir in [Direction::Read, Direction::Write] {
            while let Some(aio) = state.queue_mut(dir).pop_front() {
                done.push(aio.finish_error(Error::Closed));
            }
        }

        // Never calls back into this connection.
        self.pfd.close();
        debug!(fd = ?self.pfd.fd(), "connection closed");
    }
}

/// Attempts one scatter/gather transfer for `aio`.
fn transfer(fd: RawFd, aio: &Aio, dir: Direction) -> Transfer {
    aio.with_iov_mut(|bufs| {
        if bufs.len() > MAX_IOV {
            return Transfer::Rejected(Error::InvalidArgument);
        }

        let mut iov: ArrayVec<iovec, MAX_IOV> = ArrayVec::new();
        for buf in bufs.iter_mut().filter(|buf| !buf.is_empty()) {
            iov.push(iovec {
                iov_base: buf.as_mut_ptr().cast(),
                iov_len: buf.len(),
            });
        }

        // Nothing to move. An empty readv would read as end of stream.
        if iov.is_empty() {
            return Transfer::Done(0);
        }

        loop {
            let result = match dir {
                Direction::Read => sys_readv(fd, &iov),
                Direction::Write => sys_sendmsg(fd, &iov),
            };

            return match result {
                Ok(0) if dir == Direction::Read => Transfer::PeerClosed,
                Ok(n) => Transfer::Done(n),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => Transfer::WouldBlock,
                Err(err) => Transfer::Failed(err.into()),
            };
        }
    })
}

fn apply_initial(fd: RawFd, opt: SockOpt, value: bool) {
    if let Err(err) = sys_set_bool(fd, opt, value) {
        warn!(fd, ?opt, value, error = %err, "failed to apply initial socket option");
    }
}
