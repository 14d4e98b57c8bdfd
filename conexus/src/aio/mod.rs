//! Asynchronous operations.
//!
//! An [`Aio`] is a cancellable unit of I/O work. It carries a list of
//! buffers (the scatter/gather vector), a running byte count and, once
//! finished, exactly one terminal result: a byte count or an [`Error`].
//!
//! Operations are submitted to a connection, which takes over the
//! operation until it finishes. The submitter can block on
//! [`Aio::wait`], poll [`Aio::result`], or install a completion callback
//! with [`Aio::with_callback`].
//!
//! Cancellation is cooperative: whoever currently owns the operation
//! registers a handler through `schedule`, and [`Aio::abort`] hands the
//! operation back to that handler together with a reason code.

mod list;

pub(crate) use list::AioList;

use crate::error::{Error, Result};

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Callback invoked once an operation finishes.
pub type Callback = Arc<dyn Fn(&Aio) + Send + Sync>;

/// Handler registered by the current owner of a running operation.
pub(crate) type CancelFn = Box<dyn FnOnce(&Aio, Error) + Send>;

/// A cancellable asynchronous I/O operation.
///
/// Cloning an `Aio` yields another handle to the same operation.
#[derive(Clone)]
pub struct Aio {
    inner: Arc<AioInner>,
}

struct AioInner {
    state: Mutex<AioState>,

    /// Signalled whenever the operation finishes.
    finished: Condvar,

    callback: Option<Callback>,
}

#[derive(Default)]
struct AioState {
    iov: Vec<Vec<u8>>,
    count: usize,

    /// Set between `begin` and `finish`.
    busy: bool,

    result: Option<Result<usize>>,
    cancel: Option<CancelFn>,

    /// Abort requested before a cancellation handler was registered.
    abort: Option<Error>,
}

impl Aio {
    /// Creates an idle operation with no buffers.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates an idle operation that runs `callback` each time it finishes.
    ///
    /// The callback runs on whichever thread finishes the operation, which
    /// may be the reactor thread. It never runs while a connection lock is
    /// held, so it may submit new operations.
    pub fn with_callback<F>(callback: F) -> Self
    where
        F: Fn(&Aio) + Send + Sync + 'static,
    {
        Self::build(Some(Arc::new(callback)))
    }

    fn build(callback: Option<Callback>) -> Self {
        Self {
            inner: Arc::new(AioInner {
                state: Mutex::new(AioState::default()),
                finished: Condvar::new(),
                callback,
            }),
        }
    }

    /// Replaces the buffer list.
    ///
    /// For a write the buffers hold the bytes to send; for a read they are
    /// filled in order, each up to its current length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] while the operation is running.
    pub fn set_iov(&self, iov: Vec<Vec<u8>>) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.busy {
            return Err(Error::Busy);
        }

        state.iov = iov;
        Ok(())
    }

    /// Takes the buffer list out of the operation, leaving it empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] while the operation is running.
    pub fn take_iov(&self) -> Result<Vec<Vec<u8>>> {
        let mut state = self.inner.state.lock();
        if state.busy {
            return Err(Error::Busy);
        }

        Ok(std::mem::take(&mut state.iov))
    }

    /// Runs `f` with a view of the buffer list.
    pub fn with_iov<R>(&self, f: impl FnOnce(&[Vec<u8>]) -> R) -> R {
        f(&self.inner.state.lock().iov)
    }

    /// Number of buffers in the list, empty ones included.
    pub fn iov_len(&self) -> usize {
        self.inner.state.lock().iov.len()
    }

    /// Bytes transferred so far by the current or last run.
    pub fn count(&self) -> usize {
        self.inner.state.lock().count
    }

    /// Outcome of the last run, or `None` while running or before the
    /// first run.
    pub fn result(&self) -> Option<Result<usize>> {
        let state = self.inner.state.lock();
        if state.busy { None } else { state.result }
    }

    /// Returns `true` between submission and completion.
    pub fn is_busy(&self) -> bool {
        self.inner.state.lock().busy
    }

    /// Blocks until the operation finishes and returns its outcome.
    ///
    /// # Errors
    ///
    /// Returns the operation's terminal error, or [`Error::InvalidState`]
    /// if the operation was never submitted.
    pub fn wait(&self) -> Result<usize> {
        let mut state = self.inner.state.lock();
        while state.busy {
            self.inner.finished.wait(&mut state);
        }

        state.result.unwrap_or(Err(Error::InvalidState))
    }

    /// Like [`wait`](Self::wait), but aborts the operation with
    /// [`Error::TimedOut`] if it has not finished within `timeout`.
    ///
    /// The abort goes through the owner's cancellation handler, so an
    /// operation that completes concurrently keeps its real outcome.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<usize> {
        let deadline = Instant::now() + timeout;

        {
            let mut state = self.inner.state.lock();
            while state.busy {
                if self
                    .inner
                    .finished
                    .wait_until(&mut state, deadline)
                    .timed_out()
                {
                    break;
                }
            }

            if !state.busy {
                return state.result.unwrap_or(Err(Error::InvalidState));
            }
        }

        self.abort(Error::TimedOut);
        self.wait()
    }

    /// Requests cancellation with the given reason.
    ///
    /// If the operation is running, its owner finishes it with `reason`
    /// unless the owner already completed it. Aborting an idle operation
    /// does nothing.
    pub fn abort(&self, reason: Error) {
        let handler = {
            let mut state = self.inner.state.lock();
            if !state.busy {
                return;
            }

            match state.cancel.take() {
                Some(handler) => handler,
                None => {
                    state.abort = Some(reason);
                    return;
                }
            }
        };

        handler(self, reason);
    }

    /// Shorthand for `abort(Error::Canceled)`.
    pub fn cancel(&self) {
        self.abort(Error::Canceled);
    }

    /// Returns `true` if both handles refer to the same operation.
    pub fn ptr_eq(a: &Aio, b: &Aio) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Marks the start of a run.
    ///
    /// Fails with [`Error::Busy`] if the operation is already running.
    pub(crate) fn begin(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.busy {
            return Err(Error::Busy);
        }

        state.busy = true;
        state.count = 0;
        state.result = None;
        state.cancel = None;
        state.abort = None;

        Ok(())
    }

    /// Registers the cancellation handler of the current owner.
    ///
    /// Fails with the pending reason if [`abort`](Self::abort) was called
    /// after `begin`.
    pub(crate) fn schedule(&self, handler: CancelFn) -> Result<()> {
        let mut state = self.inner.state.lock();
        if !state.busy {
            return Err(Error::InvalidState);
        }
        if let Some(reason) = state.abort.take() {
            return Err(reason);
        }

        state.cancel = Some(handler);
        Ok(())
    }

    pub(crate) fn with_iov_mut<R>(&self, f: impl FnOnce(&mut [Vec<u8>]) -> R) -> R {
        f(&mut self.inner.state.lock().iov)
    }

    pub(crate) fn bump_count(&self, n: usize) {
        self.inner.state.lock().count += n;
    }

    /// Finishes the run successfully with the accumulated byte count.
    pub(crate) fn finish(&self) -> Completion {
        let mut state = self.inner.state.lock();
        let count = state.count;
        self.complete(&mut state, Ok(count))
    }

    /// Finishes the run with `err`.
    pub(crate) fn finish_error(&self, err: Error) -> Completion {
        let mut state = self.inner.state.lock();
        self.complete(&mut state, Err(err))
    }

    fn complete(&self, state: &mut AioState, result: Result<usize>) -> Completion {
        debug_assert!(state.busy, "finishing an operation that is not running");

        state.busy = false;
        state.cancel = None;
        state.abort = None;
        state.result = Some(result);
        self.inner.finished.notify_all();

        Completion {
            aio: self.clone(),
            callback: self.inner.callback.clone(),
        }
    }
}

impl Default for Aio {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Aio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Aio")
            .field("iov", &state.iov.len())
            .field("count", &state.count)
            .field("busy", &state.busy)
            .field("result", &state.result)
            .finish()
    }
}

/// A finished operation whose callback has not run yet.
///
/// Produced while a connection lock is held and dispatched after the lock
/// is released.
#[must_use = "a completion must be dispatched to run the callback"]
pub(crate) struct Completion {
    aio: Aio,
    callback: Option<Callback>,
}

impl Completion {
    pub(crate) fn dispatch(self) {
        if let Some(callback) = self.callback {
            callback(&self.aio);
        }
    }
}

/// Completions gathered under a lock.
#[derive(Default)]
pub(crate) struct Completions(Vec<Completion>);

impl Completions {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, completion: Completion) {
        self.0.push(completion);
    }

    pub(crate) fn dispatch(self) {
        for completion in self.0 {
            completion.dispatch();
        }
    }
}
