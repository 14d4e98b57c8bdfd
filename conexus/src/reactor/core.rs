use super::builder::ReactorBuilder;
use super::event::Event;
use super::pfd::PfdShared;
use super::poller::Poller;
use crate::error::Result;
use crate::utils::{Key, Slab};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error, trace};

/// The reactor.
///
/// The reactor runs on a dedicated thread and is responsible for:
/// - waiting for OS readiness events,
/// - routing each event to the registered descriptor,
/// - running that descriptor's callback.
///
/// Every descriptor is registered with exactly one reactor, and a reactor
/// has exactly one thread, so callbacks for a given descriptor are never
/// delivered concurrently. Applications that need more I/O parallelism
/// start several reactors and spread connections across them.
///
/// Dropping the reactor stops and joins its thread. Descriptors that are
/// still registered stay valid but no longer receive events.
pub struct Reactor {
    handle: ReactorHandle,
    thread: Option<JoinHandle<()>>,
}

/// A cloneable handle used to register descriptors with a reactor.
#[derive(Clone)]
pub struct ReactorHandle {
    pub(crate) inner: Arc<ReactorInner>,
}

pub(crate) struct ReactorInner {
    pub(crate) poller: Poller,

    /// Registered descriptors indexed by poller token.
    pub(crate) registry: Mutex<Slab<Arc<PfdShared>>>,

    shutdown: AtomicBool,

    /// Identifier of the reactor thread, set once it is spawned.
    thread: OnceLock<ThreadId>,
}

impl Reactor {
    /// Starts a reactor with the default configuration.
    pub fn new() -> Result<Self> {
        ReactorBuilder::new().build()
    }

    /// Returns a builder to configure a new reactor.
    pub fn builder() -> ReactorBuilder {
        ReactorBuilder::new()
    }

    pub(crate) fn start(builder: ReactorBuilder) -> Result<Self> {
        let inner = Arc::new(ReactorInner {
            poller: Poller::new()?,
            registry: Mutex::new(Slab::new(64)),
            shutdown: AtomicBool::new(false),
            thread: OnceLock::new(),
        });

        let worker = inner.clone();
        let capacity = builder.event_capacity;
        let thread = thread::Builder::new()
            .name(builder.name.clone())
            .spawn(move || worker.run(capacity))?;

        let _ = inner.thread.set(thread.thread().id());
        debug!(name = %builder.name, "reactor started");

        Ok(Self {
            handle: ReactorHandle { inner },
            thread: Some(thread),
        })
    }

    /// Returns a handle to this reactor.
    pub fn handle(&self) -> ReactorHandle {
        self.handle.clone()
    }
}

impl Drop for Reactor {
    /// Stops the reactor thread and waits for it to exit.
    fn drop(&mut self) {
        self.handle.inner.shutdown.store(true, Ordering::Release);
        self.handle.inner.poller.wake();

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }

        debug!("reactor stopped");
    }
}

impl ReactorInner {
    fn run(&self, capacity: usize) {
        let mut buffer = Vec::with_capacity(capacity);
        let mut events: Vec<Event> = Vec::with_capacity(capacity);

        while !self.shutdown.load(Ordering::Acquire) {
            if let Err(err) = self.poller.wait(&mut buffer, &mut events) {
                error!(error = %err, "reactor poll failed");
                break;
            }

            for event in events.drain(..) {
                let pfd = self
                    .registry
                    .lock()
                    .get(Key::from_u64(event.token))
                    .cloned();

                match pfd {
                    Some(pfd) => pfd.dispatch(event.events),
                    None => trace!(token = event.token, "event for a released descriptor"),
                }
            }
        }
    }

    /// Returns `true` when called from this reactor's thread.
    pub(crate) fn is_current_thread(&self) -> bool {
        self.thread.get() == Some(&thread::current().id())
    }
}
