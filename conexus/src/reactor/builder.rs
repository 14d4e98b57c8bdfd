use super::Reactor;
use crate::error::Result;

/// Builder for configuring and starting a reactor.
///
/// # Examples
///
/// ```rust,no_run
/// use conexus::reactor::ReactorBuilder;
///
/// let reactor = ReactorBuilder::new()
///     .name("io-0")
///     .event_capacity(256)
///     .build()
///     .unwrap();
/// ```
pub struct ReactorBuilder {
    /// Name given to the reactor thread.
    pub(crate) name: String,

    /// Maximum number of events collected per wait.
    pub(crate) event_capacity: usize,
}

impl ReactorBuilder {
    /// Creates a new `ReactorBuilder` with default configuration.
    ///
    /// The thread is named `conexus-reactor` and collects up to 64 events
    /// per wait.
    pub fn new() -> Self {
        Self {
            name: String::from("conexus-reactor"),
            event_capacity: 64,
        }
    }

    /// Sets the name of the reactor thread.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets how many readiness events are collected per wait.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn event_capacity(mut self, n: usize) -> Self {
        assert!(n > 0, "event_capacity must be > 0");

        self.event_capacity = n;
        self
    }

    /// Creates the poller and starts the reactor thread.
    pub fn build(self) -> Result<Reactor> {
        Reactor::start(self)
    }
}

impl Default for ReactorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
