use super::Runtime;
use crate::error::Error;
use crate::reactor::{Reactor, ReactorConfig};
use crate::script::ScriptEngine;

/// Builder for configuring and creating a runtime.
///
/// # Examples
///
/// ```rust,ignore
/// let runtime = RuntimeBuilder::new()
///     .worker_threads(2)
///     .close_after_response(true)
///     .build(engine)?;
/// ```
#[derive(Debug, Clone)]
pub struct RuntimeBuilder {
    config: ReactorConfig,

    /// Whether HTTP servers end each connection after `res.end()`.
    close_after_response: bool,
}

impl RuntimeBuilder {
    /// Creates a builder with the default configuration: 4 blocking
    /// workers, a listen backlog of 10, 64 KiB reads, 64 events per poll,
    /// and HTTP connections left open after a response.
    pub fn new() -> Self {
        Self {
            config: ReactorConfig::default(),
            close_after_response: false,
        }
    }

    /// Sets the maximum number of blocking-pool threads.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn worker_threads(mut self, n: usize) -> Self {
        assert!(n > 0, "worker_threads must be > 0");

        self.config.worker_threads = n;
        self
    }

    /// Sets the `listen(2)` backlog.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn listen_backlog(mut self, n: u32) -> Self {
        assert!(n > 0, "listen_backlog must be > 0");

        self.config.listen_backlog = n;
        self
    }

    /// Sets the size of each socket read.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn read_buffer_size(mut self, n: usize) -> Self {
        assert!(n > 0, "read_buffer_size must be > 0");

        self.config.read_buffer_size = n;
        self
    }

    /// Sets how many readiness events a single poll may return.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn event_capacity(mut self, n: usize) -> Self {
        assert!(n > 0, "event_capacity must be > 0");

        self.config.event_capacity = n;
        self
    }

    /// Makes HTTP servers close each connection once the response written
    /// by `res.end()` has been flushed.
    pub fn close_after_response(mut self, enabled: bool) -> Self {
        self.close_after_response = enabled;
        self
    }

    /// The reactor part of the configuration, for native use without a
    /// script engine.
    pub fn reactor_config(&self) -> ReactorConfig {
        self.config.clone()
    }

    /// Builds the runtime around `engine`.
    ///
    /// # Errors
    ///
    /// Fails if the OS poller cannot be created.
    pub fn build<E: ScriptEngine>(self, engine: E) -> Result<Runtime<E>, Error> {
        let reactor = Reactor::with_config(self.config)?;
        Ok(Runtime::from_parts(engine, reactor, self.close_after_response))
    }
}

impl Default for RuntimeBuilder {
    /// Creates a default `RuntimeBuilder`.
    fn default() -> Self {
        Self::new()
    }
}
