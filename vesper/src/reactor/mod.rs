//! Single-threaded event loop.
//!
//! The reactor is responsible for:
//! - driving socket readiness through the platform poller,
//! - firing one-shot and repeating timers,
//! - handing blocking work to a small thread pool and delivering the
//!   results back on the loop thread,
//! - running callbacks deferred to the next pass.
//!
//! Worker threads communicate with the loop through commands and a waker;
//! everything else happens on the thread that owns the [`Reactor`].

mod blocking;
mod command;
mod core;
mod event;
mod timer;

pub(crate) mod io;
pub(crate) mod poller;

pub use self::core::{Reactor, ReactorConfig, StopHandle};
pub use io::{ConnectionState, ReadEvent};
pub use timer::TimerId;

pub(crate) use self::core::WeakReactor;
