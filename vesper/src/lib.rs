//! # Vesper
//!
//! **Vesper** is a small single-threaded event loop for embedding a script
//! engine, in the spirit of a tiny Node.js host. Scripts schedule timers,
//! open TCP connections, talk HTTP and read files; the results come back
//! through script callbacks, always on the loop thread.
//!
//! Vesper provides:
//!
//! - A **reactor** driving epoll (Linux) or kqueue (macOS), one-shot and
//!   repeating timers, and a bounded pool for blocking work
//! - **TCP** connections and listeners with queued writes and
//!   callback-driven reads
//! - A minimal **HTTP/1.1** client and a fixed-response server
//! - Whole-file **reads and writes** off the loop thread
//! - A **retention boundary** that keeps script callbacks alive exactly as
//!   long as their operation is outstanding
//!
//! ## Quick Start
//!
//! The reactor can be used on its own:
//!
//! ```rust,ignore
//! use vesper::reactor::Reactor;
//! use std::time::Duration;
//!
//! let reactor = Reactor::new()?;
//!
//! reactor.set_timeout(Duration::from_millis(100), || {
//!     println!("timer fired");
//! });
//!
//! // Returns once nothing is left to wait for.
//! reactor.run()?;
//! ```
//!
//! Embedders implement [`script::ScriptEngine`] and forward the script
//! globals to a [`Runtime`]:
//!
//! ```rust,ignore
//! let runtime = vesper::RuntimeBuilder::new().build(MyEngine::new())?;
//! runtime.execute("setTimeout(() => console.log('hi'), 10)")?;
//! std::process::exit(runtime.exit_code().unwrap_or(0));
//! ```
//!
//! ## Modules
//!
//! - [`reactor`]: event loop, timers, stop handles
//! - [`net`]: TCP connections, listeners and name resolution
//! - [`http`]: HTTP client and server
//! - [`fs`]: whole-file operations
//! - [`script`]: the engine trait and callback retention
//! - [`runtime`]: the script-facing API

mod error;
mod utils;

pub mod fs;
pub mod http;
pub mod net;
pub mod reactor;
pub mod runtime;
pub mod script;

pub use error::{Error, Result};
pub use runtime::{Runtime, RuntimeBuilder};
