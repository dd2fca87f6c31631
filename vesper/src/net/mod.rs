//! TCP networking primitives.
//!
//! This module provides callback-driven TCP types built on top of the
//! [`Reactor`](crate::reactor::Reactor).
//!
//! It exposes abstractions for:
//! - listening for incoming TCP connections,
//! - establishing outbound TCP connections,
//! - resolving host names without blocking the loop.
//!
//! All callbacks run on the loop thread.
mod resolve;
mod tcp;

pub use resolve::resolve;
pub use tcp::listener::Listener;
pub use tcp::stream::{Connection, ConnectionId};
