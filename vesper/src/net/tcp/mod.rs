//! TCP networking implementation.
//!
//! It is split into:
//! - [`listener`]: accepting incoming TCP connections,
//! - [`stream`]: connected streams with queued writes and callback reads.

pub mod listener;
pub mod stream;
