//! Platform-specific I/O poller abstraction.
//!
//! This module provides a unified interface over platform-specific
//! I/O polling mechanisms (epoll on Linux, kqueue on macOS).
//!
//! The poller is used by the reactor to:
//! - wait for I/O readiness events,
//! - sleep until the next timer deadline,
//! - wake up when a blocking-pool job or a stop request completes
//!   on another thread.
//!
//! The concrete implementation is selected at compile time
//! depending on the target operating system.

pub(crate) mod common;

pub(crate) use common::{Interest, Waker};

#[cfg(target_os = "macos")]
mod kqueue;

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "macos")]
pub(crate) type Poller = kqueue::KqueuePoller;

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;

use std::time::Duration;

/// Converts a poll timeout into whole milliseconds, rounding up.
///
/// Rounding down would wake the loop just before a timer is due and make it
/// spin until the deadline passes.
pub(crate) fn timeout_millis(timeout: Option<Duration>) -> i32 {
    match timeout {
        None => -1,
        Some(t) => {
            let millis = t.as_nanos().div_ceil(1_000_000);
            i32::try_from(millis).unwrap_or(i32::MAX)
        }
    }
}
