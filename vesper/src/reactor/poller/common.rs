use std::os::fd::RawFd;

/// Readiness a registration is interested in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Interest {
    pub(crate) read: bool,
    pub(crate) write: bool,
}

impl Interest {
    pub(crate) const NONE: Interest = Interest {
        read: false,
        write: false,
    };

    pub(crate) const READ: Interest = Interest {
        read: true,
        write: false,
    };

    pub(crate) const WRITE: Interest = Interest {
        read: false,
        write: true,
    };

    /// Returns `true` when neither direction is wanted.
    ///
    /// Such registrations are removed from the poller entirely, because
    /// epoll keeps reporting `EPOLLHUP` even for an empty event mask.
    pub(crate) fn is_empty(self) -> bool {
        !self.read && !self.write
    }
}

/// Cross-thread wake-up handle for a poller.
///
/// Wraps the descriptor that interrupts a blocking wait: an `eventfd` on
/// Linux, the kqueue itself (through `EVFILT_USER`) on macOS.
pub(crate) struct Waker(pub(crate) RawFd);

unsafe impl Send for Waker {}
unsafe impl Sync for Waker {}

impl Drop for Waker {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}
