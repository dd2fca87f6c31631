//! macOS `kqueue`-based poller implementation.
//!
//! Read and write interests map to the `EVFILT_READ` and `EVFILT_WRITE`
//! filters. Cross-thread wake-ups use an `EVFILT_USER` event registered
//! once on the kqueue itself, so no extra descriptor is needed.

use super::common::Interest;
use super::Waker;
use crate::reactor::event::Event;

use libc::{
    EV_ADD, EV_CLEAR, EV_DELETE, EV_ENABLE, EV_EOF, EV_ERROR, EVFILT_READ, EVFILT_USER,
    EVFILT_WRITE, NOTE_TRIGGER, kevent, kqueue, timespec,
};
use std::io;
use std::os::unix::io::RawFd;
use std::ptr;
use std::sync::Arc;
use std::time::Duration;

/// Identifier of the `EVFILT_USER` wake event.
const WAKE_IDENT: usize = 0;

/// macOS `kqueue` poller.
pub(crate) struct KqueuePoller {
    /// Reusable buffer for kernel events.
    events: Vec<kevent>,

    /// Waker wrapping the kqueue descriptor. It owns that descriptor.
    waker: Arc<Waker>,
}

fn change(ident: usize, filter: i16, flags: u16, fflags: u32, token: usize) -> kevent {
    kevent {
        ident,
        filter,
        flags,
        fflags,
        data: 0,
        udata: token as *mut _,
    }
}

fn submit(kq: RawFd, changes: &[kevent]) -> io::Result<()> {
    if changes.is_empty() {
        return Ok(());
    }

    let rc = unsafe {
        kevent(
            kq,
            changes.as_ptr(),
            changes.len() as i32,
            ptr::null_mut(),
            0,
            ptr::null(),
        )
    };

    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

impl Waker {
    /// Wake the poller by triggering the user event.
    pub(crate) fn wake(&self) {
        let trigger = change(WAKE_IDENT, EVFILT_USER, 0, NOTE_TRIGGER, 0);
        let _ = submit(self.0, &[trigger]);
    }
}

impl KqueuePoller {
    /// Create a new `KqueuePoller` able to report up to `capacity` events
    /// per wake.
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        let kq = unsafe { kqueue() };
        if kq < 0 {
            return Err(io::Error::last_os_error());
        }

        let waker = Arc::new(Waker(kq));
        let user = change(WAKE_IDENT, EVFILT_USER, EV_ADD | EV_ENABLE | EV_CLEAR, 0, 0);
        submit(kq, &[user])?;

        Ok(Self {
            events: Vec::with_capacity(capacity.max(1)),
            waker,
        })
    }

    pub(crate) fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    /// Register a file descriptor with the poller.
    pub(crate) fn register(&self, fd: RawFd, token: usize, interest: Interest) -> io::Result<()> {
        self.apply(fd, token, Interest::NONE, interest)
    }

    /// Update interest flags for an already registered descriptor.
    ///
    /// kqueue has no "modify" operation, so both filters are re-added or
    /// deleted according to the new interest.
    pub(crate) fn reregister(&self, fd: RawFd, token: usize, interest: Interest) -> io::Result<()> {
        let previous = Interest {
            read: true,
            write: true,
        };
        self.apply(fd, token, previous, interest)
    }

    /// Remove a file descriptor from the poller.
    pub(crate) fn deregister(&self, fd: RawFd) -> io::Result<()> {
        // Deleting a filter that was never added fails with ENOENT; each
        // filter is submitted on its own so one miss does not skip the other.
        let _ = submit(self.waker.0, &[change(fd as usize, EVFILT_READ, EV_DELETE, 0, 0)]);
        let _ = submit(self.waker.0, &[change(fd as usize, EVFILT_WRITE, EV_DELETE, 0, 0)]);
        Ok(())
    }

    fn apply(&self, fd: RawFd, token: usize, previous: Interest, next: Interest) -> io::Result<()> {
        let ident = fd as usize;

        for (filter, was, wanted) in [
            (EVFILT_READ, previous.read, next.read),
            (EVFILT_WRITE, previous.write, next.write),
        ] {
            if wanted {
                submit(
                    self.waker.0,
                    &[change(ident, filter, EV_ADD | EV_ENABLE, 0, token)],
                )?;
            } else if was {
                let _ = submit(self.waker.0, &[change(ident, filter, EV_DELETE, 0, token)]);
            }
        }

        Ok(())
    }

    /// Poll for I/O readiness events.
    ///
    /// Both filters of one descriptor are merged into a single [`Event`].
    pub(crate) fn poll(
        &mut self,
        events: &mut Vec<Event>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        events.clear();

        let ts = timeout.map(|t| timespec {
            tv_sec: t.as_secs() as libc::time_t,
            tv_nsec: t.subsec_nanos() as libc::c_long,
        });
        let ts_ptr = ts
            .as_ref()
            .map(|t| t as *const timespec)
            .unwrap_or(ptr::null());

        let n = unsafe {
            kevent(
                self.waker.0,
                ptr::null(),
                0,
                self.events.as_mut_ptr(),
                self.events.capacity() as i32,
                ts_ptr,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        unsafe {
            self.events.set_len(n as usize);
        }

        for ev in &self.events {
            if ev.filter == EVFILT_USER {
                continue;
            }

            let token = ev.udata as usize;
            let failed = ev.flags & (EV_EOF | EV_ERROR) != 0;
            let readable = ev.filter == EVFILT_READ || failed;
            let writable = ev.filter == EVFILT_WRITE || failed;

            if let Some(existing) = events.iter_mut().find(|e| e.token == token) {
                existing.readable |= readable;
                existing.writable |= writable;
            } else {
                events.push(Event {
                    token,
                    readable,
                    writable,
                });
            }
        }

        Ok(())
    }
}
