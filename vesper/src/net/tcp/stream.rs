use crate::error::Error;
use crate::reactor::io::{ConnectionState, ReadEvent, StreamEntry};
use crate::reactor::poller::platform::{
    domain_of, is_in_progress, sys_close, sys_connect, sys_socket,
};
use crate::reactor::{Reactor, WeakReactor};
use crate::utils::Key;

use std::cell::RefCell;
use std::fmt;
use std::net::SocketAddr;
use std::rc::Rc;

/// Stable identity of a connection, usable as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

/// A TCP connection driven by a [`Reactor`].
///
/// `Connection` is a handle: clones refer to the same socket, and dropping
/// every handle does **not** close it. The socket stays registered (and
/// keeps the reactor alive) until it is closed or ended explicitly. A peer
/// EOF only stops reading.
///
/// Once the connection is closed, every handle becomes stale: `write`
/// fails with [`Error::Closed`] and the other methods are no-ops.
#[derive(Clone)]
pub struct Connection {
    reactor: WeakReactor,
    key: Key,
}

impl Connection {
    pub(crate) fn from_parts(reactor: WeakReactor, key: Key) -> Self {
        Self { reactor, key }
    }

    /// Opens a connection to `addr`.
    ///
    /// `on_connect` runs exactly once on the loop thread, with the open
    /// connection or with [`Error::Connect`]. It never runs before this
    /// function returns.
    pub fn connect(
        reactor: &Reactor,
        addr: SocketAddr,
        on_connect: impl FnOnce(Result<Connection, Error>) + 'static,
    ) {
        let fd = match sys_socket(domain_of(&addr)) {
            Ok(fd) => fd,
            Err(e) => {
                reactor.defer(move || on_connect(Err(Error::Connect(e))));
                return;
            }
        };

        match sys_connect(fd, &addr) {
            Ok(()) => {
                let key = reactor.insert_stream(StreamEntry::new(
                    fd,
                    ConnectionState::Open,
                    Some(addr),
                ));
                let connection = Connection::from_parts(reactor.downgrade(), key);

                reactor.defer(move || on_connect(Ok(connection)));
            }
            Err(e) if is_in_progress(&e) => {
                log::debug!("connecting to {addr}");

                let mut entry = StreamEntry::new(fd, ConnectionState::Connecting, Some(addr));
                entry.on_connect = Some(Box::new(on_connect));
                reactor.insert_stream(entry);
            }
            Err(e) => {
                sys_close(fd);
                reactor.defer(move || on_connect(Err(Error::Connect(e))));
            }
        }
    }

    pub fn id(&self) -> ConnectionId {
        ConnectionId(self.key.to_bits())
    }

    /// Current state; stale handles report [`ConnectionState::Closed`].
    pub fn state(&self) -> ConnectionState {
        match self.reactor.upgrade() {
            Some(reactor) => reactor.stream_state(self.key),
            None => ConnectionState::Closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.reactor.upgrade()?.stream_peer(self.key)
    }

    /// Starts delivering incoming data to `on_read`.
    ///
    /// Every readiness pass hands the callback all bytes read so far as one
    /// [`ReadEvent::Data`]. [`ReadEvent::Eof`] and [`ReadEvent::Error`] are
    /// terminal: reading stops after them, but the connection is not
    /// closed. Calling `read_start` again replaces the callback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] on a closed or stale connection.
    pub fn read_start(&self, on_read: impl FnMut(ReadEvent) + 'static) -> Result<(), Error> {
        let reactor = self.reactor.upgrade().ok_or(Error::Closed)?;
        reactor.read_start(self.key, Rc::new(RefCell::new(on_read)))
    }

    /// Stops delivering reads and drops the read callback.
    pub fn read_stop(&self) {
        if let Some(reactor) = self.reactor.upgrade() {
            reactor.read_stop(self.key);
        }
    }

    /// Queues `data` for writing.
    ///
    /// Writes complete in FIFO order; `on_complete` runs once all of `data`
    /// has been handed to the kernel, or with the error that stopped it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] synchronously if the connection is closing
    /// or closed. `on_complete` is not called in that case.
    pub fn write(
        &self,
        data: impl Into<Vec<u8>>,
        on_complete: impl FnOnce(Result<(), Error>) + 'static,
    ) -> Result<(), Error> {
        let reactor = self.reactor.upgrade().ok_or(Error::Closed)?;
        reactor.write(self.key, data.into(), Box::new(on_complete))
    }

    /// Closes the connection after every queued write has been flushed.
    pub fn end(&self) {
        if let Some(reactor) = self.reactor.upgrade() {
            reactor.end(self.key);
        }
    }

    /// Closes the connection now.
    ///
    /// Pending writes are discarded without their callbacks being called.
    pub fn close(&self) {
        if let Some(reactor) = self.reactor.upgrade() {
            reactor.close(self.key);
        }
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Connection {}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}
