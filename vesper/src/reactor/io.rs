use crate::error::Error;
use crate::net::Connection;
use crate::reactor::poller::Interest;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::rc::Rc;

/// Lifecycle of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// A non-blocking connect is in flight.
    Connecting,
    /// Reads and writes are accepted.
    Open,
    /// A graceful `end()` was requested; the socket closes once the
    /// write queue drains.
    Closing,
    /// The socket is closed. Stale handles report this state too.
    Closed,
}

/// What a read callback receives.
#[derive(Debug)]
pub enum ReadEvent {
    /// Bytes received from the peer.
    Data(Vec<u8>),
    /// The peer closed its write side. Reading stops after this event.
    Eof,
    /// The read failed. Reading stops after this event.
    Error(Error),
}

pub(crate) type AcceptCallback = Rc<RefCell<dyn FnMut(Connection)>>;
pub(crate) type ReadCallback = Rc<RefCell<dyn FnMut(ReadEvent)>>;
pub(crate) type ConnectCallback = Box<dyn FnOnce(Result<Connection, Error>)>;
pub(crate) type WriteCallback = Box<dyn FnOnce(Result<(), Error>)>;

/// An entry registered in the reactor's I/O slab.
pub(crate) enum IoEntry {
    /// A listening socket.
    Listener(ListenerEntry),

    /// A connected (or connecting) stream socket.
    Stream(StreamEntry),
}

impl IoEntry {
    pub(crate) fn fd(&self) -> RawFd {
        match self {
            IoEntry::Listener(listener) => listener.fd,
            IoEntry::Stream(stream) => stream.fd,
        }
    }

    /// Interest currently held with the poller.
    pub(crate) fn registered(&self) -> Interest {
        match self {
            IoEntry::Listener(_) => Interest::READ,
            IoEntry::Stream(stream) => stream.registered,
        }
    }
}

pub(crate) struct ListenerEntry {
    pub(crate) fd: RawFd,
    pub(crate) local_addr: SocketAddr,
    pub(crate) on_accept: AcceptCallback,
}

/// One queued write.
pub(crate) struct WriteRequest {
    pub(crate) data: Vec<u8>,
    pub(crate) written: usize,
    pub(crate) on_complete: Option<WriteCallback>,
}

impl WriteRequest {
    pub(crate) fn remaining(&self) -> &[u8] {
        &self.data[self.written..]
    }

    pub(crate) fn is_done(&self) -> bool {
        self.written >= self.data.len()
    }
}

pub(crate) struct StreamEntry {
    pub(crate) fd: RawFd,
    pub(crate) state: ConnectionState,
    pub(crate) peer: Option<SocketAddr>,

    /// Bytes read during the current readiness pass, handed to the read
    /// callback in one piece.
    pub(crate) read_buffer: Vec<u8>,

    /// FIFO of pending writes.
    pub(crate) write_queue: VecDeque<WriteRequest>,

    pub(crate) on_connect: Option<ConnectCallback>,
    pub(crate) on_read: Option<ReadCallback>,

    /// Interest currently held with the poller.
    pub(crate) registered: Interest,
}

impl StreamEntry {
    pub(crate) fn new(fd: RawFd, state: ConnectionState, peer: Option<SocketAddr>) -> Self {
        Self {
            fd,
            state,
            peer,
            read_buffer: Vec::new(),
            write_queue: VecDeque::new(),
            on_connect: None,
            on_read: None,
            registered: Interest::NONE,
        }
    }

    /// Interest this stream should hold given its current state.
    pub(crate) fn wanted(&self) -> Interest {
        match self.state {
            ConnectionState::Connecting => Interest::WRITE,
            ConnectionState::Open | ConnectionState::Closing => Interest {
                read: self.on_read.is_some(),
                write: !self.write_queue.is_empty(),
            },
            ConnectionState::Closed => Interest::NONE,
        }
    }
}
