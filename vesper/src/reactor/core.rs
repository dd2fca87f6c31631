use super::blocking::BlockingPool;
use super::command::Command;
use super::event::Event;
use super::io::{
    AcceptCallback, ConnectionState, IoEntry, ListenerEntry, ReadCallback, ReadEvent, StreamEntry,
    WriteCallback, WriteRequest,
};
use super::poller::platform::{
    sys_accept, sys_close, sys_get_socket_error, sys_peername, sys_read, sys_send,
};
use super::poller::{Interest, Poller, Waker};
use super::timer::{TimerCallback, TimerId, TimerRegistry};
use crate::error::Error;
use crate::net::Connection;
use crate::utils::{Key, Slab};

use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

/// Tunables of a [`Reactor`].
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// Upper bound on blocking-pool threads (DNS, file I/O).
    pub worker_threads: usize,
    /// `listen(2)` backlog used by listeners.
    pub listen_backlog: u32,
    /// Size of the scratch buffer used for each `read(2)`.
    pub read_buffer_size: usize,
    /// Maximum number of readiness events handled per poll.
    pub event_capacity: usize,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            listen_backlog: 10,
            read_buffer_size: 64 * 1024,
            event_capacity: 64,
        }
    }
}

type JobCompletion = Box<dyn FnOnce(Box<dyn Any + Send>)>;

/// State owned by the loop thread.
///
/// It is only ever borrowed for short bookkeeping sections; callbacks run
/// after the borrow is released so they can call back into the reactor.
pub(crate) struct Core {
    poller: Poller,
    events: Vec<Event>,
    scratch: Vec<u8>,
    timers: TimerRegistry,
    io: Slab<IoEntry>,
    jobs: Slab<JobCompletion>,
    blocking: BlockingPool,
    deferred: VecDeque<Box<dyn FnOnce()>>,
    sender: Sender<Command>,
    receiver: Receiver<Command>,
    waker: Arc<Waker>,
    stopped: bool,
    config: ReactorConfig,
}

impl Core {
    /// Returns `true` while anything can still produce a callback.
    fn is_alive(&self) -> bool {
        self.timers.len() > 0
            || !self.io.is_empty()
            || !self.jobs.is_empty()
            || !self.deferred.is_empty()
    }
}

impl Drop for Core {
    /// Closes every descriptor still owned by the reactor.
    fn drop(&mut self) {
        drop(self.timers.drain());
        self.deferred.clear();

        for entry in self.io.drain() {
            sys_close(entry.fd());
        }
    }
}

/// A single-threaded event loop.
///
/// The reactor owns the OS poller, the timer registry, every socket
/// registered through [`net`](crate::net), and a bounded pool for blocking
/// work. A `Reactor` value is a cheap handle; clones drive the same loop.
///
/// Callbacks are always invoked from [`run`](Self::run), on the thread that
/// created the reactor, and never while its internal state is borrowed, so
/// they may freely schedule timers, write to connections or close them.
///
/// # Examples
///
/// ```rust,ignore
/// let reactor = Reactor::new()?;
/// reactor.set_timeout(Duration::from_millis(10), || println!("tick"));
/// reactor.run()?;
/// ```
#[derive(Clone)]
pub struct Reactor {
    core: Rc<RefCell<Core>>,
}

/// Non-owning reference to a reactor, held by connection handles.
#[derive(Clone)]
pub(crate) struct WeakReactor(Weak<RefCell<Core>>);

impl WeakReactor {
    pub(crate) fn upgrade(&self) -> Option<Reactor> {
        self.0.upgrade().map(|core| Reactor { core })
    }
}

/// Thread-safe handle that asks a reactor to stop.
#[derive(Clone)]
pub struct StopHandle {
    sender: Sender<Command>,
    waker: Arc<Waker>,
}

impl StopHandle {
    /// Makes the reactor's `run()` return after its current pass.
    pub fn stop(&self) {
        if self.sender.send(Command::Stop).is_ok() {
            self.waker.wake();
        }
    }
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.core.try_borrow() {
            Ok(core) => f
                .debug_struct("Reactor")
                .field("timers", &core.timers.len())
                .field("io", &core.io.len())
                .field("jobs", &core.jobs.len())
                .finish(),
            Err(_) => f.debug_struct("Reactor").finish_non_exhaustive(),
        }
    }
}

enum ReadOutcome {
    Pending,
    Eof,
    Failed(io::Error),
}

enum ReadyKind {
    Listener,
    Connecting,
    Stream,
}

/// Brings the poller registration of a stream in line with its state.
fn sync_interest(poller: &Poller, key: Key, stream: &mut StreamEntry) {
    let wanted = stream.wanted();
    if wanted == stream.registered {
        return;
    }

    let token = key.to_token();
    let result = match (stream.registered.is_empty(), wanted.is_empty()) {
        (true, false) => poller.register(stream.fd, token, wanted),
        (false, true) => poller.deregister(stream.fd),
        (false, false) => poller.reregister(stream.fd, token, wanted),
        (true, true) => Ok(()),
    };

    match result {
        Ok(()) => stream.registered = wanted,
        Err(e) => log::error!("failed to update poller interest for fd {}: {e}", stream.fd),
    }
}

impl Reactor {
    /// Creates a reactor with the default [`ReactorConfig`].
    pub fn new() -> Result<Self, Error> {
        Self::with_config(ReactorConfig::default())
    }

    /// Creates a reactor with the given configuration.
    pub fn with_config(config: ReactorConfig) -> Result<Self, Error> {
        let poller = Poller::new(config.event_capacity)?;
        let waker = poller.waker();
        let (sender, receiver) = mpsc::channel();

        let core = Core {
            poller,
            events: Vec::with_capacity(config.event_capacity),
            scratch: vec![0; config.read_buffer_size.max(1)],
            timers: TimerRegistry::new(),
            io: Slab::with_capacity(64),
            jobs: Slab::with_capacity(16),
            blocking: BlockingPool::new(config.worker_threads),
            deferred: VecDeque::new(),
            sender,
            receiver,
            waker,
            stopped: false,
            config,
        };

        Ok(Self {
            core: Rc::new(RefCell::new(core)),
        })
    }

    /// Returns the configuration this reactor was built with.
    pub fn config(&self) -> ReactorConfig {
        self.core.borrow().config.clone()
    }

    pub(crate) fn downgrade(&self) -> WeakReactor {
        WeakReactor(Rc::downgrade(&self.core))
    }

    /// Runs the loop until nothing is registered or [`stop`](Self::stop)
    /// is called.
    ///
    /// Returning because the reactor went idle is the normal way for a
    /// script host to finish.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Poll`] if the OS polling primitive fails. The
    /// reactor cannot recover from that.
    pub fn run(&self) -> Result<(), Error> {
        log::debug!("reactor loop started");

        loop {
            {
                let mut core = self.core.borrow_mut();

                if core.stopped {
                    core.stopped = false;
                    log::debug!("reactor loop stopped");
                    return Ok(());
                }

                if !core.is_alive() {
                    log::debug!("reactor loop idle");
                    return Ok(());
                }
            }

            self.turn()?;
        }
    }

    /// Makes [`run`](Self::run) return after the current dispatch pass.
    ///
    /// Called before `run`, the next `run` returns immediately.
    pub fn stop(&self) {
        self.core.borrow_mut().stopped = true;
    }

    /// Returns a `Send` handle able to stop this reactor from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        let core = self.core.borrow();
        StopHandle {
            sender: core.sender.clone(),
            waker: core.waker.clone(),
        }
    }

    /// Returns `true` when no timer, socket, blocking job or deferred
    /// callback is registered.
    pub fn is_idle(&self) -> bool {
        !self.core.borrow().is_alive()
    }

    /// One loop iteration: poll, then dispatch every ready source.
    fn turn(&self) -> Result<(), Error> {
        let mut events = {
            let mut core = self.core.borrow_mut();

            let timeout = if !core.deferred.is_empty() {
                Some(Duration::ZERO)
            } else {
                let now = Instant::now();
                core.timers
                    .next_deadline()
                    .map(|deadline| deadline.saturating_duration_since(now))
            };

            let mut events = std::mem::take(&mut core.events);
            if let Err(e) = core.poller.poll(&mut events, timeout) {
                log::error!("poller failed: {e}");
                core.events = events;
                return Err(Error::Poll(e));
            }

            events
        };

        log::trace!("poll returned {} events", events.len());

        for event in &events {
            self.dispatch(*event);
        }

        events.clear();
        self.core.borrow_mut().events = events;

        self.drain_commands();
        self.run_deferred();
        self.fire_timers();

        Ok(())
    }

    fn dispatch(&self, event: Event) {
        let Some(key) = Key::from_token(event.token) else {
            return;
        };

        let kind = {
            let core = self.core.borrow();
            match core.io.get(key) {
                None => return,
                Some(IoEntry::Listener(_)) => ReadyKind::Listener,
                Some(IoEntry::Stream(stream)) if stream.state == ConnectionState::Connecting => {
                    ReadyKind::Connecting
                }
                Some(IoEntry::Stream(_)) => ReadyKind::Stream,
            }
        };

        log::trace!(
            "dispatch {key:?} readable={} writable={}",
            event.readable,
            event.writable
        );

        match kind {
            ReadyKind::Listener => {
                if event.readable {
                    self.accept_ready(key);
                }
            }
            ReadyKind::Connecting => {
                if event.readable || event.writable {
                    self.connect_ready(key);
                }
            }
            ReadyKind::Stream => {
                if event.readable {
                    self.read_ready(key);
                }
                if event.writable {
                    self.write_ready(key);
                }
            }
        }
    }

    fn accept_ready(&self, key: Key) {
        loop {
            let (fd, on_accept) = {
                let core = self.core.borrow();
                let Some(IoEntry::Listener(listener)) = core.io.get(key) else {
                    return;
                };
                (listener.fd, listener.on_accept.clone())
            };

            match sys_accept(fd) {
                Ok((client, peer)) => {
                    log::debug!("accepted connection from {peer}");

                    let entry = StreamEntry::new(client, ConnectionState::Open, Some(peer));
                    let client_key = self.insert_stream(entry);
                    let connection = Connection::from_parts(self.downgrade(), client_key);

                    (&mut *on_accept.borrow_mut())(connection);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("accept failed: {e}");
                    return;
                }
            }
        }
    }

    fn connect_ready(&self, key: Key) {
        let fd = {
            let core = self.core.borrow();
            match core.io.get(key) {
                Some(entry) => entry.fd(),
                None => return,
            }
        };

        match sys_get_socket_error(fd) {
            Ok(()) => {
                let callback = {
                    let mut core = self.core.borrow_mut();
                    let core = &mut *core;
                    let Some(IoEntry::Stream(stream)) = core.io.get_mut(key) else {
                        return;
                    };

                    stream.state = ConnectionState::Open;
                    stream.peer = sys_peername(fd).ok();
                    sync_interest(&core.poller, key, stream);

                    stream.on_connect.take()
                };

                log::debug!("connection {key:?} established");

                if let Some(callback) = callback {
                    callback(Ok(Connection::from_parts(self.downgrade(), key)));
                }
            }
            Err(e) => {
                log::debug!("connection {key:?} failed: {e}");

                let mut entry = self.remove_io(key);
                let callback = match entry.as_mut() {
                    Some(IoEntry::Stream(stream)) => stream.on_connect.take(),
                    _ => None,
                };
                drop(entry);

                if let Some(callback) = callback {
                    callback(Err(Error::Connect(e)));
                }
            }
        }
    }

    fn read_ready(&self, key: Key) {
        let (on_read, data, outcome) = {
            let mut core = self.core.borrow_mut();
            let core = &mut *core;

            let Some(IoEntry::Stream(stream)) = core.io.get_mut(key) else {
                return;
            };
            let Some(on_read) = stream.on_read.clone() else {
                return;
            };

            let outcome = loop {
                match sys_read(stream.fd, &mut core.scratch) {
                    Ok(0) => break ReadOutcome::Eof,
                    Ok(n) => stream.read_buffer.extend_from_slice(&core.scratch[..n]),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break ReadOutcome::Pending,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => break ReadOutcome::Failed(e),
                }
            };

            if !matches!(outcome, ReadOutcome::Pending) {
                stream.on_read = None;
                sync_interest(&core.poller, key, stream);
            }

            (on_read, std::mem::take(&mut stream.read_buffer), outcome)
        };

        if !data.is_empty() {
            (&mut *on_read.borrow_mut())(ReadEvent::Data(data));
        }

        let terminal = match outcome {
            ReadOutcome::Pending => return,
            ReadOutcome::Eof => ReadEvent::Eof,
            ReadOutcome::Failed(e) => ReadEvent::Error(Error::Io(e)),
        };

        if self.core.borrow().io.contains(key) {
            (&mut *on_read.borrow_mut())(terminal);
        }
    }

    fn write_ready(&self, key: Key) {
        let (completed, failed, close_now) = {
            let mut core = self.core.borrow_mut();
            let core = &mut *core;

            let Some(IoEntry::Stream(stream)) = core.io.get_mut(key) else {
                return;
            };

            let mut completed: Vec<WriteCallback> = Vec::new();
            let mut failure = None;

            while let Some(front) = stream.write_queue.front_mut() {
                if front.is_done() {
                    if let Some(done) = stream.write_queue.pop_front() {
                        completed.extend(done.on_complete);
                    }
                    continue;
                }

                match sys_send(stream.fd, front.remaining()) {
                    Ok(0) => break,
                    Ok(n) => front.written += n,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }

            let failed = match failure {
                Some(e) => {
                    log::warn!("write on {key:?} failed: {e}");
                    let callbacks: Vec<WriteCallback> = stream
                        .write_queue
                        .drain(..)
                        .filter_map(|request| request.on_complete)
                        .collect();
                    Some((Error::Io(e), callbacks))
                }
                None => None,
            };

            let close_now =
                stream.state == ConnectionState::Closing && stream.write_queue.is_empty();
            if !close_now {
                sync_interest(&core.poller, key, stream);
            }

            (completed, failed, close_now)
        };

        let removed = if close_now { self.remove_io(key) } else { None };

        for callback in completed {
            callback(Ok(()));
        }

        if let Some((error, callbacks)) = failed {
            for callback in callbacks {
                callback(Err(error.duplicate()));
            }
        }

        drop(removed);
    }

    fn drain_commands(&self) {
        loop {
            let command = self.core.borrow().receiver.try_recv();

            match command {
                Ok(Command::Complete { key, output }) => {
                    let done = self.core.borrow_mut().jobs.remove(key);
                    if let Some(done) = done {
                        done(output);
                    }
                }
                Ok(Command::Stop) => self.stop(),
                Err(_) => break,
            }
        }
    }

    fn run_deferred(&self) {
        let deferred = std::mem::take(&mut self.core.borrow_mut().deferred);

        for callback in deferred {
            callback();
        }
    }

    fn fire_timers(&self) {
        let now = Instant::now();
        let due = self.core.borrow_mut().timers.expired(now);

        for id in due {
            let callback = self.core.borrow_mut().timers.begin_fire(id);

            match callback {
                Some(TimerCallback::Once(callback)) => callback(),
                Some(TimerCallback::Repeat(mut callback)) => {
                    callback();
                    let leftover = self.core.borrow_mut().timers.rearm(id, now, callback);
                    drop(leftover);
                }
                None => {}
            }
        }
    }

    /// Runs `callback` once after `delay`.
    pub fn set_timeout(&self, delay: Duration, callback: impl FnOnce() + 'static) -> TimerId {
        let fire_at = Instant::now() + delay;
        self.core.borrow_mut().timers.schedule(
            fire_at,
            Duration::ZERO,
            TimerCallback::Once(Box::new(callback)),
        )
    }

    /// Runs `callback` every `period` until cancelled.
    ///
    /// Periods shorter than one millisecond are clamped to one millisecond.
    pub fn set_interval(&self, period: Duration, callback: impl FnMut() + 'static) -> TimerId {
        let period = period.max(Duration::from_millis(1));
        let fire_at = Instant::now() + period;
        self.core.borrow_mut().timers.schedule(
            fire_at,
            period,
            TimerCallback::Repeat(Box::new(callback)),
        )
    }

    /// Cancels a timer.
    ///
    /// Returns `true` if the timer was live. Cancelling from inside the
    /// timer's own callback prevents any further firing.
    pub fn clear_timer(&self, id: TimerId) -> bool {
        let (live, callback) = {
            let mut core = self.core.borrow_mut();
            let live = core.timers.contains(id);
            (live, core.timers.cancel(id))
        };
        drop(callback);

        live
    }

    /// Queues `callback` for the next dispatch pass.
    pub fn defer(&self, callback: impl FnOnce() + 'static) {
        self.core
            .borrow_mut()
            .deferred
            .push_back(Box::new(callback));
    }

    /// Runs `work` on the blocking pool and hands its output to `done` on
    /// the loop thread.
    pub fn spawn_blocking<T, W, D>(&self, work: W, done: D)
    where
        T: Send + 'static,
        W: FnOnce() -> T + Send + 'static,
        D: FnOnce(T) + 'static,
    {
        let mut core = self.core.borrow_mut();

        let completion: JobCompletion = Box::new(move |output| match output.downcast::<T>() {
            Ok(value) => done(*value),
            Err(_) => log::error!("blocking job produced an unexpected output type"),
        });
        let key = core.jobs.insert(completion);

        let sender = core.sender.clone();
        let waker = core.waker.clone();

        core.blocking.spawn(Box::new(move || {
            let output = work();
            let command = Command::Complete {
                key,
                output: Box::new(output),
            };

            if sender.send(command).is_ok() {
                waker.wake();
            }
        }));

        log::trace!("blocking job {key:?} queued ({} workers)", core.blocking.workers());
    }

    pub(crate) fn insert_stream(&self, stream: StreamEntry) -> Key {
        let mut core = self.core.borrow_mut();
        let core = &mut *core;

        let key = core.io.insert(IoEntry::Stream(stream));
        if let Some(IoEntry::Stream(stream)) = core.io.get_mut(key) {
            sync_interest(&core.poller, key, stream);
        }

        key
    }

    pub(crate) fn insert_listener(
        &self,
        fd: std::os::fd::RawFd,
        local_addr: SocketAddr,
        on_accept: AcceptCallback,
    ) -> io::Result<Key> {
        let mut core = self.core.borrow_mut();

        let key = core.io.insert(IoEntry::Listener(ListenerEntry {
            fd,
            local_addr,
            on_accept,
        }));

        if let Err(e) = core.poller.register(fd, key.to_token(), Interest::READ) {
            let entry = core.io.remove(key);
            drop(core);
            drop(entry);
            return Err(e);
        }

        Ok(key)
    }

    /// Applies `f` to a stream and re-syncs its poller interest.
    ///
    /// Returns `None` if the key no longer names a stream.
    pub(crate) fn update_stream<R>(
        &self,
        key: Key,
        f: impl FnOnce(&mut StreamEntry) -> R,
    ) -> Option<R> {
        let mut core = self.core.borrow_mut();
        let core = &mut *core;

        let Some(IoEntry::Stream(stream)) = core.io.get_mut(key) else {
            return None;
        };

        let result = f(stream);
        sync_interest(&core.poller, key, stream);

        Some(result)
    }

    pub(crate) fn stream_state(&self, key: Key) -> ConnectionState {
        match self.core.borrow().io.get(key) {
            Some(IoEntry::Stream(stream)) => stream.state,
            _ => ConnectionState::Closed,
        }
    }

    pub(crate) fn stream_peer(&self, key: Key) -> Option<SocketAddr> {
        match self.core.borrow().io.get(key) {
            Some(IoEntry::Stream(stream)) => stream.peer,
            _ => None,
        }
    }

    pub(crate) fn listener_addr(&self, key: Key) -> Option<SocketAddr> {
        match self.core.borrow().io.get(key) {
            Some(IoEntry::Listener(listener)) => Some(listener.local_addr),
            _ => None,
        }
    }

    /// Starts delivering reads to `callback`, replacing any previous one.
    pub(crate) fn read_start(&self, key: Key, callback: ReadCallback) -> Result<(), Error> {
        let replaced = self
            .update_stream(key, |stream| match stream.state {
                ConnectionState::Open | ConnectionState::Closing => {
                    Ok(stream.on_read.replace(callback))
                }
                _ => Err(Error::Closed),
            })
            .ok_or(Error::Closed)??;

        drop(replaced);
        Ok(())
    }

    pub(crate) fn read_stop(&self, key: Key) {
        let replaced = self.update_stream(key, |stream| stream.on_read.take());
        drop(replaced);
    }

    /// Queues `data` for writing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the connection is closing or closed;
    /// `on_complete` is dropped without being called in that case.
    pub(crate) fn write(
        &self,
        key: Key,
        data: Vec<u8>,
        on_complete: WriteCallback,
    ) -> Result<(), Error> {
        let request = WriteRequest {
            data,
            written: 0,
            on_complete: Some(on_complete),
        };

        let rejected = self
            .update_stream(key, move |stream| match stream.state {
                ConnectionState::Connecting | ConnectionState::Open => {
                    stream.write_queue.push_back(request);
                    None
                }
                _ => Some(request),
            })
            .unwrap_or(None);

        let result = match self.stream_state(key) {
            ConnectionState::Closed => Err(Error::Closed),
            _ if rejected.is_some() => Err(Error::Closed),
            _ => Ok(()),
        };

        drop(rejected);
        result
    }

    /// Closes the stream once its write queue drains.
    pub(crate) fn end(&self, key: Key) {
        let drained = self.update_stream(key, |stream| {
            if stream.state == ConnectionState::Open || stream.state == ConnectionState::Connecting
            {
                stream.state = ConnectionState::Closing;
            }
            stream.write_queue.is_empty()
        });

        if drained == Some(true) {
            self.close(key);
        }
    }

    /// Closes a stream or listener immediately.
    ///
    /// Pending write and read callbacks are dropped without being called.
    pub(crate) fn close(&self, key: Key) {
        let entry = self.remove_io(key);
        if entry.is_some() {
            log::debug!("closed {key:?}");
        }
        drop(entry);
    }

    /// Removes an entry from the slab, deregisters and closes its
    /// descriptor.
    ///
    /// The entry is returned so its callbacks are dropped by the caller,
    /// after the borrow on the reactor state is released.
    fn remove_io(&self, key: Key) -> Option<IoEntry> {
        let mut core = self.core.borrow_mut();
        let mut entry = core.io.remove(key)?;

        if !entry.registered().is_empty() {
            let _ = core.poller.deregister(entry.fd());
        }
        sys_close(entry.fd());

        if let IoEntry::Stream(stream) = &mut entry {
            stream.state = ConnectionState::Closed;
        }

        Some(entry)
    }
}
