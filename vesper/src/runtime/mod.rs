//! The script-facing runtime.
//!
//! [`Runtime`] ties a [`ScriptEngine`] to a [`Reactor`]. The embedder
//! installs the script globals (`setTimeout`, `net`, `http`, `fs`,
//! `process.exit`, ...) and forwards every call to the matching method
//! here, passing the raw argument slice. Methods return the script value
//! to hand back, or an [`Error`] to raise as a script exception.
//!
//! Every asynchronous call becomes a [`PendingOperation`] holding the
//! retained callback, so each callback runs at most once and is released
//! right after.

mod builder;
mod fs;
mod http;
mod net;
mod timers;

pub use builder::RuntimeBuilder;

use crate::error::Error;
use crate::http::HttpServer;
use crate::net::Listener;
use crate::reactor::Reactor;
use crate::script::{NativeValue, PendingOperation, Retained, ScriptEngine, ServerId};
use crate::utils::{Key, Slab};

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// A server created by `net.createServer` or `http.createServer`.
enum ServerSlot<E: ScriptEngine> {
    Net {
        callback: Rc<Retained<E>>,
        listener: Option<Listener>,
    },
    Http {
        callback: Rc<Retained<E>>,
        server: Option<HttpServer>,
    },
}

impl<E: ScriptEngine> ServerSlot<E> {
    fn close(&self) {
        match self {
            ServerSlot::Net {
                listener: Some(listener),
                ..
            } => listener.close(),
            ServerSlot::Http {
                server: Some(server),
                ..
            } => server.close(),
            _ => {}
        }
    }
}

struct Shared<E: ScriptEngine> {
    engine: Rc<E>,
    reactor: Reactor,
    servers: RefCell<Slab<ServerSlot<E>>>,
    close_after_response: bool,
    next_operation: Cell<u64>,
    exit_code: Cell<Option<i32>>,
}

/// A script host runtime.
///
/// Cloning is cheap; clones share the same engine and reactor.
pub struct Runtime<E: ScriptEngine> {
    shared: Rc<Shared<E>>,
}

impl<E: ScriptEngine> Clone for Runtime<E> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<E: ScriptEngine> Runtime<E> {
    /// Creates a runtime with the default configuration.
    pub fn new(engine: E) -> Result<Self, Error> {
        RuntimeBuilder::new().build(engine)
    }

    pub(crate) fn from_parts(engine: E, reactor: Reactor, close_after_response: bool) -> Self {
        Self {
            shared: Rc::new(Shared {
                engine: Rc::new(engine),
                reactor,
                servers: RefCell::new(Slab::with_capacity(4)),
                close_after_response,
                next_operation: Cell::new(0),
                exit_code: Cell::new(None),
            }),
        }
    }

    pub fn engine(&self) -> &Rc<E> {
        &self.shared.engine
    }

    pub fn reactor(&self) -> &Reactor {
        &self.shared.reactor
    }

    /// Evaluates `source`, then runs the loop until it is idle or stopped.
    ///
    /// A top-level exception is reported through the engine; the loop
    /// still runs so that callbacks registered before the throw complete.
    pub fn execute(&self, source: &str) -> Result<(), Error> {
        if let Err(exception) = self.engine().evaluate(source) {
            self.engine().report_exception(&exception);
        }

        self.run()
    }

    pub fn run(&self) -> Result<(), Error> {
        self.reactor().run()
    }

    pub fn stop(&self) {
        self.reactor().stop();
    }

    /// `process.exit(code?)`: records the exit code and stops the loop.
    ///
    /// A missing or non-numeric code is `0`.
    pub fn exit(&self, args: &[E::Value]) -> Result<E::Value, Error> {
        let code = args
            .first()
            .and_then(|value| self.engine().to_native_number(value))
            .filter(|code| code.is_finite())
            .map_or(0, |code| code as i32);

        log::debug!("exit requested with code {code}");

        self.shared.exit_code.set(Some(code));
        self.stop();

        Ok(self.undefined())
    }

    /// The code passed to `process.exit`, if it was called.
    pub fn exit_code(&self) -> Option<i32> {
        self.shared.exit_code.get()
    }

    /// Address a server is listening on, once `listen` succeeded.
    pub fn server_address(&self, id: ServerId) -> Option<std::net::SocketAddr> {
        let key = Key::from_bits(id.0)?;
        let servers = self.shared.servers.borrow();

        match servers.get(key)? {
            ServerSlot::Net { listener, .. } => listener.as_ref()?.local_addr(),
            ServerSlot::Http { server, .. } => server.as_ref()?.local_addr(),
        }
    }

    /// Drops a server: closes its socket and releases its callback.
    ///
    /// Meant to be called from the engine's finalizer of the script-side
    /// server object. Unknown ids are ignored.
    pub fn release_server(&self, id: ServerId) {
        let Some(key) = Key::from_bits(id.0) else {
            return;
        };

        let slot = self.shared.servers.borrow_mut().remove(key);
        if let Some(slot) = slot {
            slot.close();
            log::debug!("released server {}", id.0);
        }
    }

    fn insert_server(&self, slot: ServerSlot<E>) -> ServerId {
        let key = self.shared.servers.borrow_mut().insert(slot);
        ServerId(key.to_bits())
    }

    fn undefined(&self) -> E::Value {
        self.engine().to_script(NativeValue::Undefined)
    }

    /// Retains `value` after checking that it is a function.
    fn function_arg(&self, value: &E::Value, name: &str) -> Result<Retained<E>, Error> {
        if !self.engine().is_function(value) {
            return Err(Error::argument(format!("{name} callback must be a function")));
        }

        Ok(Retained::new(self.engine().clone(), value.clone()))
    }

    fn string_arg(&self, value: &E::Value, message: &str) -> Result<String, Error> {
        self.engine()
            .to_native_string(value)
            .ok_or_else(|| Error::argument(message))
    }

    fn operation(&self, callback: Retained<E>) -> PendingOperation<E> {
        let id = self.shared.next_operation.get() + 1;
        self.shared.next_operation.set(id);

        PendingOperation::new(id, callback)
    }
}

/// Error-first callback arguments for a completed operation.
fn completion_args(result: Result<NativeValue, Error>) -> Vec<NativeValue> {
    match result {
        Ok(value) => vec![NativeValue::Null, value],
        Err(e) => vec![NativeValue::error(e), NativeValue::Null],
    }
}
