use super::{Runtime, ServerSlot};
use crate::error::Error;
use crate::http::{HttpServer, ServerOptions};
use crate::net::{Connection, Listener};
use crate::reactor::ReadEvent;
use crate::script::{HostObject, NativeValue, Retained, ScriptEngine, ServerId};
use crate::utils::Key;

use std::net::{Ipv4Addr, SocketAddr};
use std::rc::Rc;

impl<E: ScriptEngine> Runtime<E> {
    /// `net.createServer(onConnection) -> server`
    ///
    /// The server does nothing until `listen` is called.
    pub fn net_create_server(&self, args: &[E::Value]) -> Result<E::Value, Error> {
        let callback = self.server_callback(args, "net.createServer requires a callback function")?;

        let id = self.insert_server(ServerSlot::Net {
            callback: Rc::new(callback),
            listener: None,
        });

        Ok(self
            .engine()
            .to_script(NativeValue::Host(HostObject::NetServer(id))))
    }

    pub(super) fn server_callback(
        &self,
        args: &[E::Value],
        message: &str,
    ) -> Result<Retained<E>, Error> {
        match args.first() {
            Some(callback) if self.engine().is_function(callback) => {
                Ok(Retained::new(self.engine().clone(), callback.clone()))
            }
            _ => Err(Error::argument(message)),
        }
    }

    /// `server.listen(port)` for servers from both `net` and `http`.
    ///
    /// Binds `0.0.0.0:port`. Port `0` picks an ephemeral port, see
    /// [`server_address`](Self::server_address). Calling `listen` again
    /// replaces the previous socket.
    ///
    /// # Errors
    ///
    /// A bind failure is logged and returned as [`Error::Io`].
    pub fn server_listen(&self, id: ServerId, args: &[E::Value]) -> Result<E::Value, Error> {
        let port = args
            .first()
            .and_then(|value| self.engine().to_native_number(value))
            .filter(|port| port.fract() == 0.0 && (0.0..=65535.0).contains(port))
            .ok_or_else(|| Error::argument("server.listen() requires a valid port number"))?
            as u16;

        let key = Key::from_bits(id.0).ok_or(Error::Closed)?;
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

        let (callback, is_http) = {
            let servers = self.shared.servers.borrow();
            match servers.get(key).ok_or(Error::Closed)? {
                ServerSlot::Net { callback, .. } => (callback.clone(), false),
                ServerSlot::Http { callback, .. } => (callback.clone(), true),
            }
        };

        let bound = if is_http {
            self.bind_http(addr, callback).map(BoundServer::Http)
        } else {
            self.bind_net(addr, callback).map(BoundServer::Net)
        };

        let bound = match bound {
            Ok(bound) => bound,
            Err(e) => {
                log::error!("failed to listen on port {port}: {e}");
                return Err(e);
            }
        };

        let previous = {
            let mut servers = self.shared.servers.borrow_mut();
            match (servers.get_mut(key), bound) {
                (Some(ServerSlot::Net { listener, .. }), BoundServer::Net(new)) => {
                    listener.replace(new).map(BoundServer::Net)
                }
                (Some(ServerSlot::Http { server, .. }), BoundServer::Http(new)) => {
                    server.replace(new).map(BoundServer::Http)
                }
                (_, orphan) => Some(orphan),
            }
        };

        if let Some(previous) = previous {
            previous.close();
        }

        log::info!("server listening on port {port}");

        Ok(self.undefined())
    }

    fn bind_net(&self, addr: SocketAddr, callback: Rc<Retained<E>>) -> Result<Listener, Error> {
        Listener::bind(self.reactor(), addr, move |connection| {
            drain(&connection);
            callback.invoke_native(vec![NativeValue::Host(HostObject::Socket(connection))]);
        })
    }

    fn bind_http(&self, addr: SocketAddr, callback: Rc<Retained<E>>) -> Result<HttpServer, Error> {
        let options = ServerOptions {
            close_after_end: self.shared.close_after_response,
        };

        HttpServer::bind(self.reactor(), addr, options, move |exchange| {
            let engine = callback.engine().clone();

            let request = engine.to_script(NativeValue::Object(vec![
                ("method".to_owned(), NativeValue::Undefined),
                ("url".to_owned(), NativeValue::Undefined),
            ]));
            let response =
                engine.to_script(NativeValue::Host(HostObject::Response(exchange.clone())));

            let retained = Retained::new(engine, request.clone());
            exchange.on_head(move |line| {
                let engine = retained.engine();
                engine.set_property(retained.value(), "method", NativeValue::string(&line.method));
                engine.set_property(retained.value(), "url", NativeValue::string(&line.target));
            });

            callback.invoke(&[request, response]);
        })
    }

    /// `socket.write(data)` on a socket handed to a `net` server callback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the peer is already gone.
    pub fn socket_write(&self, socket: &Connection, args: &[E::Value]) -> Result<E::Value, Error> {
        let data = match args.first() {
            Some(value) => self.string_arg(value, "socket.write requires data")?,
            None => return Err(Error::argument("socket.write requires data")),
        };

        socket.write(data, |result| {
            if let Err(e) = result {
                log::warn!("socket write failed: {e}");
            }
        })?;

        Ok(self.undefined())
    }
}

/// Discards incoming data. When the peer closes its side, the connection
/// closes once pending writes are flushed.
fn drain(connection: &Connection) {
    let reader = connection.clone();

    let reading = connection.read_start(move |event| match event {
        ReadEvent::Data(data) => log::trace!("discarded {} bytes", data.len()),
        ReadEvent::Eof => reader.end(),
        ReadEvent::Error(e) => {
            log::debug!("socket read failed: {e}");
            reader.close();
        }
    });

    if let Err(e) = reading {
        log::debug!("accepted socket closed early: {e}");
    }
}

enum BoundServer {
    Net(Listener),
    Http(HttpServer),
}

impl BoundServer {
    fn close(&self) {
        match self {
            BoundServer::Net(listener) => listener.close(),
            BoundServer::Http(server) => server.close(),
        }
    }
}
