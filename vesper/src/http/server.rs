//! Minimal HTTP server.
//!
//! Only the request line is parsed. Every exchange is answered with the
//! same fixed `200 OK` response; headers, bodies and keep-alive are not
//! supported.

use crate::error::Error;
use crate::net::{Connection, Listener};
use crate::reactor::{ReadEvent, Reactor};

use std::cell::{Cell, RefCell};
use std::fmt;
use std::net::SocketAddr;
use std::rc::Rc;

/// The response written by [`ServerExchange::end`].
pub const RESPONSE: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 13\r\n\r\nHello, World!";

/// Longest request line accepted before the request is treated as
/// malformed.
const MAX_REQUEST_LINE: usize = 8 * 1024;

/// Method and target of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub target: String,
}

impl RequestLine {
    /// Parses `METHOD target [version]` using whitespace tokenization.
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();

        let method = tokens.next()?;
        let target = tokens.next()?;

        Some(Self {
            method: method.to_owned(),
            target: target.to_owned(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ServerOptions {
    /// Gracefully close each connection once its response is flushed.
    pub close_after_end: bool,
}

type HeadHook = Box<dyn FnOnce(&RequestLine)>;

enum Head {
    /// Bytes of a request line still being received.
    Waiting {
        pending: Vec<u8>,
        hook: Option<HeadHook>,
    },
    Parsed(RequestLine),
    /// Malformed, oversized, or the peer left before sending a line.
    Missing,
}

/// One accepted connection and its single response.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct ServerExchange {
    connection: Connection,
    head: Rc<RefCell<Head>>,
    ended: Rc<Cell<bool>>,
    close_after_end: bool,
}

impl ServerExchange {
    fn new(connection: Connection, close_after_end: bool) -> Self {
        Self {
            connection,
            head: Rc::new(RefCell::new(Head::Waiting {
                pending: Vec::new(),
                hook: None,
            })),
            ended: Rc::new(Cell::new(false)),
            close_after_end,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The parsed request line, once received.
    pub fn request_line(&self) -> Option<RequestLine> {
        match &*self.head.borrow() {
            Head::Parsed(line) => Some(line.clone()),
            _ => None,
        }
    }

    /// Registers `hook` to run when the request line has been parsed.
    ///
    /// Runs immediately if it already has been. A later registration
    /// replaces an earlier one. The hook is dropped without running if the
    /// line turns out to be malformed or never arrives.
    pub fn on_head(&self, hook: impl FnOnce(&RequestLine) + 'static) {
        let parsed = {
            let mut head = self.head.borrow_mut();
            match &mut *head {
                Head::Waiting { hook: slot, .. } => {
                    let replaced = slot.replace(Box::new(hook));
                    drop(head);
                    drop(replaced);
                    return;
                }
                Head::Parsed(line) => line.clone(),
                Head::Missing => return,
            }
        };

        hook(&parsed);
    }

    pub fn is_ended(&self) -> bool {
        self.ended.get()
    }

    /// Writes the fixed response.
    ///
    /// Only the first call writes; later calls return `Ok(())` without
    /// doing anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the connection is already gone.
    pub fn end(&self) -> Result<(), Error> {
        if self.ended.replace(true) {
            return Ok(());
        }

        self.connection.write(RESPONSE, |result| {
            if let Err(e) = result {
                log::warn!("failed to send response: {e}");
            }
        })?;

        if self.close_after_end {
            self.connection.end();
        }

        Ok(())
    }

    fn handle_read(&self, event: ReadEvent) {
        match event {
            ReadEvent::Data(data) => self.receive(&data),
            // A half-closed peer still gets any queued response.
            ReadEvent::Eof => {
                self.abandon();
                self.connection.end();
            }
            ReadEvent::Error(e) => {
                log::debug!("request read failed: {e}");
                self.abandon();
                self.connection.close();
            }
        }
    }

    fn receive(&self, data: &[u8]) {
        let line = {
            let mut head = self.head.borrow_mut();
            let Head::Waiting { pending, .. } = &mut *head else {
                return;
            };

            pending.extend_from_slice(data);

            match pending.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    let raw = String::from_utf8_lossy(&pending[..end]);
                    Some(raw.trim_end_matches('\r').to_owned())
                }
                None if pending.len() > MAX_REQUEST_LINE => {
                    log::error!("request line exceeds {MAX_REQUEST_LINE} bytes");
                    None
                }
                None => return,
            }
        };

        let Some(line) = line else {
            self.abandon();
            return;
        };

        let Some(request) = RequestLine::parse(&line) else {
            log::error!("malformed request line {line:?}");
            self.abandon();
            return;
        };

        log::info!("{} request for {}", request.method, request.target);

        let previous = self.head.replace(Head::Parsed(request.clone()));
        if let Head::Waiting {
            hook: Some(hook), ..
        } = previous
        {
            hook(&request);
        }
    }

    /// Gives up on the request line, dropping any registered hook.
    fn abandon(&self) {
        let previous = {
            let mut head = self.head.borrow_mut();
            if !matches!(&*head, Head::Waiting { .. }) {
                return;
            }
            std::mem::replace(&mut *head, Head::Missing)
        };

        drop(previous);
    }
}

impl fmt::Debug for ServerExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerExchange")
            .field("connection", &self.connection)
            .field("request", &self.request_line())
            .field("ended", &self.ended.get())
            .finish()
    }
}

/// A listening HTTP server.
///
/// `on_request` is invoked once per accepted connection, before the
/// request line has been received; use [`ServerExchange::on_head`] to
/// observe it.
pub struct HttpServer {
    listener: Listener,
}

impl HttpServer {
    pub fn bind(
        reactor: &Reactor,
        addr: SocketAddr,
        options: ServerOptions,
        mut on_request: impl FnMut(ServerExchange) + 'static,
    ) -> Result<Self, Error> {
        let listener = Listener::bind(reactor, addr, move |connection| {
            let exchange = ServerExchange::new(connection.clone(), options.close_after_end);
            let reader = exchange.clone();

            if let Err(e) = connection.read_start(move |event| reader.handle_read(event)) {
                log::debug!("accepted connection closed before reading: {e}");
                return;
            }

            on_request(exchange);
        })?;

        log::info!(
            "http server listening on {}",
            listener.local_addr().map_or_else(|| addr.to_string(), |a| a.to_string())
        );

        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn close(&self) {
        self.listener.close();
    }
}
