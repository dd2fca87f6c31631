use super::parser::{Response, ResponseParser};
use super::request::ClientRequest;
use crate::error::Error;
use crate::net::{self, Connection};
use crate::reactor::{ReadEvent, Reactor};

use std::cell::RefCell;
use std::rc::Rc;

type Completion = Rc<RefCell<Option<Box<dyn FnOnce(Result<Response, Error>)>>>>;

/// Calls the completion if it has not run yet.
fn finish(completion: &Completion, result: Result<Response, Error>) {
    let callback = completion.borrow_mut().take();
    if let Some(callback) = callback {
        callback(result);
    }
}

/// Sends `request` and collects the response until the server closes the
/// connection.
///
/// `on_complete` runs exactly once: with the parsed [`Response`], or with
/// the first resolution, connect, write or read error.
pub fn request(
    reactor: &Reactor,
    request: ClientRequest,
    on_complete: impl FnOnce(Result<Response, Error>) + 'static,
) {
    let completion: Completion = Rc::new(RefCell::new(Some(Box::new(on_complete))));
    let payload = request.encode();
    let url = request.url;

    log::debug!("{} http://{}{}", request.method, url.host_header(), url.path);

    let connect_reactor = reactor.clone();

    net::resolve(reactor, &url.host, url.port, move |resolved| {
        let addr = match resolved {
            Ok(addr) => addr,
            Err(e) => return finish(&completion, Err(e)),
        };

        Connection::connect(&connect_reactor, addr, move |connected| {
            let connection = match connected {
                Ok(connection) => connection,
                Err(e) => return finish(&completion, Err(e)),
            };

            exchange(connection, payload, completion);
        });
    });
}

fn exchange(connection: Connection, payload: Vec<u8>, completion: Completion) {
    let write_completion = completion.clone();
    let write_connection = connection.clone();

    let written = connection.write(payload, move |result| {
        if let Err(e) = result {
            write_connection.close();
            finish(&write_completion, Err(e));
        }
    });

    if let Err(e) = written {
        connection.close();
        return finish(&completion, Err(e));
    }

    let mut parser = ResponseParser::new();
    let read_connection = connection.clone();
    let read_completion = completion.clone();

    let reading = connection.read_start(move |event| match event {
        ReadEvent::Data(data) => parser.feed(&data),
        ReadEvent::Eof => {
            read_connection.close();
            finish(&read_completion, Ok(std::mem::take(&mut parser).finish()));
        }
        ReadEvent::Error(e) => {
            read_connection.close();
            finish(&read_completion, Err(e));
        }
    });

    if let Err(e) = reading {
        connection.close();
        finish(&completion, Err(e));
    }
}
