mod common;

use vesper::http::{HttpServer, RESPONSE, RequestLine, ServerOptions};

use std::cell::RefCell;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::rc::Rc;
use std::thread;
use std::time::Duration;

fn any_port() -> SocketAddr {
    "127.0.0.1:0".parse().expect("Invalid address")
}

#[test]
fn answers_with_fixed_response_and_closes_when_configured() {
    let reactor = common::reactor();
    common::watchdog(&reactor, Duration::from_secs(5));

    let heads: Rc<RefCell<Vec<RequestLine>>> = Rc::new(RefCell::new(Vec::new()));
    let server_slot: Rc<RefCell<Option<HttpServer>>> = Rc::new(RefCell::new(None));

    let (sink, slot) = (heads.clone(), server_slot.clone());
    let server = HttpServer::bind(
        &reactor,
        any_port(),
        ServerOptions {
            close_after_end: true,
        },
        move |exchange| {
            if let Some(server) = slot.borrow().as_ref() {
                server.close();
            }

            let sink = sink.clone();
            let responder = exchange.clone();
            exchange.on_head(move |line| {
                sink.borrow_mut().push(line.clone());
                responder.end().expect("Failed to end response");
                responder.end().expect("Second end is a no-op");
            });
        },
    )
    .expect("Failed to bind server");

    let addr = server.local_addr().expect("Server has no address");
    *server_slot.borrow_mut() = Some(server);

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).expect("Failed to connect to server");
        stream
            .write_all(b"GET /hello?x=1 HTTP/1.1\r\nHost: test\r\n\r\n")
            .expect("Failed to write to stream");

        let mut response = Vec::new();
        stream
            .read_to_end(&mut response)
            .expect("Failed to read from stream");
        response
    });

    reactor.run().expect("Reactor failed");

    assert_eq!(client.join().expect("Thread panicked"), RESPONSE);
    assert_eq!(
        *heads.borrow(),
        vec![RequestLine {
            method: "GET".to_owned(),
            target: "/hello?x=1".to_owned(),
        }]
    );
    assert!(reactor.is_idle());
}

#[test]
fn keeps_connection_open_until_the_peer_closes() {
    let reactor = common::reactor();
    common::watchdog(&reactor, Duration::from_secs(5));

    let server_slot: Rc<RefCell<Option<HttpServer>>> = Rc::new(RefCell::new(None));
    let ended = Rc::new(RefCell::new(Vec::new()));

    let (slot, record) = (server_slot.clone(), ended.clone());
    let server = HttpServer::bind(&reactor, any_port(), ServerOptions::default(), move |exchange| {
        if let Some(server) = slot.borrow().as_ref() {
            server.close();
        }

        exchange.end().expect("Failed to end response");
        record.borrow_mut().push(exchange.is_ended());
    })
    .expect("Failed to bind server");

    let addr = server.local_addr().expect("Server has no address");
    *server_slot.borrow_mut() = Some(server);

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).expect("Failed to connect to server");
        stream
            .write_all(b"POST /data HTTP/1.1\r\n\r\n")
            .expect("Failed to write to stream");

        let mut response = vec![0u8; RESPONSE.len()];
        stream
            .read_exact(&mut response)
            .expect("Failed to read from stream");

        // The server must not have closed: nothing more arrives within the
        // timeout, rather than an EOF.
        stream
            .set_read_timeout(Some(Duration::from_millis(100)))
            .expect("Failed to set timeout");
        let mut extra = [0u8; 1];
        let still_open = stream.read(&mut extra).is_err();

        (response, still_open)
    });

    reactor.run().expect("Reactor failed");

    let (response, still_open) = client.join().expect("Thread panicked");
    assert_eq!(response, RESPONSE);
    assert!(still_open, "The connection should stay open after end()");
    assert_eq!(*ended.borrow(), vec![true]);
    assert!(reactor.is_idle(), "The server closes its side on peer EOF");
}

#[test]
fn half_closed_client_still_receives_the_response() {
    let reactor = common::reactor();
    common::watchdog(&reactor, Duration::from_secs(5));

    let server_slot: Rc<RefCell<Option<HttpServer>>> = Rc::new(RefCell::new(None));

    let slot = server_slot.clone();
    let server = HttpServer::bind(&reactor, any_port(), ServerOptions::default(), move |exchange| {
        if let Some(server) = slot.borrow().as_ref() {
            server.close();
        }

        let responder = exchange.clone();
        exchange.on_head(move |_| {
            responder.end().expect("Failed to end response");
        });
    })
    .expect("Failed to bind server");

    let addr = server.local_addr().expect("Server has no address");
    *server_slot.borrow_mut() = Some(server);

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).expect("Failed to connect to server");
        stream
            .write_all(b"GET / HTTP/1.0\r\n\r\n")
            .expect("Failed to write to stream");
        stream
            .shutdown(Shutdown::Write)
            .expect("Failed to shut down write side");

        let mut response = Vec::new();
        stream
            .read_to_end(&mut response)
            .expect("Failed to read from stream");
        response
    });

    reactor.run().expect("Reactor failed");

    assert_eq!(client.join().expect("Thread panicked"), RESPONSE);
    assert!(reactor.is_idle(), "The server closes once the response is flushed");
}

#[test]
fn malformed_request_line_never_reaches_the_hook() {
    let reactor = common::reactor();
    common::watchdog(&reactor, Duration::from_secs(5));

    let heads: Rc<RefCell<Vec<RequestLine>>> = Rc::new(RefCell::new(Vec::new()));
    let server_slot: Rc<RefCell<Option<HttpServer>>> = Rc::new(RefCell::new(None));

    let (sink, slot) = (heads.clone(), server_slot.clone());
    let server = HttpServer::bind(&reactor, any_port(), ServerOptions::default(), move |exchange| {
        if let Some(server) = slot.borrow().as_ref() {
            server.close();
        }

        let sink = sink.clone();
        exchange.on_head(move |line| sink.borrow_mut().push(line.clone()));
    })
    .expect("Failed to bind server");

    let addr = server.local_addr().expect("Server has no address");
    *server_slot.borrow_mut() = Some(server);

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).expect("Failed to connect to server");
        stream
            .write_all(b"NONSENSE\r\n")
            .expect("Failed to write to stream");
    });

    reactor.run().expect("Reactor failed");
    client.join().expect("Thread panicked");

    assert!(heads.borrow().is_empty());
}
