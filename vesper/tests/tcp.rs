mod common;

use vesper::Error;
use vesper::net::{Connection, Listener, resolve};
use vesper::reactor::{ConnectionState, ReadEvent};

use std::cell::{Cell, RefCell};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::rc::Rc;
use std::thread;
use std::time::Duration;

#[test]
fn connect_write_and_read_roundtrip() {
    let reactor = common::reactor();
    common::watchdog(&reactor, Duration::from_secs(5));

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to get local address");

    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("Failed to accept connection");
        let mut buffer = [0; 5];
        stream
            .read_exact(&mut buffer)
            .expect("Failed to read from stream");
        assert_eq!(&buffer, b"hello");
        stream
            .write_all(b"world")
            .expect("Failed to write to stream");
    });

    let received = Rc::new(RefCell::new(Vec::new()));
    let written = Rc::new(Cell::new(false));
    let eof = Rc::new(Cell::new(false));

    let (sink, write_flag, eof_flag) = (received.clone(), written.clone(), eof.clone());
    Connection::connect(&reactor, addr, move |result| {
        let connection = result.expect("Failed to connect");
        assert_eq!(connection.state(), ConnectionState::Open);
        assert_eq!(connection.peer_addr(), Some(addr));

        connection
            .write("hello", move |result| {
                result.expect("Write failed");
                write_flag.set(true);
            })
            .expect("Write rejected");

        let reader = connection.clone();
        connection
            .read_start(move |event| match event {
                ReadEvent::Data(data) => sink.borrow_mut().extend(data),
                ReadEvent::Eof => {
                    eof_flag.set(true);
                    reader.close();
                }
                ReadEvent::Error(e) => panic!("Read failed: {e}"),
            })
            .expect("Read rejected");
    });

    reactor.run().expect("Reactor failed");
    peer.join().expect("Thread panicked");

    assert!(written.get());
    assert!(eof.get());
    assert_eq!(&*received.borrow(), b"world");
    assert!(reactor.is_idle());
}

#[test]
fn listener_accepts_and_echoes_then_ends() {
    let reactor = common::reactor();
    common::watchdog(&reactor, Duration::from_secs(5));

    let accepted = Rc::new(Cell::new(0));
    let listener_slot: Rc<RefCell<Option<Listener>>> = Rc::new(RefCell::new(None));

    let (count, slot) = (accepted.clone(), listener_slot.clone());
    let listener = Listener::bind(
        &reactor,
        "127.0.0.1:0".parse().expect("Invalid address"),
        move |connection| {
            count.set(count.get() + 1);

            // One client only.
            if let Some(listener) = slot.borrow().as_ref() {
                listener.close();
            }

            let writer = connection.clone();
            connection
                .read_start(move |event| {
                    if let ReadEvent::Data(data) = event {
                        if writer.write(data, |_| {}).is_ok() {
                            writer.end();
                        }
                    }
                })
                .expect("Read rejected");
        },
    )
    .expect("Failed to bind listener");

    let addr = listener.local_addr().expect("Listener has no address");
    assert_ne!(addr.port(), 0);
    *listener_slot.borrow_mut() = Some(listener.clone());

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).expect("Failed to connect to listener");
        stream.write_all(b"ping").expect("Failed to write to stream");

        let mut reply = Vec::new();
        stream
            .read_to_end(&mut reply)
            .expect("Failed to read from stream");
        reply
    });

    reactor.run().expect("Reactor failed");

    assert_eq!(client.join().expect("Thread panicked"), b"ping");
    assert_eq!(accepted.get(), 1);
    assert!(!listener.is_listening());
}

#[test]
fn connect_to_closed_port_fails_exactly_once() {
    let reactor = common::reactor();
    common::watchdog(&reactor, Duration::from_secs(5));

    let addr: SocketAddr = format!("127.0.0.1:{}", common::closed_port())
        .parse()
        .expect("Invalid address");

    let calls = Rc::new(Cell::new(0));
    let failed = Rc::new(Cell::new(false));

    let (count, flag) = (calls.clone(), failed.clone());
    Connection::connect(&reactor, addr, move |result| {
        count.set(count.get() + 1);
        flag.set(matches!(result, Err(Error::Connect(_))));
    });

    reactor.run().expect("Reactor failed");

    assert_eq!(calls.get(), 1);
    assert!(failed.get());
    assert!(reactor.is_idle());
}

#[test]
fn writes_after_end_are_rejected() {
    let reactor = common::reactor();
    common::watchdog(&reactor, Duration::from_secs(5));

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to get local address");

    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("Failed to accept connection");
        let mut received = Vec::new();
        stream
            .read_to_end(&mut received)
            .expect("Failed to read from stream");
        received
    });

    let outcome = Rc::new(RefCell::new(None));
    let slot = outcome.clone();

    Connection::connect(&reactor, addr, move |result| {
        let connection = result.expect("Failed to connect");

        connection.write("queued", |_| {}).expect("Write rejected");
        connection.end();

        let late = connection.write("late", |_| panic!("Rejected write must not complete"));
        *slot.borrow_mut() = Some(late);
    });

    reactor.run().expect("Reactor failed");

    assert!(matches!(outcome.borrow_mut().take(), Some(Err(Error::Closed))));
    assert_eq!(peer.join().expect("Thread panicked"), b"queued");
}

#[test]
fn close_drops_pending_write_callbacks() {
    let reactor = common::reactor();
    common::watchdog(&reactor, Duration::from_secs(5));

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to get local address");

    let peer = thread::spawn(move || {
        let _ = listener.accept().expect("Failed to accept connection");
    });

    let completed = Rc::new(Cell::new(false));
    let released = Rc::new(Cell::new(false));

    let (flag, guard) = (completed.clone(), released.clone());
    Connection::connect(&reactor, addr, move |result| {
        let connection = result.expect("Failed to connect");

        let token = DropFlag(guard);
        connection
            .write(vec![0u8; 16], move |_| {
                let _token = &token;
                flag.set(true);
            })
            .expect("Write rejected");

        connection.close();
        assert!(connection.is_closed());
    });

    reactor.run().expect("Reactor failed");
    peer.join().expect("Thread panicked");

    assert!(!completed.get(), "Closed connections never call write callbacks");
    assert!(released.get(), "The callback must still be dropped");
}

#[test]
fn resolve_localhost() {
    let reactor = common::reactor();
    common::watchdog(&reactor, Duration::from_secs(5));

    let resolved = Rc::new(RefCell::new(None));
    let slot = resolved.clone();

    resolve(&reactor, "localhost", 8080, move |result| {
        *slot.borrow_mut() = Some(result);
    });

    reactor.run().expect("Reactor failed");

    let addr = resolved
        .borrow_mut()
        .take()
        .expect("Resolve never completed")
        .expect("Failed to resolve localhost");
    assert!(addr.ip().is_loopback());
    assert_eq!(addr.port(), 8080);
}

#[test]
fn resolve_unknown_host_fails() {
    let reactor = common::reactor();
    common::watchdog(&reactor, Duration::from_secs(10));

    let failed = Rc::new(Cell::new(false));
    let flag = failed.clone();

    resolve(&reactor, "does-not-exist.invalid", 80, move |result| {
        flag.set(matches!(result, Err(Error::Resolution { .. })));
    });

    reactor.run().expect("Reactor failed");

    assert!(failed.get());
}

struct DropFlag(Rc<Cell<bool>>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.set(true);
    }
}
