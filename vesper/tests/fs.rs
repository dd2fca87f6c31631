mod common;

use vesper::Error;
use vesper::fs::{read_file, write_file};

use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn write_then_read_roundtrip() {
    let reactor = common::reactor();
    let path = common::temp_path("roundtrip");

    let contents = Rc::new(RefCell::new(None));
    let slot = contents.clone();
    let handle = reactor.clone();
    let read_path = path.clone();

    write_file(&reactor, &path, "hello world", move |result| {
        result.expect("Failed to write file");

        read_file(&handle, read_path, move |result| {
            *slot.borrow_mut() = Some(result.expect("Failed to read file"));
        });
    });

    reactor.run().expect("Reactor failed");

    assert_eq!(contents.borrow().as_deref(), Some(&b"hello world"[..]));

    let _ = std::fs::remove_file(path);
}

#[test]
fn write_truncates_existing_content() {
    let reactor = common::reactor();
    let path = common::temp_path("truncate");
    std::fs::write(&path, "a much longer previous content").expect("Failed to seed file");

    let done = Rc::new(RefCell::new(None));
    let slot = done.clone();
    write_file(&reactor, &path, "short", move |result| {
        *slot.borrow_mut() = Some(result);
    });

    reactor.run().expect("Reactor failed");

    assert!(matches!(done.borrow_mut().take(), Some(Ok(()))));
    assert_eq!(std::fs::read_to_string(&path).expect("Failed to read file"), "short");

    let _ = std::fs::remove_file(path);
}

#[test]
fn reading_a_missing_file_fails() {
    let reactor = common::reactor();
    let path = common::temp_path("missing");

    let outcome = Rc::new(RefCell::new(None));
    let slot = outcome.clone();
    read_file(&reactor, &path, move |result| {
        *slot.borrow_mut() = Some(result);
    });

    reactor.run().expect("Reactor failed");

    match outcome.borrow_mut().take() {
        Some(Err(Error::Io(e))) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
        other => panic!("Expected a not-found error, got {other:?}"),
    }
}

#[test]
fn large_files_are_read_completely() {
    let reactor = common::reactor();
    let path = common::temp_path("large");
    let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, &data).expect("Failed to seed file");

    let contents = Rc::new(RefCell::new(Vec::new()));
    let slot = contents.clone();
    read_file(&reactor, &path, move |result| {
        *slot.borrow_mut() = result.expect("Failed to read file");
    });

    reactor.run().expect("Reactor failed");

    assert_eq!(*contents.borrow(), data);

    let _ = std::fs::remove_file(path);
}
