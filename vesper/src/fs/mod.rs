//! Whole-file reads and writes.
//!
//! Both operations run on the reactor's blocking pool and deliver their
//! result on the loop thread, like every other completion.

mod file;

use crate::error::Error;
use crate::reactor::Reactor;
use file::File;

use std::path::{Path, PathBuf};

/// Reads the whole file at `path`.
pub fn read_file(
    reactor: &Reactor,
    path: impl AsRef<Path>,
    on_complete: impl FnOnce(Result<Vec<u8>, Error>) + 'static,
) {
    let path: PathBuf = path.as_ref().to_owned();

    reactor.spawn_blocking(
        move || File::open(&path)?.read_to_end(),
        move |result| on_complete(result.map_err(Error::Io)),
    );
}

/// Writes `contents` to `path`, creating or truncating the file.
pub fn write_file(
    reactor: &Reactor,
    path: impl AsRef<Path>,
    contents: impl Into<Vec<u8>>,
    on_complete: impl FnOnce(Result<(), Error>) + 'static,
) {
    let path: PathBuf = path.as_ref().to_owned();
    let contents = contents.into();

    reactor.spawn_blocking(
        move || File::create(&path)?.write_all(&contents),
        move |result| on_complete(result.map_err(Error::Io)),
    );
}
