//! Error type shared by the reactor, the protocol layers and the script
//! surface.

use std::io;

/// Errors produced by `vesper`.
///
/// I/O-path failures reach scripts as the first argument of their
/// callback; [`Error::Argument`] and [`Error::Url`] are meant to be raised
/// synchronously as script exceptions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Host name resolution failed or returned no address.
    #[error("failed to resolve {host}: {source}")]
    Resolution {
        host: String,
        #[source]
        source: io::Error,
    },

    /// A TCP connection attempt failed.
    #[error("connection failed: {0}")]
    Connect(#[source] io::Error),

    /// A read, write, bind or file operation failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The connection is closing or closed, or the handle is stale.
    #[error("connection is closed")]
    Closed,

    /// Wrong arity or argument type at an API boundary.
    #[error("{0}")]
    Argument(String),

    /// The URL is malformed or uses an unsupported scheme.
    #[error("invalid url: {0}")]
    Url(String),

    /// The OS polling primitive failed; the loop cannot continue.
    #[error("poller failure: {0}")]
    Poll(#[source] io::Error),
}

impl Error {
    pub(crate) fn argument(message: impl Into<String>) -> Self {
        Error::Argument(message.into())
    }

    /// Duplicates the error for fan-out to several callbacks.
    ///
    /// `io::Error` is not `Clone`; the copy keeps its kind and message.
    pub(crate) fn duplicate(&self) -> Self {
        fn copy(e: &io::Error) -> io::Error {
            io::Error::new(e.kind(), e.to_string())
        }

        match self {
            Error::Resolution { host, source } => Error::Resolution {
                host: host.clone(),
                source: copy(source),
            },
            Error::Connect(e) => Error::Connect(copy(e)),
            Error::Io(e) => Error::Io(copy(e)),
            Error::Closed => Error::Closed,
            Error::Argument(m) => Error::Argument(m.clone()),
            Error::Url(m) => Error::Url(m.clone()),
            Error::Poll(e) => Error::Poll(copy(e)),
        }
    }
}

/// Shorthand used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
