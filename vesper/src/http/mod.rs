//! HTTP/1.1 over [`net`](crate::net) connections.
//!
//! The client sends one request per connection with `Connection: close`
//! and reads the response until the server closes. The server parses the
//! request line only and answers with a fixed response.

mod client;
mod parser;
mod request;
mod server;
mod url;

pub use client::request;
pub use parser::{ParseState, Response, ResponseParser};
pub use request::{ClientRequest, Method};
pub use server::{HttpServer, RESPONSE, RequestLine, ServerExchange, ServerOptions};
pub use url::Url;
