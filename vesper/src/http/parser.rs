//! Incremental HTTP response parser.
//!
//! Framing is close-delimited: the body is everything received after the
//! header block until the peer closes the stream. `Content-Length` and
//! chunked encoding are not interpreted.

use std::collections::BTreeMap;

const LINE_END: &[u8] = b"\r\n";
const HEAD_END: &[u8] = b"\r\n\r\n";

/// Where the parser is within the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseState {
    #[default]
    AwaitingStatusLine,
    AwaitingHeaders,
    Body,
}

/// A complete response, as seen once the peer closed the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// `0` if the status line was missing or malformed.
    pub status_code: u16,
    /// Header names as sent; the last occurrence of a name wins.
    pub headers: BTreeMap<String, String>,
    /// Lossily decoded body. An empty body is reported as `"{}"`.
    pub body: String,
}

#[derive(Debug, Default)]
pub struct ResponseParser {
    state: ParseState,
    /// Bytes received before the header delimiter.
    head: Vec<u8>,
    status_code: u16,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Feeds received bytes.
    ///
    /// Status and headers are parsed exactly once, when the first
    /// `\r\n\r\n` appears in the accumulated bytes.
    pub fn feed(&mut self, data: &[u8]) {
        if self.state == ParseState::Body {
            self.body.extend_from_slice(data);
            return;
        }

        self.head.extend_from_slice(data);

        if self.state == ParseState::AwaitingStatusLine && find(&self.head, LINE_END).is_some() {
            self.state = ParseState::AwaitingHeaders;
        }

        if let Some(at) = find(&self.head, HEAD_END) {
            let rest = self.head.split_off(at + HEAD_END.len());
            self.head.truncate(at);

            self.parse_head();
            self.body = rest;
            self.state = ParseState::Body;
        }
    }

    fn parse_head(&mut self) {
        let head = String::from_utf8_lossy(&self.head);
        let mut lines = head.split("\r\n");

        let status_line = lines.next().unwrap_or_default();
        self.status_code = parse_status_line(status_line).unwrap_or_else(|| {
            log::debug!("malformed status line {status_line:?}");
            0
        });

        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.strip_prefix(' ').unwrap_or(value);

            self.headers.insert(name.to_owned(), value.to_owned());
        }
    }

    /// Consumes the parser once the stream has ended.
    ///
    /// If the header delimiter never arrived, the status is `0`, headers
    /// are empty and the body is `"{}"`; the bytes received are dropped.
    pub fn finish(self) -> Response {
        if self.state != ParseState::Body && !self.head.is_empty() {
            log::debug!("response ended without a header block");
        }

        let body = if self.body.is_empty() {
            String::from("{}")
        } else {
            String::from_utf8_lossy(&self.body).into_owned()
        };

        Response {
            status_code: self.status_code,
            headers: self.headers,
            body,
        }
    }
}

fn parse_status_line(line: &str) -> Option<u16> {
    if !line.starts_with("HTTP/") {
        return None;
    }

    line.split_whitespace().nth(1)?.parse().ok()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_headers_and_body() {
        let mut parser = ResponseParser::new();
        parser.feed(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nhello");

        let response = parser.finish();

        assert_eq!(response.status_code, 200);
        assert_eq!(
            response.headers,
            BTreeMap::from([("Content-Type".to_owned(), "text/plain".to_owned())])
        );
        assert_eq!(response.body, "hello");
    }

    #[test]
    fn delimiter_split_across_chunks() {
        let mut parser = ResponseParser::new();

        parser.feed(b"HTTP/1.0 404 Not Found\r");
        assert_eq!(parser.state(), ParseState::AwaitingStatusLine);

        parser.feed(b"\nX-A: 1\r\n\r");
        assert_eq!(parser.state(), ParseState::AwaitingHeaders);

        parser.feed(b"\nbo");
        assert_eq!(parser.state(), ParseState::Body);

        parser.feed(b"dy\r\n\r\nmore");

        let response = parser.finish();
        assert_eq!(response.status_code, 404);
        assert_eq!(response.headers["X-A"], "1");
        assert_eq!(response.body, "body\r\n\r\nmore");
    }

    #[test]
    fn last_header_wins_and_lines_without_colon_are_ignored() {
        let mut parser = ResponseParser::new();
        parser.feed(b"HTTP/1.1 200 OK\r\nX: first\r\ngarbage\r\nX: second\r\nY:tight\r\n\r\n");

        let response = parser.finish();
        assert_eq!(response.headers.len(), 2);
        assert_eq!(response.headers["X"], "second");
        assert_eq!(response.headers["Y"], "tight");
    }

    #[test]
    fn empty_body_is_reported_as_braces() {
        let mut parser = ResponseParser::new();
        parser.feed(b"HTTP/1.1 204 No Content\r\n\r\n");

        assert_eq!(parser.finish().body, "{}");
    }

    #[test]
    fn malformed_status_line_yields_zero() {
        let mut parser = ResponseParser::new();
        parser.feed(b"SPDY nonsense\r\nA: b\r\n\r\nx");

        let response = parser.finish();
        assert_eq!(response.status_code, 0);
        assert_eq!(response.headers["A"], "b");
    }

    #[test]
    fn missing_delimiter_yields_zero_and_no_headers() {
        let mut parser = ResponseParser::new();
        parser.feed(b"HTTP/1.1 200 OK\r\nA: b\r\n");

        let response = parser.finish();
        assert_eq!(response.status_code, 0);
        assert!(response.headers.is_empty());
        assert_eq!(response.body, "{}");
    }
}
