use super::url::Url;

use std::fmt;

/// Request methods supported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    fn carries_body(self) -> bool {
        matches!(self, Method::Post | Method::Put)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to be sent by [`request`](super::request).
#[derive(Debug, Clone)]
pub struct ClientRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<String>,
}

impl ClientRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes the request.
    ///
    /// The connection is always marked `Connection: close`; the response is
    /// framed by the peer closing the stream. A body is only sent for
    /// `POST` and `PUT`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = format!(
            "{} {} HTTP/1.1\r\nHost: {}\r\n",
            self.method,
            self.url.path,
            self.url.host_header()
        );

        let body = self.body.as_deref().filter(|_| self.method.carries_body());

        if let Some(body) = body {
            out.push_str("Content-Type: ");
            out.push_str(content_type(body));
            out.push_str("\r\n");
            out.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }

        out.push_str("Connection: close\r\n\r\n");

        if let Some(body) = body {
            out.push_str(body);
        }

        out.into_bytes()
    }
}

/// Guesses the body's media type: object-looking bodies are JSON,
/// everything else is form-encoded.
fn content_type(body: &str) -> &'static str {
    if body.starts_with('{') && body.ends_with('}') {
        "application/json"
    } else {
        "application/x-www-form-urlencoded"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn encoded(request: &ClientRequest) -> String {
        String::from_utf8(request.encode()).unwrap()
    }

    #[test]
    fn get_has_no_body_headers() {
        let request = ClientRequest::new(Method::Get, url("http://localhost:3000/status"));

        assert_eq!(
            encoded(&request),
            "GET /status HTTP/1.1\r\nHost: localhost:3000\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn form_body_is_url_encoded() {
        let request = ClientRequest::new(Method::Post, url("http://h/submit")).with_body("a=1");

        assert_eq!(
            encoded(&request),
            "POST /submit HTTP/1.1\r\nHost: h\r\n\
             Content-Type: application/x-www-form-urlencoded\r\n\
             Content-Length: 3\r\nConnection: close\r\n\r\na=1"
        );
    }

    #[test]
    fn object_body_is_json() {
        let request = ClientRequest::new(Method::Put, url("http://h/")).with_body(r#"{"a":1}"#);
        let text = encoded(&request);

        assert!(text.contains("Content-Type: application/json\r\n"));
        assert!(text.contains("Content-Length: 7\r\n"));
        assert!(text.ends_with("\r\n\r\n{\"a\":1}"));
    }

    #[test]
    fn empty_body_still_sends_length() {
        let request = ClientRequest::new(Method::Post, url("http://h/")).with_body("");
        assert!(encoded(&request).contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn delete_ignores_body() {
        let request = ClientRequest::new(Method::Delete, url("http://h/item/1")).with_body("x");

        assert_eq!(
            encoded(&request),
            "DELETE /item/1 HTTP/1.1\r\nHost: h\r\nConnection: close\r\n\r\n"
        );
    }
}
