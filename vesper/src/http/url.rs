use crate::error::Error;

/// The parts of an `http://` URL needed to issue a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    /// Host name or IP literal, without brackets.
    pub host: String,
    pub port: u16,
    /// Path and query, always starting with `/`.
    pub path: String,
    /// `host[:port]` exactly as written; sent as the `Host` header.
    authority: String,
}

impl Url {
    /// Parses `http://host[:port][/path]`.
    ///
    /// The scheme is matched case-insensitively. IPv6 hosts must be
    /// bracketed. A fragment, if any, is dropped.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let input = input.trim();

        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| Error::Url(format!("missing scheme in {input:?}")))?;

        if !scheme.eq_ignore_ascii_case("http") {
            return Err(Error::Url(format!("unsupported scheme {scheme:?}")));
        }

        let rest = rest.split('#').next().unwrap_or_default();

        let (authority, path) = match rest.find(['/', '?']) {
            Some(at) if rest[at..].starts_with('/') => (&rest[..at], rest[at..].to_owned()),
            Some(at) => (&rest[..at], format!("/{}", &rest[at..])),
            None => (rest, String::from("/")),
        };

        let (host, port) = split_authority(authority)?;

        if host.is_empty() {
            return Err(Error::Url(format!("empty host in {input:?}")));
        }

        Ok(Self {
            host: host.to_owned(),
            port,
            path,
            authority: authority.to_owned(),
        })
    }

    /// Value of the `Host` header.
    pub fn host_header(&self) -> &str {
        &self.authority
    }
}

fn split_authority(authority: &str) -> Result<(&str, u16), Error> {
    // Credentials are not supported; keep only the host part.
    let authority = authority.rsplit('@').next().unwrap_or(authority);

    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .ok_or_else(|| Error::Url(format!("unterminated IPv6 host {authority:?}")))?;

        match after {
            "" => (host, None),
            _ => match after.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None => return Err(Error::Url(format!("invalid authority {authority:?}"))),
            },
        }
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    let port = match port {
        None | Some("") => 80,
        Some(port) => port
            .parse::<u16>()
            .map_err(|_| Error::Url(format!("invalid port {port:?}")))?,
    };

    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_port_and_path() {
        let url = Url::parse("http://example.com").unwrap();

        assert_eq!(url.host, "example.com");
        assert_eq!(url.port, 80);
        assert_eq!(url.path, "/");
        assert_eq!(url.host_header(), "example.com");
    }

    #[test]
    fn keeps_explicit_port_path_and_query() {
        let url = Url::parse("HTTP://127.0.0.1:8080/api/items?id=3#top").unwrap();

        assert_eq!(url.host, "127.0.0.1");
        assert_eq!(url.port, 8080);
        assert_eq!(url.path, "/api/items?id=3");
        assert_eq!(url.host_header(), "127.0.0.1:8080");
    }

    #[test]
    fn query_without_path_gets_a_slash() {
        let url = Url::parse("http://host?q=1").unwrap();
        assert_eq!(url.path, "/?q=1");
    }

    #[test]
    fn bracketed_ipv6_host() {
        let url = Url::parse("http://[::1]:9000/x").unwrap();

        assert_eq!(url.host, "::1");
        assert_eq!(url.port, 9000);
        assert_eq!(url.host_header(), "[::1]:9000");
    }

    #[test]
    fn rejects_other_schemes_and_empty_hosts() {
        assert!(matches!(Url::parse("https://example.com"), Err(Error::Url(_))));
        assert!(matches!(Url::parse("example.com/path"), Err(Error::Url(_))));
        assert!(matches!(Url::parse("http:///path"), Err(Error::Url(_))));
        assert!(matches!(Url::parse("http://host:http/"), Err(Error::Url(_))));
    }
}
