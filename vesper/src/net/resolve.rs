use crate::error::Error;
use crate::reactor::Reactor;
use crate::reactor::poller::platform::sys_getaddrinfo;

use std::io;
use std::net::{IpAddr, SocketAddr};

/// Resolves `host` to an IPv4 socket address on the blocking pool.
///
/// IP literals skip the lookup. Otherwise the first address returned by
/// the resolver is used. `on_resolved` always runs on the loop thread and
/// never before this function returns.
pub fn resolve(
    reactor: &Reactor,
    host: &str,
    port: u16,
    on_resolved: impl FnOnce(Result<SocketAddr, Error>) + 'static,
) {
    if let Ok(ip) = host.parse::<IpAddr>() {
        reactor.defer(move || on_resolved(Ok(SocketAddr::new(ip, port))));
        return;
    }

    let lookup_host = host.to_owned();
    let host = host.to_owned();

    reactor.spawn_blocking(
        move || sys_getaddrinfo(&lookup_host, port),
        move |result: io::Result<Vec<SocketAddr>>| {
            let resolved = match result {
                Ok(addrs) => addrs.into_iter().next().ok_or_else(|| Error::Resolution {
                    host: host.clone(),
                    source: io::Error::new(io::ErrorKind::NotFound, "no addresses"),
                }),
                Err(source) => Err(Error::Resolution { host, source }),
            };

            if let Ok(addr) = &resolved {
                log::trace!("resolved to {addr}");
            }

            on_resolved(resolved);
        },
    );
}
