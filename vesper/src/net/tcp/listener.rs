use super::stream::Connection;
use crate::error::Error;
use crate::reactor::poller::platform::{
    domain_of, sys_bind, sys_close, sys_ipv6_is_necessary, sys_listen, sys_set_reuseaddr,
    sys_socket, sys_sockname,
};
use crate::reactor::{Reactor, WeakReactor};
use crate::utils::Key;

use std::cell::RefCell;
use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::rc::Rc;

/// A listening TCP socket registered with a [`Reactor`].
///
/// Every accepted connection is handed to the accept callback as an open
/// [`Connection`] with no read active. The listener stays registered until
/// [`close`](Self::close) is called; dropping the handle does not close it.
#[derive(Clone)]
pub struct Listener {
    reactor: WeakReactor,
    key: Key,
}

impl Listener {
    /// Binds a listener to `addr` and starts accepting.
    ///
    /// This function:
    /// - creates a non-blocking socket,
    /// - enables `SO_REUSEADDR`,
    /// - configures IPv6 dual-stack if applicable,
    /// - binds and starts listening with the reactor's configured backlog.
    ///
    /// Port `0` picks an ephemeral port; see [`local_addr`](Self::local_addr).
    pub fn bind(
        reactor: &Reactor,
        addr: SocketAddr,
        on_accept: impl FnMut(Connection) + 'static,
    ) -> Result<Self, Error> {
        let backlog = reactor.config().listen_backlog;
        let domain = domain_of(&addr);
        let fd = sys_socket(domain)?;

        let local_addr = match prepare(fd, domain, &addr, backlog) {
            Ok(local_addr) => local_addr,
            Err(e) => {
                sys_close(fd);
                return Err(e.into());
            }
        };

        let key = match reactor.insert_listener(fd, local_addr, Rc::new(RefCell::new(on_accept))) {
            Ok(key) => key,
            Err(e) => {
                sys_close(fd);
                return Err(e.into());
            }
        };

        log::debug!("listening on {local_addr}");

        Ok(Self {
            reactor: reactor.downgrade(),
            key,
        })
    }

    /// Returns the bound address, or `None` once closed.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.reactor.upgrade()?.listener_addr(self.key)
    }

    pub fn is_listening(&self) -> bool {
        self.local_addr().is_some()
    }

    /// Stops accepting and closes the listening socket.
    ///
    /// Connections already accepted are unaffected.
    pub fn close(&self) {
        if let Some(reactor) = self.reactor.upgrade() {
            reactor.close(self.key);
        }
    }
}

fn prepare(fd: RawFd, domain: i32, addr: &SocketAddr, backlog: u32) -> io::Result<SocketAddr> {
    sys_set_reuseaddr(fd)?;
    sys_ipv6_is_necessary(fd, domain)?;
    sys_bind(fd, addr)?;
    sys_listen(fd, backlog)?;

    sys_sockname(fd)
}
