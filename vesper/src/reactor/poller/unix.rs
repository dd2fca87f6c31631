//! Thin `libc` wrappers used by the reactor, the TCP layer and the
//! blocking pool.
//!
//! Every wrapper converts a negative return value into
//! [`io::Error::last_os_error`].

use libc::{
    AF_INET, AF_INET6, AF_UNSPEC, F_GETFL, F_SETFL, IPPROTO_IPV6, IPV6_V6ONLY, O_CLOEXEC, O_CREAT,
    O_NONBLOCK, O_RDONLY, O_TRUNC, O_WRONLY, SO_ERROR, SO_REUSEADDR, SOCK_STREAM, SOL_SOCKET,
    accept, addrinfo, bind, c_int, c_void, close, connect, fcntl, freeaddrinfo, gai_strerror,
    getaddrinfo, getpeername, getsockname, getsockopt, listen, mode_t, open, read, send,
    setsockopt, sockaddr, sockaddr_in, sockaddr_in6, sockaddr_storage, socket, socklen_t, write,
};
use std::ffi::{CStr, CString};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::fd::RawFd;
use std::path::Path;
use std::os::unix::ffi::OsStrExt;
use std::{io, mem, ptr};

/// Flags used when opening a file for reading.
pub(crate) const READ_FLAGS: i32 = O_RDONLY | O_CLOEXEC;

/// Flags used when creating a file for writing.
pub(crate) const CREATE_FLAGS: i32 = O_WRONLY | O_CREAT | O_TRUNC | O_CLOEXEC;

/// Mode given to newly created files.
pub(crate) const CREATE_MODE: mode_t = 0o644;

#[cfg(target_os = "linux")]
const SEND_FLAGS: c_int = libc::MSG_NOSIGNAL;

#[cfg(not(target_os = "linux"))]
const SEND_FLAGS: c_int = 0;

fn check(rc: c_int) -> io::Result<c_int> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

fn check_size(rc: isize) -> io::Result<usize> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

/// Reads from a file descriptor into the given buffer.
///
/// Returns the number of bytes read; `0` means end of stream.
pub(crate) fn sys_read(fd: RawFd, buffer: &mut [u8]) -> io::Result<usize> {
    check_size(unsafe { read(fd, buffer.as_mut_ptr() as *mut c_void, buffer.len()) })
}

/// Writes the buffer to a file descriptor.
pub(crate) fn sys_write(fd: RawFd, buffer: &[u8]) -> io::Result<usize> {
    check_size(unsafe { write(fd, buffer.as_ptr() as *const c_void, buffer.len()) })
}

/// Writes the buffer to a connected socket.
///
/// On Linux `MSG_NOSIGNAL` turns a write to a reset peer into `EPIPE`
/// instead of a `SIGPIPE`.
pub(crate) fn sys_send(fd: RawFd, buffer: &[u8]) -> io::Result<usize> {
    check_size(unsafe { send(fd, buffer.as_ptr() as *const c_void, buffer.len(), SEND_FLAGS) })
}

/// Closes a file descriptor.
pub(crate) fn sys_close(fd: RawFd) {
    unsafe { close(fd) };
}

/// Opens a file using `open(2)`.
pub(crate) fn sys_open(path: &Path, flags: i32, mode: mode_t) -> io::Result<RawFd> {
    let c_path = CString::new(path.as_os_str().as_bytes())?;
    check(unsafe { open(c_path.as_ptr(), flags, mode as libc::c_uint) })
}

/// Sets a file descriptor to non-blocking mode.
pub(crate) fn sys_set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = check(unsafe { fcntl(fd, F_GETFL) })?;
    check(unsafe { fcntl(fd, F_SETFL, flags | O_NONBLOCK) })?;

    Ok(())
}

/// Creates a non-blocking stream socket.
pub(crate) fn sys_socket(domain: c_int) -> io::Result<RawFd> {
    let fd = check(unsafe { socket(domain, SOCK_STREAM, 0) })?;

    if let Err(e) = sys_set_nonblocking(fd) {
        sys_close(fd);
        return Err(e);
    }

    #[cfg(target_os = "macos")]
    {
        let yes: c_int = 1;
        unsafe {
            setsockopt(
                fd,
                SOL_SOCKET,
                libc::SO_NOSIGPIPE,
                &yes as *const _ as *const c_void,
                mem::size_of::<c_int>() as socklen_t,
            );
        }
    }

    Ok(fd)
}

/// Returns the socket domain matching an address.
pub(crate) fn domain_of(addr: &SocketAddr) -> c_int {
    match addr {
        SocketAddr::V4(_) => AF_INET,
        SocketAddr::V6(_) => AF_INET6,
    }
}

/// Binds a socket to an address.
pub(crate) fn sys_bind(fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
    let (storage, len) = socketaddr_to_storage(addr);
    check(unsafe { bind(fd, &storage as *const _ as *const sockaddr, len) })?;

    Ok(())
}

/// Marks a socket as a listening socket with the given backlog.
pub(crate) fn sys_listen(fd: RawFd, backlog: u32) -> io::Result<()> {
    let backlog = c_int::try_from(backlog).unwrap_or(c_int::MAX);
    check(unsafe { listen(fd, backlog) })?;

    Ok(())
}

/// Accepts a new incoming connection.
///
/// The returned client socket is automatically set to non-blocking mode.
pub(crate) fn sys_accept(fd: RawFd) -> io::Result<(RawFd, SocketAddr)> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    let client_fd =
        check(unsafe { accept(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) })?;

    if let Err(e) = sys_set_nonblocking(client_fd) {
        sys_close(client_fd);
        return Err(e);
    }

    match sockaddr_storage_to_socketaddr(&storage) {
        Ok(addr) => Ok((client_fd, addr)),
        Err(e) => {
            sys_close(client_fd);
            Err(e)
        }
    }
}

/// Returns the local address of a socket.
pub(crate) fn sys_sockname(fd: RawFd) -> io::Result<SocketAddr> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    check(unsafe { getsockname(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) })?;
    sockaddr_storage_to_socketaddr(&storage)
}

/// Returns the remote address of a connected socket.
pub(crate) fn sys_peername(fd: RawFd) -> io::Result<SocketAddr> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    check(unsafe { getpeername(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) })?;
    sockaddr_storage_to_socketaddr(&storage)
}

/// Initiates a non-blocking connection.
///
/// `EINPROGRESS` is returned as an error; the caller waits for
/// writability and then inspects [`sys_get_socket_error`].
pub(crate) fn sys_connect(fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
    let (storage, len) = socketaddr_to_storage(addr);
    check(unsafe { connect(fd, &storage as *const _ as *const sockaddr, len) })?;

    Ok(())
}

/// Returns `true` if a connect error means "still connecting".
pub(crate) fn is_in_progress(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EINPROGRESS)
}

/// Reads and clears the pending error of a socket (`SO_ERROR`).
///
/// Returns `Ok(())` when the socket has no pending error.
pub(crate) fn sys_get_socket_error(fd: RawFd) -> io::Result<()> {
    let mut value: c_int = 0;
    let mut len = mem::size_of::<c_int>() as socklen_t;

    check(unsafe {
        getsockopt(
            fd,
            SOL_SOCKET,
            SO_ERROR,
            &mut value as *mut _ as *mut c_void,
            &mut len,
        )
    })?;

    if value != 0 {
        return Err(io::Error::from_raw_os_error(value));
    }

    Ok(())
}

/// Enables `SO_REUSEADDR` on a socket.
pub(crate) fn sys_set_reuseaddr(fd: RawFd) -> io::Result<()> {
    let yes: c_int = 1;
    check(unsafe {
        setsockopt(
            fd,
            SOL_SOCKET,
            SO_REUSEADDR,
            &yes as *const _ as *const c_void,
            mem::size_of::<c_int>() as socklen_t,
        )
    })?;

    Ok(())
}

/// Enables IPv6 dual-stack support when required.
pub(crate) fn sys_ipv6_is_necessary(fd: RawFd, domain: c_int) -> io::Result<()> {
    if domain == AF_INET6 {
        sys_set_v6only(fd, false)?;
    }
    Ok(())
}

/// Sets the `IPV6_V6ONLY` socket option.
pub(crate) fn sys_set_v6only(fd: RawFd, v6only: bool) -> io::Result<()> {
    let value: c_int = if v6only { 1 } else { 0 };

    check(unsafe {
        setsockopt(
            fd,
            IPPROTO_IPV6,
            IPV6_V6ONLY,
            &value as *const _ as *const c_void,
            mem::size_of::<c_int>() as socklen_t,
        )
    })?;

    Ok(())
}

/// Resolves `host:port` with `getaddrinfo(3)`.
///
/// The lookup is restricted to IPv4 stream sockets. This call blocks and
/// must only run on the blocking pool.
pub(crate) fn sys_getaddrinfo(host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
    let c_host = CString::new(host)?;
    let c_port = CString::new(port.to_string())?;

    let mut hints: addrinfo = unsafe { mem::zeroed() };
    hints.ai_family = AF_INET;
    hints.ai_socktype = SOCK_STREAM;

    let mut result: *mut addrinfo = ptr::null_mut();
    let rc = unsafe { getaddrinfo(c_host.as_ptr(), c_port.as_ptr(), &hints, &mut result) };

    if rc != 0 {
        let message = unsafe { CStr::from_ptr(gai_strerror(rc)) }
            .to_string_lossy()
            .into_owned();
        return Err(io::Error::new(io::ErrorKind::NotFound, message));
    }

    let mut addrs = Vec::new();
    let mut cursor = result;

    while !cursor.is_null() {
        let info = unsafe { &*cursor };

        if !info.ai_addr.is_null() && info.ai_family != AF_UNSPEC {
            let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
            let len = (info.ai_addrlen as usize).min(mem::size_of::<sockaddr_storage>());

            unsafe {
                ptr::copy_nonoverlapping(
                    info.ai_addr as *const u8,
                    &mut storage as *mut _ as *mut u8,
                    len,
                );
            }

            if let Ok(addr) = sockaddr_storage_to_socketaddr(&storage) {
                addrs.push(addr);
            }
        }

        cursor = info.ai_next;
    }

    unsafe { freeaddrinfo(result) };

    Ok(addrs)
}

/// Converts a `sockaddr_storage` to a Rust `SocketAddr`.
pub(crate) fn sockaddr_storage_to_socketaddr(storage: &sockaddr_storage) -> io::Result<SocketAddr> {
    match storage.ss_family as c_int {
        AF_INET => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr));
            let port = u16::from_be(addr.sin_port);

            Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }

        AF_INET6 => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in6) };
            let ip = Ipv6Addr::from(addr.sin6_addr.s6_addr);
            let port = u16::from_be(addr.sin6_port);

            Ok(SocketAddr::V6(SocketAddrV6::new(
                ip,
                port,
                addr.sin6_flowinfo,
                addr.sin6_scope_id,
            )))
        }

        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unsupported address family",
        )),
    }
}

/// Converts a `SocketAddr` to a `sockaddr_storage`.
pub(crate) fn socketaddr_to_storage(addr: &SocketAddr) -> (sockaddr_storage, socklen_t) {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

    match addr {
        SocketAddr::V4(v4) => {
            let sa = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in) };
            sa.sin_family = AF_INET as _;
            sa.sin_port = v4.port().to_be();
            sa.sin_addr.s_addr = u32::from(*v4.ip()).to_be();

            (storage, mem::size_of::<sockaddr_in>() as socklen_t)
        }

        SocketAddr::V6(v6) => {
            let sa = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in6) };
            sa.sin6_family = AF_INET6 as _;
            sa.sin6_port = v6.port().to_be();
            sa.sin6_addr.s6_addr = v6.ip().octets();
            sa.sin6_flowinfo = v6.flowinfo();
            sa.sin6_scope_id = v6.scope_id();

            (storage, mem::size_of::<sockaddr_in6>() as socklen_t)
        }
    }
}
