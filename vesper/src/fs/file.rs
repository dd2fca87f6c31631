use crate::reactor::poller::platform::{
    CREATE_FLAGS, CREATE_MODE, READ_FLAGS, sys_close, sys_open, sys_read, sys_write,
};

use std::io;
use std::os::fd::RawFd;
use std::path::Path;

/// A blocking file handle.
///
/// Regular files are always "ready" as far as epoll and kqueue are
/// concerned, so `File` is only used from the blocking pool.
pub(crate) struct File {
    /// File descriptor associated with this file.
    fd: RawFd,
}

impl File {
    /// Opens a file in read-only mode.
    pub(crate) fn open(path: &Path) -> io::Result<Self> {
        let fd = sys_open(path, READ_FLAGS, 0)?;
        Ok(Self { fd })
    }

    /// Creates a file for writing, truncating it if it already exists.
    ///
    /// New files get mode `0644`, minus the process umask.
    pub(crate) fn create(path: &Path) -> io::Result<Self> {
        let fd = sys_open(path, CREATE_FLAGS, CREATE_MODE)?;
        Ok(Self { fd })
    }

    /// Reads until end of file.
    pub(crate) fn read_to_end(&self) -> io::Result<Vec<u8>> {
        let mut contents = Vec::new();
        let mut chunk = vec![0u8; 16 * 1024];

        loop {
            match sys_read(self.fd, &mut chunk) {
                Ok(0) => return Ok(contents),
                Ok(n) => contents.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Writes the entire buffer to the file.
    ///
    /// # Errors
    ///
    /// Returns `WriteZero` if the write operation makes no progress.
    pub(crate) fn write_all(&self, mut buffer: &[u8]) -> io::Result<()> {
        while !buffer.is_empty() {
            let n = match sys_write(self.fd, buffer) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };

            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write entire buffer",
                ));
            }

            buffer = &buffer[n..];
        }

        Ok(())
    }
}

impl Drop for File {
    /// Closes the file descriptor.
    fn drop(&mut self) {
        sys_close(self.fd);
    }
}
