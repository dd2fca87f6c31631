/// A readiness event reported by the poller.
///
/// The token identifies the slab entry (connection or listener) the
/// descriptor was registered for. Errors and hang-ups are folded into
/// both flags so that the owner observes them on its next read or write.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Event {
    /// Token associated with the registered file descriptor.
    pub(crate) token: usize,

    /// Indicates that the file descriptor is readable.
    pub(crate) readable: bool,

    /// Indicates that the file descriptor is writable.
    pub(crate) writable: bool,
}
