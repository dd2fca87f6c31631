use crate::utils::Key;

use std::any::Any;

/// Messages posted to the reactor from other threads.
///
/// Every send is followed by a poller wake-up so that a blocked
/// `epoll_wait`/`kevent` returns and the loop drains the channel.
pub(crate) enum Command {
    /// A blocking job finished; `output` is handed to the completion
    /// registered under `key`.
    Complete {
        key: Key,
        output: Box<dyn Any + Send>,
    },

    /// Request the loop to return from `run()` after the current pass.
    Stop,
}
