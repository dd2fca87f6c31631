use super::engine::{NativeValue, ScriptEngine};
use super::retention::Retained;

/// Completion state of a [`PendingOperation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    Completed,
    Cancelled,
}

/// One in-flight asynchronous operation owning its script callback.
///
/// The callback runs at most once. Its retention is released right after
/// that call, or when the operation is cancelled or dropped while still
/// pending.
#[derive(Debug)]
pub struct PendingOperation<E: ScriptEngine> {
    id: u64,
    callback: Option<Retained<E>>,
    state: OperationState,
}

impl<E: ScriptEngine> PendingOperation<E> {
    pub fn new(id: u64, callback: Retained<E>) -> Self {
        Self {
            id,
            callback: Some(callback),
            state: OperationState::Pending,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Invokes the callback with `args` and releases it.
    ///
    /// Does nothing unless the operation is still pending.
    pub fn complete(&mut self, args: Vec<NativeValue>) {
        if self.state != OperationState::Pending {
            return;
        }
        self.state = OperationState::Completed;

        if let Some(callback) = self.callback.take() {
            log::trace!("completing operation {}", self.id);
            callback.invoke_native(args);
        }
    }

    /// Releases the callback without invoking it.
    pub fn cancel(&mut self) {
        if self.state == OperationState::Pending {
            self.state = OperationState::Cancelled;
            self.callback = None;
        }
    }
}

impl<E: ScriptEngine> Drop for PendingOperation<E> {
    fn drop(&mut self) {
        if self.state == OperationState::Pending {
            log::trace!("operation {} dropped before completion", self.id);
            self.cancel();
        }
    }
}
