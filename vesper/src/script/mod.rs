//! The boundary between native completions and script callbacks.
//!
//! [`ScriptEngine`] is implemented by the embedder. [`Retained`] keeps a
//! callback alive while an operation is outstanding, and
//! [`PendingOperation`] guarantees that callback runs at most once.

mod engine;
mod pending;
mod retention;

pub use engine::{HostObject, NativeValue, ScriptEngine, ServerId};
pub use pending::{OperationState, PendingOperation};
pub use retention::Retained;
