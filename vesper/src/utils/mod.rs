//! Utilities for memory-efficient data structures.
//!
//! This module provides low-level utilities used internally by the runtime.
//! In particular, it exposes a [`Slab`] allocator with generation-checked
//! [`Key`]s, used for fast indexed storage with safe reuse of freed slots.

mod slab;

pub(crate) use slab::{Key, Slab};
