//! Utilities for memory-efficient data structures.
//!
//! This module exposes the generation-checked [`Slab`] used both for the
//! reactor registry and for the per-connection operation queues.

mod slab;

pub(crate) use slab::{Key, Slab};
