//! TCP connection implementation.
//!
//! It is split into:
//! - [`conn`]: the connection core with its read and write queues,
//! - [`options`]: named socket options and their accessors.

pub mod conn;
pub mod options;
