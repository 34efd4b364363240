//! chainscope-storage — storage backends for the chainscope indexer.
//!
//! Backends:
//! - [`memory`] — in-memory, coarse exclusive locking (dev/testing, no
//!   persistence)
//!
//! Every backend satisfies the capability traits of `chainscope-core`; the
//! contract is batch-atomicity per call.

pub mod memory;
mod ranges;

pub use memory::MemoryDatabase;
