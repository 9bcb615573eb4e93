//! Storage backends bundled with the core crate.
//!
//! SQL backends live in their own crates; the in-memory backend here needs no
//! setup and is what the tests and short lived tools use.

pub mod memory;

pub use memory::{MemoryApplicationRepository, MemoryRepositoryProvider, MemoryTokenRepository};
