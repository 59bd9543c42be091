//! Remote client implementations
//!
//! Concrete [`crate::remote::RemoteClient`] backends: an in-process remote
//! store and a local directory tree served through the same blocking
//! interface.

pub mod local;
pub mod memory;

// Re-export main types for convenience
pub use local::{LocalClient, LocalSession};
pub use memory::{MemoryClient, MemorySession, MemoryStore};
