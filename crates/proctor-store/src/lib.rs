//! proctor-store — Ordering store and result sink implementations.
//!
//! Implements the `proctor-core` storage seams: in-memory stores with call
//! introspection for tests and embedding, and a JSON-file-backed ordering
//! store that survives process restarts.

pub mod json;
pub mod memory;

pub use json::JsonFileStore;
pub use memory::{MemoryStore, RecordingSink, StaticQuestionSource};
