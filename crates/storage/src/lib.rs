//! Key/value storage abstraction and implementations for Carematch.
//!
//! Drafts are persisted as opaque strings under namespaced keys; this crate
//! provides the trait the engine writes through plus an in-memory and a
//! JSON-file backend.

#![warn(missing_docs)]

pub mod trait_;
pub mod memory;
pub mod json_storage;

pub use trait_::{KeyValueStore, StorageError, Result};
pub use memory::MemoryStore;
pub use json_storage::JsonFileStore;
