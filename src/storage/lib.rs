//! The persistent storage engine collaborator. This crate intentionally
//! does not specify *how* a production key-value store is implemented;
//! that is out of scope, leaving only the trait boundary the A/A
//! ingestion engine calls through, plus a single in-memory reference
//! implementation used by the rest of the workspace's tests.

pub mod engine;
pub mod error;
pub mod memory;

pub use engine::{Engine, StorageEngine, StoreVersionState};
pub use error::StorageError;
pub use memory::MemoryStorageEngine;
