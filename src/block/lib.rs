//! The chunking adapter. Reassembles chunked values/RMD from storage via
//! a manifest and hides chunk boundaries from callers.

pub mod adapter;
pub mod compression;
pub mod error;
pub mod manifest;

pub use adapter::ChunkingAdapter;
pub use error::ChunkError;
pub use manifest::{reassemble, split_into_chunks, ChunkedValueManifest, RESERVED_MANIFEST_SCHEMA_ID};
