use aa_storage::StorageError;
use thiserror::Error;

/// Errors raised by the chunking adapter.
#[derive(Debug, Error)]
pub enum ChunkError {
	#[error(transparent)]
	Storage(#[from] StorageError),

	#[error("chunk {index} of manifest for key {key:?} is missing from storage")]
	ChunkMissing { key: Vec<u8>, index: usize },

	#[error("malformed chunk envelope or manifest: {0}")]
	Malformed(String),
}
