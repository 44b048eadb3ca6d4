use crate::error::StorageError;

/// Snapshot of a store-version's control-plane state, as surfaced by
/// `get_version_state`. The control-plane state machine itself is out
/// of scope; this is only the shape the ingestion task reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreVersionState {
	pub store_name: String,
	pub version_number: u32,
	pub is_hybrid: bool,
}

/// The storage engine collaborator: a thread-safe, per-partition
/// key-value store that keeps a value and its replication metadata (RMD)
/// under the same logical key.
///
/// Value and RMD must be persisted together or not at all; a real
/// backend (LSM tree, B-tree store, ...) is expected to implement
/// `put_with_rmd`/`delete_with_rmd` as a single atomic write. This trait
/// does not mandate a particular mechanism, only the all-or-nothing
/// contract.
pub trait StorageEngine: Send + Sync {
	fn put(&self, partition: u32, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

	fn put_with_rmd(
		&self,
		partition: u32,
		key: &[u8],
		value: &[u8],
		rmd_prefixed: &[u8],
	) -> Result<(), StorageError>;

	fn put_rmd(&self, partition: u32, key: &[u8], rmd_prefixed: &[u8]) -> Result<(), StorageError>;

	fn delete(&self, partition: u32, key: &[u8]) -> Result<(), StorageError>;

	fn delete_with_rmd(
		&self,
		partition: u32,
		key: &[u8],
		rmd_prefixed: &[u8],
	) -> Result<(), StorageError>;

	fn get(&self, partition: u32, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

	fn get_rmd(&self, partition: u32, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

	fn get_version_state(&self) -> Result<Option<StoreVersionState>, StorageError>;
}

/// Selects which storage engine backend to open, mirroring the reference
/// node's pluggable-backend `Engine` enum. Only `Memory` is actually wired up
/// here: a real persistent backend is not implemented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Engine {
	Memory,
}

impl Engine {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Memory => "memory",
		}
	}
}

impl std::fmt::Display for Engine {
	fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
		self.as_str().fmt(fmt)
	}
}

impl std::str::FromStr for Engine {
	type Err = StorageError;

	fn from_str(text: &str) -> Result<Engine, StorageError> {
		match text {
			"memory" => Ok(Engine::Memory),
			other => Err(StorageError::Other(format!(
				"unsupported storage engine: {} (only 'memory' is available in this build)",
				other
			))),
		}
	}
}
