use std::collections::HashMap;

use parking_lot::RwLock;

use crate::engine::{StorageEngine, StoreVersionState};
use crate::error::StorageError;

type MapKey = (u32, Vec<u8>);

/// In-memory reference implementation of [`StorageEngine`], used by the rest
/// of the workspace's test suites in place of a real persistent backend
///.
#[derive(Default)]
pub struct MemoryStorageEngine {
	values: RwLock<HashMap<MapKey, Vec<u8>>>,
	rmds: RwLock<HashMap<MapKey, Vec<u8>>>,
	version_state: RwLock<Option<StoreVersionState>>,
}

impl MemoryStorageEngine {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_version_state(state: StoreVersionState) -> Self {
		let engine = Self::new();
		*engine.version_state.write() = Some(state);
		engine
	}

	fn key(partition: u32, key: &[u8]) -> MapKey {
		(partition, key.to_vec())
	}
}

impl StorageEngine for MemoryStorageEngine {
	fn put(&self, partition: u32, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
		self.values
			.write()
			.insert(Self::key(partition, key), value.to_vec());
		Ok(())
	}

	fn put_with_rmd(
		&self,
		partition: u32,
		key: &[u8],
		value: &[u8],
		rmd_prefixed: &[u8],
	) -> Result<(), StorageError> {
		// Value and RMD are persisted together. Holding both write locks
		// across both inserts is the in-memory stand-in for "one atomic
		// write" that a real backend would implement via a transaction.
		let mut values = self.values.write();
		let mut rmds = self.rmds.write();
		values.insert(Self::key(partition, key), value.to_vec());
		rmds.insert(Self::key(partition, key), rmd_prefixed.to_vec());
		Ok(())
	}

	fn put_rmd(&self, partition: u32, key: &[u8], rmd_prefixed: &[u8]) -> Result<(), StorageError> {
		self.rmds
			.write()
			.insert(Self::key(partition, key), rmd_prefixed.to_vec());
		Ok(())
	}

	fn delete(&self, partition: u32, key: &[u8]) -> Result<(), StorageError> {
		self.values.write().remove(&Self::key(partition, key));
		Ok(())
	}

	fn delete_with_rmd(
		&self,
		partition: u32,
		key: &[u8],
		rmd_prefixed: &[u8],
	) -> Result<(), StorageError> {
		let mut values = self.values.write();
		let mut rmds = self.rmds.write();
		values.remove(&Self::key(partition, key));
		rmds.insert(Self::key(partition, key), rmd_prefixed.to_vec());
		Ok(())
	}

	fn get(&self, partition: u32, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
		Ok(self.values.read().get(&Self::key(partition, key)).cloned())
	}

	fn get_rmd(&self, partition: u32, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
		Ok(self.rmds.read().get(&Self::key(partition, key)).cloned())
	}

	fn get_version_state(&self) -> Result<Option<StoreVersionState>, StorageError> {
		Ok(self.version_state.read().clone())
	}
}
