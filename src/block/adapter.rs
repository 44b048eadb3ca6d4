use std::sync::Arc;

use aa_storage::StorageEngine;
use tracing::{trace, warn};

use crate::error::ChunkError;
use crate::manifest::{
	chunk_key, checksum, reassemble, split_into_chunks, wrap_manifest, wrap_plain, ChunkedValueManifest,
	Envelope,
};

/// Adapts a [`StorageEngine`] so that callers never see chunk boundaries:
/// large values are transparently split into chunks plus a manifest on the
/// write side (when `write_chunked_value` is used) and transparently
/// reassembled on the read side. Small values pass through as a single
/// enveloped record.
pub struct ChunkingAdapter<S: StorageEngine> {
	engine: Arc<S>,
}

impl<S: StorageEngine> ChunkingAdapter<S> {
	pub fn new(engine: Arc<S>) -> Self {
		Self { engine }
	}

	pub fn get_value(&self, partition: u32, key: &[u8]) -> Result<Option<Vec<u8>>, ChunkError> {
		let Some(bytes) = self.engine.get(partition, key)? else {
			return Ok(None);
		};
		Ok(Some(self.reassemble_from_envelope(partition, key, &bytes)?))
	}

	pub fn get_rmd(&self, partition: u32, key: &[u8]) -> Result<Option<Vec<u8>>, ChunkError> {
		let Some(bytes) = self.engine.get_rmd(partition, key)? else {
			return Ok(None);
		};
		Ok(Some(self.reassemble_from_envelope(partition, key, &bytes)?))
	}

	fn reassemble_from_envelope(
		&self,
		partition: u32,
		key: &[u8],
		bytes: &[u8],
	) -> Result<Vec<u8>, ChunkError> {
		match crate::manifest::unwrap(bytes)? {
			Envelope::Plain(value) => Ok(value),
			Envelope::Manifest(manifest) => {
				let mut chunks = Vec::with_capacity(manifest.chunk_keys.len());
				for (index, chunk_key) in manifest.chunk_keys.iter().enumerate() {
					let chunk = self
						.engine
						.get(partition, chunk_key)?
						.ok_or_else(|| ChunkError::ChunkMissing {
							key: key.to_vec(),
							index,
						})?;
					chunks.push(chunk);
				}
				let value = reassemble(&chunks);
				if value.len() as u64 != manifest.total_size {
					return Err(ChunkError::Malformed(format!(
						"reassembled {} bytes, manifest declared {}",
						value.len(),
						manifest.total_size
					)));
				}
				if checksum(&value) != manifest.checksum {
					warn!(key = ?key, "checksum mismatch reassembling chunked value");
					return Err(ChunkError::Malformed("checksum mismatch on reassembly".into()));
				}
				Ok(value)
			}
		}
	}

	/// Stores a value and its RMD as a single unchunked record.
	pub fn put_value_and_rmd(
		&self,
		partition: u32,
		key: &[u8],
		value: &[u8],
		rmd_prefixed: &[u8],
	) -> Result<(), ChunkError> {
		self.engine
			.put_with_rmd(partition, key, &wrap_plain(value), &wrap_plain(rmd_prefixed))?;
		Ok(())
	}

	pub fn put_rmd_only(&self, partition: u32, key: &[u8], rmd_prefixed: &[u8]) -> Result<(), ChunkError> {
		self.engine.put_rmd(partition, key, &wrap_plain(rmd_prefixed))?;
		Ok(())
	}

	/// Writes a value without touching its RMD: used for version-topic
	/// write-through, where the record already represents resolved state
	/// and carries no separate RMD payload to persist.
	pub fn put_value_only(&self, partition: u32, key: &[u8], value: &[u8]) -> Result<(), ChunkError> {
		self.engine.put(partition, key, &wrap_plain(value))?;
		Ok(())
	}

	/// Splits `value` into `chunk_size`-byte chunks, writes each chunk plus a
	/// manifest under `key`, and stores `rmd_prefixed` unchunked alongside it.
	pub fn write_chunked_value(
		&self,
		partition: u32,
		key: &[u8],
		value: &[u8],
		rmd_prefixed: &[u8],
		chunk_size: usize,
	) -> Result<(), ChunkError> {
		let chunks = split_into_chunks(value, chunk_size);
		trace!(key = ?key, num_chunks = chunks.len(), "splitting value into chunks");
		let chunk_keys: Vec<Vec<u8>> = chunks
			.iter()
			.enumerate()
			.map(|(index, _)| chunk_key(key, index))
			.collect();

		for (chunk, chunk_key) in chunks.iter().zip(chunk_keys.iter()) {
			self.engine.put(partition, chunk_key, chunk)?;
		}

		let manifest = ChunkedValueManifest::new(chunk_keys, value.len() as u64, checksum(value));
		self.engine
			.put_with_rmd(partition, key, &wrap_manifest(&manifest), &wrap_plain(rmd_prefixed))?;
		Ok(())
	}

	/// Deletes the logical record at `key`. If it was chunked, every chunk
	/// referenced by its manifest is deleted too.
	pub fn delete(&self, partition: u32, key: &[u8], tombstone_rmd_prefixed: &[u8]) -> Result<(), ChunkError> {
		if let Some(bytes) = self.engine.get(partition, key)? {
			if let Envelope::Manifest(manifest) = crate::manifest::unwrap(&bytes)? {
				for chunk_key in &manifest.chunk_keys {
					self.engine.delete(partition, chunk_key)?;
				}
			}
		}
		self.engine
			.delete_with_rmd(partition, key, &wrap_plain(tombstone_rmd_prefixed))?;
		Ok(())
	}
}
