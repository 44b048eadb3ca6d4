use std::collections::HashMap;

use aa_block::ChunkedValueManifest;
use aa_util::{Key, Rmd};

/// One cached, just-resolved record. A non-null [`TransientCache::get`]
/// means callers MUST use it instead of the storage engine for the current
/// resolution; the cache is authoritative until evicted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransientRecord {
	pub value: Option<Vec<u8>>,
	pub value_offset: u64,
	pub value_len: u64,
	pub schema_id: u32,
	pub rmd: Rmd,
	pub value_manifest: Option<ChunkedValueManifest>,
	pub rmd_manifest: Option<ChunkedValueManifest>,
	/// Local VT offset this record will be produced at; entries are evicted
	/// once that offset is acknowledged.
	pub produced_position: u64,
}

/// Per-partition map from key to its most recently applied
/// [`TransientRecord`].
#[derive(Debug, Default)]
pub struct TransientCache {
	entries: HashMap<Key, TransientRecord>,
}

impl TransientCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, key: &Key) -> Option<&TransientRecord> {
		self.entries.get(key)
	}

	pub fn put(&mut self, key: Key, record: TransientRecord) {
		self.entries.insert(key, record);
	}

	/// Removes every entry whose `produced_position <= position`.
	pub fn evict_up_to(&mut self, position: u64) {
		self.entries.retain(|_, record| record.produced_position > position);
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(produced_position: u64) -> TransientRecord {
		TransientRecord {
			value: Some(b"v".to_vec()),
			value_offset: 0,
			value_len: 1,
			schema_id: 1,
			rmd: Rmd::record_level(10, vec![1]),
			value_manifest: None,
			rmd_manifest: None,
			produced_position,
		}
	}

	#[test]
	fn get_reflects_most_recent_put() {
		let mut cache = TransientCache::new();
		let key = Key::from(b"k".as_slice());
		assert!(cache.get(&key).is_none());
		cache.put(key.clone(), record(5));
		assert_eq!(cache.get(&key).unwrap().produced_position, 5);
	}

	#[test]
	fn evict_up_to_removes_acknowledged_entries_only() {
		let mut cache = TransientCache::new();
		cache.put(Key::from(b"a".as_slice()), record(1));
		cache.put(Key::from(b"b".as_slice()), record(2));
		cache.put(Key::from(b"c".as_slice()), record(5));

		cache.evict_up_to(2);

		assert!(cache.get(&Key::from(b"a".as_slice())).is_none());
		assert!(cache.get(&Key::from(b"b".as_slice())).is_none());
		assert!(cache.get(&Key::from(b"c".as_slice())).is_some());
	}
}
