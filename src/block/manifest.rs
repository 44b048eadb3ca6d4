use crate::error::ChunkError;

/// Schema id reserved to mark a stored payload as a [`ChunkedValueManifest`]
/// rather than a plain value. No real Avro/Avro-like schema registry ever
/// hands out `u32::MAX`, so collisions with real schema ids are not possible.
pub const RESERVED_MANIFEST_SCHEMA_ID: u32 = u32::MAX;

const ENVELOPE_PLAIN: u8 = 0;
const ENVELOPE_MANIFEST: u8 = 1;

/// Describes how a logical value too large for a single record was split.
/// The manifest itself is stored under the logical key; the chunks are
/// stored under derived keys (see [`chunk_key`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedValueManifest {
	pub chunk_keys: Vec<Vec<u8>>,
	pub total_size: u64,
	pub checksum: u32,
}

impl ChunkedValueManifest {
	pub fn new(chunk_keys: Vec<Vec<u8>>, total_size: u64, checksum: u32) -> Self {
		Self {
			chunk_keys,
			total_size,
			checksum,
		}
	}

	fn encode(&self) -> Vec<u8> {
		let mut out = Vec::new();
		out.push(ENVELOPE_MANIFEST);
		out.extend_from_slice(&(self.chunk_keys.len() as u32).to_be_bytes());
		for chunk_key in &self.chunk_keys {
			out.extend_from_slice(&(chunk_key.len() as u32).to_be_bytes());
			out.extend_from_slice(chunk_key);
		}
		out.extend_from_slice(&self.total_size.to_be_bytes());
		out.extend_from_slice(&self.checksum.to_be_bytes());
		out
	}

	fn decode(bytes: &[u8]) -> Result<Self, ChunkError> {
		let mut pos = 0usize;
		let take = |pos: &mut usize, n: usize| -> Result<&[u8], ChunkError> {
			let end = pos
				.checked_add(n)
				.filter(|&end| end <= bytes.len())
				.ok_or_else(|| ChunkError::Malformed("truncated manifest".into()))?;
			let slice = &bytes[*pos..end];
			*pos = end;
			Ok(slice)
		};

		let count = u32::from_be_bytes(take(&mut pos, 4)?.try_into().unwrap()) as usize;
		let mut chunk_keys = Vec::with_capacity(count);
		for _ in 0..count {
			let key_len = u32::from_be_bytes(take(&mut pos, 4)?.try_into().unwrap()) as usize;
			chunk_keys.push(take(&mut pos, key_len)?.to_vec());
		}
		let total_size = u64::from_be_bytes(take(&mut pos, 8)?.try_into().unwrap());
		let checksum = u32::from_be_bytes(take(&mut pos, 4)?.try_into().unwrap());

		Ok(Self {
			chunk_keys,
			total_size,
			checksum,
		})
	}
}

/// Wraps a plain payload with the single-byte envelope discriminant used to
/// tell stored manifests apart from stored values/RMD on the read path.
pub fn wrap_plain(payload: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(payload.len() + 1);
	out.push(ENVELOPE_PLAIN);
	out.extend_from_slice(payload);
	out
}

pub fn wrap_manifest(manifest: &ChunkedValueManifest) -> Vec<u8> {
	manifest.encode()
}

/// The decoded shape of an enveloped payload read back from storage.
pub enum Envelope {
	Plain(Vec<u8>),
	Manifest(ChunkedValueManifest),
}

pub fn unwrap(bytes: &[u8]) -> Result<Envelope, ChunkError> {
	match bytes.first() {
		Some(&ENVELOPE_PLAIN) => Ok(Envelope::Plain(bytes[1..].to_vec())),
		Some(&ENVELOPE_MANIFEST) => Ok(Envelope::Manifest(ChunkedValueManifest::decode(&bytes[1..])?)),
		Some(other) => Err(ChunkError::Malformed(format!("unknown envelope tag {other}"))),
		None => Err(ChunkError::Malformed("empty envelope".into())),
	}
}

/// Derives the storage key for chunk `index` of the logical key `key`.
/// Deterministic so that re-deriving chunk keys from a manifest (e.g. during
/// delete) never depends on anything but the logical key and chunk count.
pub fn chunk_key(key: &[u8], index: usize) -> Vec<u8> {
	let mut out = Vec::with_capacity(key.len() + 7 + 4);
	out.extend_from_slice(key);
	out.extend_from_slice(b"\0chunk\0");
	out.extend_from_slice(&(index as u32).to_be_bytes());
	out
}

/// Splits `value` into fixed-size chunks (the last one may be shorter).
/// `chunk_size` is clamped to at least 1 so a misconfigured 0 never loops
/// forever or panics.
pub fn split_into_chunks(value: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
	value.chunks(chunk_size.max(1)).map(<[u8]>::to_vec).collect()
}

/// Concatenates chunks back into the original value, in manifest order.
pub fn reassemble(chunks: &[Vec<u8>]) -> Vec<u8> {
	chunks.concat()
}

pub fn checksum(bytes: &[u8]) -> u32 {
	crc_fast::checksum(crc_fast::CrcAlgorithm::Crc32IsoHdlc, bytes) as u32
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn split_then_reassemble_round_trips() {
		let value = vec![7u8; 5 * 1024 * 1024];
		let chunks = split_into_chunks(&value, 1024 * 1024);
		assert_eq!(chunks.len(), 5);
		assert_eq!(reassemble(&chunks), value);
	}

	#[test]
	fn manifest_round_trips_through_envelope() {
		let manifest = ChunkedValueManifest::new(
			vec![chunk_key(b"k", 0), chunk_key(b"k", 1)],
			2048,
			checksum(b"hello"),
		);
		let wire = wrap_manifest(&manifest);
		match unwrap(&wire).unwrap() {
			Envelope::Manifest(decoded) => assert_eq!(decoded, manifest),
			Envelope::Plain(_) => panic!("expected manifest"),
		}
	}

	#[test]
	fn plain_payload_round_trips_through_envelope() {
		let wire = wrap_plain(b"short value");
		match unwrap(&wire).unwrap() {
			Envelope::Plain(bytes) => assert_eq!(bytes, b"short value"),
			Envelope::Manifest(_) => panic!("expected plain"),
		}
	}

	#[test]
	fn chunk_keys_are_deterministic_and_distinct() {
		assert_eq!(chunk_key(b"k", 0), chunk_key(b"k", 0));
		assert_ne!(chunk_key(b"k", 0), chunk_key(b"k", 1));
	}

	#[test]
	fn truncated_manifest_is_malformed() {
		let manifest = ChunkedValueManifest::new(vec![b"c0".to_vec()], 10, 1);
		let mut wire = wrap_manifest(&manifest);
		wire.truncate(wire.len() - 1);
		assert!(matches!(unwrap(&wire), Err(ChunkError::Malformed(_))));
	}
}
