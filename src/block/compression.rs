use crate::error::ChunkError;

/// Optional zstd recompression applied to a resolved value before it is
/// handed to the storage engine, per the store's configured level. A level
/// of `0` means "store as-is" and is the common case.
pub fn compress(value: &[u8], level: i32) -> Result<Vec<u8>, ChunkError> {
	if level == 0 {
		return Ok(value.to_vec());
	}
	zstd::stream::encode_all(value, level)
		.map_err(|err| ChunkError::Malformed(format!("zstd compression failed: {err}")))
}

pub fn decompress(value: &[u8], level: i32) -> Result<Vec<u8>, ChunkError> {
	if level == 0 {
		return Ok(value.to_vec());
	}
	zstd::stream::decode_all(value)
		.map_err(|err| ChunkError::Malformed(format!("zstd decompression failed: {err}")))
}
