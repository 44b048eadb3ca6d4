//! Replication Metadata (RMD) codec.
//!
//! Wire layout: `[4 bytes be: value_schema_id][RMD payload in the schema
//! selected by rmd_schema_id]`. The codec never looks at chunk boundaries;
//! that is the chunking adapter's job (`aa_block`).

use std::collections::BTreeMap;

use thiserror::Error;

/// Record-level RMD: one timestamp covers the whole value.
pub const RMD_SCHEMA_RECORD_LEVEL: u32 = 1;
/// Field-level RMD: partial-update stores keep one timestamp per field.
pub const RMD_SCHEMA_FIELD_LEVEL: u32 = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RmdCodecError {
	#[error("truncated RMD payload")]
	Truncated,
	#[error("unknown RMD schema id: {0}")]
	UnknownRmdSchema(u32),
}

/// Either a single record-level timestamp, or one timestamp per field for
/// partial-update stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timestamp {
	Record(u64),
	Field(BTreeMap<String, u64>),
}

/// Replication metadata for a single key: which RMD schema it is encoded
/// under, the timestamp(s), and the per-region offset vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rmd {
	pub rmd_schema_id: u32,
	pub timestamp: Timestamp,
	pub offset_vector: Vec<u64>,
}

impl Rmd {
	pub fn record_level(ts: u64, offset_vector: Vec<u64>) -> Self {
		Rmd {
			rmd_schema_id: RMD_SCHEMA_RECORD_LEVEL,
			timestamp: Timestamp::Record(ts),
			offset_vector,
		}
	}

	pub fn field_level(ts: BTreeMap<String, u64>, offset_vector: Vec<u64>) -> Self {
		Rmd {
			rmd_schema_id: RMD_SCHEMA_FIELD_LEVEL,
			timestamp: Timestamp::Field(ts),
			offset_vector,
		}
	}

	/// An all-zero RMD for a key with no prior history: if old_rmd is
	/// absent, treat prior timestamp as 0 and prior offset vector as zeros.
	pub fn absent(region_count: usize) -> Self {
		Rmd::record_level(0, vec![0; region_count])
	}
}

/// The flat list of timestamps carried by `rmd`: the resolver's per-field
/// comparison, and the ingestion task's regression check, both read through
/// this rather than matching on `Timestamp` directly.
pub fn timestamps(rmd: &Rmd) -> Vec<u64> {
	match &rmd.timestamp {
		Timestamp::Record(t) => vec![*t],
		Timestamp::Field(m) => m.values().copied().collect(),
	}
}

/// Sum of the offset vector, used as a cheap monotonicity check: a merge
/// result's sum must never be lower than the prior state's.
pub fn offset_vector_sum(rmd: &Rmd) -> u128 {
	rmd.offset_vector.iter().map(|&x| x as u128).sum()
}

pub fn encode(value_schema_id: u32, rmd: &Rmd) -> Vec<u8> {
	let mut out = Vec::new();
	out.extend_from_slice(&value_schema_id.to_be_bytes());
	out.extend_from_slice(&rmd.rmd_schema_id.to_be_bytes());

	match &rmd.timestamp {
		Timestamp::Record(ts) => {
			out.extend_from_slice(&ts.to_be_bytes());
		}
		Timestamp::Field(fields) => {
			out.extend_from_slice(&(fields.len() as u32).to_be_bytes());
			for (name, ts) in fields.iter() {
				let name_bytes = name.as_bytes();
				out.extend_from_slice(&(name_bytes.len() as u16).to_be_bytes());
				out.extend_from_slice(name_bytes);
				out.extend_from_slice(&ts.to_be_bytes());
			}
		}
	}

	out.extend_from_slice(&(rmd.offset_vector.len() as u16).to_be_bytes());
	for off in &rmd.offset_vector {
		out.extend_from_slice(&off.to_be_bytes());
	}

	out
}

pub fn decode(bytes: &[u8]) -> Result<(u32, Rmd), RmdCodecError> {
	let mut cur = Cursor::new(bytes);
	let value_schema_id = cur.take_u32()?;
	let rmd_schema_id = cur.take_u32()?;

	let timestamp = match rmd_schema_id {
		RMD_SCHEMA_RECORD_LEVEL => Timestamp::Record(cur.take_u64()?),
		RMD_SCHEMA_FIELD_LEVEL => {
			let count = cur.take_u32()? as usize;
			let mut fields = BTreeMap::new();
			for _ in 0..count {
				let name_len = cur.take_u16()? as usize;
				let name = String::from_utf8_lossy(cur.take_bytes(name_len)?).into_owned();
				let ts = cur.take_u64()?;
				fields.insert(name, ts);
			}
			Timestamp::Field(fields)
		}
		other => return Err(RmdCodecError::UnknownRmdSchema(other)),
	};

	let region_count = cur.take_u16()? as usize;
	let mut offset_vector = Vec::with_capacity(region_count);
	for _ in 0..region_count {
		offset_vector.push(cur.take_u64()?);
	}

	Ok((
		value_schema_id,
		Rmd {
			rmd_schema_id,
			timestamp,
			offset_vector,
		},
	))
}

struct Cursor<'a> {
	buf: &'a [u8],
	pos: usize,
}

impl<'a> Cursor<'a> {
	fn new(buf: &'a [u8]) -> Self {
		Cursor { buf, pos: 0 }
	}

	fn take_bytes(&mut self, n: usize) -> Result<&'a [u8], RmdCodecError> {
		let end = self.pos.checked_add(n).ok_or(RmdCodecError::Truncated)?;
		let slice = self.buf.get(self.pos..end).ok_or(RmdCodecError::Truncated)?;
		self.pos = end;
		Ok(slice)
	}

	fn take_u16(&mut self) -> Result<u16, RmdCodecError> {
		let b = self.take_bytes(2)?;
		Ok(u16::from_be_bytes(b.try_into().unwrap()))
	}

	fn take_u32(&mut self) -> Result<u32, RmdCodecError> {
		let b = self.take_bytes(4)?;
		Ok(u32::from_be_bytes(b.try_into().unwrap()))
	}

	fn take_u64(&mut self) -> Result<u64, RmdCodecError> {
		let b = self.take_bytes(8)?;
		Ok(u64::from_be_bytes(b.try_into().unwrap()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip_record_level() {
		let rmd = Rmd::record_level(42, vec![10, 0, 7]);
		let encoded = encode(99, &rmd);
		let (schema_id, decoded) = decode(&encoded).unwrap();
		assert_eq!(schema_id, 99);
		assert_eq!(decoded, rmd);
	}

	#[test]
	fn round_trip_field_level() {
		let mut fields = BTreeMap::new();
		fields.insert("a".to_string(), 5);
		fields.insert("b".to_string(), 9);
		let rmd = Rmd::field_level(fields, vec![1, 2]);
		let encoded = encode(7, &rmd);
		let (schema_id, decoded) = decode(&encoded).unwrap();
		assert_eq!(schema_id, 7);
		assert_eq!(decoded, rmd);
	}

	#[test]
	fn truncated_is_malformed() {
		let rmd = Rmd::record_level(1, vec![1]);
		let mut encoded = encode(1, &rmd);
		encoded.truncate(encoded.len() - 2);
		assert_eq!(decode(&encoded).unwrap_err(), RmdCodecError::Truncated);
	}

	#[test]
	fn unknown_schema_is_malformed() {
		let mut encoded = encode(1, &Rmd::record_level(1, vec![1]));
		// overwrite rmd_schema_id (bytes 4..8) with an unknown value
		encoded[4..8].copy_from_slice(&999u32.to_be_bytes());
		assert_eq!(
			decode(&encoded).unwrap_err(),
			RmdCodecError::UnknownRmdSchema(999)
		);
	}

	#[test]
	fn timestamps_and_offset_sum() {
		let rmd = Rmd::record_level(5, vec![1, 2, 3]);
		assert_eq!(timestamps(&rmd), vec![5]);
		assert_eq!(offset_vector_sum(&rmd), 6);
	}
}
