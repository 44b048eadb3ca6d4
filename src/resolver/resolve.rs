use std::cmp::Ordering;
use std::collections::BTreeMap;

use aa_util::data::lexicographically_greater;
use aa_util::rmd::{RMD_SCHEMA_FIELD_LEVEL, RMD_SCHEMA_RECORD_LEVEL};
use aa_util::{Rmd, Timestamp};

use crate::error::ResolveError;
use crate::op::{Op, ResolveInput};

/// The outcome of resolving one record against prior state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeResult {
	Ignored,
	Applied {
		/// `None` means the key is now a tombstone.
		new_value: Option<Vec<u8>>,
		new_rmd: Rmd,
		new_value_schema_id: u32,
		/// Hint only: the resolver may hand back a slice of its input
		/// unchanged. Callers must copy before mutating it in place.
		result_reuses_input: bool,
	},
}

/// Pure, deterministic resolution of one incoming operation against prior
/// state. No I/O, no locks, no wall-clock reads.
pub fn resolve(input: ResolveInput) -> Result<MergeResult, ResolveError> {
	let old_rmd = input
		.old_rmd
		.clone()
		.unwrap_or_else(|| Rmd::absent(input.region_count));

	match &input.op {
		Op::Put { value, value_schema_id } => resolve_whole_record(&input, &old_rmd, Some(value), *value_schema_id),
		Op::Delete => resolve_whole_record(&input, &old_rmd, None, 0),
		Op::Update {
			field_values,
			value_schema_id,
			update_schema_id,
		} => resolve_update(&input, &old_rmd, field_values, *value_schema_id, *update_schema_id),
	}
}

/// Rule 3 applied to a whole-record Put/Delete: one scalar prior timestamp,
/// one tie-break over the candidate value's bytes.
fn resolve_whole_record(
	input: &ResolveInput,
	old_rmd: &Rmd,
	new_value: Option<&[u8]>,
	new_value_schema_id: u32,
) -> Result<MergeResult, ResolveError> {
	let prior_ts = whole_record_timestamp(old_rmd);
	let old_value_bytes = input.old_value.as_ref().map(|(bytes, _)| bytes.as_slice());

	let applied = match input.write_ts.cmp(&prior_ts) {
		Ordering::Greater => true,
		Ordering::Less => false,
		Ordering::Equal => match (old_value_bytes, new_value) {
			// DELETE beats PUT at an equal timestamp, whichever side is the delete.
			(Some(_), None) => true,
			(None, Some(_)) => false,
			// Two deletes at an equal timestamp: ignore the second.
			(None, None) => false,
			// Two puts at an equal timestamp: lexicographically larger bytes win.
			(Some(old_bytes), Some(candidate)) => lexicographically_greater(candidate, old_bytes),
		},
	};

	if !applied {
		return Ok(MergeResult::Ignored);
	}

	let new_offset_vector = bump_offset_vector(&old_rmd.offset_vector, input.source_region_id, input.source_offset);
	let new_rmd = Rmd::record_level(input.write_ts, new_offset_vector);

	Ok(MergeResult::Applied {
		new_value: new_value.map(<[u8]>::to_vec),
		new_rmd,
		new_value_schema_id,
		result_reuses_input: false,
	})
}

fn resolve_update(
	input: &ResolveInput,
	old_rmd: &Rmd,
	field_values: &BTreeMap<String, Vec<u8>>,
	value_schema_id: u32,
	update_schema_id: u32,
) -> Result<MergeResult, ResolveError> {
	if old_rmd.rmd_schema_id == RMD_SCHEMA_RECORD_LEVEL && matches!(old_rmd.timestamp, Timestamp::Record(_)) {
		// A record-level prior value has no per-field structure to merge
		// into; a partial update needs the value to already be field-level.
		if input.old_value.is_some() {
			return Err(ResolveError::SchemaIncompatible {
				value_schema_id,
				update_schema_id,
			});
		}
	}

	let mut merged_fields = input
		.old_value
		.as_ref()
		.map(|(bytes, _)| decode_fields(bytes))
		.unwrap_or_default();
	let mut merged_timestamps = prior_field_timestamps(old_rmd);

	let mut any_applied = false;
	for (name, candidate) in field_values {
		let prior_field_ts = merged_timestamps.get(name).copied().unwrap_or(0);
		let apply = match input.write_ts.cmp(&prior_field_ts) {
			Ordering::Greater => true,
			Ordering::Less => false,
			Ordering::Equal => {
				let prior_bytes = merged_fields.get(name).map(Vec::as_slice).unwrap_or(&[]);
				lexicographically_greater(candidate.as_slice(), prior_bytes)
			}
		};
		if apply {
			merged_fields.insert(name.clone(), candidate.clone());
			merged_timestamps.insert(name.clone(), input.write_ts);
			any_applied = true;
		}
	}

	if !any_applied {
		return Ok(MergeResult::Ignored);
	}

	let new_offset_vector = bump_offset_vector(&old_rmd.offset_vector, input.source_region_id, input.source_offset);
	let new_rmd = Rmd::field_level(merged_timestamps, new_offset_vector);

	Ok(MergeResult::Applied {
		new_value: Some(encode_fields(&merged_fields)),
		new_rmd,
		new_value_schema_id: value_schema_id,
		result_reuses_input: false,
	})
}

/// The single scalar timestamp used to judge whole-record Put/Delete
/// operations against possibly field-level prior metadata: the record-level
/// timestamp as-is, or the newest of the per-field timestamps (so a
/// whole-record overwrite can never lose a more recent field update).
fn whole_record_timestamp(rmd: &Rmd) -> u64 {
	match &rmd.timestamp {
		Timestamp::Record(ts) => *ts,
		Timestamp::Field(fields) => fields.values().copied().max().unwrap_or(0),
	}
}

fn prior_field_timestamps(rmd: &Rmd) -> BTreeMap<String, u64> {
	match &rmd.timestamp {
		Timestamp::Record(_) => BTreeMap::new(),
		Timestamp::Field(fields) => fields.clone(),
	}
}

/// Rule 5: the new offset vector is the pointwise max of the prior vector
/// and a vector whose `source_region_id` slot equals `source_offset`.
fn bump_offset_vector(prior: &[u64], source_region_id: u16, source_offset: u64) -> Vec<u64> {
	let region = source_region_id as usize;
	let len = prior.len().max(region + 1);
	let mut out = vec![0u64; len];
	out[..prior.len()].copy_from_slice(prior);
	out[region] = out[region].max(source_offset);
	out
}

/// Canonical field-map encoding used so `Update` can merge at field
/// granularity without a real schema registry.
pub fn encode_fields(fields: &BTreeMap<String, Vec<u8>>) -> Vec<u8> {
	let mut out = Vec::new();
	out.extend_from_slice(&(fields.len() as u32).to_be_bytes());
	for (name, value) in fields {
		let name_bytes = name.as_bytes();
		out.extend_from_slice(&(name_bytes.len() as u16).to_be_bytes());
		out.extend_from_slice(name_bytes);
		out.extend_from_slice(&(value.len() as u32).to_be_bytes());
		out.extend_from_slice(value);
	}
	out
}

pub fn decode_fields(bytes: &[u8]) -> BTreeMap<String, Vec<u8>> {
	let mut fields = BTreeMap::new();
	let mut pos = 0usize;
	let Some(count_bytes) = bytes.get(0..4) else {
		return fields;
	};
	let count = u32::from_be_bytes(count_bytes.try_into().unwrap());
	pos += 4;
	for _ in 0..count {
		let Some(name_len_bytes) = bytes.get(pos..pos + 2) else {
			break;
		};
		let name_len = u16::from_be_bytes(name_len_bytes.try_into().unwrap()) as usize;
		pos += 2;
		let Some(name_bytes) = bytes.get(pos..pos + name_len) else {
			break;
		};
		pos += name_len;
		let Some(value_len_bytes) = bytes.get(pos..pos + 4) else {
			break;
		};
		let value_len = u32::from_be_bytes(value_len_bytes.try_into().unwrap()) as usize;
		pos += 4;
		let Some(value_bytes) = bytes.get(pos..pos + value_len) else {
			break;
		};
		pos += value_len;
		fields.insert(String::from_utf8_lossy(name_bytes).into_owned(), value_bytes.to_vec());
	}
	fields
}

#[cfg(test)]
mod tests {
	use super::*;

	fn put(value: &[u8], write_ts: u64, region: u16, offset: u64, old_rmd: Option<Rmd>) -> ResolveInput {
		ResolveInput {
			old_value: old_rmd.as_ref().and_then(|_| None),
			old_rmd,
			op: Op::Put {
				value: value.to_vec(),
				value_schema_id: 1,
			},
			write_ts,
			source_region_id: region,
			source_offset: offset,
			region_count: 2,
		}
	}

	#[test]
	fn scenario_1_last_writer_wins_on_put() {
		let a = put(b"v1", 100, 0, 10, None);
		let applied_a = resolve(a).unwrap();
		let (rmd_after_a, value_after_a) = match applied_a {
			MergeResult::Applied {
				new_value, new_rmd, ..
			} => (new_rmd, new_value),
			MergeResult::Ignored => panic!("expected Applied"),
		};
		assert_eq!(value_after_a, Some(b"v1".to_vec()));
		assert_eq!(rmd_after_a.offset_vector, vec![10, 0]);

		let mut b = put(b"v2", 50, 1, 5, Some(rmd_after_a.clone()));
		b.old_value = Some((b"v1".to_vec(), 1));
		assert_eq!(resolve(b).unwrap(), MergeResult::Ignored);

		let mut c = put(b"v3", 200, 1, 7, Some(rmd_after_a));
		c.old_value = Some((b"v1".to_vec(), 1));
		let applied_c = resolve(c).unwrap();
		match applied_c {
			MergeResult::Applied {
				new_value, new_rmd, ..
			} => {
				assert_eq!(new_value, Some(b"v3".to_vec()));
				assert_eq!(new_rmd.offset_vector, vec![10, 7]);
				assert_eq!(new_rmd.timestamp, Timestamp::Record(200));
			}
			MergeResult::Ignored => panic!("expected Applied"),
		}
	}

	#[test]
	fn scenario_2_tie_break_by_value_bytes() {
		let a = put(&[0x01], 100, 0, 1, None);
		let applied_a = resolve(a).unwrap();
		let rmd_after_a = match applied_a {
			MergeResult::Applied { new_rmd, .. } => new_rmd,
			MergeResult::Ignored => panic!("expected Applied"),
		};

		let mut b = put(&[0x02], 100, 1, 1, Some(rmd_after_a));
		b.old_value = Some((vec![0x01], 1));
		let applied_b = resolve(b).unwrap();
		match applied_b {
			MergeResult::Applied {
				new_value, new_rmd, ..
			} => {
				assert_eq!(new_value, Some(vec![0x02]));
				assert_eq!(new_rmd.offset_vector, vec![1, 1]);
			}
			MergeResult::Ignored => panic!("expected Applied (lexicographically greater)"),
		}
	}

	#[test]
	fn scenario_3_delete_beats_put_at_equal_ts() {
		let a = put(b"x", 100, 0, 1, None);
		let applied_a = resolve(a).unwrap();
		let rmd_after_a = match applied_a {
			MergeResult::Applied { new_rmd, .. } => new_rmd,
			MergeResult::Ignored => panic!("expected Applied"),
		};

		let delete = ResolveInput {
			old_value: Some((b"x".to_vec(), 1)),
			old_rmd: Some(rmd_after_a),
			op: Op::Delete,
			write_ts: 100,
			source_region_id: 1,
			source_offset: 1,
			region_count: 2,
		};
		let applied = resolve(delete).unwrap();
		match applied {
			MergeResult::Applied {
				new_value, new_rmd, ..
			} => {
				assert_eq!(new_value, None);
				assert_eq!(new_rmd.timestamp, Timestamp::Record(100));
				assert_eq!(new_rmd.offset_vector, vec![1, 1]);
			}
			MergeResult::Ignored => panic!("expected Applied (delete wins tie)"),
		}
	}

	#[test]
	fn second_delete_at_equal_ts_is_ignored() {
		let delete = ResolveInput {
			old_value: None,
			old_rmd: Some(Rmd::record_level(100, vec![1, 1])),
			op: Op::Delete,
			write_ts: 100,
			source_region_id: 0,
			source_offset: 1,
			region_count: 2,
		};
		assert_eq!(resolve(delete).unwrap(), MergeResult::Ignored);
	}

	#[test]
	fn partial_update_applies_only_newer_fields() {
		let mut old_fields = BTreeMap::new();
		old_fields.insert("a".to_string(), b"old_a".to_vec());
		old_fields.insert("b".to_string(), b"old_b".to_vec());

		let mut old_ts = BTreeMap::new();
		old_ts.insert("a".to_string(), 100);
		old_ts.insert("b".to_string(), 200);

		let mut incoming = BTreeMap::new();
		incoming.insert("a".to_string(), b"new_a".to_vec()); // write_ts 150 > 100, applies
		incoming.insert("b".to_string(), b"stale_b".to_vec()); // write_ts 150 < 200, kept

		let input = ResolveInput {
			old_value: Some((encode_fields(&old_fields), 1)),
			old_rmd: Some(Rmd::field_level(old_ts, vec![1, 0])),
			op: Op::Update {
				field_values: incoming,
				value_schema_id: 1,
				update_schema_id: 2,
			},
			write_ts: 150,
			source_region_id: 0,
			source_offset: 2,
			region_count: 2,
		};

		let applied = resolve(input).unwrap();
		match applied {
			MergeResult::Applied { new_value, new_rmd, .. } => {
				let fields = decode_fields(&new_value.unwrap());
				assert_eq!(fields.get("a"), Some(&b"new_a".to_vec()));
				assert_eq!(fields.get("b"), Some(&b"old_b".to_vec()));
				match &new_rmd.timestamp {
					Timestamp::Field(ts) => {
						assert_eq!(ts.get("a"), Some(&150));
						assert_eq!(ts.get("b"), Some(&200));
					}
					Timestamp::Record(_) => panic!("expected field-level timestamp"),
				}
				assert_eq!(new_rmd.rmd_schema_id, RMD_SCHEMA_FIELD_LEVEL);
			}
			MergeResult::Ignored => panic!("expected Applied"),
		}
	}

	#[test]
	fn update_on_record_level_value_is_schema_incompatible() {
		let input = ResolveInput {
			old_value: Some((b"opaque".to_vec(), 1)),
			old_rmd: Some(Rmd::record_level(10, vec![1])),
			op: Op::Update {
				field_values: BTreeMap::new(),
				value_schema_id: 1,
				update_schema_id: 2,
			},
			write_ts: 20,
			source_region_id: 0,
			source_offset: 1,
			region_count: 1,
		};
		assert_eq!(
			resolve(input).unwrap_err(),
			ResolveError::SchemaIncompatible {
				value_schema_id: 1,
				update_schema_id: 2,
			}
		);
	}

	#[test]
	fn field_map_round_trips() {
		let mut fields = BTreeMap::new();
		fields.insert("x".to_string(), vec![1, 2, 3]);
		fields.insert("y".to_string(), vec![]);
		assert_eq!(decode_fields(&encode_fields(&fields)), fields);
	}
}
