use std::collections::BTreeMap;

use aa_util::Rmd;

/// The incoming operation to resolve against prior state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
	Put {
		value: Vec<u8>,
		value_schema_id: u32,
	},
	Delete,
	/// Partial update: per-field replacement bytes, keyed by field name. The
	/// real write-compute schema evolution machinery is out of scope; this
	/// models the part actually needed, the mapping from
	/// field name to the field's new serialized bytes.
	Update {
		field_values: BTreeMap<String, Vec<u8>>,
		value_schema_id: u32,
		update_schema_id: u32,
	},
}

/// Everything [`crate::resolve`] needs to decide one record. No handle to
/// storage, the cache, or a clock: all of that is resolved by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveInput {
	/// Prior stored value and its schema id, if any.
	pub old_value: Option<(Vec<u8>, u32)>,
	/// Prior stored RMD, if any. Absent is treated as "zero timestamp, zero
	/// offset vector" (decision rule 1).
	pub old_rmd: Option<Rmd>,
	pub op: Op,
	pub write_ts: u64,
	pub source_region_id: u16,
	pub source_offset: u64,
	/// Number of regions in the cluster, used to size a freshly synthesized
	/// zero offset vector when `old_rmd` is absent.
	pub region_count: usize,
}
