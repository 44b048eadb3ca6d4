use std::collections::HashMap;

use tracing::warn;

use crate::control::TopicSwitch;
use crate::transient::{TransientCache, TransientRecord};
use aa_util::Key;

/// Sentinel for "offset not yet known". Offsets are `i64` rather than
/// `u64` specifically to carry this sentinel.
pub const OFFSET_NOT_YET_KNOWN: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
	Leader,
	Follower,
}

/// Per-partition mutable state, owned and mutated exclusively by
/// the A/A Ingestion Task thread driving this partition.
pub struct PartitionConsumptionState {
	partition_id: u32,
	role: Role,
	source_topic: String,
	topic_switch: Option<TopicSwitch>,
	per_region_upstream_offset: HashMap<String, i64>,
	per_region_consumed_offset: HashMap<String, i64>,
	local_vt_offset: i64,
	eop_received: bool,
	deferred_write: bool,
	consume_remotely: bool,
	last_vt_activity_ms: u64,
	transient_cache: TransientCache,
}

impl PartitionConsumptionState {
	/// `now_ms` seeds the inactivity timer leader promotion watches; passed
	/// in rather than read from the wall clock so this struct stays a plain,
	/// deterministically testable state machine.
	pub fn new(partition_id: u32, source_topic: impl Into<String>, now_ms: u64) -> Self {
		Self {
			partition_id,
			role: Role::Follower,
			source_topic: source_topic.into(),
			topic_switch: None,
			per_region_upstream_offset: HashMap::new(),
			per_region_consumed_offset: HashMap::new(),
			local_vt_offset: OFFSET_NOT_YET_KNOWN,
			eop_received: false,
			deferred_write: false,
			consume_remotely: false,
			last_vt_activity_ms: now_ms,
			transient_cache: TransientCache::new(),
		}
	}

	pub fn partition_id(&self) -> u32 {
		self.partition_id
	}

	pub fn role(&self) -> Role {
		self.role
	}

	pub fn set_role(&mut self, role: Role) {
		self.role = role;
	}

	pub fn source_topic(&self) -> &str {
		&self.source_topic
	}

	pub fn topic_switch(&self) -> Option<&TopicSwitch> {
		self.topic_switch.as_ref()
	}

	pub fn apply_topic_switch(&mut self, switch: TopicSwitch) {
		self.source_topic = switch.source_topic.clone();
		self.topic_switch = Some(switch);
	}

	/// The highest upstream real-time offset known to have been produced by
	/// `region`, or [`OFFSET_NOT_YET_KNOWN`] if none has been observed.
	pub fn leader_offset(&self, region: &str) -> i64 {
		self.per_region_upstream_offset
			.get(region)
			.copied()
			.unwrap_or(OFFSET_NOT_YET_KNOWN)
	}

	/// Records the latest upstream offset observed from `region`. This
	/// should never regress between checkpoints; a regression is logged and
	/// the smaller value is ignored rather than silently corrupting
	/// consumption state.
	pub fn update_latest_processed_upstream_rt_offset(&mut self, region: &str, offset: i64) {
		let current = self.leader_offset(region);
		if offset < current {
			warn!(
				partition = self.partition_id,
				region, current, offset, "ignoring upstream offset regression"
			);
			return;
		}
		self.per_region_upstream_offset.insert(region.to_string(), offset);
	}

	pub fn leader_consumed_offset(&self, region: &str) -> i64 {
		self.per_region_consumed_offset
			.get(region)
			.copied()
			.unwrap_or(OFFSET_NOT_YET_KNOWN)
	}

	pub fn update_leader_consumed_upstream_rt_offset(&mut self, region: &str, offset: i64) {
		let current = self.leader_consumed_offset(region);
		if offset < current {
			warn!(
				partition = self.partition_id,
				region, current, offset, "ignoring consumed offset regression"
			);
			return;
		}
		self.per_region_consumed_offset.insert(region.to_string(), offset);
	}

	pub fn local_vt_offset(&self) -> i64 {
		self.local_vt_offset
	}

	pub fn set_local_vt_offset(&mut self, offset: i64) {
		self.local_vt_offset = offset;
	}

	pub fn eop_received(&self) -> bool {
		self.eop_received
	}

	pub fn mark_eop_received(&mut self) {
		self.eop_received = true;
	}

	pub fn deferred_write(&self) -> bool {
		self.deferred_write
	}

	pub fn set_deferred_write(&mut self, deferred: bool) {
		self.deferred_write = deferred;
	}

	pub fn consume_remotely(&self) -> bool {
		self.consume_remotely
	}

	/// Records that a record was just consumed off the local VT, resetting
	/// the inactivity timer leader promotion watches.
	pub fn note_vt_activity(&mut self, now_ms: u64) {
		self.last_vt_activity_ms = now_ms;
	}

	/// True once a follower's local VT has gone quiet for at least
	/// `inactivity_window_ms`: no candidate is actively leading this
	/// partition, so this replica may flip to leader.
	pub fn ready_for_leader_promotion(&self, now_ms: u64, inactivity_window_ms: u64) -> bool {
		self.role == Role::Follower && now_ms.saturating_sub(self.last_vt_activity_ms) >= inactivity_window_ms
	}

	/// Flips this partition to leader. `consume_remotely` is set when the
	/// last known topic switch points at brokers other than this node's own,
	/// so the new leader resumes from checkpointed upstream offsets instead
	/// of the (now-quiet) local VT.
	pub fn promote_to_leader(&mut self, consume_remotely: bool) {
		self.role = Role::Leader;
		self.consume_remotely = consume_remotely;
	}

	pub fn get_transient_record(&self, key: &Key) -> Option<&TransientRecord> {
		self.transient_cache.get(key)
	}

	pub fn set_transient_record(&mut self, key: Key, record: TransientRecord) {
		self.transient_cache.put(key, record);
	}

	pub fn evict_transient_up_to(&mut self, position: u64) {
		self.transient_cache.evict_up_to(position);
	}
}
