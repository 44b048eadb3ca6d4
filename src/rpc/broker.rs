use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use aa_util::Region;

use crate::error::RpcError;

/// Distinguishes a real-time record from a version-topic (VT) record: VT
/// records already represent resolved state and bypass conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTopicKind {
	RealTime,
	VersionTopic,
}

/// A write-compute partial update: per-field replacement bytes plus the
/// schema id the update itself was serialized under. Carried separately
/// from `BrokerRecord::value` because a partial update has no single
/// whole-record payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialUpdate {
	pub field_values: BTreeMap<String, Vec<u8>>,
	pub update_schema_id: u32,
}

/// A single record delivered by [`BrokerClient::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerRecord {
	pub topic: String,
	pub topic_kind: RecordTopicKind,
	pub partition: u32,
	pub offset: u64,
	pub key: Vec<u8>,
	pub value: Vec<u8>,
	pub value_schema_id: u32,
	/// The application-assigned logical timestamp. May be negative; callers
	/// fall back to `broker_timestamp_ms` when so.
	pub logical_timestamp: i64,
	pub broker_timestamp_ms: u64,
	pub source_region: Region,
	/// `Some` when this record is a partial field update rather than a
	/// whole-record Put/Delete. `value`/`value_schema_id` still carry the
	/// update's own encoded payload and schema id when present.
	pub partial_update: Option<PartialUpdate>,
}

/// The partitioned log client collaborator: subscription state, polling,
/// and timestamp-to-offset resolution, never the wire protocol.
#[async_trait]
pub trait BrokerClient: Send + Sync {
	async fn subscribe(&self, topic: &str, partition: u32, offset: i64) -> Result<(), RpcError>;

	async fn unsubscribe(&self, topic: &str, partition: u32) -> Result<(), RpcError>;

	async fn poll(&self, timeout: Duration) -> Result<Vec<BrokerRecord>, RpcError>;

	/// Resolves a timestamp to the first offset at or after it, or `None` if
	/// no such offset exists (e.g. the timestamp is in the future).
	async fn offsets_for_times(
		&self,
		topic: &str,
		partition: u32,
		timestamp_ms: u64,
	) -> Result<Option<u64>, RpcError>;

	async fn end_offset(&self, topic: &str, partition: u32) -> Result<u64, RpcError>;
}
