/// Sentinel for [`TopicSwitch::rewind_start_timestamp`]: "compute the rewind
/// point from SOP/EOP timestamps and the store's configured rewind window"
/// rather than using a caller-supplied absolute timestamp.
pub const REWIND_TIME_DECIDED_BY_SERVER: i64 = -1;

/// A control message consumed from the version topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
	StartOfPush { timestamp_ms: u64 },
	EndOfPush { timestamp_ms: u64 },
	TopicSwitch(TopicSwitch),
}

/// Instructs a partition's leader to stop consuming `source_topic` and begin
/// consuming a new one, rewinding each source region to a timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSwitch {
	pub source_topic: String,
	pub source_brokers: Vec<String>,
	pub rewind_start_timestamp: i64,
}

impl TopicSwitch {
	pub fn is_server_decided_rewind(&self) -> bool {
		self.rewind_start_timestamp == REWIND_TIME_DECIDED_BY_SERVER
	}
}
