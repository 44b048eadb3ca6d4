//! In-memory fakes of the broker and producer collaborator traits, used by
//! the ingestion task's test suite instead of a real broker/producer.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use aa_block::ChunkedValueManifest;

use crate::broker::{BrokerClient, BrokerRecord};
use crate::error::RpcError;
use crate::producer::{ProduceOutcome, Producer, PutMetadata};

type TopicPartition = (String, u32);

#[derive(Default)]
struct FakeBrokerState {
	records: HashMap<TopicPartition, VecDeque<BrokerRecord>>,
	subscriptions: HashSet<TopicPartition>,
	offsets_for_times: HashMap<(String, u32, u64), Option<u64>>,
	end_offsets: HashMap<TopicPartition, u64>,
	unreachable: HashSet<TopicPartition>,
}

/// A broker double: records are pre-seeded per `(topic, partition)` and
/// handed out in order on `poll`. `offsets_for_times` results and
/// reachability are configured per call site to exercise the topic-switch
/// quorum logic.
#[derive(Default)]
pub struct FakeBrokerClient {
	state: Mutex<FakeBrokerState>,
}

impl FakeBrokerClient {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn seed_records(&self, topic: &str, partition: u32, records: Vec<BrokerRecord>) {
		self.state
			.lock()
			.records
			.entry((topic.to_string(), partition))
			.or_default()
			.extend(records);
	}

	pub fn set_offset_for_time(&self, topic: &str, partition: u32, timestamp_ms: u64, offset: Option<u64>) {
		self.state
			.lock()
			.offsets_for_times
			.insert((topic.to_string(), partition, timestamp_ms), offset);
	}

	pub fn set_end_offset(&self, topic: &str, partition: u32, offset: u64) {
		self.state
			.lock()
			.end_offsets
			.insert((topic.to_string(), partition), offset);
	}

	pub fn mark_unreachable(&self, topic: &str, partition: u32) {
		self.state.lock().unreachable.insert((topic.to_string(), partition));
	}

	pub fn is_subscribed(&self, topic: &str, partition: u32) -> bool {
		self.state
			.lock()
			.subscriptions
			.contains(&(topic.to_string(), partition))
	}
}

#[async_trait]
impl BrokerClient for FakeBrokerClient {
	async fn subscribe(&self, topic: &str, partition: u32, _offset: i64) -> Result<(), RpcError> {
		let key = (topic.to_string(), partition);
		let mut state = self.state.lock();
		if state.unreachable.contains(&key) {
			return Err(RpcError::Unreachable);
		}
		state.subscriptions.insert(key);
		Ok(())
	}

	async fn unsubscribe(&self, topic: &str, partition: u32) -> Result<(), RpcError> {
		self.state.lock().subscriptions.remove(&(topic.to_string(), partition));
		Ok(())
	}

	async fn poll(&self, _timeout: Duration) -> Result<Vec<BrokerRecord>, RpcError> {
		let mut state = self.state.lock();
		let mut out = Vec::new();
		for queue in state.records.values_mut() {
			out.extend(queue.drain(..));
		}
		Ok(out)
	}

	async fn offsets_for_times(
		&self,
		topic: &str,
		partition: u32,
		timestamp_ms: u64,
	) -> Result<Option<u64>, RpcError> {
		let key_tp = (topic.to_string(), partition);
		let state = self.state.lock();
		if state.unreachable.contains(&key_tp) {
			return Err(RpcError::Unreachable);
		}
		Ok(state
			.offsets_for_times
			.get(&(topic.to_string(), partition, timestamp_ms))
			.copied()
			.flatten())
	}

	async fn end_offset(&self, topic: &str, partition: u32) -> Result<u64, RpcError> {
		let key = (topic.to_string(), partition);
		let state = self.state.lock();
		if state.unreachable.contains(&key) {
			return Err(RpcError::Unreachable);
		}
		Ok(state.end_offsets.get(&key).copied().unwrap_or(0))
	}
}

/// One call recorded by [`FakeProducer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducedOp {
	Put {
		key: Vec<u8>,
		value: Vec<u8>,
		schema_id: u32,
	},
	Delete {
		key: Vec<u8>,
	},
}

/// A producer double that assigns increasing offsets and records every call
/// so tests can assert on produce order and content.
#[derive(Default)]
pub struct FakeProducer {
	next_offset: AtomicU64,
	produced: Mutex<Vec<ProducedOp>>,
}

impl FakeProducer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn produced(&self) -> Vec<ProducedOp> {
		self.produced.lock().clone()
	}
}

#[async_trait]
impl Producer for FakeProducer {
	async fn put(
		&self,
		key: &[u8],
		value: &[u8],
		schema_id: u32,
		_logical_ts: i64,
		_put_metadata: PutMetadata,
		_old_value_manifest: Option<ChunkedValueManifest>,
		_old_rmd_manifest: Option<ChunkedValueManifest>,
	) -> Result<ProduceOutcome, RpcError> {
		self.produced.lock().push(ProducedOp::Put {
			key: key.to_vec(),
			value: value.to_vec(),
			schema_id,
		});
		Ok(ProduceOutcome {
			offset: self.next_offset.fetch_add(1, Ordering::SeqCst),
		})
	}

	async fn delete(
		&self,
		key: &[u8],
		_logical_ts: i64,
		_put_metadata: PutMetadata,
		_old_value_manifest: Option<ChunkedValueManifest>,
		_old_rmd_manifest: Option<ChunkedValueManifest>,
	) -> Result<ProduceOutcome, RpcError> {
		self.produced.lock().push(ProducedOp::Delete { key: key.to_vec() });
		Ok(ProduceOutcome {
			offset: self.next_offset.fetch_add(1, Ordering::SeqCst),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::broker::RecordTopicKind;
	use aa_util::Region;

	fn record(offset: u64) -> BrokerRecord {
		BrokerRecord {
			topic: "store_v1_rt".into(),
			topic_kind: RecordTopicKind::RealTime,
			partition: 0,
			offset,
			key: b"k".to_vec(),
			value: b"v".to_vec(),
			value_schema_id: 1,
			logical_timestamp: 100,
			broker_timestamp_ms: 100,
			source_region: Region(0),
			partial_update: None,
		}
	}

	#[tokio::test]
	async fn poll_drains_seeded_records() {
		let broker = FakeBrokerClient::new();
		broker.seed_records("store_v1_rt", 0, vec![record(0), record(1)]);

		let batch = broker.poll(Duration::from_millis(10)).await.unwrap();
		assert_eq!(batch.len(), 2);
		assert!(broker.poll(Duration::from_millis(10)).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn unreachable_topic_partition_errors_on_subscribe() {
		let broker = FakeBrokerClient::new();
		broker.mark_unreachable("store_v1_rt", 0);
		assert!(matches!(
			broker.subscribe("store_v1_rt", 0, -1).await,
			Err(RpcError::Unreachable)
		));
	}

	#[tokio::test]
	async fn producer_assigns_increasing_offsets_and_records_calls() {
		let producer = FakeProducer::new();
		let first = producer
			.put(b"k", b"v1", 1, 100, PutMetadata { rmd_schema_id: 1, rmd_bytes: vec![] }, None, None)
			.await
			.unwrap();
		let second = producer
			.delete(b"k", 200, PutMetadata { rmd_schema_id: 1, rmd_bytes: vec![] }, None, None)
			.await
			.unwrap();

		assert_eq!(second.offset, first.offset + 1);
		assert_eq!(producer.produced().len(), 2);
	}
}
