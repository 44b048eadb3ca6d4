use std::collections::HashMap;
use std::sync::Arc;

use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, trace, warn};

use aa_block::compression;
use aa_block::ChunkingAdapter;
use aa_lock::KeyLockPool;
use aa_model::{ControlMessage, PartitionConsumptionState, Role, TopicSwitch, TransientRecord};
use aa_resolver::{resolve, MergeResult, Op, ResolveError, ResolveInput};
use aa_rpc::{BrokerClient, BrokerRecord, ProduceOutcome, Producer, PutMetadata};
use aa_storage::StorageEngine;
use aa_util::metrics::IngestMetrics;
use aa_util::rmd::{decode, encode, offset_vector_sum, timestamps};
use aa_util::time::{now_msec, server_decided_rewind_start_ms, BufferReplayPolicy};
use aa_util::{Key, Rmd};

use crate::error::IngestError;
use crate::fanout::{ViewFanout, ViewUpdate};
use crate::repair::{RepairService, RepairTask};

/// Per-store-version tunables for an [`AaIngestTask`].
#[derive(Debug, Clone)]
pub struct IngestTaskConfig {
	pub store_name: String,
	pub region_count: usize,
	pub chunk_size: usize,
	pub compression_level: i32,
	pub rewind_time_ms: u64,
	pub buffer_replay_policy: BufferReplayPolicy,
	/// When `true`, a poisoned record halts the partition; otherwise it is
	/// counted and skipped.
	pub halt_on_poisoned_record: bool,
	/// How long a follower's local VT must sit idle before it is eligible to
	/// flip to leader.
	pub leader_inactivity_window_ms: u64,
	/// This node's own broker URL, compared against a topic switch's source
	/// brokers to decide whether a newly promoted leader resumes locally or
	/// remotely.
	pub local_broker_url: String,
}

/// Owns a store-version's partitions and drives the poll, resolve,
/// persist, produce loop for each. Generic over the three collaborator
/// traits so tests can substitute the in-memory fakes from `aa_rpc::fakes`.
pub struct AaIngestTask<S, B, P>
where
	S: StorageEngine,
	B: BrokerClient,
	P: Producer,
{
	config: IngestTaskConfig,
	chunking: Arc<ChunkingAdapter<S>>,
	locks: Arc<KeyLockPool>,
	broker: Arc<B>,
	producer: Arc<P>,
	fanout: ViewFanout,
	repair: Arc<RepairService<B>>,
	metrics: Arc<IngestMetrics>,
	partitions: Mutex<HashMap<u32, PartitionConsumptionState>>,
}

impl<S, B, P> AaIngestTask<S, B, P>
where
	S: StorageEngine,
	B: BrokerClient,
	P: Producer,
{
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		config: IngestTaskConfig,
		chunking: Arc<ChunkingAdapter<S>>,
		locks: Arc<KeyLockPool>,
		broker: Arc<B>,
		producer: Arc<P>,
		fanout: ViewFanout,
		repair: Arc<RepairService<B>>,
		metrics: Arc<IngestMetrics>,
	) -> Self {
		Self {
			config,
			chunking,
			locks,
			broker,
			producer,
			fanout,
			repair,
			metrics,
			partitions: Mutex::new(HashMap::new()),
		}
	}

	fn ensure_partition(&self, partition: u32, source_topic: &str) {
		self.partitions
			.lock()
			.entry(partition)
			.or_insert_with(|| PartitionConsumptionState::new(partition, source_topic, now_msec()));
	}

	pub fn metrics(&self) -> &Arc<IngestMetrics> {
		&self.metrics
	}

	pub fn repair(&self) -> &Arc<RepairService<B>> {
		&self.repair
	}

	/// Partitions this task currently tracks, for callers that need to drive
	/// per-partition maintenance (leader promotion, repair) from outside.
	pub fn partition_ids(&self) -> Vec<u32> {
		self.partitions.lock().keys().copied().collect()
	}

	/// Flips this partition to leader if its local VT has gone quiet for at
	/// least `leader_inactivity_window_ms`. A newly promoted leader resumes
	/// remotely when the last topic switch it applied points at brokers
	/// other than this node's own.
	pub fn maybe_promote_leader(&self, partition: u32) {
		let now = now_msec();
		let mut partitions = self.partitions.lock();
		let Some(state) = partitions.get_mut(&partition) else {
			return;
		};
		if !state.ready_for_leader_promotion(now, self.config.leader_inactivity_window_ms) {
			return;
		}

		let consume_remotely = state
			.topic_switch()
			.map(|switch| switch.source_brokers.iter().any(|broker| broker != &self.config.local_broker_url))
			.unwrap_or(false);

		state.promote_to_leader(consume_remotely);
		info!(partition, consume_remotely, "promoted to leader after local VT inactivity");
	}

	/// Bounded wait for an in-flight topic switch's deferred-write window to
	/// clear before producing, so a produce call never races a resubscribe.
	async fn wait_for_deferred_write_clear(&self, partition: u32) {
		const MAX_ATTEMPTS: u32 = 50;
		for attempt in 0..MAX_ATTEMPTS {
			let deferred = self
				.partitions
				.lock()
				.get(&partition)
				.map(PartitionConsumptionState::deferred_write)
				.unwrap_or(false);
			if !deferred {
				return;
			}
			if attempt + 1 == MAX_ATTEMPTS {
				warn!(partition, "deferred write still set after bounded wait, producing anyway");
				return;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
	}

	/// Polls the broker once and feeds every returned record through
	/// [`Self::process_record`]. A poisoned record never stops the batch
	/// (it is already metered and skipped inside `process_record`); a
	/// fatal error aborts the batch and is returned to the caller.
	pub async fn poll_and_process(&self, timeout: std::time::Duration) -> Result<usize, IngestError> {
		let records = self.broker.poll(timeout).await?;
		let mut applied = 0;
		for record in records {
			match self.process_record(record).await {
				Ok(true) => applied += 1,
				Ok(false) => {}
				Err(err) => {
					warn!(%err, severity = ?err.severity(), "process_record failed");
					if err.severity().is_fatal() {
						return Err(err);
					}
				}
			}
		}
		Ok(applied)
	}

	/// Processes one control message: `StartOfPush`/`EndOfPush` update
	/// partition bookkeeping; `TopicSwitch` drives the quorum-gated
	/// resubscribe below.
	pub async fn handle_control_message(
		&self,
		partition: u32,
		message: ControlMessage,
		regions: &[(u16, String)],
	) -> Result<(), IngestError> {
		match message {
			ControlMessage::StartOfPush { .. } => {
				self.ensure_partition(partition, &self.config.store_name);
				Ok(())
			}
			ControlMessage::EndOfPush { .. } => {
				self.ensure_partition(partition, &self.config.store_name);
				self.partitions.lock().get_mut(&partition).unwrap().mark_eop_received();
				Ok(())
			}
			ControlMessage::TopicSwitch(switch) => self.handle_topic_switch(partition, switch, regions).await,
		}
	}

	async fn handle_topic_switch(
		&self,
		partition: u32,
		switch: TopicSwitch,
		regions: &[(u16, String)],
	) -> Result<(), IngestError> {
		self.ensure_partition(partition, &self.config.store_name);

		let (was_leader, previous_topic) = {
			let mut partitions = self.partitions.lock();
			let state = partitions.get_mut(&partition).unwrap();
			let was_leader = state.role() == Role::Leader;
			let previous_topic = state.source_topic().to_string();
			state.apply_topic_switch(switch.clone());
			if was_leader {
				// Gate produce calls on this partition until the resubscribe
				// below either lands or aborts, so in-flight writes don't race it.
				state.set_deferred_write(true);
			}
			(was_leader, previous_topic)
		};

		let result = self.handle_topic_switch_resubscribe(partition, &switch, regions, was_leader, &previous_topic).await;

		if was_leader {
			self.partitions.lock().get_mut(&partition).unwrap().set_deferred_write(false);
		}

		result
	}

	async fn handle_topic_switch_resubscribe(
		&self,
		partition: u32,
		switch: &TopicSwitch,
		regions: &[(u16, String)],
		was_leader: bool,
		previous_topic: &str,
	) -> Result<(), IngestError> {
		if was_leader {
			self.broker.unsubscribe(previous_topic, partition).await?;
		}

		// Abort the switch once unreachable regions reach quorum,
		// ceil((R+1)/2), rather than leaving the partition partially rewound.
		let quorum = (regions.len() + 1).div_ceil(2);
		let mut unreachable = 0usize;
		let mut resolved_offsets = Vec::new();

		for (_region_id, region_url) in regions {
			let checkpoint = {
				let partitions = self.partitions.lock();
				partitions.get(&partition).unwrap().leader_offset(region_url)
			};

			if checkpoint >= 0 {
				resolved_offsets.push(checkpoint as u64);
				continue;
			}

			let rewind_ms = if switch.is_server_decided_rewind() {
				server_decided_rewind_start_ms(self.config.buffer_replay_policy, None, None, self.config.rewind_time_ms)
			} else {
				switch.rewind_start_timestamp.max(0) as u64
			};

			match self.broker.offsets_for_times(&switch.source_topic, partition, rewind_ms).await {
				Ok(offset) => resolved_offsets.push(offset.unwrap_or(0)),
				Err(_) => {
					unreachable += 1;
					self.repair.enqueue(RepairTask {
						partition,
						topic: switch.source_topic.clone(),
						region_url: region_url.clone(),
						rewind_start_ts_ms: rewind_ms,
					});
				}
			}
		}

		if unreachable >= quorum {
			self.metrics.inc_topic_switch_aborted();
			return Err(IngestError::TopicSwitchAborted { unreachable, quorum });
		}

		// The leader consumes one upstream log per region id, but resubscribes
		// to the new topic from the earliest resolved offset so no reachable
		// region's records are skipped.
		if let Some(&start_offset) = resolved_offsets.iter().min() {
			self.broker
				.subscribe(&switch.source_topic, partition, start_offset as i64)
				.await?;
		}

		Ok(())
	}

	/// Processes one record. Returns `true` if it was Applied,
	/// `false` if Ignored.
	#[tracing::instrument(skip_all, fields(store_version = %self.config.store_name, partition = record.partition))]
	pub async fn process_record(&self, record: BrokerRecord) -> Result<bool, IngestError> {
		self.ensure_partition(record.partition, &record.topic);

		if matches!(record.topic_kind, aa_rpc::RecordTopicKind::VersionTopic) {
			self.chunking.put_value_only(record.partition, &record.key, &record.value)?;
			let mut partitions = self.partitions.lock();
			partitions.get_mut(&record.partition).unwrap().note_vt_activity(now_msec());
			return Ok(true);
		}

		let key = Key::from(record.key.as_slice());
		let _lock = self.locks.acquire(&key);

		let write_ts = if record.logical_timestamp < 0 {
			warn!(key = %key, "non-ideal fallback: logical_timestamp < 0, using broker timestamp");
			self.metrics.inc_negative_ts_fallback();
			record.broker_timestamp_ms
		} else {
			record.logical_timestamp as u64
		};

		let (old_value, old_rmd) = self.load_old_state(record.partition, &key)?;
		let (prior_value, prior_schema_id) = match &old_value {
			Some((bytes, schema_id)) => (Some(bytes.clone()), Some(*schema_id)),
			None => (None, None),
		};
		let prior_rmd_for_regression_check = old_rmd.clone();

		let op = match &record.partial_update {
			Some(update) => Op::Update {
				field_values: update.field_values.clone(),
				value_schema_id: record.value_schema_id,
				update_schema_id: update.update_schema_id,
			},
			None if record.value.is_empty() => Op::Delete,
			None => Op::Put {
				value: record.value.clone(),
				value_schema_id: record.value_schema_id,
			},
		};

		let input = ResolveInput {
			old_value,
			old_rmd,
			op,
			write_ts,
			source_region_id: record.source_region.0,
			source_offset: record.offset,
			region_count: self.config.region_count,
		};

		let decision = match resolve(input) {
			Ok(decision) => decision,
			Err(ResolveError::SchemaIncompatible {
				value_schema_id,
				update_schema_id,
			}) => {
				self.metrics.inc_poisoned();
				warn!(
					key = %key, value_schema_id, update_schema_id,
					"poisoned record: incompatible write-compute schema"
				);
				if self.config.halt_on_poisoned_record {
					return Err(IngestError::Resolve(ResolveError::SchemaIncompatible {
						value_schema_id,
						update_schema_id,
					}));
				}
				return Ok(false);
			}
		};

		let MergeResult::Applied {
			new_value,
			new_rmd,
			new_value_schema_id,
			..
		} = decision
		else {
			self.metrics.inc_ignored();
			trace!(key = %key, "ignored");
			return Ok(false);
		};

		check_offset_regression(&prior_rmd_for_regression_check, &new_rmd)?;
		check_timestamp_regression(&prior_rmd_for_regression_check, &new_rmd)?;

		let compressed_value = match &new_value {
			Some(value) => Some(compression::compress(value, self.config.compression_level)?),
			None => None,
		};

		let rmd_bytes = encode(new_value_schema_id, &new_rmd);

		self.store_applied(
			record.partition,
			&key,
			compressed_value.as_deref(),
			new_value_schema_id,
			&rmd_bytes,
			&new_rmd,
		)?;

		{
			let mut partitions = self.partitions.lock();
			let state = partitions.get_mut(&record.partition).unwrap();
			state.update_latest_processed_upstream_rt_offset(&record.source_region.to_string(), record.offset as i64);
		}

		let fanout_handle = self.fanout.spawn_fanout(ViewUpdate {
			key: key.as_bytes().to_vec(),
			new_value: compressed_value.clone(),
			old_value: prior_value,
			new_schema_id: new_value_schema_id,
			old_schema_id: prior_schema_id,
			new_rmd: new_rmd.clone(),
		});

		drop(_lock);

		fanout_handle
			.await
			.map_err(|err| IngestError::Fanout(err.to_string()))?
			.map_err(|err| IngestError::Fanout(err.to_string()))?;

		let put_metadata = PutMetadata {
			rmd_schema_id: new_rmd.rmd_schema_id,
			rmd_bytes,
		};

		self.wait_for_deferred_write_clear(record.partition).await;

		let outcome: ProduceOutcome = match &compressed_value {
			Some(value) => {
				self.producer
					.put(key.as_bytes(), value, new_value_schema_id, write_ts as i64, put_metadata, None, None)
					.await?
			}
			None => {
				self.producer
					.delete(key.as_bytes(), write_ts as i64, put_metadata, None, None)
					.await?
			}
		};

		{
			let mut partitions = self.partitions.lock();
			let state = partitions.get_mut(&record.partition).unwrap();
			state.set_local_vt_offset(outcome.offset as i64);
			state.evict_transient_up_to(outcome.offset);
		}

		self.metrics.inc_applied();
		trace!(key = %key, vt_offset = outcome.offset, "applied");
		Ok(true)
	}

	fn load_old_state(&self, partition: u32, key: &Key) -> Result<(Option<(Vec<u8>, u32)>, Option<Rmd>), IngestError> {
		if let Some(cached) = self.partitions.lock().get(&partition).and_then(|state| state.get_transient_record(key)) {
			self.metrics.inc_cache_hit();
			return Ok((
				cached.value.clone().map(|v| (v, cached.schema_id)),
				Some(cached.rmd.clone()),
			));
		}

		self.metrics.inc_cache_miss();
		let value = self.chunking.get_value(partition, key.as_bytes())?;
		let decoded = self.chunking.get_rmd(partition, key.as_bytes())?.map(|bytes| decode(&bytes)).transpose()?;

		let old_value = match (value, &decoded) {
			(Some(bytes), Some((value_schema_id, _))) => Some((bytes, *value_schema_id)),
			(Some(bytes), None) => Some((bytes, 0)),
			(None, _) => None,
		};
		Ok((old_value, decoded.map(|(_, rmd)| rmd)))
	}

	#[allow(clippy::too_many_arguments)]
	fn store_applied(
		&self,
		partition: u32,
		key: &Key,
		new_value: Option<&[u8]>,
		new_value_schema_id: u32,
		rmd_bytes: &[u8],
		new_rmd: &Rmd,
	) -> Result<(), IngestError> {
		match new_value {
			Some(value) if value.len() > self.config.chunk_size => {
				self.chunking
					.write_chunked_value(partition, key.as_bytes(), value, rmd_bytes, self.config.chunk_size)?;
			}
			Some(value) => {
				self.chunking.put_value_and_rmd(partition, key.as_bytes(), value, rmd_bytes)?;
			}
			None => {
				self.chunking.delete(partition, key.as_bytes(), rmd_bytes)?;
			}
		}

		{
			let mut partitions = self.partitions.lock();
			let state = partitions.get_mut(&partition).unwrap();
			state.set_transient_record(
				key.clone(),
				TransientRecord {
					value: new_value.map(<[u8]>::to_vec),
					value_offset: 0,
					value_len: new_value.map_or(0, |v| v.len() as u64),
					schema_id: new_value_schema_id,
					rmd: new_rmd.clone(),
					value_manifest: None,
					rmd_manifest: None,
					produced_position: now_msec(),
				},
			);
		}
		Ok(())
	}
}

/// Defense-in-depth check: `resolve` already guarantees the offset vector
/// sum never drops, so this should never trip in practice, but a schema
/// bug upstream of `resolve` should fail the partition rather than
/// silently corrupt replication metadata.
fn check_offset_regression(prior: &Option<Rmd>, new_rmd: &Rmd) -> Result<(), IngestError> {
	let prior_sum = prior.as_ref().map(offset_vector_sum).unwrap_or(0);
	if offset_vector_sum(new_rmd) < prior_sum {
		return Err(IngestError::OffsetRegression);
	}
	Ok(())
}

fn check_timestamp_regression(prior: &Option<Rmd>, new_rmd: &Rmd) -> Result<(), IngestError> {
	let prior_max = prior.as_ref().map(|rmd| timestamps(rmd).into_iter().max().unwrap_or(0)).unwrap_or(0);
	let new_max = timestamps(new_rmd).into_iter().max().unwrap_or(0);
	if new_max < prior_max {
		return Err(IngestError::TimestampRegression);
	}
	Ok(())
}
