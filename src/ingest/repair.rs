use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tracing::{error, warn};

use aa_rpc::BrokerClient;
use aa_util::metrics::IngestMetrics;

/// One retryable rewind-resubscribe task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairTask {
	pub partition: u32,
	pub topic: String,
	pub region_url: String,
	pub rewind_start_ts_ms: u64,
}

/// A successfully repaired task: the offset the region should resume from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
	pub partition: u32,
	pub region_url: String,
	pub resolved_offset: u64,
}

/// Background retry queue for partitions whose topic switch could not
/// immediately resolve a region's rewind offset. Persistent failures
/// after `max_attempts` escalate to a logged per-region alarm; a real
/// deployment would externalize this to paging.
pub struct RepairService<B: BrokerClient> {
	broker: Arc<B>,
	metrics: Arc<IngestMetrics>,
	queue: Mutex<VecDeque<RepairTask>>,
	max_attempts: u32,
	base_backoff: Duration,
}

impl<B: BrokerClient> RepairService<B> {
	pub fn new(broker: Arc<B>, metrics: Arc<IngestMetrics>, max_attempts: u32, base_backoff: Duration) -> Self {
		Self {
			broker,
			metrics,
			queue: Mutex::new(VecDeque::new()),
			max_attempts,
			base_backoff,
		}
	}

	pub fn enqueue(&self, task: RepairTask) {
		self.metrics.inc_repair_enqueued();
		self.queue.lock().push_back(task);
	}

	pub fn pending(&self) -> usize {
		self.queue.lock().len()
	}

	/// Drains and retries every task currently queued, resubscribing on
	/// success. Returns the outcomes for tasks that succeeded; tasks that
	/// exhaust `max_attempts` are dropped after an error-level log.
	pub async fn run_once(&self) -> Vec<RepairOutcome> {
		let tasks: Vec<_> = { self.queue.lock().drain(..).collect() };
		let mut outcomes = Vec::with_capacity(tasks.len());
		for task in tasks {
			if let Some(outcome) = self.retry_task(&task).await {
				outcomes.push(outcome);
			}
		}
		outcomes
	}

	async fn retry_task(&self, task: &RepairTask) -> Option<RepairOutcome> {
		for attempt in 0..self.max_attempts {
			if attempt > 0 {
				tokio::time::sleep(self.jittered_backoff(attempt)).await;
			}
			match self
				.broker
				.offsets_for_times(&task.topic, task.partition, task.rewind_start_ts_ms)
				.await
			{
				Ok(Some(offset)) => {
					if let Err(err) = self.broker.subscribe(&task.topic, task.partition, offset as i64).await {
						warn!(partition = task.partition, region = %task.region_url, %err, "repair resubscribe failed, will retry");
						continue;
					}
					return Some(RepairOutcome {
						partition: task.partition,
						region_url: task.region_url.clone(),
						resolved_offset: offset,
					});
				}
				Ok(None) => {
					warn!(partition = task.partition, region = %task.region_url, "no offset resolves for repair timestamp, retrying");
				}
				Err(err) => {
					warn!(partition = task.partition, region = %task.region_url, %err, "repair attempt failed, will retry");
				}
			}
		}
		error!(
			partition = task.partition,
			region = %task.region_url,
			attempts = self.max_attempts,
			"repair exhausted retries, region health alarm raised"
		);
		None
	}

	fn jittered_backoff(&self, attempt: u32) -> Duration {
		let base = self.base_backoff.saturating_mul(attempt);
		let jitter_ms = rand::rng().random_range(0..=25u64);
		base + Duration::from_millis(jitter_ms)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use aa_rpc::fakes::FakeBrokerClient;

	fn metrics() -> Arc<IngestMetrics> {
		Arc::new(IngestMetrics::new())
	}

	#[tokio::test]
	async fn successful_repair_resubscribes_and_reports_offset() {
		let broker = Arc::new(FakeBrokerClient::new());
		broker.set_offset_for_time("store_v2_rt", 0, 1_000, Some(42));
		let service = RepairService::new(broker.clone(), metrics(), 3, Duration::from_millis(1));

		service.enqueue(RepairTask {
			partition: 0,
			topic: "store_v2_rt".into(),
			region_url: "region-1".into(),
			rewind_start_ts_ms: 1_000,
		});

		let outcomes = service.run_once().await;
		assert_eq!(outcomes.len(), 1);
		assert_eq!(outcomes[0].resolved_offset, 42);
		assert!(broker.is_subscribed("store_v2_rt", 0));
	}

	#[tokio::test]
	async fn persistent_unreachable_region_exhausts_retries() {
		let broker = Arc::new(FakeBrokerClient::new());
		broker.mark_unreachable("store_v2_rt", 0);
		let service = RepairService::new(broker.clone(), metrics(), 2, Duration::from_millis(1));

		service.enqueue(RepairTask {
			partition: 0,
			topic: "store_v2_rt".into(),
			region_url: "region-1".into(),
			rewind_start_ts_ms: 1_000,
		});

		let outcomes = service.run_once().await;
		assert!(outcomes.is_empty());
		assert_eq!(service.pending(), 0);
	}

	#[tokio::test]
	async fn enqueue_increments_metric() {
		let broker = Arc::new(FakeBrokerClient::new());
		let metrics = metrics();
		let service = RepairService::new(broker, metrics.clone(), 1, Duration::from_millis(1));
		service.enqueue(RepairTask {
			partition: 0,
			topic: "t".into(),
			region_url: "region-0".into(),
			rewind_start_ts_ms: 0,
		});
		assert_eq!(metrics.snapshot().repair_enqueued, 1);
	}
}
