//! Every decision path increments a labelled counter. A minimal
//! in-process counter set, deliberately not wired to an external exporter
//! (Prometheus/OpenTelemetry client libraries are an observability-surface
//! concern this crate leaves to the embedder).

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct IngestMetrics {
	pub applied: AtomicU64,
	pub ignored: AtomicU64,
	pub poisoned: AtomicU64,
	pub cache_hit: AtomicU64,
	pub cache_miss: AtomicU64,
	pub negative_ts_fallback: AtomicU64,
	pub topic_switch_aborted: AtomicU64,
	pub repair_enqueued: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestMetricsSnapshot {
	pub applied: u64,
	pub ignored: u64,
	pub poisoned: u64,
	pub cache_hit: u64,
	pub cache_miss: u64,
	pub negative_ts_fallback: u64,
	pub topic_switch_aborted: u64,
	pub repair_enqueued: u64,
}

impl IngestMetrics {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn snapshot(&self) -> IngestMetricsSnapshot {
		IngestMetricsSnapshot {
			applied: self.applied.load(Ordering::Relaxed),
			ignored: self.ignored.load(Ordering::Relaxed),
			poisoned: self.poisoned.load(Ordering::Relaxed),
			cache_hit: self.cache_hit.load(Ordering::Relaxed),
			cache_miss: self.cache_miss.load(Ordering::Relaxed),
			negative_ts_fallback: self.negative_ts_fallback.load(Ordering::Relaxed),
			topic_switch_aborted: self.topic_switch_aborted.load(Ordering::Relaxed),
			repair_enqueued: self.repair_enqueued.load(Ordering::Relaxed),
		}
	}

	pub fn inc_applied(&self) {
		self.applied.fetch_add(1, Ordering::Relaxed);
	}
	pub fn inc_ignored(&self) {
		self.ignored.fetch_add(1, Ordering::Relaxed);
	}
	pub fn inc_poisoned(&self) {
		self.poisoned.fetch_add(1, Ordering::Relaxed);
	}
	pub fn inc_cache_hit(&self) {
		self.cache_hit.fetch_add(1, Ordering::Relaxed);
	}
	pub fn inc_cache_miss(&self) {
		self.cache_miss.fetch_add(1, Ordering::Relaxed);
	}
	pub fn inc_negative_ts_fallback(&self) {
		self.negative_ts_fallback.fetch_add(1, Ordering::Relaxed);
	}
	pub fn inc_topic_switch_aborted(&self) {
		self.topic_switch_aborted.fetch_add(1, Ordering::Relaxed);
	}
	pub fn inc_repair_enqueued(&self) {
		self.repair_enqueued.fetch_add(1, Ordering::Relaxed);
	}
}
