//! Node and store configuration surface, loaded from a toml file.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::time::BufferReplayPolicy;

/// Per-store settings: these vary per store rather than per node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
	#[serde(default = "default_rewind_time_seconds")]
	pub rewind_time_seconds: u64,
	#[serde(default = "default_buffer_replay_policy")]
	pub buffer_replay_policy: BufferReplayPolicy,
	/// When `true`, a poisoned record (e.g. an incompatible write-compute
	/// schema) halts the partition instead of being counted and skipped.
	#[serde(default)]
	pub halt_on_poisoned_record: bool,
}

fn default_rewind_time_seconds() -> u64 {
	60 * 60
}

fn default_buffer_replay_policy() -> BufferReplayPolicy {
	BufferReplayPolicy::RewindFromEop
}

impl Default for StoreConfig {
	fn default() -> Self {
		StoreConfig {
			rewind_time_seconds: default_rewind_time_seconds(),
			buffer_replay_policy: default_buffer_replay_policy(),
			halt_on_poisoned_record: false,
		}
	}
}

/// Node-wide configuration recognized by the A/A ingestion core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	#[serde(default)]
	pub participant_message_store_enabled: bool,

	#[serde(default = "default_server_consumer_pool_size_per_cluster")]
	pub server_consumer_pool_size_per_cluster: usize,

	#[serde(default)]
	pub aa_wc_parallel_processing_enabled: bool,

	#[serde(default = "default_parallel_processing_pool_size")]
	pub aa_wc_parallel_processing_pool_size: usize,

	#[serde(default = "default_consumer_pool_size_for_aa_wc_leader")]
	pub consumer_pool_size_for_aa_wc_leader: usize,

	#[serde(default = "default_offset_lag_threshold_to_go_online")]
	pub offset_lag_threshold_to_go_online: u64,

	/// How long a follower's local VT must sit idle before it is eligible to
	/// flip to leader.
	#[serde(default = "default_leader_inactivity_window_ms")]
	pub leader_inactivity_window_ms: u64,

	/// This node's own broker URL, used to tell whether a topic switch's
	/// source brokers are local or remote when deciding how a newly
	/// promoted leader should resume consumption.
	#[serde(default)]
	pub local_broker_url: String,

	/// Per-store overrides of `rewind_time_seconds` / `buffer_replay_policy`,
	/// keyed by store name.
	#[serde(default)]
	pub stores: BTreeMap<String, StoreConfig>,

	/// `region_id -> region_url`. Injected rather than discovered.
	#[serde(default)]
	pub regions: BTreeMap<u16, String>,

	/// Colo id -> region url and kafka cluster id -> region url. The source
	/// system conflates the two; we keep them as two maps instead of
	/// silently merging them.
	#[serde(default)]
	pub colo_id_to_region_url: BTreeMap<String, String>,
	#[serde(default)]
	pub kafka_cluster_id_to_region_url: BTreeMap<String, String>,
}

fn default_server_consumer_pool_size_per_cluster() -> usize {
	4
}
fn default_parallel_processing_pool_size() -> usize {
	8
}
fn default_consumer_pool_size_for_aa_wc_leader() -> usize {
	4
}
fn default_offset_lag_threshold_to_go_online() -> u64 {
	1_000
}
fn default_leader_inactivity_window_ms() -> u64 {
	30_000
}

impl Default for Config {
	fn default() -> Self {
		Config {
			participant_message_store_enabled: false,
			server_consumer_pool_size_per_cluster: default_server_consumer_pool_size_per_cluster(),
			aa_wc_parallel_processing_enabled: false,
			aa_wc_parallel_processing_pool_size: default_parallel_processing_pool_size(),
			consumer_pool_size_for_aa_wc_leader: default_consumer_pool_size_for_aa_wc_leader(),
			offset_lag_threshold_to_go_online: default_offset_lag_threshold_to_go_online(),
			leader_inactivity_window_ms: default_leader_inactivity_window_ms(),
			local_broker_url: String::new(),
			stores: BTreeMap::new(),
			regions: BTreeMap::new(),
			colo_id_to_region_url: BTreeMap::new(),
			kafka_cluster_id_to_region_url: BTreeMap::new(),
		}
	}
}

impl Config {
	pub fn store_config(&self, store_name: &str) -> StoreConfig {
		self.stores.get(store_name).cloned().unwrap_or_default()
	}
}

/// Reads and parses a node's TOML configuration file, the single entry point
/// the binary calls at startup.
pub fn read_config(path: impl AsRef<Path>) -> Result<Config> {
	let data = std::fs::read_to_string(path)?;
	let config: Config = toml::from_str(&data).map_err(|e| Error::Message(e.to_string()))?;
	Ok(config)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_apply_to_missing_fields() {
		let config: Config = toml::from_str("").unwrap();
		assert_eq!(
			config.server_consumer_pool_size_per_cluster,
			default_server_consumer_pool_size_per_cluster()
		);
		assert!(config.stores.is_empty());
	}

	#[test]
	fn per_store_config_falls_back_to_defaults() {
		let toml_str = r#"
			[stores.my-store]
			rewind_time_seconds = 120
		"#;
		let config: Config = toml::from_str(toml_str).unwrap();
		let store_cfg = config.store_config("my-store");
		assert_eq!(store_cfg.rewind_time_seconds, 120);
		assert_eq!(store_cfg.buffer_replay_policy, BufferReplayPolicy::RewindFromEop);

		let other = config.store_config("unmentioned-store");
		assert_eq!(other.rewind_time_seconds, default_rewind_time_seconds());
	}
}
