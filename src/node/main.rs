//! Binary entry point: loads configuration, wires collaborators for
//! each configured store and drives their ingestion tasks until shutdown.
//!
//! No real broker or storage backend ships with this crate; the binary
//! wires `aa_storage::MemoryStorageEngine` and
//! `aa_rpc::fakes::{FakeBrokerClient, FakeProducer}` so the ingestion loop
//! itself is exercisable end to end without external dependencies.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use aa_block::ChunkingAdapter;
use aa_ingest::{AaIngestTask, IngestTaskConfig, RepairService, ViewFanout};
use aa_lock::KeyLockPool;
use aa_rpc::fakes::{FakeBrokerClient, FakeProducer};
use aa_storage::MemoryStorageEngine;
use aa_util::config::{read_config, Config};
use aa_util::metrics::IngestMetrics;

#[derive(Debug, Parser)]
#[command(name = "aa_node", about = "A/A ingestion engine node")]
struct Opt {
	/// Path to the node's TOML configuration file.
	#[arg(long, env = "AA_NODE_CONFIG")]
	config_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.init();

	let opt = Opt::parse();
	run_node(opt.config_file).await?;
	Ok(())
}

async fn run_node(config_file: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
	info!("loading configuration from {}", config_file.display());
	let config = read_config(config_file)?;

	let watch_cancel = watch_shutdown_signal();
	let metrics = Arc::new(IngestMetrics::new());

	let mut store_loops = Vec::new();
	for store_name in config.stores.keys() {
		let task = build_task(&config, store_name, metrics.clone());
		let cancel = watch_cancel.clone();
		let store_name = store_name.clone();
		store_loops.push(tokio::spawn(async move {
			run_store_loop(store_name, task, cancel).await;
		}));
	}

	if store_loops.is_empty() {
		info!("no stores configured, nothing to ingest; waiting for shutdown");
	}

	wait_for_shutdown(watch_cancel).await;

	for handle in store_loops {
		if let Err(err) = handle.await {
			error!(%err, "store ingestion loop panicked");
		}
	}

	let snapshot = metrics.snapshot();
	info!(
		applied = snapshot.applied,
		ignored = snapshot.ignored,
		poisoned = snapshot.poisoned,
		"shutdown complete"
	);

	Ok(())
}

fn build_task(
	config: &Config,
	store_name: &str,
	metrics: Arc<IngestMetrics>,
) -> Arc<AaIngestTask<MemoryStorageEngine, FakeBrokerClient, FakeProducer>> {
	let store_config = config.store_config(store_name);
	let chunking = Arc::new(ChunkingAdapter::new(Arc::new(MemoryStorageEngine::new())));
	let locks = Arc::new(KeyLockPool::sized_for(
		/* partition_count */ 8,
		config.consumer_pool_size_for_aa_wc_leader,
		config.regions.len().max(1),
		config.aa_wc_parallel_processing_pool_size,
	));
	let broker = Arc::new(FakeBrokerClient::new());
	let producer = Arc::new(FakeProducer::new());
	let repair = Arc::new(RepairService::new(broker.clone(), metrics.clone(), 5, Duration::from_millis(100)));

	Arc::new(AaIngestTask::new(
		IngestTaskConfig {
			store_name: store_name.to_string(),
			region_count: config.regions.len().max(1),
			chunk_size: 1024 * 1024,
			compression_level: 3,
			rewind_time_ms: store_config.rewind_time_seconds * 1000,
			buffer_replay_policy: store_config.buffer_replay_policy,
			halt_on_poisoned_record: store_config.halt_on_poisoned_record,
			leader_inactivity_window_ms: config.leader_inactivity_window_ms,
			local_broker_url: config.local_broker_url.clone(),
		},
		chunking,
		locks,
		broker,
		producer,
		ViewFanout::default(),
		repair,
		metrics,
	))
}

async fn run_store_loop(
	store_name: String,
	task: Arc<AaIngestTask<MemoryStorageEngine, FakeBrokerClient, FakeProducer>>,
	mut cancel: watch::Receiver<bool>,
) {
	info!(store = %store_name, "ingestion loop starting");
	let poll_timeout = Duration::from_millis(200);
	let mut ticks_since_repair = 0u32;
	const REPAIR_EVERY_N_TICKS: u32 = 25; // ~5s at a 200ms poll timeout

	loop {
		let mut idle = false;
		tokio::select! {
			result = task.poll_and_process(poll_timeout) => {
				match result {
					Ok(applied) if applied > 0 => info!(store = %store_name, applied, "batch processed"),
					Ok(_) => idle = true,
					Err(err) => error!(store = %store_name, %err, "ingestion batch failed"),
				}
			}
			_ = cancel.changed() => break,
		}
		if *cancel.borrow() {
			break;
		}

		// The fake broker returns instantly rather than actually blocking for
		// poll_timeout, so an empty batch needs an explicit pause to avoid a
		// tight busy loop.
		if idle {
			tokio::select! {
				_ = tokio::time::sleep(poll_timeout) => {}
				_ = cancel.changed() => break,
			}
			if *cancel.borrow() {
				break;
			}
		}

		for partition in task.partition_ids() {
			task.maybe_promote_leader(partition);
		}

		ticks_since_repair += 1;
		if ticks_since_repair >= REPAIR_EVERY_N_TICKS {
			ticks_since_repair = 0;
			let outcomes = task.repair().run_once().await;
			if !outcomes.is_empty() {
				info!(store = %store_name, repaired = outcomes.len(), "repair pass resubscribed lagging regions");
			}
		}
	}
	info!(store = %store_name, "ingestion loop stopped");
}

async fn wait_for_shutdown(mut cancel: watch::Receiver<bool>) {
	while !*cancel.borrow() {
		if cancel.changed().await.is_err() {
			return;
		}
	}
}

#[cfg(unix)]
fn watch_shutdown_signal() -> watch::Receiver<bool> {
	use tokio::signal::unix::{signal, SignalKind};

	let (send_cancel, watch_cancel) = watch::channel(false);
	tokio::spawn(async move {
		let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
		let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
		tokio::select! {
			_ = sigint.recv() => info!("received SIGINT, shutting down"),
			_ = sigterm.recv() => info!("received SIGTERM, shutting down"),
		}
		let _ = send_cancel.send(true);
	});
	watch_cancel
}

#[cfg(windows)]
fn watch_shutdown_signal() -> watch::Receiver<bool> {
	use tokio::signal::windows::ctrl_c;

	let (send_cancel, watch_cancel) = watch::channel(false);
	tokio::spawn(async move {
		let mut sigint = ctrl_c().expect("failed to install Ctrl-C handler");
		sigint.recv().await;
		info!("received Ctrl-C, shutting down");
		let _ = send_cancel.send(true);
	});
	watch_cancel
}
