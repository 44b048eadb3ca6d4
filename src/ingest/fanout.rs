use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;

use aa_util::Rmd;

#[derive(Debug, Error)]
pub enum ViewWriteError {
	#[error("view write failed: {0}")]
	Other(String),
}

/// The resolved winner, as handed to every registered view stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewUpdate {
	pub key: Vec<u8>,
	pub new_value: Option<Vec<u8>>,
	pub old_value: Option<Vec<u8>>,
	pub new_schema_id: u32,
	pub old_schema_id: Option<u32>,
	pub new_rmd: Rmd,
}

/// A downstream derived-view stream. Out of scope is what a view actually
/// does with the update; this is only the interface the ingestion task
/// calls through.
#[async_trait]
pub trait ViewWriter: Send + Sync {
	async fn write(&self, update: &ViewUpdate) -> Result<(), ViewWriteError>;
}

/// Fans a resolved record out to every registered view writer. The
/// local VT write must not be enqueued until the returned handle resolves,
/// but the caller's key lock may already have been released by then.
#[derive(Clone, Default)]
pub struct ViewFanout {
	writers: Vec<Arc<dyn ViewWriter>>,
}

impl ViewFanout {
	pub fn new(writers: Vec<Arc<dyn ViewWriter>>) -> Self {
		Self { writers }
	}

	/// Spawns the fanout and returns a handle that resolves once every
	/// writer has acknowledged. Spawning (rather than returning a plain
	/// future) lets the caller release its key lock and do other work
	/// before awaiting the handle.
	pub fn spawn_fanout(&self, update: ViewUpdate) -> JoinHandle<Result<(), ViewWriteError>> {
		let writers = self.writers.clone();
		tokio::spawn(async move {
			let update = Arc::new(update);
			let results = futures::future::join_all(writers.iter().map(|writer| {
				let writer = Arc::clone(writer);
				let update = Arc::clone(&update);
				async move { writer.write(&update).await }
			}))
			.await;
			for result in results {
				result?;
			}
			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	struct CountingWriter {
		calls: Arc<AtomicUsize>,
	}

	#[async_trait]
	impl ViewWriter for CountingWriter {
		async fn write(&self, _update: &ViewUpdate) -> Result<(), ViewWriteError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
	}

	struct FailingWriter;

	#[async_trait]
	impl ViewWriter for FailingWriter {
		async fn write(&self, _update: &ViewUpdate) -> Result<(), ViewWriteError> {
			Err(ViewWriteError::Other("boom".into()))
		}
	}

	fn update() -> ViewUpdate {
		ViewUpdate {
			key: b"k".to_vec(),
			new_value: Some(b"v".to_vec()),
			old_value: None,
			new_schema_id: 1,
			old_schema_id: None,
			new_rmd: Rmd::record_level(1, vec![1]),
		}
	}

	#[tokio::test]
	async fn all_writers_are_invoked() {
		let calls = Arc::new(AtomicUsize::new(0));
		let fanout = ViewFanout::new(vec![
			Arc::new(CountingWriter { calls: calls.clone() }),
			Arc::new(CountingWriter { calls: calls.clone() }),
		]);

		fanout.spawn_fanout(update()).await.unwrap().unwrap();
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn a_failing_writer_fails_the_whole_fanout() {
		let fanout = ViewFanout::new(vec![Arc::new(FailingWriter)]);
		let result = fanout.spawn_fanout(update()).await.unwrap();
		assert!(result.is_err());
	}

	#[tokio::test]
	async fn empty_fanout_resolves_immediately() {
		let fanout = ViewFanout::new(vec![]);
		fanout.spawn_fanout(update()).await.unwrap().unwrap();
	}
}
