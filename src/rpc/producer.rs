use async_trait::async_trait;

use aa_block::ChunkedValueManifest;

use crate::error::RpcError;

/// RMD metadata accompanying a produce call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutMetadata {
	pub rmd_schema_id: u32,
	pub rmd_bytes: Vec<u8>,
}

/// The offset the local version topic assigned to a produced record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProduceOutcome {
	pub offset: u64,
}

/// The producer collaborator: writes the resolved winner to the local
/// version topic. `old_value_manifest`/`old_rmd_manifest` let the producer
/// clean up superseded chunks once the new record is durable.
#[async_trait]
pub trait Producer: Send + Sync {
	#[allow(clippy::too_many_arguments)]
	async fn put(
		&self,
		key: &[u8],
		value: &[u8],
		schema_id: u32,
		logical_ts: i64,
		put_metadata: PutMetadata,
		old_value_manifest: Option<ChunkedValueManifest>,
		old_rmd_manifest: Option<ChunkedValueManifest>,
	) -> Result<ProduceOutcome, RpcError>;

	async fn delete(
		&self,
		key: &[u8],
		logical_ts: i64,
		put_metadata: PutMetadata,
		old_value_manifest: Option<ChunkedValueManifest>,
		old_rmd_manifest: Option<ChunkedValueManifest>,
	) -> Result<ProduceOutcome, RpcError>;
}
