use thiserror::Error;

use aa_block::ChunkError;
use aa_resolver::ResolveError;
use aa_rpc::RpcError;
use aa_storage::StorageError;
use aa_util::rmd::RmdCodecError;
use aa_util::ErrorSeverity;

/// The task-facing umbrella error, composing every collaborator
/// error plus the failures specific to the ingestion loop itself. Every
/// variant maps to a propagation decision via [`IngestError::severity`]
/// rather than having that decision re-derived ad hoc at each call site.
#[derive(Debug, Error)]
pub enum IngestError {
	#[error(transparent)]
	Storage(#[from] StorageError),

	#[error(transparent)]
	Chunk(#[from] ChunkError),

	#[error(transparent)]
	Resolve(#[from] ResolveError),

	#[error(transparent)]
	Rpc(#[from] RpcError),

	#[error(transparent)]
	RmdCodec(#[from] RmdCodecError),

	#[error("topic switch aborted: {unreachable} unreachable region(s) >= quorum {quorum}")]
	TopicSwitchAborted { unreachable: usize, quorum: usize },

	#[error("offset vector regression detected for key")]
	OffsetRegression,

	#[error("timestamp regression detected for key")]
	TimestampRegression,

	#[error("view writer fanout failed: {0}")]
	Fanout(String),
}

impl IngestError {
	/// The propagation class from the error taxonomy: transient errors
	/// never escape the ingestion task, poisoned records are metered and
	/// otherwise skipped, fatal-to-partition errors mark the partition
	/// ERRORed, and fatal-to-version errors abort the task.
	pub fn severity(&self) -> ErrorSeverity {
		match self {
			IngestError::Storage(StorageError::Timeout) => ErrorSeverity::Transient,
			IngestError::Storage(_) => ErrorSeverity::FatalPartition,

			IngestError::Chunk(ChunkError::Storage(StorageError::Timeout)) => ErrorSeverity::Transient,
			IngestError::Chunk(_) => ErrorSeverity::FatalPartition,

			IngestError::Resolve(ResolveError::SchemaIncompatible { .. }) => ErrorSeverity::PoisonedRecord,

			IngestError::Rpc(RpcError::Unreachable) => ErrorSeverity::Transient,
			IngestError::Rpc(RpcError::Timeout) => ErrorSeverity::Transient,
			IngestError::Rpc(RpcError::Other(_)) => ErrorSeverity::Recoverable,

			IngestError::RmdCodec(_) => ErrorSeverity::FatalVersion,

			IngestError::TopicSwitchAborted { .. } => ErrorSeverity::FatalPartition,
			IngestError::OffsetRegression => ErrorSeverity::FatalPartition,
			IngestError::TimestampRegression => ErrorSeverity::FatalPartition,

			IngestError::Fanout(_) => ErrorSeverity::Transient,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn schema_incompatible_is_poisoned_record() {
		let err = IngestError::Resolve(ResolveError::SchemaIncompatible {
			value_schema_id: 1,
			update_schema_id: 2,
		});
		assert_eq!(err.severity(), ErrorSeverity::PoisonedRecord);
	}

	#[test]
	fn unreachable_rpc_is_transient() {
		assert_eq!(IngestError::Rpc(RpcError::Unreachable).severity(), ErrorSeverity::Transient);
	}

	#[test]
	fn unknown_rmd_schema_is_fatal_to_version() {
		let err = IngestError::RmdCodec(RmdCodecError::UnknownRmdSchema(9));
		assert!(err.severity().is_fatal());
	}
}
