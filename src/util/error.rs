//! Generic error type and the severity taxonomy shared by every component.
//!
//! Each component crate defines its own narrow error enum (see
//! `aa_storage::StorageError`, `aa_block::ChunkError`, `aa_resolver::ResolveError`,
//! `aa_ingest::IngestError`); this module only holds the few things that cut
//! across all of them: a catch-all [`Error`] for utility-level failures (config
//! parsing, time conversions) and the [`ErrorSeverity`] classification from the
//! propagation policy.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("TOML decode error: {0}")]
	TomlDecode(#[from] toml::de::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("{0}")]
	Message(String),
}

impl From<String> for Error {
	fn from(s: String) -> Error {
		Error::Message(s)
	}
}

impl From<&str> for Error {
	fn from(s: &str) -> Error {
		Error::Message(s.to_string())
	}
}

/// Where a failure sits in the propagation policy.
///
/// Transient errors never escape the ingestion task; everything from
/// `PoisonedRecord` upward is surfaced to the caller in some form (a metric
/// bump, a partition-level ERRORed state, or an aborted task).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
	/// Broker unreachable, storage read timeout on first attempt: retried or
	/// routed to the repair queue, never raised past the ingestion task.
	Transient,
	/// Schema cache miss: refresh once and retry before escalating.
	Recoverable,
	/// Malformed RMD or schema-incompatible update on a single record: the
	/// record is poisoned, a counter is bumped, the partition may continue.
	PoisonedRecord,
	/// Repeated storage write failure, missing chunk, or a detected offset /
	/// timestamp regression: the partition is marked ERRORed.
	FatalPartition,
	/// Unknown RMD schema id or a persistent invariant violation: the whole
	/// ingestion task aborts.
	FatalVersion,
}

impl ErrorSeverity {
	pub fn is_fatal(self) -> bool {
		matches!(self, ErrorSeverity::FatalPartition | ErrorSeverity::FatalVersion)
	}
}
