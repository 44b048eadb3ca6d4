use thiserror::Error;

/// Errors raised across the storage engine boundary, split into "transient"
/// and "fatal to partition" classes.
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("storage read/write timed out")]
	Timeout,

	#[error("storage failure: {0}")]
	Other(String),
}
