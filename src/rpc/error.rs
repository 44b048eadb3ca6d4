use thiserror::Error;

/// Errors raised across the broker/producer collaborator boundary, sharing
/// the "transient" class. The real transport is out of scope;
/// this only names the failure shapes the ingestion task reacts to.
#[derive(Debug, Error)]
pub enum RpcError {
	#[error("broker or producer unreachable")]
	Unreachable,

	#[error("operation timed out")]
	Timeout,

	#[error("rpc failure: {0}")]
	Other(String),
}
