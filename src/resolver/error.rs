use thiserror::Error;

/// Errors raised by [`crate::resolve`]. Never silently dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
	#[error("update schema {update_schema_id} cannot be applied to value schema {value_schema_id}")]
	SchemaIncompatible {
		value_schema_id: u32,
		update_schema_id: u32,
	},
}
