//! The A/A ingestion task, its view writer fanout, and the remote
//! ingestion repair service: the orchestration layer that drives the
//! per-partition poll, resolve, persist, produce loop.

pub mod error;
pub mod fanout;
pub mod repair;
pub mod task;

pub use error::IngestError;
pub use fanout::{ViewFanout, ViewUpdate, ViewWriteError, ViewWriter};
pub use repair::{RepairOutcome, RepairService, RepairTask};
pub use task::{AaIngestTask, IngestTaskConfig};
