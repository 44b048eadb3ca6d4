//! The transient record cache and per-partition consumption state: the
//! mutable state an A/A ingestion task owns for each partition it drives.
//! Both are plain structs mutated only by their owning task thread, with
//! no internal locking here; that is the caller's job.

pub mod control;
pub mod partition_state;
pub mod transient;

pub use control::{ControlMessage, TopicSwitch, REWIND_TIME_DECIDED_BY_SERVER};
pub use partition_state::{PartitionConsumptionState, Role, OFFSET_NOT_YET_KNOWN};
pub use transient::{TransientCache, TransientRecord};
