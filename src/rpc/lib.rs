//! Collaborator traits at the edges of the A/A ingestion engine: the
//! partitioned log (broker) client, the producer, and the cluster/colo id
//! resolver. None of these specify a wire protocol; that is explicitly out
//! of scope, leaving only the interface the ingestion task calls through.

pub mod broker;
pub mod cluster;
pub mod error;
pub mod fakes;
pub mod producer;

pub use broker::{BrokerClient, BrokerRecord, PartialUpdate, RecordTopicKind};
pub use cluster::{ClusterIdResolver, StaticClusterIdResolver};
pub use error::RpcError;
pub use producer::{ProduceOutcome, Producer, PutMetadata};
