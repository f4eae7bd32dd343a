//! Shared types and interfaces for the sync runtime: the entity model,
//! the DAG, the three pluggable adapter traits, the entity ledger contract,
//! the error taxonomy, and the progress-channel message schemas.
//!
//! This crate has no async runtime logic of its own — `sync-core` wires
//! these contracts into a running pipeline, and `sync-sources` supplies
//! concrete adapter implementations.

pub mod dag;
pub mod entity;
pub mod error;
pub mod ledger;
pub mod progress;
pub mod traits;
pub mod value;

pub use dag::{Dag, DagEdge, DagNode, NodeType, TransformerRegistry};
pub use entity::{BreadcrumbEntry, DestinationAction, Entity, FileAttributes, SystemMetadata};
pub use error::{DestinationError, EmbeddingError, JobStatus, LedgerError, SourceError, SyncFailure, TokenError};
pub use ledger::{EntityLedger, EntityLedgerRecord};
pub use progress::{CountersSnapshot, StateSnapshot, SyncCompleteMessage};
pub use traits::{DestinationAdapter, EmbeddingModel, EntityStream, SearchHit, SourceAdapter, Transformer};
pub use value::Value;
