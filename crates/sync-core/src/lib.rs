//! The sync runtime: wires the `sync-api` contracts into a running,
//! bounded-concurrency pipeline (§2 SYSTEM OVERVIEW, components D-K).
//!
//! Concrete adapters (sources, destinations, embedding models) live in
//! `sync-sources`; this crate owns the orchestration machinery only.

pub mod context;
pub mod context_builder;
pub mod entity_processor;
pub mod ledger_sqlx;
pub mod orchestrator;
pub mod progress;
pub mod router;
pub mod settings;
pub mod token_manager;
pub mod worker_pool;

#[cfg(any(test, feature = "test-doubles"))]
pub mod testing;

pub use context::SyncContext;
pub use context_builder::{RunContextBuilder, RunContextInputs};
pub use entity_processor::EntityProcessor;
pub use ledger_sqlx::PostgresEntityLedger;
pub use orchestrator::Orchestrator;
pub use progress::ProgressPublisher;
pub use router::{NoOpTransformer, SyncDagRouter};
pub use settings::SyncSettings;
pub use token_manager::{AuthProviderRefresh, RefreshStrategy, RefreshedToken, TokenManager};
pub use worker_pool::WorkerPool;
