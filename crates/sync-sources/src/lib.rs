//! Concrete source, destination, and embedding-model adapters, plus the
//! chunker transformer (§4.F "Chunker transformer (a notable instance)").
//!
//! `sync-api` defines the interfaces; `sync-core` drives them; this crate
//! supplies the vendor-facing implementations a real deployment registers
//! by short name (§6 "A new source is onboarded by implementing this
//! interface and registering a short-name").

pub mod destinations;
pub mod embeddings;
pub mod oauth;
pub mod sources;
pub mod transformers;

pub use destinations::vector_store::HttpVectorStoreDestination;
pub use embeddings::local::DeterministicLocalEmbeddingModel;
pub use embeddings::remote::RemoteApiEmbeddingModel;
pub use embeddings::select_embedding_model;
pub use oauth::{validate_oauth2, Oauth2RefreshStrategy, Oauth2TokenEndpointConfig};
pub use sources::filesystem::FilesystemSource;
pub use sources::rest::{PaginatedRestSource, RestSourceConfig};
pub use transformers::chunker::FileChunkerTransformer;
