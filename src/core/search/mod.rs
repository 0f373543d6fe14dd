//! Business search pipeline for Sacramento County.
//!
//! The pipeline runs in stages: the query is embedded, the embedding is
//! matched against the curated business directory, and Google Places fills
//! in when the directory comes up short. The merged results are narrated
//! into a single voice-friendly sentence.
//!
//! [`SearchOrchestrator`] is the entry point; it never fails at its surface.
//! Pipeline errors degrade to an apology narration with empty results so
//! the assistant always has something to say.

use thiserror::Error;

mod embeddings;
mod narration;
mod orchestrator;
mod places;
mod types;
mod vector_store;

pub use embeddings::EmbeddingsClient;
pub use narration::{error_response, voice_response};
pub use orchestrator::SearchOrchestrator;
pub use places::PlacesClient;
pub use types::{BusinessHit, GeoBounds, GeoPoint, SACRAMENTO_BOUNDS, SACRAMENTO_CENTER, SearchResponse};
pub use vector_store::VectorStore;

/// Errors from the search pipeline stages.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Query embedding request failed
    #[error("Embedding request failed: {0}")]
    Embedding(String),

    /// Vector store RPC or row fetch failed
    #[error("Vector store request failed: {0}")]
    VectorStore(String),

    /// Google Places request failed
    #[error("Places request failed: {0}")]
    Places(String),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
