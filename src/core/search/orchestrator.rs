//! Search pipeline orchestration.

use tracing::{debug, error, info};

use super::embeddings::EmbeddingsClient;
use super::narration;
use super::places::PlacesClient;
use super::types::{BusinessHit, GeoPoint, SearchResponse};
use super::vector_store::VectorStore;
use super::SearchError;

/// Runs the staged business search: embed, match the directory, fall back
/// to Google Places when the directory comes up short, narrate.
///
/// The public surface is infallible. When the pipeline cannot produce
/// results the response carries an apology narration instead of an error.
#[derive(Clone)]
pub struct SearchOrchestrator {
    embeddings: EmbeddingsClient,
    vector_store: VectorStore,
    places: PlacesClient,
    match_count: usize,
    fallback_min_results: usize,
}

impl SearchOrchestrator {
    pub fn new(
        embeddings: EmbeddingsClient,
        vector_store: VectorStore,
        places: PlacesClient,
        match_count: usize,
        fallback_min_results: usize,
    ) -> Self {
        Self {
            embeddings,
            vector_store,
            places,
            match_count,
            fallback_min_results,
        }
    }

    /// Search for businesses near a location.
    pub async fn search(&self, query: &str, location: GeoPoint) -> SearchResponse {
        match self.run_pipeline(query, location).await {
            Ok(results) => SearchResponse {
                voice_response: narration::voice_response(&results, query),
                results,
            },
            Err(e) => {
                error!("search pipeline failed for \"{query}\": {e}");
                SearchResponse {
                    results: Vec::new(),
                    voice_response: narration::error_response(query),
                }
            }
        }
    }

    async fn run_pipeline(
        &self,
        query: &str,
        location: GeoPoint,
    ) -> Result<Vec<BusinessHit>, SearchError> {
        info!(
            "searching for \"{query}\" at {}, {}",
            location.latitude, location.longitude
        );

        let embedding = self.embeddings.embed(query).await?;

        // Directory errors degrade to an empty set so Places can still
        // answer; only the embedding stage aborts the pipeline.
        let mut results = match self.vector_store.search(&embedding, self.match_count).await {
            Ok(hits) => hits,
            Err(e) => {
                error!("directory search failed: {e}");
                Vec::new()
            }
        };
        debug!("directory returned {} results", results.len());

        if results.len() < self.fallback_min_results {
            info!(
                "{} directory results, falling back to Google Places",
                results.len()
            );
            let fallback = match self
                .places
                .text_search(query, location, self.match_count)
                .await
            {
                Ok(hits) => hits,
                Err(e) => {
                    error!("places search failed: {e}");
                    Vec::new()
                }
            };
            debug!("places returned {} results", fallback.len());

            // Directory hits keep priority over Places hits.
            results.extend(fallback);
            results.truncate(self.match_count);
        }

        Ok(results)
    }
}
