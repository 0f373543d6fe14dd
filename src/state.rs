//! Shared application state for the HTTP surface.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::core::credentials::{ElevenLabsCredentials, OpenAiCredentials};
use crate::core::search::{EmbeddingsClient, PlacesClient, SearchOrchestrator, VectorStore};

/// Per-request timeout on outbound provider calls. The model waits on the
/// tool result during a search, so this bounds the whole pipeline stage.
const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(10);

/// State shared by all request handlers.
///
/// Built once at startup from the validated [`ServerConfig`]; handlers
/// receive it as `Arc<AppState>`.
pub struct AppState {
    pub config: ServerConfig,
    pub orchestrator: SearchOrchestrator,
    pub openai_credentials: OpenAiCredentials,
    pub elevenlabs_credentials: ElevenLabsCredentials,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let http = match reqwest::Client::builder().timeout(OUTBOUND_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("Failed to build HTTP client with timeout, using default: {e}");
                reqwest::Client::new()
            }
        };

        let embeddings = EmbeddingsClient::new(
            http.clone(),
            config.openai_base_url.clone(),
            config.openai_api_key.as_ref().map(|k| k.expose().to_string()),
            config.embedding_model.clone(),
        );
        let vector_store = VectorStore::new(
            http.clone(),
            config.supabase_url.clone(),
            config
                .supabase_service_key
                .as_ref()
                .map(|k| k.expose().to_string()),
            config.match_threshold,
        );
        let places = PlacesClient::new(
            http.clone(),
            config.places_base_url.clone(),
            config
                .google_places_api_key
                .as_ref()
                .map(|k| k.expose().to_string()),
            config.places_radius_m,
        );
        let orchestrator = SearchOrchestrator::new(
            embeddings,
            vector_store,
            places,
            config.match_count,
            config.fallback_min_results,
        );

        let openai_credentials = OpenAiCredentials::new(
            http.clone(),
            config.openai_base_url.clone(),
            config.openai_api_key.as_ref().map(|k| k.expose().to_string()),
            config.openai_session_model.clone(),
            config.openai_voice.clone(),
        );
        let elevenlabs_credentials = ElevenLabsCredentials::new(
            http,
            config.elevenlabs_base_url.clone(),
            config
                .elevenlabs_api_key
                .as_ref()
                .map(|k| k.expose().to_string()),
            config.elevenlabs_agent_id.clone(),
        );

        Arc::new(Self {
            config,
            orchestrator,
            openai_credentials,
            elevenlabs_credentials,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_builds_from_default_config() {
        let state = AppState::new(ServerConfig::default());
        assert_eq!(state.config.port, 3001);
    }
}
