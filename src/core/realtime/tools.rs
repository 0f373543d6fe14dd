//! Bridge between in-conversation tool calls and the gateway search API.
//!
//! When the model asks for `search_nearby_business`, the bridge resolves the
//! search coordinates, POSTs the gateway search endpoint, hands the parsed
//! results to the host and submits the narration back into the session as the
//! function output. Providers whose platform consumes tool results out of
//! band (ElevenLabs) implement the submission methods as no-ops, so the
//! bridge drives every session the same way.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use super::base::{RealtimeError, RealtimeResult, SearchResultsCallback, ToolCallRequest};
use super::openai::SEARCH_TOOL_NAME;
use crate::core::realtime::base::VoiceSession;
use crate::core::search::{GeoPoint, SACRAMENTO_CENTER, SearchResponse};

/// Bound on the gateway search call so the model's tool wait cannot hang.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct SearchRequestBody<'a> {
    query: &'a str,
    latitude: f64,
    longitude: f64,
}

/// Intercepts `search_nearby_business` tool calls for one session.
///
/// Calls are handled serially: a second invocation arriving while one is in
/// flight queues behind it. After [`shutdown`](Self::shutdown), late results
/// are dropped instead of reaching callbacks.
pub struct SearchToolBridge {
    search_url: String,
    http: reqwest::Client,
    /// Serializes tool handling per session.
    in_flight: AsyncMutex<()>,
    /// Cleared on shutdown so post-teardown results never fire callbacks.
    active: AtomicBool,
    results: Mutex<Option<SearchResultsCallback>>,
}

impl SearchToolBridge {
    /// Create a bridge posting to `{gateway_base_url}/api/search`.
    pub fn new(gateway_base_url: impl Into<String>) -> RealtimeResult<Self> {
        let base = gateway_base_url.into();
        let http = reqwest::Client::builder()
            .timeout(SEARCH_TIMEOUT)
            .build()
            .map_err(|e| {
                RealtimeError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            search_url: format!("{}/api/search", base.trim_end_matches('/')),
            http,
            in_flight: AsyncMutex::new(()),
            active: AtomicBool::new(true),
            results: Mutex::new(None),
        })
    }

    /// Register the results callback. Last registration wins.
    pub fn on_results(&self, callback: SearchResultsCallback) {
        *self.results.lock() = Some(callback);
    }

    /// Stop delivering results. Called when the owning session tears down;
    /// an in-flight search completes but its outcome is discarded.
    pub fn shutdown(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Handle one tool invocation against the given session.
    ///
    /// Unknown tool names are answered with an error function output so the
    /// model can recover verbally instead of waiting forever.
    pub async fn handle(&self, invocation: ToolCallRequest, session: Arc<dyn VoiceSession>) {
        let _serial = self.in_flight.lock().await;

        if invocation.name != SEARCH_TOOL_NAME {
            warn!(tool = %invocation.name, "Unsupported tool requested");
            self.submit_failure(
                &invocation,
                session.as_ref(),
                &format!("Unknown tool: {}", invocation.name),
            )
            .await;
            return;
        }

        let Some(query) = invocation
            .arguments
            .get("query")
            .and_then(Value::as_str)
            .filter(|q| !q.is_empty())
        else {
            warn!("Tool call missing query argument");
            self.submit_failure(&invocation, session.as_ref(), "Missing query argument")
                .await;
            return;
        };

        let location = resolve_location(&invocation.arguments, session.search_center());
        info!(
            query,
            latitude = location.latitude,
            longitude = location.longitude,
            "Handling business search tool call"
        );

        match self.search(query, location).await {
            Ok(response) => {
                if !self.is_active() {
                    debug!("Session torn down, dropping late search results");
                    return;
                }

                let callback = self.results.lock().clone();
                if let Some(callback) = callback {
                    callback(response.results.clone()).await;
                }

                if let Some(call_id) = invocation.call_id.as_deref() {
                    if let Err(e) = session
                        .submit_tool_result(call_id, &response.voice_response)
                        .await
                    {
                        error!("Failed to submit tool result: {e}");
                        return;
                    }
                    if let Err(e) = session.create_response().await {
                        error!("Failed to trigger response generation: {e}");
                    }
                }
            }
            Err(e) => {
                error!("Business search failed: {e}");
                if !self.is_active() {
                    return;
                }
                self.submit_failure(&invocation, session.as_ref(), &e.to_string())
                    .await;
            }
        }
    }

    async fn search(&self, query: &str, location: GeoPoint) -> RealtimeResult<SearchResponse> {
        let response = self
            .http
            .post(&self.search_url)
            .json(&SearchRequestBody {
                query,
                latitude: location.latitude,
                longitude: location.longitude,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RealtimeError::Timeout("search request timed out".to_string())
                } else {
                    RealtimeError::ProviderError(format!("search request failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            return Err(RealtimeError::ProviderError(format!(
                "search endpoint returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| RealtimeError::SerializationError(format!("invalid search response: {e}")))
    }

    /// Submit a structured failure so the model apologizes instead of
    /// hanging. Sessions without an in-band result channel ignore it.
    async fn submit_failure(&self, invocation: &ToolCallRequest, session: &dyn VoiceSession, message: &str) {
        let Some(call_id) = invocation.call_id.as_deref() else {
            return;
        };
        let output = failure_output(message);
        if let Err(e) = session.submit_tool_result(call_id, &output).await {
            error!("Failed to submit failure output: {e}");
            return;
        }
        if let Err(e) = session.create_response().await {
            error!("Failed to trigger response after failure: {e}");
        }
    }
}

/// Coordinates for a tool call, in falling priority: explicit arguments,
/// the session's stored search center, the Sacramento default.
fn resolve_location(arguments: &Value, session_center: Option<GeoPoint>) -> GeoPoint {
    let latitude = arguments.get("latitude").and_then(Value::as_f64);
    let longitude = arguments.get("longitude").and_then(Value::as_f64);
    if let (Some(latitude), Some(longitude)) = (latitude, longitude) {
        return GeoPoint {
            latitude,
            longitude,
        };
    }
    session_center.unwrap_or(SACRAMENTO_CENTER)
}

fn failure_output(message: &str) -> String {
    serde_json::json!({"success": false, "error": message}).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_location_prefers_arguments() {
        let args = json!({"query": "pizza", "latitude": 38.6, "longitude": -121.3});
        let center = Some(GeoPoint {
            latitude: 38.5,
            longitude: -121.5,
        });
        let resolved = resolve_location(&args, center);
        assert_eq!(resolved.latitude, 38.6);
        assert_eq!(resolved.longitude, -121.3);
    }

    #[test]
    fn test_resolve_location_falls_back_to_session_center() {
        let args = json!({"query": "pizza"});
        let center = Some(GeoPoint {
            latitude: 38.5,
            longitude: -121.5,
        });
        let resolved = resolve_location(&args, center);
        assert_eq!(resolved.latitude, 38.5);
    }

    #[test]
    fn test_resolve_location_defaults_to_sacramento() {
        let resolved = resolve_location(&json!({"query": "pizza"}), None);
        assert_eq!(resolved.latitude, SACRAMENTO_CENTER.latitude);
        assert_eq!(resolved.longitude, SACRAMENTO_CENTER.longitude);
    }

    #[test]
    fn test_partial_coordinates_ignored() {
        // Latitude without longitude is not a usable pair.
        let resolved = resolve_location(&json!({"latitude": 38.6}), None);
        assert_eq!(resolved.latitude, SACRAMENTO_CENTER.latitude);
    }

    #[test]
    fn test_failure_output_shape() {
        let output = failure_output("boom");
        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "boom");
    }

    #[test]
    fn test_search_url_normalizes_trailing_slash() {
        let bridge = SearchToolBridge::new("http://localhost:3001/").unwrap();
        assert_eq!(bridge.search_url, "http://localhost:3001/api/search");
    }

    #[test]
    fn test_shutdown_flips_active() {
        let bridge = SearchToolBridge::new("http://localhost:3001").unwrap();
        assert!(bridge.is_active());
        bridge.shutdown();
        assert!(!bridge.is_active());
    }
}
