//! Business search endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use tracing::info;

use super::ErrorResponse;
use crate::core::search::{GeoPoint, SearchResponse};
use crate::state::AppState;

/// All three fields are required; they are optional here so the handler can
/// answer missing fields with the contract's 400 body instead of the
/// extractor's default rejection.
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// `POST /api/search`
///
/// Pipeline failures are not errors at this surface: the orchestrator
/// degrades to an apology narration and the endpoint still returns 200.
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, (StatusCode, Json<ErrorResponse>)> {
    let (Some(query), Some(latitude), Some(longitude)) = (
        request.query.filter(|q| !q.is_empty()),
        request.latitude,
        request.longitude,
    ) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "Missing required parameters: query, latitude, longitude",
            )),
        ));
    };

    info!(query, latitude, longitude, "Search request");
    let response = state
        .orchestrator
        .search(
            &query,
            GeoPoint {
                latitude,
                longitude,
            },
        )
        .await;

    Ok(Json(response))
}
