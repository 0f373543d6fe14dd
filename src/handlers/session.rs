//! Ephemeral credential endpoints.
//!
//! The browser never sees a long-lived API key. Each endpoint mints a
//! short-lived credential server-side: an ephemeral Realtime token for
//! OpenAI, a signed conversation URL for ElevenLabs.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

use super::ErrorResponse;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub client_secret: ClientSecret,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClientSecret {
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignedUrlResponse {
    pub signed_url: String,
}

/// `POST /api/session`: mint an OpenAI Realtime ephemeral token.
pub async fn openai_session_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.openai_credentials.mint_session_token().await {
        Ok(value) => Ok(Json(SessionResponse {
            client_secret: ClientSecret { value },
        })),
        Err(e) => {
            error!("Failed to mint session token: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to generate session token")),
            ))
        }
    }
}

/// `POST /api/elevenlabs/session`: fetch a signed conversation URL.
pub async fn elevenlabs_session_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SignedUrlResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.elevenlabs_credentials.signed_url().await {
        Ok(signed_url) => Ok(Json(SignedUrlResponse { signed_url })),
        Err(e) => {
            error!("Failed to fetch signed URL: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to get signed URL")),
            ))
        }
    }
}
