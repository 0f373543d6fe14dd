//! Short-lived provider credentials for browserless realtime clients.
//!
//! Long-lived API keys stay on the server. Session setup mints a
//! single-use credential per provider: an ephemeral token for the OpenAI
//! Realtime API and a signed WebSocket URL for ElevenLabs Conversational AI.

use thiserror::Error;

mod elevenlabs;
mod openai;

pub use elevenlabs::{ElevenLabsCredentials, DEFAULT_ELEVENLABS_BASE_URL};
pub use openai::{OpenAiCredentials, DEFAULT_OPENAI_BASE_URL};

/// Errors minting provider credentials.
#[derive(Debug, Error)]
pub enum CredentialsError {
    /// A required key or id is missing from the configuration
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    /// The provider rejected the credential request
    #[error("Credential request failed: {0}")]
    RequestFailed(String),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
