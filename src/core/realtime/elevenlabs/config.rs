//! ElevenLabs Conversational AI configuration.

use serde::{Deserialize, Serialize};

use crate::core::realtime::base::ReconnectionConfig;

/// Base URL for the ConvAI conversation WebSocket.
pub const ELEVENLABS_WS_BASE_URL: &str = "wss://api.elevenlabs.io/v1/convai/conversation";

/// Sample rate of ConvAI audio in both directions, in Hz.
pub const ELEVENLABS_SAMPLE_RATE: u32 = 16000;

/// Configuration for an ElevenLabs conversational session.
///
/// Sessions normally authenticate with a signed URL minted by the gateway.
/// When the gateway cannot mint one and an agent ID is configured, the
/// public conversation endpoint is used instead, which only works for
/// agents marked public in the ElevenLabs dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevenLabsConfig {
    /// Base URL of the gateway that mints signed URLs
    pub gateway_base_url: String,

    /// Agent ID for the public endpoint fallback
    pub agent_id: Option<String>,

    /// ConvAI WebSocket base URL
    pub ws_base_url: String,

    /// Audio sample rate in Hz
    pub sample_rate: u32,

    /// Timeout for HTTP requests during connection, in seconds
    pub connection_timeout_secs: u64,

    /// Automatic reconnection behavior
    pub reconnection: ReconnectionConfig,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            gateway_base_url: "http://localhost:3001".to_string(),
            agent_id: None,
            ws_base_url: ELEVENLABS_WS_BASE_URL.to_string(),
            sample_rate: ELEVENLABS_SAMPLE_RATE,
            connection_timeout_secs: 30,
            reconnection: ReconnectionConfig::default(),
        }
    }
}

impl ElevenLabsConfig {
    /// Config pointing at the given gateway, defaults elsewhere.
    pub fn new(gateway_base_url: impl Into<String>) -> Self {
        Self {
            gateway_base_url: gateway_base_url.into(),
            ..Default::default()
        }
    }

    /// URL of the gateway endpoint that mints signed URLs.
    pub fn session_url(&self) -> String {
        format!(
            "{}/api/elevenlabs/session",
            self.gateway_base_url.trim_end_matches('/')
        )
    }

    /// Public conversation endpoint for the given agent.
    pub fn public_ws_url(&self, agent_id: &str) -> String {
        format!("{}?agent_id={agent_id}", self.ws_base_url)
    }
}
