//! Configuration for the OpenAI Realtime WebRTC session client.

use serde::{Deserialize, Serialize};

use crate::core::realtime::base::ReconnectionConfig;

/// OpenAI Realtime endpoint that receives the SDP offer.
pub const OPENAI_REALTIME_BASE_URL: &str = "https://api.openai.com/v1/realtime";

/// Realtime model negotiated in the SDP exchange.
pub const OPENAI_REALTIME_DEFAULT_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";

/// Default assistant voice.
pub const OPENAI_REALTIME_DEFAULT_VOICE: &str = "alloy";

/// Opus clock rate used on both WebRTC audio tracks (Hz).
pub const OPENAI_WEBRTC_SAMPLE_RATE: u32 = 48000;

/// Samples per 20 ms Opus frame at the WebRTC clock rate.
pub const OPUS_FRAME_SAMPLES: usize = 960;

/// Assistant system prompt. Restricts the session to Sacramento County
/// business search and mirrors the user's language.
pub const BUSINESS_ASSISTANT_INSTRUCTIONS: &str =
    "You are a specialized voice assistant for the 'City of Goodness' project, designed EXCLUSIVELY to help users find businesses and services in Sacramento County, California. \
    \n\nYour PRIMARY FUNCTION: Search and provide information about local businesses, restaurants, services, and commercial establishments when users request them.\
    \n\nIMPORTANT LANGUAGE RULE: Always respond in the SAME LANGUAGE the user speaks to you. Most commonly this will be Russian, Ukrainian, or American English, but it can be any other language. Mirror the user's language exactly.\
    \n\nREQUEST VALIDATION: Before responding, analyze if the user's request is related to finding/searching for a business, place, restaurant, or service. \
    \n- IF YES (search-related): Use the search_nearby_business function to help them. When you receive search results, use ONLY the 'voice_response' field from the function output. Do NOT read through individual results. Just say exactly what's in the voice_response field.\
    \n- IF NO (general conversation, jokes, weather, philosophy, etc.): Politely decline in a friendly, slightly humorous way (but stay professional - no overly familiar tone). For example: 'Хм, это интересный вопрос, но я специализируюсь исключительно на поиске бизнесов в Sacramento County. Может, помочь найти какое-нибудь заведение поблизости?' or 'Ha, I'd love to chat, but I'm really just here to help you find great businesses in Sacramento County! Need to find something nearby?' Adapt the tone and language to match the user's input.\
    \n\nRemember: Stay conversational, friendly, and helpful, but keep focused on your core mission - helping people discover local businesses.";

/// Server-side voice activity detection parameters sent in `session.update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadSettings {
    /// Activation threshold (0.0 to 1.0)
    pub threshold: f32,
    /// Audio included before detected speech (ms)
    pub prefix_padding_ms: u32,
    /// Silence duration that ends a turn (ms)
    pub silence_duration_ms: u32,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
        }
    }
}

/// Configuration for an OpenAI Realtime WebRTC session.
#[derive(Debug, Clone)]
pub struct OpenAiRealtimeConfig {
    /// Gateway base URL used to mint the ephemeral session token
    /// (POST `{gateway_base_url}/api/session`).
    pub gateway_base_url: String,

    /// Realtime endpoint that receives the SDP offer.
    pub realtime_base_url: String,

    /// Realtime model appended to the SDP POST as `?model=`.
    pub model: String,

    /// Assistant voice.
    pub voice: String,

    /// System prompt sent in `session.update`.
    pub instructions: String,

    /// Sampling temperature sent in `session.update`.
    pub temperature: f32,

    /// Turn detection parameters.
    pub vad: VadSettings,

    /// Timeout for the token mint and SDP exchange (seconds).
    pub connection_timeout_secs: u64,

    /// Timeout for ICE candidate gathering (seconds).
    pub ice_gathering_timeout_secs: u64,

    /// Reconnection behavior after transport loss.
    pub reconnection: ReconnectionConfig,
}

impl Default for OpenAiRealtimeConfig {
    fn default() -> Self {
        Self {
            gateway_base_url: "http://localhost:3001".to_string(),
            realtime_base_url: OPENAI_REALTIME_BASE_URL.to_string(),
            model: OPENAI_REALTIME_DEFAULT_MODEL.to_string(),
            voice: OPENAI_REALTIME_DEFAULT_VOICE.to_string(),
            instructions: BUSINESS_ASSISTANT_INSTRUCTIONS.to_string(),
            temperature: 0.8,
            vad: VadSettings::default(),
            connection_timeout_secs: 30,
            ice_gathering_timeout_secs: 10,
            reconnection: ReconnectionConfig::default(),
        }
    }
}

impl OpenAiRealtimeConfig {
    /// Create a config pointing at the given gateway.
    pub fn new(gateway_base_url: impl Into<String>) -> Self {
        Self {
            gateway_base_url: gateway_base_url.into(),
            ..Default::default()
        }
    }

    /// URL of the token mint endpoint.
    pub fn session_token_url(&self) -> String {
        format!(
            "{}/api/session",
            self.gateway_base_url.trim_end_matches('/')
        )
    }

    /// URL the SDP offer is posted to.
    pub fn sdp_url(&self) -> String {
        format!("{}?model={}", self.realtime_base_url, self.model)
    }
}
