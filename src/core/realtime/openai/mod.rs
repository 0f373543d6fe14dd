//! OpenAI Realtime API over WebRTC.
//!
//! Audio travels on RTP tracks (Opus, 48kHz) while conversation events flow
//! over the `oai-events` data channel as JSON. The session authenticates with
//! an ephemeral client secret minted by the gateway, so no long-lived API key
//! ever reaches this client.
//!
//! # Example
//!
//! ```rust,ignore
//! use bizvoice_gateway::core::realtime::{OpenAiRealtimeConfig, OpenAiRealtimeSession, VoiceSession};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = OpenAiRealtimeConfig::new("http://localhost:3001");
//!     let session = OpenAiRealtimeSession::new(config).unwrap();
//!
//!     session.on_transcript(Arc::new(|t| Box::pin(async move {
//!         println!("[{}] {}", t.role, t.text);
//!     }))).unwrap();
//!
//!     session.connect().await.unwrap();
//!     session.set_microphone_active(true);
//! }
//! ```

mod client;
mod config;
mod messages;

pub use client::OpenAiRealtimeSession;
pub use config::{
    BUSINESS_ASSISTANT_INSTRUCTIONS, OPENAI_REALTIME_BASE_URL, OPENAI_REALTIME_DEFAULT_MODEL,
    OPENAI_REALTIME_DEFAULT_VOICE, OPENAI_WEBRTC_SAMPLE_RATE, OPUS_FRAME_SAMPLES,
    OpenAiRealtimeConfig, VadSettings,
};
pub use messages::{
    ClientEvent, EVENTS_DATA_CHANNEL_LABEL, SEARCH_TOOL_NAME, ServerEvent, SessionConfig, ToolDef,
    TurnDetection,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_urls() {
        let config = OpenAiRealtimeConfig::new("http://localhost:3001");
        assert_eq!(
            config.session_token_url(),
            "http://localhost:3001/api/session"
        );
        assert_eq!(
            config.sdp_url(),
            format!("{OPENAI_REALTIME_BASE_URL}?model={OPENAI_REALTIME_DEFAULT_MODEL}")
        );
    }

    #[test]
    fn test_constants() {
        assert_eq!(OPENAI_WEBRTC_SAMPLE_RATE, 48000);
        assert_eq!(OPUS_FRAME_SAMPLES, 960);
        assert_eq!(EVENTS_DATA_CHANNEL_LABEL, "oai-events");
        assert_eq!(SEARCH_TOOL_NAME, "search_nearby_business");
    }
}
