//! ElevenLabs Conversational AI over WebSocket.
//!
//! One socket carries everything: base64 PCM16 microphone audio up, agent
//! audio, transcripts, pings and client tool calls down. The agent platform
//! owns turn-taking and speech synthesis, so the client never triggers
//! responses; it answers pings and surfaces normalized events.
//!
//! # Example
//!
//! ```rust,ignore
//! use bizvoice_gateway::core::realtime::{ElevenLabsConfig, ElevenLabsSession, VoiceSession};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ElevenLabsConfig::new("http://localhost:3001");
//!     let session = ElevenLabsSession::new(config).unwrap();
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

pub use client::ElevenLabsSession;
pub use config::{ELEVENLABS_SAMPLE_RATE, ELEVENLABS_WS_BASE_URL, ElevenLabsConfig};
pub use messages::{ConvAiEvent, Pong, UserAudioChunk, parse_event};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_urls() {
        let config = ElevenLabsConfig::new("http://localhost:3001");
        assert_eq!(
            config.session_url(),
            "http://localhost:3001/api/elevenlabs/session"
        );
        assert_eq!(
            config.public_ws_url("agent_1"),
            format!("{ELEVENLABS_WS_BASE_URL}?agent_id=agent_1")
        );
    }

    #[test]
    fn test_sample_rate_constant() {
        assert_eq!(ELEVENLABS_SAMPLE_RATE, 16000);
    }
}
