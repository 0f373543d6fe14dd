//! Realtime voice session clients.
//!
//! Two transports implement the [`VoiceSession`] capability trait:
//!
//! - **OpenAI Realtime API** over WebRTC: audio on Opus RTP tracks,
//!   conversation events on the `oai-events` data channel.
//! - **ElevenLabs Conversational AI** over WebSocket: base64 PCM16 audio and
//!   JSON events on one socket.
//!
//! Both normalize provider wire formats into the shared event types in
//! [`base`] before anything reaches a callback, and both route
//! `search_nearby_business` tool calls through [`SearchToolBridge`].
//!
//! # Audio Format
//!
//! - OpenAI: Opus at 48kHz on the wire, PCM16 at the session surface
//! - ElevenLabs: PCM16 at 16kHz both directions

pub mod base;
pub mod elevenlabs;
pub mod openai;
pub mod router;
mod tools;

pub use base::{
    AudioOutputCallback, ConnectionState, InterruptionCallback, RealtimeAudioData, RealtimeError,
    RealtimeResult, ReconnectionCallback, ReconnectionConfig, ReconnectionEvent,
    SearchResultsCallback, SharedVoiceSession, StateChangeCallback, ToolCallCallback,
    ToolCallRequest, TranscriptCallback, TranscriptResult, TranscriptRole, VoiceSession,
};
pub use elevenlabs::{ELEVENLABS_SAMPLE_RATE, ElevenLabsConfig, ElevenLabsSession};
pub use openai::{
    OPENAI_REALTIME_DEFAULT_MODEL, OPENAI_WEBRTC_SAMPLE_RATE, OpenAiRealtimeConfig,
    OpenAiRealtimeSession, SEARCH_TOOL_NAME,
};
pub use router::{SessionCallbacks, TranscriptAccumulator};
pub use tools::SearchToolBridge;

/// Supported realtime providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealtimeProvider {
    /// OpenAI Realtime API over WebRTC
    OpenAi,
    /// ElevenLabs Conversational AI over WebSocket
    ElevenLabs,
}

impl RealtimeProvider {
    /// Parse provider from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openai" | "webrtc" => Some(RealtimeProvider::OpenAi),
            "elevenlabs" | "11labs" | "convai" => Some(RealtimeProvider::ElevenLabs),
            _ => None,
        }
    }
}

impl std::fmt::Display for RealtimeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RealtimeProvider::OpenAi => write!(f, "openai"),
            RealtimeProvider::ElevenLabs => write!(f, "elevenlabs"),
        }
    }
}

/// Create a session for the given provider, pointed at the gateway that
/// mints its credentials.
pub fn create_voice_session(
    provider: RealtimeProvider,
    gateway_base_url: &str,
) -> RealtimeResult<SharedVoiceSession> {
    match provider {
        RealtimeProvider::OpenAi => {
            let config = OpenAiRealtimeConfig::new(gateway_base_url);
            Ok(std::sync::Arc::new(OpenAiRealtimeSession::new(config)?))
        }
        RealtimeProvider::ElevenLabs => {
            let config = ElevenLabsConfig::new(gateway_base_url);
            Ok(std::sync::Arc::new(ElevenLabsSession::new(config)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!(RealtimeProvider::parse("openai"), Some(RealtimeProvider::OpenAi));
        assert_eq!(RealtimeProvider::parse("OPENAI"), Some(RealtimeProvider::OpenAi));
        assert_eq!(
            RealtimeProvider::parse("elevenlabs"),
            Some(RealtimeProvider::ElevenLabs)
        );
        assert_eq!(
            RealtimeProvider::parse("ConvAI"),
            Some(RealtimeProvider::ElevenLabs)
        );
        assert_eq!(RealtimeProvider::parse("hume"), None);
    }

    #[test]
    fn test_provider_display() {
        assert_eq!(RealtimeProvider::OpenAi.to_string(), "openai");
        assert_eq!(RealtimeProvider::ElevenLabs.to_string(), "elevenlabs");
    }

    #[test]
    fn test_create_voice_session() {
        let session =
            create_voice_session(RealtimeProvider::OpenAi, "http://localhost:3001").unwrap();
        assert_eq!(session.provider_name(), "openai");
        assert!(!session.is_connected());

        let session =
            create_voice_session(RealtimeProvider::ElevenLabs, "http://localhost:3001").unwrap();
        assert_eq!(session.provider_name(), "elevenlabs");
    }
}
