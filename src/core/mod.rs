pub mod audio;
pub mod credentials;
pub mod realtime;
pub mod search;

// Re-export commonly used types for convenience
pub use audio::{AudioError, AudioSink, PlayoutQueue, f32_to_pcm16, pcm16_to_f32};

pub use realtime::{
    ConnectionState, ElevenLabsConfig, ElevenLabsSession, OpenAiRealtimeConfig,
    OpenAiRealtimeSession, RealtimeError, RealtimeProvider, RealtimeResult, SearchToolBridge,
    SharedVoiceSession, VoiceSession, create_voice_session,
};

pub use search::{
    BusinessHit, GeoBounds, GeoPoint, SACRAMENTO_BOUNDS, SACRAMENTO_CENTER, SearchError,
    SearchOrchestrator, SearchResponse,
};

pub use credentials::{CredentialsError, ElevenLabsCredentials, OpenAiCredentials};
