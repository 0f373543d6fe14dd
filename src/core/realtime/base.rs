//! Base trait and shared types for realtime voice sessions.
//!
//! A voice session is a duplex audio conversation with a provider: the user
//! speaks into the session, the assistant speaks back, and tool calls flow
//! out of the conversation into application code. Two transports implement
//! this contract:
//!
//! - OpenAI Realtime API over WebRTC (`openai` module)
//! - ElevenLabs Conversational AI over WebSocket (`elevenlabs` module)
//!
//! All provider events are normalized into the types defined here before
//! they reach callbacks, so application code never sees wire formats.
//!
//! # Callbacks
//!
//! Every event kind has exactly one callback slot. Registering a callback
//! replaces the previous one; there is no broadcast list.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

use crate::core::search::{BusinessHit, GeoPoint};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during realtime session operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Ephemeral credential or signed URL could not be obtained
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// WebRTC transport error
    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    /// Provider-reported error
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// Audio encode/decode failure
    #[error("Audio error: {0}")]
    AudioError(String),
}

/// Result type for realtime session operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Reconnection
// =============================================================================

/// Configuration for automatic reconnection after transport loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectionConfig {
    /// Enable automatic reconnection on connection loss.
    /// Default: true
    pub enabled: bool,

    /// Maximum reconnection attempts before giving up. 0 means unlimited.
    /// Default: 5
    pub max_attempts: u32,

    /// Initial delay between attempts (milliseconds).
    /// Default: 1000ms
    pub initial_delay_ms: u64,

    /// Maximum delay between attempts (milliseconds).
    /// Default: 30000ms
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff.
    /// Default: 2.0
    pub backoff_multiplier: f32,

    /// Add jitter to the delay to prevent thundering herd.
    /// Default: true
    pub jitter: bool,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ReconnectionConfig {
    /// Create a config with reconnection disabled.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Delay for a given attempt number using exponential backoff, in
    /// milliseconds.
    pub fn calculate_delay(&self, attempt: u32) -> u64 {
        let base = self.initial_delay_ms as f64;
        let multiplier = self.backoff_multiplier as f64;

        let delay = base * multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = delay.min(self.max_delay_ms as f64);

        if self.jitter {
            // Up to 25% jitter either way
            let range = delay * 0.25;
            (delay + pseudo_jitter(range)) as u64
        } else {
            delay as u64
        }
    }

    /// Whether another reconnection attempt is allowed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.enabled && (self.max_attempts == 0 || attempt < self.max_attempts)
    }
}

/// Pseudo-random jitter from a time-seeded LCG, avoiding a rand dependency
/// for this one use.
fn pseudo_jitter(range: f64) -> f64 {
    use std::time::SystemTime;
    let seed = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let random = ((seed.wrapping_mul(1103515245).wrapping_add(12345)) % (1 << 31)) as f64;
    let normalized = random / (1u64 << 31) as f64;
    (normalized - 0.5) * 2.0 * range
}

// =============================================================================
// Connection State
// =============================================================================

/// Connection state of a voice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected to the provider
    #[default]
    Disconnected,
    /// Currently connecting
    Connecting,
    /// Connected and ready
    Connected,
    /// Reconnecting after connection loss
    Reconnecting,
    /// Connection failed
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Reconnecting => write!(f, "Reconnecting"),
            ConnectionState::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// Event Types
// =============================================================================

/// Role of the speaker in a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    /// User speech transcript
    User,
    /// Assistant speech transcript
    Assistant,
}

impl fmt::Display for TranscriptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptRole::User => write!(f, "user"),
            TranscriptRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Transcript emitted by a session.
///
/// Partial assistant transcripts stream with `is_final: false` while the
/// model is speaking; exactly one final transcript follows per utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    /// The transcribed text
    pub text: String,
    /// Role of the speaker
    pub role: TranscriptRole,
    /// Whether this is the final transcript for the utterance
    pub is_final: bool,
    /// Provider item ID, when the provider supplies one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
}

/// Playable audio emitted by a session.
#[derive(Debug, Clone)]
pub struct RealtimeAudioData {
    /// Raw audio bytes (PCM 16-bit, mono, little-endian)
    pub data: Bytes,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Provider item ID
    pub item_id: Option<String>,
    /// Provider response ID
    pub response_id: Option<String>,
}

/// Tool call surfaced by the model.
///
/// `call_id` is present for providers that expect a result to be submitted
/// back into the conversation (OpenAI) and absent or informational for
/// providers that consume results out of band (ElevenLabs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Tool name
    pub name: String,
    /// Parsed tool arguments
    pub arguments: serde_json::Value,
    /// Provider call ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

/// Reconnection event details.
#[derive(Debug, Clone)]
pub struct ReconnectionEvent {
    /// Number of reconnection attempts made
    pub attempt: u32,
    /// Whether reconnection was successful
    pub success: bool,
    /// Error message if reconnection failed
    pub error: Option<String>,
}

// =============================================================================
// Callback Types
// =============================================================================

/// Callback type for transcript events.
pub type TranscriptCallback =
    Arc<dyn Fn(TranscriptResult) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for audio output events.
pub type AudioOutputCallback =
    Arc<dyn Fn(RealtimeAudioData) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for tool call events.
pub type ToolCallCallback =
    Arc<dyn Fn(ToolCallRequest) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for connection state changes.
pub type StateChangeCallback =
    Arc<dyn Fn(ConnectionState) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for business search results produced by the tool bridge.
pub type SearchResultsCallback =
    Arc<dyn Fn(Vec<BusinessHit>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for interruption (barge-in) events.
pub type InterruptionCallback =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for reconnection events.
pub type ReconnectionCallback =
    Arc<dyn Fn(ReconnectionEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

// =============================================================================
// Base Trait
// =============================================================================

/// Capability trait for realtime voice sessions.
///
/// Implementations use interior mutability throughout, so sessions are
/// shared as `Arc<dyn VoiceSession>` and every method takes `&self`.
///
/// # Example
///
/// ```rust,ignore
/// let session: Arc<dyn VoiceSession> = Arc::new(OpenAiRealtimeSession::new(config)?);
///
/// session.on_transcript(Arc::new(|t| {
///     Box::pin(async move {
///         println!("[{}] {}", t.role, t.text);
///     })
/// }))?;
///
/// session.connect().await?;
/// session.set_microphone_active(true);
/// session.send_audio(&captured_samples).await?;
/// ```
#[async_trait]
pub trait VoiceSession: Send + Sync {
    /// Connect to the provider. Returns immediately when already connected.
    async fn connect(&self) -> RealtimeResult<()>;

    /// Disconnect from the provider and stop all event delivery.
    ///
    /// Safe to call when already disconnected. Suppresses automatic
    /// reconnection.
    async fn disconnect(&self) -> RealtimeResult<()>;

    /// Check if the session is connected and ready.
    fn is_connected(&self) -> bool;

    /// Get the current connection state.
    fn connection_state(&self) -> ConnectionState;

    // -------------------------------------------------------------------------
    // Audio and location input
    // -------------------------------------------------------------------------

    /// Send captured microphone samples (32-bit float, mono) into the
    /// session.
    ///
    /// Frames are dropped silently while the microphone is muted.
    async fn send_audio(&self, samples: &[f32]) -> RealtimeResult<()>;

    /// Gate the microphone. While inactive, captured frames are dropped
    /// rather than queued.
    fn set_microphone_active(&self, active: bool);

    /// Current microphone gate state.
    fn microphone_active(&self) -> bool;

    /// Store the coordinates substituted into business searches when the
    /// model does not supply any.
    fn set_search_center(&self, center: GeoPoint);

    /// The stored search center, if one has been set.
    fn search_center(&self) -> Option<GeoPoint>;

    // -------------------------------------------------------------------------
    // Conversation control
    // -------------------------------------------------------------------------

    /// Submit a tool result back into the conversation.
    ///
    /// Providers without an in-band result channel treat this as a no-op.
    async fn submit_tool_result(&self, call_id: &str, output: &str) -> RealtimeResult<()>;

    /// Ask the model to generate a response now.
    async fn create_response(&self) -> RealtimeResult<()>;

    // -------------------------------------------------------------------------
    // Callbacks (single slot each, last registration wins)
    // -------------------------------------------------------------------------

    /// Register a callback for transcript events.
    fn on_transcript(&self, callback: TranscriptCallback) -> RealtimeResult<()>;

    /// Register a callback for audio output events.
    fn on_audio(&self, callback: AudioOutputCallback) -> RealtimeResult<()>;

    /// Register a callback for tool call events.
    fn on_tool_call(&self, callback: ToolCallCallback) -> RealtimeResult<()>;

    /// Register a callback for connection state changes.
    fn on_state_change(&self, callback: StateChangeCallback) -> RealtimeResult<()>;

    /// Register a callback for business search results.
    fn on_search_results(&self, callback: SearchResultsCallback) -> RealtimeResult<()>;

    /// Register a callback for interruption (barge-in) events.
    fn on_interruption(&self, callback: InterruptionCallback) -> RealtimeResult<()>;

    /// Register a callback for reconnection events.
    fn on_reconnection(&self, callback: ReconnectionCallback) -> RealtimeResult<()>;

    /// Provider name for logs.
    fn provider_name(&self) -> &'static str;
}

/// Shared trait object for voice sessions.
pub type SharedVoiceSession = Arc<dyn VoiceSession>;
