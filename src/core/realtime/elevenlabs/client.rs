//! ElevenLabs Conversational AI client over WebSocket.
//!
//! The session connects to a signed conversation URL minted by the gateway
//! (falling back to the public endpoint when an agent ID is configured),
//! streams base64 PCM16 microphone audio up as `user_audio_chunk` messages,
//! and receives transcripts, agent audio and tool calls back. The agent
//! platform runs its own turn-taking, so there is no response-control
//! channel: tool results are consumed by the application, not submitted back
//! into the conversation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::config::ElevenLabsConfig;
use super::messages::{ConvAiEvent, Pong, UserAudioChunk, parse_event};
use crate::core::audio::{AudioSink, PlayoutQueue, f32_to_pcm16, samples_to_pcm16_bytes};
use crate::core::realtime::base::{
    AudioOutputCallback, ConnectionState, InterruptionCallback, RealtimeAudioData, RealtimeError,
    RealtimeResult, ReconnectionCallback, ReconnectionEvent, SearchResultsCallback,
    StateChangeCallback, ToolCallCallback, ToolCallRequest, TranscriptCallback, TranscriptResult,
    TranscriptRole, VoiceSession,
};
use crate::core::realtime::router::SessionCallbacks;
use crate::core::search::GeoPoint;

/// Capacity of the outbound message channel.
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Response from the gateway signed URL endpoint.
#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    signed_url: String,
}

// =============================================================================
// Session core
// =============================================================================

struct SessionCore {
    config: ElevenLabsConfig,
    http: reqwest::Client,
    state: RwLock<ConnectionState>,
    mic_active: AtomicBool,
    /// Set by `disconnect` to suppress automatic reconnection.
    intentional_disconnect: AtomicBool,
    outbound: AsyncMutex<Option<mpsc::Sender<Message>>>,
    task: AsyncMutex<Option<JoinHandle<()>>>,
    search_center: Mutex<Option<GeoPoint>>,
    /// Local playout queue, present once a sink is attached. Agent audio
    /// feeds it and interruptions clear it.
    playout: Mutex<Option<PlayoutQueue>>,
    callbacks: SessionCallbacks,
}

impl SessionCore {
    fn connection_state(&self) -> ConnectionState {
        *self.state.read()
    }

    async fn set_state(&self, next: ConnectionState) {
        let changed = {
            let mut state = self.state.write();
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        };
        if changed {
            tracing::debug!(state = %next, "Connection state changed");
            self.callbacks.emit_state_change(next).await;
        }
    }

    /// Obtain a conversation URL: a gateway-signed one when possible, the
    /// public endpoint otherwise.
    async fn fetch_conversation_url(&self) -> RealtimeResult<String> {
        let url = self.config.session_url();
        match self.http.post(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let body: SignedUrlResponse = response.json().await.map_err(|e| {
                    RealtimeError::AuthenticationFailed(format!(
                        "Invalid signed URL response: {e}"
                    ))
                })?;
                if body.signed_url.is_empty() {
                    return Err(RealtimeError::AuthenticationFailed(
                        "Signed URL response was empty".to_string(),
                    ));
                }
                Ok(body.signed_url)
            }
            Ok(response) => {
                tracing::warn!(
                    status = %response.status(),
                    "Signed URL endpoint failed"
                );
                self.public_fallback_url()
            }
            Err(e) => {
                tracing::warn!("Signed URL request failed: {e}");
                self.public_fallback_url()
            }
        }
    }

    fn public_fallback_url(&self) -> RealtimeResult<String> {
        match self.config.agent_id.as_deref() {
            Some(agent_id) if !agent_id.is_empty() => {
                tracing::warn!("Falling back to the public conversation endpoint");
                Ok(self.config.public_ws_url(agent_id))
            }
            _ => Err(RealtimeError::AuthenticationFailed(
                "Could not obtain a signed URL and no agent ID is configured".to_string(),
            )),
        }
    }

    async fn open_socket(&self) -> RealtimeResult<WsStream> {
        let url = self.fetch_conversation_url().await?;
        let (socket, _response) =
            tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| {
                    RealtimeError::WebSocketError(format!("WebSocket connect failed: {e}"))
                })?;
        Ok(socket)
    }

    /// Pump the WebSocket until disconnect, reconnecting with backoff on
    /// transport loss.
    async fn run_connection(self: Arc<Self>, socket: WsStream, mut rx: mpsc::Receiver<Message>) {
        let (mut sink, mut stream) = socket.split();
        let mut attempt: u32 = 0;

        'outer: loop {
            loop {
                tokio::select! {
                    Some(message) = rx.recv() => {
                        if let Err(e) = sink.send(message).await {
                            tracing::error!("Failed to send WebSocket message: {e}");
                            break;
                        }
                    }

                    Some(message) = stream.next() => {
                        match message {
                            Ok(Message::Text(text)) => {
                                if let Some(reply) = self.handle_text_message(&text).await
                                    && let Err(e) = sink.send(Message::Text(reply.into())).await
                                {
                                    tracing::error!("Failed to send pong: {e}");
                                    break;
                                }
                            }
                            Ok(Message::Ping(payload)) => {
                                if let Err(e) = sink.send(Message::Pong(payload)).await {
                                    tracing::error!("Failed to send pong frame: {e}");
                                }
                            }
                            Ok(Message::Close(_)) => {
                                tracing::info!("WebSocket closed by server");
                                break;
                            }
                            Err(e) => {
                                tracing::error!("WebSocket error: {e}");
                                break;
                            }
                            _ => {}
                        }
                    }

                    else => break,
                }
            }

            if self.intentional_disconnect.load(Ordering::SeqCst) {
                self.set_state(ConnectionState::Disconnected).await;
                break 'outer;
            }

            self.set_state(ConnectionState::Reconnecting).await;

            // Signed URLs are single-use, so every attempt mints a new one.
            loop {
                if self.intentional_disconnect.load(Ordering::SeqCst) {
                    self.set_state(ConnectionState::Disconnected).await;
                    break 'outer;
                }
                if !self.config.reconnection.should_retry(attempt) {
                    tracing::error!("Giving up after {attempt} reconnection attempts");
                    self.set_state(ConnectionState::Failed).await;
                    break 'outer;
                }

                attempt += 1;
                let delay_ms = self.config.reconnection.calculate_delay(attempt);
                tracing::info!(attempt, delay_ms, "Reconnecting to conversation");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                if self.intentional_disconnect.load(Ordering::SeqCst) {
                    self.set_state(ConnectionState::Disconnected).await;
                    break 'outer;
                }

                match self.open_socket().await {
                    Ok(socket) => {
                        let (new_sink, new_stream) = socket.split();
                        sink = new_sink;
                        stream = new_stream;
                        self.set_state(ConnectionState::Connected).await;
                        tracing::info!(attempt, "Reconnected to conversation");
                        self.callbacks
                            .emit_reconnection(ReconnectionEvent {
                                attempt,
                                success: true,
                                error: None,
                            })
                            .await;
                        attempt = 0;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(attempt, "Reconnection attempt failed: {e}");
                        self.callbacks
                            .emit_reconnection(ReconnectionEvent {
                                attempt,
                                success: false,
                                error: Some(e.to_string()),
                            })
                            .await;
                    }
                }
            }
        }

        *self.outbound.lock().await = None;
        tracing::info!("Conversation task ended");
    }

    /// Dispatch one text message. Returns a serialized reply when the
    /// message demands one (pings).
    async fn handle_text_message(self: &Arc<Self>, text: &str) -> Option<String> {
        let event = match parse_event(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Failed to parse conversation message: {e}");
                return None;
            }
        };

        match event {
            ConvAiEvent::ConversationInitiated => {
                tracing::info!("Conversation initiated");
                None
            }

            ConvAiEvent::UserTranscript(text) => {
                tracing::debug!("User transcript: {text}");
                self.callbacks
                    .emit_transcript(TranscriptResult {
                        text,
                        role: TranscriptRole::User,
                        is_final: true,
                        item_id: None,
                    })
                    .await;
                None
            }

            ConvAiEvent::AgentResponse(text) => {
                tracing::debug!("Agent response: {text}");
                self.callbacks
                    .emit_transcript(TranscriptResult {
                        text,
                        role: TranscriptRole::Assistant,
                        is_final: true,
                        item_id: None,
                    })
                    .await;
                None
            }

            ConvAiEvent::Audio { audio_base64 } => {
                match BASE64_STANDARD.decode(audio_base64.as_bytes()) {
                    Ok(bytes) => {
                        let chunk = RealtimeAudioData {
                            data: Bytes::from(bytes),
                            sample_rate: self.config.sample_rate,
                            item_id: None,
                            response_id: None,
                        };
                        if let Some(queue) = self.playout.lock().clone() {
                            queue.enqueue(chunk.clone());
                        }
                        self.callbacks.emit_audio(chunk).await;
                    }
                    Err(e) => {
                        tracing::warn!("Invalid audio payload: {e}");
                    }
                }
                None
            }

            ConvAiEvent::Interruption => {
                tracing::debug!("User interrupted, clearing playback");
                if let Some(queue) = self.playout.lock().clone() {
                    queue.clear();
                }
                self.callbacks.emit_interruption().await;
                None
            }

            ConvAiEvent::Ping { event_id } => match serde_json::to_string(&Pong::new(event_id)) {
                Ok(json) => Some(json),
                Err(e) => {
                    tracing::error!("Failed to serialize pong: {e}");
                    None
                }
            },

            ConvAiEvent::ToolCall {
                tool_name,
                parameters,
                tool_call_id,
            } => {
                tracing::info!(tool_name, "Tool call requested");
                self.callbacks
                    .emit_tool_call(ToolCallRequest {
                        name: tool_name,
                        arguments: parameters,
                        call_id: tool_call_id,
                    })
                    .await;
                None
            }

            ConvAiEvent::ProviderError(message) => {
                tracing::error!("Conversation error: {message}");
                None
            }

            ConvAiEvent::Ignored => None,
        }
    }
}

// =============================================================================
// Public session handle
// =============================================================================

/// Voice session backed by ElevenLabs Conversational AI.
///
/// Sessions start with the microphone muted; captured frames are dropped
/// until the gate opens.
pub struct ElevenLabsSession {
    core: Arc<SessionCore>,
}

impl ElevenLabsSession {
    /// Create a session from configuration. No network activity until
    /// `connect` is called.
    pub fn new(config: ElevenLabsConfig) -> RealtimeResult<Self> {
        if config.gateway_base_url.is_empty() && config.agent_id.is_none() {
            return Err(RealtimeError::InvalidConfiguration(
                "Either a gateway base URL or an agent ID is required".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.connection_timeout_secs))
            .build()
            .map_err(|e| {
                RealtimeError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            core: Arc::new(SessionCore {
                config,
                http,
                state: RwLock::new(ConnectionState::Disconnected),
                mic_active: AtomicBool::new(false),
                intentional_disconnect: AtomicBool::new(false),
                outbound: AsyncMutex::new(None),
                task: AsyncMutex::new(None),
                search_center: Mutex::new(None),
                playout: Mutex::new(None),
                callbacks: SessionCallbacks::default(),
            }),
        })
    }

    /// The configuration this session was built with.
    pub fn config(&self) -> &ElevenLabsConfig {
        &self.core.config
    }

    /// Route agent audio through a local playout queue draining into `sink`.
    ///
    /// Chunks play strictly in arrival order; a user interruption drops the
    /// unplayed tail while the chunk already in the sink finishes. Without a
    /// sink the session only emits `on_audio` callbacks and the host owns
    /// playback. Returns a handle to the queue.
    pub fn attach_playout_sink(&self, sink: Arc<dyn AudioSink>) -> PlayoutQueue {
        let queue = PlayoutQueue::new(sink);
        *self.core.playout.lock() = Some(queue.clone());
        queue
    }
}

#[async_trait]
impl VoiceSession for ElevenLabsSession {
    async fn connect(&self) -> RealtimeResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        self.core
            .intentional_disconnect
            .store(false, Ordering::SeqCst);
        self.core.set_state(ConnectionState::Connecting).await;

        let socket = match self.core.open_socket().await {
            Ok(socket) => socket,
            Err(e) => {
                // Failed is reserved for exhausted reconnection attempts; a
                // first connect that never got through stays retryable.
                self.core.set_state(ConnectionState::Disconnected).await;
                return Err(e);
            }
        };
        tracing::info!("Connected to conversation WebSocket");

        let (tx, rx) = mpsc::channel::<Message>(OUTBOUND_CHANNEL_CAPACITY);
        *self.core.outbound.lock().await = Some(tx);

        let core = Arc::clone(&self.core);
        let handle = tokio::spawn(async move {
            core.run_connection(socket, rx).await;
        });
        *self.core.task.lock().await = Some(handle);

        self.core.set_state(ConnectionState::Connected).await;
        Ok(())
    }

    async fn disconnect(&self) -> RealtimeResult<()> {
        self.core
            .intentional_disconnect
            .store(true, Ordering::SeqCst);
        *self.core.outbound.lock().await = None;

        if let Some(handle) = self.core.task.lock().await.take() {
            handle.abort();
        }

        self.core.set_state(ConnectionState::Disconnected).await;
        tracing::info!("Disconnected from conversation");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.core.connection_state() == ConnectionState::Connected
    }

    fn connection_state(&self) -> ConnectionState {
        self.core.connection_state()
    }

    async fn send_audio(&self, samples: &[f32]) -> RealtimeResult<()> {
        if !self.is_connected() {
            return Err(RealtimeError::NotConnected);
        }
        if !self.microphone_active() {
            return Ok(());
        }

        let pcm = f32_to_pcm16(samples);
        let encoded = BASE64_STANDARD.encode(samples_to_pcm16_bytes(&pcm));
        let chunk = UserAudioChunk {
            user_audio_chunk: encoded,
        };
        let json = serde_json::to_string(&chunk)
            .map_err(|e| RealtimeError::SerializationError(e.to_string()))?;

        let sender = self.core.outbound.lock().await.clone();
        let Some(sender) = sender else {
            return Err(RealtimeError::NotConnected);
        };
        sender
            .send(Message::Text(json.into()))
            .await
            .map_err(|_| RealtimeError::NotConnected)
    }

    fn set_microphone_active(&self, active: bool) {
        self.core.mic_active.store(active, Ordering::SeqCst);
        tracing::debug!(active, "Microphone gate changed");
    }

    fn microphone_active(&self) -> bool {
        self.core.mic_active.load(Ordering::SeqCst)
    }

    fn set_search_center(&self, center: GeoPoint) {
        *self.core.search_center.lock() = Some(center);
    }

    fn search_center(&self) -> Option<GeoPoint> {
        *self.core.search_center.lock()
    }

    /// The agent platform consumes tool results out of band, so this is a
    /// no-op kept for trait symmetry.
    async fn submit_tool_result(&self, _call_id: &str, _output: &str) -> RealtimeResult<()> {
        tracing::debug!("Tool results are not submitted back into the conversation");
        Ok(())
    }

    /// The agent drives its own turn-taking; there is nothing to trigger.
    async fn create_response(&self) -> RealtimeResult<()> {
        Ok(())
    }

    fn on_transcript(&self, callback: TranscriptCallback) -> RealtimeResult<()> {
        self.core.callbacks.set_transcript(callback);
        Ok(())
    }

    fn on_audio(&self, callback: AudioOutputCallback) -> RealtimeResult<()> {
        self.core.callbacks.set_audio(callback);
        Ok(())
    }

    fn on_tool_call(&self, callback: ToolCallCallback) -> RealtimeResult<()> {
        self.core.callbacks.set_tool_call(callback);
        Ok(())
    }

    fn on_state_change(&self, callback: StateChangeCallback) -> RealtimeResult<()> {
        self.core.callbacks.set_state_change(callback);
        Ok(())
    }

    fn on_search_results(&self, callback: SearchResultsCallback) -> RealtimeResult<()> {
        self.core.callbacks.set_search_results(callback);
        Ok(())
    }

    fn on_interruption(&self, callback: InterruptionCallback) -> RealtimeResult<()> {
        self.core.callbacks.set_interruption(callback);
        Ok(())
    }

    fn on_reconnection(&self, callback: ReconnectionCallback) -> RealtimeResult<()> {
        self.core.callbacks.set_reconnection(callback);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "elevenlabs"
    }
}
