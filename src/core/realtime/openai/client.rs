//! OpenAI Realtime API client over WebRTC.
//!
//! Connection flow:
//!
//! 1. Mint an ephemeral client secret through the gateway session endpoint.
//! 2. Build a peer connection carrying one Opus microphone track and the
//!    `oai-events` data channel.
//! 3. Create an SDP offer, wait for ICE gathering to complete, POST the offer
//!    to the Realtime endpoint with the ephemeral token, and apply the answer.
//! 4. When the data channel opens, send `session.update` with the business
//!    assistant configuration and mark the session connected.
//!
//! Outgoing microphone samples are Opus-encoded in 20ms frames at 48kHz mono.
//! Incoming track audio is Opus-decoded back to PCM16 and handed to the audio
//! callback for playout. Conversation events (transcripts, function calls,
//! speech detection) arrive as JSON on the data channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use audiopus::coder::{Decoder, Encoder};
use audiopus::{Application, Channels, SampleRate};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::oneshot;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MediaEngine};
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

use super::config::{OPENAI_WEBRTC_SAMPLE_RATE, OPUS_FRAME_SAMPLES, OpenAiRealtimeConfig};
use super::messages::{ClientEvent, EVENTS_DATA_CHANNEL_LABEL, ServerEvent, SessionConfig};
use crate::core::realtime::base::{
    AudioOutputCallback, ConnectionState, InterruptionCallback, RealtimeAudioData, RealtimeError,
    RealtimeResult, ReconnectionCallback, ReconnectionEvent, SearchResultsCallback,
    StateChangeCallback, ToolCallCallback, ToolCallRequest, TranscriptCallback, TranscriptResult,
    TranscriptRole, VoiceSession,
};
use crate::core::realtime::router::{SessionCallbacks, TranscriptAccumulator, accumulation_key};
use crate::core::search::GeoPoint;

/// Duration of one Opus frame at the frame size we encode.
const OPUS_FRAME_DURATION: Duration = Duration::from_millis(20);

/// Maximum encoded packet size recommended by libopus.
const MAX_ENCODED_FRAME_BYTES: usize = 4000;

/// Decode buffer size: 120ms at 48kHz, the largest packet Opus allows.
const MAX_DECODED_SAMPLES: usize = 5760;

// =============================================================================
// Session token response
// =============================================================================

/// Subset of the gateway session endpoint response needed to authenticate
/// the SDP exchange.
#[derive(Debug, Deserialize)]
struct SessionTokenResponse {
    client_secret: ClientSecret,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: String,
}

// =============================================================================
// WebRTC plumbing
// =============================================================================

fn opus_codec_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_OPUS.to_owned(),
        clock_rate: OPENAI_WEBRTC_SAMPLE_RATE,
        channels: 2,
        sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
        rtcp_feedback: vec![],
    }
}

fn build_webrtc_api() -> RealtimeResult<API> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_codec(
            RTCRtpCodecParameters {
                capability: opus_codec_capability(),
                payload_type: 111,
                stats_id: String::new(),
            },
            RTPCodecType::Audio,
        )
        .map_err(|e| RealtimeError::WebRtcError(format!("Failed to register Opus codec: {e}")))?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)
        .map_err(|e| RealtimeError::WebRtcError(format!("Failed to register interceptors: {e}")))?;

    let mut setting_engine = SettingEngine::default();
    setting_engine.set_ice_timeouts(
        Some(Duration::from_secs(5)),
        Some(Duration::from_secs(25)),
        Some(Duration::from_secs(2)),
    );

    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .with_setting_engine(setting_engine)
        .build())
}

fn new_opus_encoder() -> RealtimeResult<Encoder> {
    Encoder::new(SampleRate::Hz48000, Channels::Mono, Application::Voip)
        .map_err(|e| RealtimeError::AudioError(format!("Failed to create Opus encoder: {e}")))
}

// =============================================================================
// Session core
// =============================================================================

/// Shared state behind the public session handle.
///
/// Everything lives behind interior mutability so WebRTC handler closures,
/// spawned tasks and the public API can all hold `Arc<SessionCore>`.
struct SessionCore {
    config: OpenAiRealtimeConfig,
    http: reqwest::Client,
    state: RwLock<ConnectionState>,
    mic_active: AtomicBool,
    /// Set by `disconnect` to suppress automatic reconnection.
    intentional_disconnect: AtomicBool,
    /// Guards against concurrent reconnection loops when the data channel
    /// and the peer connection report loss independently.
    reconnecting: AtomicBool,
    peer: AsyncMutex<Option<Arc<RTCPeerConnection>>>,
    data_channel: AsyncMutex<Option<Arc<RTCDataChannel>>>,
    mic_track: AsyncMutex<Option<Arc<TrackLocalStaticSample>>>,
    /// Residual microphone samples not yet filling a whole Opus frame.
    mic_buffer: Mutex<Vec<f32>>,
    encoder: Mutex<Option<Encoder>>,
    /// call_id -> function name, populated by `response.output_item.added`.
    pending_tool_calls: Mutex<HashMap<String, String>>,
    transcripts: Mutex<TranscriptAccumulator>,
    search_center: Mutex<Option<GeoPoint>>,
    callbacks: SessionCallbacks,
}

impl SessionCore {
    fn connection_state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Update the connection state, notifying the state callback on change.
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

    /// Request an ephemeral client secret from the gateway.
    async fn mint_client_secret(&self) -> RealtimeResult<String> {
        let url = self.config.session_token_url();
        let response = self.http.post(&url).send().await.map_err(|e| {
            RealtimeError::AuthenticationFailed(format!("Session token request failed: {e}"))
        })?;

        if !response.status().is_success() {
            return Err(RealtimeError::AuthenticationFailed(format!(
                "Session token endpoint returned {}",
                response.status()
            )));
        }

        let token: SessionTokenResponse = response.json().await.map_err(|e| {
            RealtimeError::AuthenticationFailed(format!("Invalid session token response: {e}"))
        })?;

        if token.client_secret.value.is_empty() {
            return Err(RealtimeError::AuthenticationFailed(
                "Session token response carried an empty client secret".to_string(),
            ));
        }

        Ok(token.client_secret.value)
    }

    /// Run the full connection sequence and store the resulting transport.
    ///
    /// The session is not considered connected until the data channel opens,
    /// which happens after this returns.
    async fn establish(self: &Arc<Self>) -> RealtimeResult<()> {
        let token = self.mint_client_secret().await?;
        tracing::debug!("Ephemeral token received, creating peer connection");

        let api = build_webrtc_api()?;
        let peer = Arc::new(
            api.new_peer_connection(RTCConfiguration::default())
                .await
                .map_err(|e| {
                    RealtimeError::WebRtcError(format!("Failed to create peer connection: {e}"))
                })?,
        );

        // The microphone track and the event channel both have to exist
        // before the offer so they are negotiated in the initial SDP.
        let mic_track = Arc::new(TrackLocalStaticSample::new(
            opus_codec_capability(),
            "audio".to_string(),
            "bizvoice-microphone".to_string(),
        ));
        peer.add_track(Arc::clone(&mic_track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| {
                RealtimeError::WebRtcError(format!("Failed to add microphone track: {e}"))
            })?;

        let data_channel = peer
            .create_data_channel(EVENTS_DATA_CHANNEL_LABEL, None)
            .await
            .map_err(|e| {
                RealtimeError::WebRtcError(format!("Failed to create data channel: {e}"))
            })?;

        self.install_data_channel_handlers(&data_channel);
        self.install_peer_handlers(&peer);

        let (ice_tx, ice_rx) = oneshot::channel::<()>();
        let ice_tx = Arc::new(Mutex::new(Some(ice_tx)));
        peer.on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
            if state == RTCIceGathererState::Complete
                && let Some(tx) = ice_tx.lock().take()
            {
                let _ = tx.send(());
            }
            Box::pin(async {})
        }));

        let offer = peer
            .create_offer(None)
            .await
            .map_err(|e| RealtimeError::WebRtcError(format!("Failed to create offer: {e}")))?;
        peer.set_local_description(offer)
            .await
            .map_err(|e| RealtimeError::WebRtcError(format!("Failed to set offer: {e}")))?;

        // Non-trickle: the Realtime endpoint expects a complete offer, so
        // wait for gathering to finish before sending the SDP.
        let gathering_timeout = Duration::from_secs(self.config.ice_gathering_timeout_secs);
        match tokio::time::timeout(gathering_timeout, ice_rx).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                tracing::debug!("ICE gathering signal dropped, candidates already complete");
            }
            Err(_) => {
                return Err(RealtimeError::Timeout(format!(
                    "ICE gathering did not complete within {}s",
                    gathering_timeout.as_secs()
                )));
            }
        }

        let local_sdp = peer
            .local_description()
            .await
            .map(|d| d.sdp)
            .ok_or_else(|| RealtimeError::WebRtcError("Missing local description".to_string()))?;

        let response = self
            .http
            .post(self.config.sdp_url())
            .bearer_auth(&token)
            .header(CONTENT_TYPE, "application/sdp")
            .body(local_sdp)
            .send()
            .await
            .map_err(|e| RealtimeError::ConnectionFailed(format!("SDP exchange failed: {e}")))?;

        if !response.status().is_success() {
            return Err(RealtimeError::ConnectionFailed(format!(
                "SDP exchange returned {}",
                response.status()
            )));
        }

        let answer_sdp = response.text().await.map_err(|e| {
            RealtimeError::ConnectionFailed(format!("Failed to read SDP answer: {e}"))
        })?;
        let answer = RTCSessionDescription::answer(answer_sdp)
            .map_err(|e| RealtimeError::WebRtcError(format!("Invalid SDP answer: {e}")))?;
        peer.set_remote_description(answer)
            .await
            .map_err(|e| RealtimeError::WebRtcError(format!("Failed to apply answer: {e}")))?;

        *self.encoder.lock() = Some(new_opus_encoder()?);
        self.mic_buffer.lock().clear();

        *self.peer.lock().await = Some(peer);
        *self.data_channel.lock().await = Some(data_channel);
        *self.mic_track.lock().await = Some(mic_track);

        tracing::info!("SDP answer applied, waiting for data channel");
        Ok(())
    }

    fn install_data_channel_handlers(self: &Arc<Self>, channel: &Arc<RTCDataChannel>) {
        let core = Arc::clone(self);
        let dc = Arc::clone(channel);
        channel.on_open(Box::new(move || {
            let core = Arc::clone(&core);
            let dc = Arc::clone(&dc);
            Box::pin(async move {
                tracing::info!("Events data channel open");

                let session = SessionConfig::from_realtime_config(&core.config);
                let update = ClientEvent::SessionUpdate { session };
                match update.to_json() {
                    Ok(json) => {
                        if let Err(e) = dc.send_text(json).await {
                            tracing::error!("Failed to send session configuration: {e}");
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to serialize session configuration: {e}");
                    }
                }

                core.set_state(ConnectionState::Connected).await;
            })
        }));

        let core = Arc::clone(self);
        channel.on_message(Box::new(move |message: DataChannelMessage| {
            let core = Arc::clone(&core);
            Box::pin(async move {
                let text = match std::str::from_utf8(&message.data) {
                    Ok(text) => text,
                    Err(_) => {
                        tracing::warn!("Dropping non-UTF8 data channel message");
                        return;
                    }
                };
                match serde_json::from_str::<ServerEvent>(text) {
                    Ok(event) => core.handle_server_event(event).await,
                    Err(e) => {
                        tracing::warn!("Failed to parse server event: {e}");
                    }
                }
            })
        }));

        let core = Arc::clone(self);
        channel.on_close(Box::new(move || {
            let core = Arc::clone(&core);
            tokio::spawn(async move {
                core.handle_transport_loss("events data channel closed").await;
            });
            Box::pin(async {})
        }));
    }

    fn install_peer_handlers(self: &Arc<Self>, peer: &Arc<RTCPeerConnection>) {
        let core = Arc::clone(self);
        peer.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            tracing::debug!(state = ?state, "Peer connection state changed");
            if matches!(
                state,
                RTCPeerConnectionState::Failed
                    | RTCPeerConnectionState::Disconnected
                    | RTCPeerConnectionState::Closed
            ) {
                let core = Arc::clone(&core);
                tokio::spawn(async move {
                    core.handle_transport_loss("peer connection lost").await;
                });
            }
            Box::pin(async {})
        }));

        let core = Arc::clone(self);
        peer.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
            tracing::info!(kind = ?track.kind(), "Remote track added");
            let core = Arc::clone(&core);
            tokio::spawn(async move {
                core.run_playout_loop(track).await;
            });
            Box::pin(async {})
        }));
    }

    /// Read RTP from the assistant's audio track, decode to PCM16 and hand
    /// each frame to the audio callback. Runs until the track ends.
    async fn run_playout_loop(self: Arc<Self>, track: Arc<TrackRemote>) {
        let mut decoder = match Decoder::new(SampleRate::Hz48000, Channels::Mono) {
            Ok(decoder) => decoder,
            Err(e) => {
                tracing::error!("Failed to create Opus decoder: {e}");
                return;
            }
        };
        let mut pcm = vec![0i16; MAX_DECODED_SAMPLES];

        loop {
            match track.read_rtp().await {
                Ok((packet, _)) => {
                    if packet.payload.is_empty() {
                        continue;
                    }
                    let decoded =
                        match decoder.decode(Some(&packet.payload[..]), &mut pcm[..], false) {
                            Ok(samples) => samples,
                            Err(e) => {
                                tracing::warn!("Opus decode error: {e}");
                                continue;
                            }
                        };

                    let mut data = Vec::with_capacity(decoded * 2);
                    for sample in &pcm[..decoded] {
                        data.extend_from_slice(&sample.to_le_bytes());
                    }

                    self.callbacks
                        .emit_audio(RealtimeAudioData {
                            data: Bytes::from(data),
                            sample_rate: OPENAI_WEBRTC_SAMPLE_RATE,
                            item_id: None,
                            response_id: None,
                        })
                        .await;
                }
                Err(e) => {
                    tracing::debug!("Remote track ended: {e}");
                    break;
                }
            }
        }
    }

    /// Dispatch one event from the data channel to the normalized callbacks.
    async fn handle_server_event(self: &Arc<Self>, event: ServerEvent) {
        match event {
            ServerEvent::SessionCreated { event_id } => {
                tracing::info!(event_id, "Realtime session created");
            }

            ServerEvent::SessionUpdated { .. } => {
                tracing::debug!("Session configuration acknowledged");
            }

            ServerEvent::InputAudioTranscriptionCompleted {
                item_id,
                transcript,
            } => {
                tracing::debug!("User transcript: {transcript}");
                self.callbacks
                    .emit_transcript(TranscriptResult {
                        text: transcript,
                        role: TranscriptRole::User,
                        is_final: true,
                        item_id,
                    })
                    .await;
            }

            ServerEvent::AudioTranscriptDelta {
                response_id,
                item_id,
                delta,
            } => {
                let key = accumulation_key(item_id.as_deref(), response_id.as_deref());
                let text = self.transcripts.lock().push_delta(&key, &delta);
                self.callbacks
                    .emit_transcript(TranscriptResult {
                        text,
                        role: TranscriptRole::Assistant,
                        is_final: false,
                        item_id,
                    })
                    .await;
            }

            ServerEvent::AudioTranscriptDone {
                response_id,
                item_id,
                transcript,
            } => {
                let key = accumulation_key(item_id.as_deref(), response_id.as_deref());
                let text = self.transcripts.lock().finish(&key, Some(&transcript));
                tracing::debug!("Assistant transcript: {text}");
                self.callbacks
                    .emit_transcript(TranscriptResult {
                        text,
                        role: TranscriptRole::Assistant,
                        is_final: true,
                        item_id,
                    })
                    .await;
            }

            ServerEvent::OutputItemAdded { item, .. } => {
                if item.item_type.as_deref() == Some("function_call")
                    && let (Some(call_id), Some(name)) = (item.call_id, item.name)
                {
                    tracing::debug!(call_id, name, "Tracking pending function call");
                    self.pending_tool_calls.lock().insert(call_id, name);
                }
            }

            ServerEvent::FunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
            } => {
                // The name usually arrives earlier via output_item.added; the
                // event's own name field is the fallback.
                let resolved = self.pending_tool_calls.lock().remove(&call_id).or(name);
                let Some(name) = resolved else {
                    tracing::warn!(call_id, "Function call finished without a known name");
                    return;
                };

                let parsed: serde_json::Value = match serde_json::from_str(&arguments) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!(call_id, name, "Unparseable function call arguments: {e}");
                        return;
                    }
                };

                tracing::info!(call_id, name, "Function call requested");
                self.callbacks
                    .emit_tool_call(ToolCallRequest {
                        name,
                        arguments: parsed,
                        call_id: Some(call_id),
                    })
                    .await;
            }

            ServerEvent::SpeechStarted { audio_start_ms, .. } => {
                tracing::debug!(audio_start_ms, "User speech started, interrupting playback");
                self.callbacks.emit_interruption().await;
            }

            ServerEvent::SpeechStopped { audio_end_ms, .. } => {
                tracing::debug!(audio_end_ms, "User speech ended");
            }

            ServerEvent::ResponseDone { response } => {
                let response_id = response
                    .as_ref()
                    .and_then(|r| r.get("id"))
                    .and_then(|id| id.as_str())
                    .unwrap_or("unknown");
                tracing::debug!(response_id, "Response complete");
            }

            ServerEvent::Error { error } => {
                tracing::error!(
                    code = error.code.as_deref().unwrap_or("unknown"),
                    "Realtime API error: {}",
                    error.message
                );
            }

            ServerEvent::Unknown => {
                tracing::trace!("Ignoring unhandled server event");
            }
        }
    }

    /// React to transport loss: tear down, then reconnect with backoff
    /// unless the disconnect was requested.
    async fn handle_transport_loss(self: &Arc<Self>, reason: &str) {
        if self.intentional_disconnect.load(Ordering::SeqCst) {
            return;
        }
        if self
            .reconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        tracing::warn!("Transport lost: {reason}");
        self.teardown_transport().await;
        self.pending_tool_calls.lock().clear();
        self.transcripts.lock().clear();
        self.set_state(ConnectionState::Reconnecting).await;

        let mut attempt: u32 = 0;
        loop {
            if self.intentional_disconnect.load(Ordering::SeqCst) {
                self.set_state(ConnectionState::Disconnected).await;
                break;
            }
            if !self.config.reconnection.should_retry(attempt) {
                tracing::error!("Giving up after {attempt} reconnection attempts");
                self.set_state(ConnectionState::Failed).await;
                break;
            }

            attempt += 1;
            let delay_ms = self.config.reconnection.calculate_delay(attempt);
            tracing::info!(attempt, delay_ms, "Reconnecting to Realtime API");
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;

            if self.intentional_disconnect.load(Ordering::SeqCst) {
                self.set_state(ConnectionState::Disconnected).await;
                break;
            }

            match self.establish().await {
                Ok(()) => {
                    // The fresh data channel re-sends session.update on open,
                    // restoring instructions, VAD and tool definitions.
                    tracing::info!(attempt, "Reconnected to Realtime API");
                    self.callbacks
                        .emit_reconnection(ReconnectionEvent {
                            attempt,
                            success: true,
                            error: None,
                        })
                        .await;
                    break;
                }
                Err(e) => {
                    tracing::warn!(attempt, "Reconnection attempt failed: {e}");
                    self.teardown_transport().await;
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

        self.reconnecting.store(false, Ordering::SeqCst);
    }

    /// Close and drop the transport. Safe to call repeatedly.
    async fn teardown_transport(&self) {
        if let Some(channel) = self.data_channel.lock().await.take() {
            let _ = channel.close().await;
        }
        if let Some(peer) = self.peer.lock().await.take() {
            let _ = peer.close().await;
        }
        *self.mic_track.lock().await = None;
        *self.encoder.lock() = None;
        self.mic_buffer.lock().clear();
    }

    /// Serialize and send a client event over the data channel.
    async fn send_event(&self, event: &ClientEvent) -> RealtimeResult<()> {
        let channel = self.data_channel.lock().await.clone();
        let Some(channel) = channel else {
            return Err(RealtimeError::NotConnected);
        };

        let json = event
            .to_json()
            .map_err(|e| RealtimeError::SerializationError(e.to_string()))?;
        channel
            .send_text(json)
            .await
            .map(|_| ())
            .map_err(|e| RealtimeError::WebRtcError(format!("Data channel send failed: {e}")))
    }

    /// Encode buffered microphone samples into 20ms Opus frames and write
    /// them to the outgoing track.
    async fn encode_and_send(&self, samples: &[f32]) -> RealtimeResult<()> {
        let track = self.mic_track.lock().await.clone();
        let Some(track) = track else {
            return Err(RealtimeError::NotConnected);
        };

        let frames: Vec<Vec<f32>> = {
            let mut buffer = self.mic_buffer.lock();
            buffer.extend_from_slice(samples);
            let mut frames = Vec::new();
            while buffer.len() >= OPUS_FRAME_SAMPLES {
                frames.push(buffer.drain(..OPUS_FRAME_SAMPLES).collect());
            }
            frames
        };

        if frames.is_empty() {
            return Ok(());
        }

        let packets = {
            let mut encoder = self.encoder.lock();
            let encoder = encoder.as_mut().ok_or(RealtimeError::NotConnected)?;
            let mut out = [0u8; MAX_ENCODED_FRAME_BYTES];
            let mut packets = Vec::with_capacity(frames.len());
            for frame in &frames {
                let written = encoder.encode_float(&frame[..], &mut out[..]).map_err(|e| {
                    RealtimeError::AudioError(format!("Opus encode failed: {e}"))
                })?;
                packets.push(Bytes::copy_from_slice(&out[..written]));
            }
            packets
        };

        for data in packets {
            track
                .write_sample(&Sample {
                    data,
                    duration: OPUS_FRAME_DURATION,
                    ..Default::default()
                })
                .await
                .map_err(|e| {
                    RealtimeError::WebRtcError(format!("Failed to write audio sample: {e}"))
                })?;
        }

        Ok(())
    }
}

// =============================================================================
// Public session handle
// =============================================================================

/// Voice session backed by the OpenAI Realtime API over WebRTC.
///
/// The handle is cheap to clone into handler closures; all state lives in a
/// shared core. Sessions start with the microphone muted, matching the
/// browser behavior of acquiring the device but keeping the track disabled
/// until the user opts in.
pub struct OpenAiRealtimeSession {
    core: Arc<SessionCore>,
}

impl OpenAiRealtimeSession {
    /// Create a session from configuration. No network activity until
    /// `connect` is called.
    pub fn new(config: OpenAiRealtimeConfig) -> RealtimeResult<Self> {
        if config.gateway_base_url.is_empty() {
            return Err(RealtimeError::InvalidConfiguration(
                "Gateway base URL is required".to_string(),
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
                reconnecting: AtomicBool::new(false),
                peer: AsyncMutex::new(None),
                data_channel: AsyncMutex::new(None),
                mic_track: AsyncMutex::new(None),
                mic_buffer: Mutex::new(Vec::new()),
                encoder: Mutex::new(None),
                pending_tool_calls: Mutex::new(HashMap::new()),
                transcripts: Mutex::new(TranscriptAccumulator::new()),
                search_center: Mutex::new(None),
                callbacks: SessionCallbacks::default(),
            }),
        })
    }

    /// The configuration this session was built with.
    pub fn config(&self) -> &OpenAiRealtimeConfig {
        &self.core.config
    }
}

#[async_trait]
impl VoiceSession for OpenAiRealtimeSession {
    async fn connect(&self) -> RealtimeResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        self.core
            .intentional_disconnect
            .store(false, Ordering::SeqCst);
        self.core.set_state(ConnectionState::Connecting).await;

        if let Err(e) = self.core.establish().await {
            self.core.teardown_transport().await;
            // Failed is reserved for exhausted reconnection attempts; a
            // first connect that never got through stays retryable.
            self.core.set_state(ConnectionState::Disconnected).await;
            return Err(e);
        }

        Ok(())
    }

    async fn disconnect(&self) -> RealtimeResult<()> {
        self.core
            .intentional_disconnect
            .store(true, Ordering::SeqCst);
        self.core.teardown_transport().await;
        self.core.pending_tool_calls.lock().clear();
        self.core.transcripts.lock().clear();
        self.core.set_state(ConnectionState::Disconnected).await;
        tracing::info!("Disconnected from Realtime API");
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
        self.core.encode_and_send(samples).await
    }

    fn set_microphone_active(&self, active: bool) {
        self.core.mic_active.store(active, Ordering::SeqCst);
        if !active {
            // Drop any partial frame so unmuting starts clean.
            self.core.mic_buffer.lock().clear();
        }
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

    async fn submit_tool_result(&self, call_id: &str, output: &str) -> RealtimeResult<()> {
        let event = ClientEvent::function_call_output(call_id, output);
        self.core.send_event(&event).await
    }

    async fn create_response(&self) -> RealtimeResult<()> {
        self.core.send_event(&ClientEvent::ResponseCreate).await
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
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn test_session() -> OpenAiRealtimeSession {
        OpenAiRealtimeSession::new(OpenAiRealtimeConfig::new("http://localhost:3001")).unwrap()
    }

    #[test]
    fn test_new_requires_gateway_url() {
        let config = OpenAiRealtimeConfig {
            gateway_base_url: String::new(),
            ..Default::default()
        };
        let result = OpenAiRealtimeSession::new(config);
        assert!(matches!(
            result,
            Err(RealtimeError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_initial_state() {
        let session = test_session();
        assert!(!session.is_connected());
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert!(!session.microphone_active());
        assert!(session.search_center().is_none());
        assert_eq!(session.provider_name(), "openai");
    }

    #[test]
    fn test_microphone_gate() {
        let session = test_session();
        session.set_microphone_active(true);
        assert!(session.microphone_active());
        session.set_microphone_active(false);
        assert!(!session.microphone_active());
    }

    #[test]
    fn test_search_center_roundtrip() {
        let session = test_session();
        session.set_search_center(GeoPoint {
            latitude: 38.5816,
            longitude: -121.4944,
        });
        let center = session.search_center().unwrap();
        assert!((center.latitude - 38.5816).abs() < f64::EPSILON);
        assert!((center.longitude - -121.4944).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_send_audio_requires_connection() {
        let session = test_session();
        let result = session.send_audio(&[0.0f32; 960]).await;
        assert!(matches!(result, Err(RealtimeError::NotConnected)));
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_state_disconnected() {
        // Closed port, so the token mint fails before any transport setup.
        let session =
            OpenAiRealtimeSession::new(OpenAiRealtimeConfig::new("http://127.0.0.1:9")).unwrap();

        assert!(session.connect().await.is_err());
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_tool_result_requires_connection() {
        let session = test_session();
        let result = session.submit_tool_result("call_1", "{}").await;
        assert!(matches!(result, Err(RealtimeError::NotConnected)));

        let result = session.create_response().await;
        assert!(matches!(result, Err(RealtimeError::NotConnected)));
    }

    #[tokio::test]
    async fn test_disconnect_when_never_connected() {
        let session = test_session();
        assert!(session.disconnect().await.is_ok());
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_session_token_response_parse() {
        let json = r#"{
            "id": "sess_001",
            "client_secret": {"value": "ek_abc123", "expires_at": 1700000000}
        }"#;
        let parsed: SessionTokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.client_secret.value, "ek_abc123");
    }

    #[tokio::test]
    async fn test_function_call_name_resolution() {
        let session = test_session();
        let core = &session.core;

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_ref = Arc::clone(&calls);
        core.callbacks.set_tool_call(Arc::new(move |request| {
            let calls = Arc::clone(&calls_ref);
            Box::pin(async move {
                assert_eq!(request.name, "search_nearby_business");
                assert_eq!(request.call_id.as_deref(), Some("call_9"));
                assert_eq!(request.arguments["query"], "pizza");
                calls.fetch_add(1, Ordering::SeqCst);
            })
        }));

        // Name arrives via output_item.added, then arguments complete.
        let added: ServerEvent = serde_json::from_str(
            r#"{
                "type": "response.output_item.added",
                "response_id": "resp_1",
                "item": {
                    "id": "item_1",
                    "type": "function_call",
                    "call_id": "call_9",
                    "name": "search_nearby_business"
                }
            }"#,
        )
        .unwrap();
        core.handle_server_event(added).await;
        assert_eq!(core.pending_tool_calls.lock().len(), 1);

        let done: ServerEvent = serde_json::from_str(
            r#"{
                "type": "response.function_call_arguments.done",
                "call_id": "call_9",
                "arguments": "{\"query\": \"pizza\"}"
            }"#,
        )
        .unwrap();
        core.handle_server_event(done).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(core.pending_tool_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_function_call_skipped() {
        let session = test_session();
        let core = &session.core;

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_ref = Arc::clone(&calls);
        core.callbacks.set_tool_call(Arc::new(move |_| {
            let calls = Arc::clone(&calls_ref);
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        }));

        // No output_item.added and no name on the event itself.
        let done: ServerEvent = serde_json::from_str(
            r#"{
                "type": "response.function_call_arguments.done",
                "call_id": "call_unseen",
                "arguments": "{}"
            }"#,
        )
        .unwrap();
        core.handle_server_event(done).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transcript_delta_accumulation() {
        let session = test_session();
        let core = &session.core;

        let finals = Arc::new(parking_lot::Mutex::new(Vec::<TranscriptResult>::new()));
        let finals_ref = Arc::clone(&finals);
        core.callbacks.set_transcript(Arc::new(move |transcript| {
            let finals = Arc::clone(&finals_ref);
            Box::pin(async move {
                if transcript.is_final {
                    finals.lock().push(transcript);
                }
            })
        }));

        for delta in ["Round ", "Table ", "Pizza"] {
            let event: ServerEvent = serde_json::from_str(&format!(
                r#"{{
                    "type": "response.audio_transcript.delta",
                    "response_id": "resp_1",
                    "item_id": "item_1",
                    "delta": "{delta}"
                }}"#
            ))
            .unwrap();
            core.handle_server_event(event).await;
        }

        let done: ServerEvent = serde_json::from_str(
            r#"{
                "type": "response.audio_transcript.done",
                "response_id": "resp_1",
                "item_id": "item_1",
                "transcript": "Round Table Pizza"
            }"#,
        )
        .unwrap();
        core.handle_server_event(done).await;

        let finals = finals.lock();
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].text, "Round Table Pizza");
        assert_eq!(finals[0].role, TranscriptRole::Assistant);
        assert!(core.transcripts.lock().in_progress() == 0);
    }

    #[tokio::test]
    async fn test_speech_started_emits_interruption() {
        let session = test_session();
        let core = &session.core;

        let interruptions = Arc::new(AtomicUsize::new(0));
        let interruptions_ref = Arc::clone(&interruptions);
        core.callbacks.set_interruption(Arc::new(move || {
            let interruptions = Arc::clone(&interruptions_ref);
            Box::pin(async move {
                interruptions.fetch_add(1, Ordering::SeqCst);
            })
        }));

        let event: ServerEvent = serde_json::from_str(
            r#"{"type": "input_audio_buffer.speech_started", "audio_start_ms": 120, "item_id": "item_2"}"#,
        )
        .unwrap();
        core.handle_server_event(event).await;

        assert_eq!(interruptions.load(Ordering::SeqCst), 1);
    }
}
