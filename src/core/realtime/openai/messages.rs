//! OpenAI Realtime API data-channel event types.
//!
//! Events are JSON-encoded and exchanged over the `oai-events` WebRTC data
//! channel. Response audio itself arrives on the remote media track, not as
//! events.
//!
//! # Protocol Overview
//!
//! Client events (sent to server):
//! - session.update - Configure the session after the channel opens
//! - conversation.item.create - Submit a function call output
//! - response.create - Ask the model to respond
//!
//! Server events (received from server):
//! - session.created / session.updated - Session lifecycle
//! - conversation.item.input_audio_transcription.completed - User transcript
//! - response.audio_transcript.delta / .done - Assistant transcript
//! - response.output_item.added - Output item (function calls announce here)
//! - response.function_call_arguments.done - Function call arguments ready
//! - input_audio_buffer.speech_started / speech_stopped - Server VAD
//! - response.done - Response complete
//! - error - Error occurred

use serde::{Deserialize, Serialize};

use super::config::{OpenAiRealtimeConfig, VadSettings};

/// Label of the WebRTC data channel carrying session events.
pub const EVENTS_DATA_CHANNEL_LABEL: &str = "oai-events";

/// Name of the business search tool exposed to the model.
pub const SEARCH_TOOL_NAME: &str = "search_nearby_business";

// =============================================================================
// Session Configuration
// =============================================================================

/// Session configuration payload for `session.update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Response modalities (text, audio)
    pub modalities: Vec<String>,

    /// System instructions for the assistant
    pub instructions: String,

    /// Voice for audio output
    pub voice: String,

    /// Input audio format
    pub input_audio_format: String,

    /// Output audio format
    pub output_audio_format: String,

    /// Input audio transcription configuration
    pub input_audio_transcription: InputAudioTranscription,

    /// Turn detection configuration
    pub turn_detection: TurnDetection,

    /// Tool definitions
    pub tools: Vec<ToolDef>,

    /// Tool choice strategy
    pub tool_choice: String,

    /// Temperature for response generation
    pub temperature: f32,
}

impl SessionConfig {
    /// Build the business-search session configuration from client config.
    pub fn from_realtime_config(config: &OpenAiRealtimeConfig) -> Self {
        Self {
            modalities: vec!["text".to_string(), "audio".to_string()],
            instructions: config.instructions.clone(),
            voice: config.voice.clone(),
            input_audio_format: "pcm16".to_string(),
            output_audio_format: "pcm16".to_string(),
            input_audio_transcription: InputAudioTranscription {
                model: "whisper-1".to_string(),
            },
            turn_detection: TurnDetection::server_vad(&config.vad),
            tools: vec![ToolDef::search_nearby_business()],
            tool_choice: "auto".to_string(),
            temperature: config.temperature,
        }
    }
}

/// Input audio transcription configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    /// Transcription model (e.g., "whisper-1")
    pub model: String,
}

/// Turn detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    /// Server-side VAD
    #[serde(rename = "server_vad")]
    ServerVad {
        /// Activation threshold
        threshold: f32,
        /// Audio prefix padding in ms
        prefix_padding_ms: u32,
        /// Silence duration ending a turn in ms
        silence_duration_ms: u32,
    },
}

impl TurnDetection {
    fn server_vad(vad: &VadSettings) -> Self {
        Self::ServerVad {
            threshold: vad.threshold,
            prefix_padding_ms: vad.prefix_padding_ms,
            silence_duration_ms: vad.silence_duration_ms,
        }
    }
}

/// A tool (function) exposed to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    /// Tool type, always "function"
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function name
    pub name: String,
    /// Description guiding when the model should call it
    pub description: String,
    /// JSON Schema for the arguments
    pub parameters: serde_json::Value,
}

impl ToolDef {
    /// The `search_nearby_business` function definition. Only `query` is
    /// required; coordinates are resolved client-side when absent.
    pub fn search_nearby_business() -> Self {
        Self {
            tool_type: "function".to_string(),
            name: SEARCH_TOOL_NAME.to_string(),
            description: "Search for businesses near the user location in Sacramento County, \
                California. Use this ONLY when user explicitly asks to find, search for, or \
                locate businesses, restaurants, shops, services, or any commercial establishments. \
                DO NOT use for general questions, weather, jokes, or unrelated topics."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What the user is searching for (e.g., \"парикмахерская\", \"русская кухня\", \"coffee shop\")"
                    },
                    "latitude": {
                        "type": "number",
                        "description": "User latitude coordinate"
                    },
                    "longitude": {
                        "type": "number",
                        "description": "User longitude coordinate"
                    }
                },
                "required": ["query"]
            }),
        }
    }
}

// =============================================================================
// Client Events
// =============================================================================

/// Events sent to the server over the data channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update session configuration
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// New session configuration
        session: SessionConfig,
    },

    /// Add an item to the conversation (function call outputs)
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        /// The item to add
        item: ConversationItem,
    },

    /// Ask the model to generate a response
    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    /// Serialize to the JSON wire format.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// A `conversation.item.create` carrying a function call output.
    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::ConversationItemCreate {
            item: ConversationItem {
                item_type: "function_call_output".to_string(),
                call_id: call_id.into(),
                output: output.into(),
            },
        }
    }
}

/// Conversation item for function call outputs.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationItem {
    /// Item type, "function_call_output"
    #[serde(rename = "type")]
    pub item_type: String,
    /// Call ID the output answers
    pub call_id: String,
    /// Output payload (stringified JSON or plain text)
    pub output: String,
}

// =============================================================================
// Server Events
// =============================================================================

/// Events received from the server over the data channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Session created
    #[serde(rename = "session.created")]
    SessionCreated {
        /// Event ID
        event_id: Option<String>,
    },

    /// Session configuration acknowledged
    #[serde(rename = "session.updated")]
    SessionUpdated {
        /// Event ID
        event_id: Option<String>,
    },

    /// Final transcript of user speech
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputAudioTranscriptionCompleted {
        /// Conversation item ID
        item_id: Option<String>,
        /// Transcribed text
        transcript: String,
    },

    /// Incremental assistant transcript
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta {
        /// Response ID
        response_id: Option<String>,
        /// Output item ID
        item_id: Option<String>,
        /// Text fragment
        delta: String,
    },

    /// Assistant transcript complete
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone {
        /// Response ID
        response_id: Option<String>,
        /// Output item ID
        item_id: Option<String>,
        /// Full transcript
        transcript: String,
    },

    /// Output item added to a response; function calls announce their
    /// call_id and name here
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        /// Response ID
        response_id: Option<String>,
        /// The added item
        item: OutputItem,
    },

    /// Function call arguments fully received
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        /// Call ID
        call_id: String,
        /// Function name (also tracked via OutputItemAdded)
        name: Option<String>,
        /// Arguments as a JSON string
        arguments: String,
    },

    /// Server VAD detected the start of user speech
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        /// Milliseconds into the audio buffer
        audio_start_ms: Option<u64>,
        /// Item ID of the in-progress user turn
        item_id: Option<String>,
    },

    /// Server VAD detected the end of user speech
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        /// Milliseconds into the audio buffer
        audio_end_ms: Option<u64>,
        /// Item ID of the user turn
        item_id: Option<String>,
    },

    /// Response generation complete
    #[serde(rename = "response.done")]
    ResponseDone {
        /// The completed response
        response: Option<serde_json::Value>,
    },

    /// Error from the server
    #[serde(rename = "error")]
    Error {
        /// Error details
        error: ErrorDetails,
    },

    /// Any event type this client does not handle
    #[serde(other)]
    Unknown,
}

/// Output item within a response.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputItem {
    /// Item ID
    pub id: Option<String>,
    /// Item type ("message", "function_call", ...)
    #[serde(rename = "type")]
    pub item_type: Option<String>,
    /// Call ID for function_call items
    pub call_id: Option<String>,
    /// Function name for function_call items
    pub name: Option<String>,
}

/// Error details from the server.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetails {
    /// Error type
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    /// Error code
    pub code: Option<String>,
    /// Human-readable message
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::realtime::openai::config::OpenAiRealtimeConfig;

    #[test]
    fn test_session_update_serialization() {
        let config = OpenAiRealtimeConfig::default();
        let event = ClientEvent::SessionUpdate {
            session: SessionConfig::from_realtime_config(&config),
        };

        let json: serde_json::Value =
            serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "session.update");
        assert_eq!(json["session"]["modalities"][0], "text");
        assert_eq!(json["session"]["modalities"][1], "audio");
        assert_eq!(json["session"]["voice"], "alloy");
        assert_eq!(json["session"]["input_audio_format"], "pcm16");
        assert_eq!(json["session"]["output_audio_format"], "pcm16");
        assert_eq!(
            json["session"]["input_audio_transcription"]["model"],
            "whisper-1"
        );
        assert_eq!(json["session"]["turn_detection"]["type"], "server_vad");
        assert_eq!(json["session"]["turn_detection"]["threshold"], 0.5);
        assert_eq!(json["session"]["turn_detection"]["prefix_padding_ms"], 300);
        assert_eq!(
            json["session"]["turn_detection"]["silence_duration_ms"],
            500
        );
        assert_eq!(json["session"]["tool_choice"], "auto");
        assert_eq!(json["session"]["tools"][0]["name"], "search_nearby_business");
        assert_eq!(
            json["session"]["tools"][0]["parameters"]["required"][0],
            "query"
        );
    }

    #[test]
    fn test_function_call_output_serialization() {
        let event = ClientEvent::function_call_output("call_abc", "I found 2 options.");
        let json: serde_json::Value =
            serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "conversation.item.create");
        assert_eq!(json["item"]["type"], "function_call_output");
        assert_eq!(json["item"]["call_id"], "call_abc");
        assert_eq!(json["item"]["output"], "I found 2 options.");
    }

    #[test]
    fn test_response_create_serialization() {
        let json: serde_json::Value =
            serde_json::from_str(&ClientEvent::ResponseCreate.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "response.create");
    }

    #[test]
    fn test_transcript_delta_deserialization() {
        let json = r#"{
            "type": "response.audio_transcript.delta",
            "response_id": "resp_1",
            "item_id": "item_1",
            "delta": "I found"
        }"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::AudioTranscriptDelta {
                response_id,
                item_id,
                delta,
            } => {
                assert_eq!(response_id.as_deref(), Some("resp_1"));
                assert_eq!(item_id.as_deref(), Some("item_1"));
                assert_eq!(delta, "I found");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_function_call_events_deserialization() {
        let added = r#"{
            "type": "response.output_item.added",
            "response_id": "resp_1",
            "item": {
                "id": "item_fc",
                "type": "function_call",
                "call_id": "call_123",
                "name": "search_nearby_business"
            }
        }"#;
        let event: ServerEvent = serde_json::from_str(added).unwrap();
        match event {
            ServerEvent::OutputItemAdded { item, .. } => {
                assert_eq!(item.item_type.as_deref(), Some("function_call"));
                assert_eq!(item.call_id.as_deref(), Some("call_123"));
                assert_eq!(item.name.as_deref(), Some("search_nearby_business"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let done = r#"{
            "type": "response.function_call_arguments.done",
            "call_id": "call_123",
            "arguments": "{\"query\":\"coffee shop\"}"
        }"#;
        let event: ServerEvent = serde_json::from_str(done).unwrap();
        match event {
            ServerEvent::FunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
            } => {
                assert_eq!(call_id, "call_123");
                assert!(name.is_none());
                assert_eq!(arguments, "{\"query\":\"coffee shop\"}");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_deserialization() {
        let json = r#"{"type": "rate_limits.updated", "rate_limits": []}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, ServerEvent::Unknown));
    }

    #[test]
    fn test_error_event_deserialization() {
        let json = r#"{
            "type": "error",
            "error": {"type": "invalid_request_error", "code": "bad", "message": "nope"}
        }"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::Error { error } => {
                assert_eq!(error.message, "nope");
                assert_eq!(error.code.as_deref(), Some("bad"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_speech_started_deserialization() {
        let json = r#"{
            "type": "input_audio_buffer.speech_started",
            "audio_start_ms": 1200,
            "item_id": "item_9"
        }"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::SpeechStarted { audio_start_ms, .. } => {
                assert_eq!(audio_start_ms, Some(1200));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
