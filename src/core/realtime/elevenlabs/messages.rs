//! ConvAI wire messages.
//!
//! The conversation WebSocket speaks two dialects. Older agent runtimes emit
//! flat fields with no `type` tag (`audio`, `user_transcription`,
//! `agent_response`, `interruption`, `ping_event`); current runtimes emit
//! tagged events, some with nested payloads (`audio_event.audio_base_64`,
//! `client_tool_call`). Normalization checks the legacy fields first and
//! falls through to the tagged dispatch, so either dialect lands on the same
//! [`ConvAiEvent`].

use serde::Serialize;
use serde_json::Value;

/// Outbound microphone audio: base64 PCM16 at 16kHz.
#[derive(Debug, Clone, Serialize)]
pub struct UserAudioChunk {
    pub user_audio_chunk: String,
}

/// Reply to a server ping, echoing its event ID.
#[derive(Debug, Clone, Serialize)]
pub struct Pong {
    #[serde(rename = "type")]
    pub message_type: String,
    pub event_id: Value,
}

impl Pong {
    pub fn new(event_id: Value) -> Self {
        Self {
            message_type: "pong".to_string(),
            event_id,
        }
    }
}

/// A ConvAI event normalized out of either wire dialect.
#[derive(Debug, Clone, PartialEq)]
pub enum ConvAiEvent {
    /// Conversation metadata received, session is live
    ConversationInitiated,
    /// Final transcript of user speech
    UserTranscript(String),
    /// Agent reply text
    AgentResponse(String),
    /// Base64 PCM16 audio chunk for playout
    Audio {
        audio_base64: String,
    },
    /// User barge-in, playback should stop
    Interruption,
    /// Keepalive ping that expects a pong with the same event ID
    Ping {
        event_id: Value,
    },
    /// Client-side tool invocation
    ToolCall {
        tool_name: String,
        parameters: Value,
        tool_call_id: Option<String>,
    },
    /// Error reported by the agent platform
    ProviderError(String),
    /// Anything not handled
    Ignored,
}

/// Parse one WebSocket text message into a normalized event.
pub fn parse_event(text: &str) -> Result<ConvAiEvent, serde_json::Error> {
    let message: Value = serde_json::from_str(text)?;
    Ok(normalize(&message))
}

fn normalize(message: &Value) -> ConvAiEvent {
    // Legacy flat fields win; a message matches exactly one shape.
    if let Some(audio) = message.get("audio").and_then(Value::as_str) {
        return ConvAiEvent::Audio {
            audio_base64: audio.to_string(),
        };
    }

    if message.get("conversation_initiation_metadata_event").is_some() {
        return ConvAiEvent::ConversationInitiated;
    }

    if let Some(value) = message.get("user_transcription") {
        return match transcript_text(value, "user_transcript") {
            Some(text) => ConvAiEvent::UserTranscript(text),
            None => ConvAiEvent::Ignored,
        };
    }

    // Catches both the legacy shape and the tagged event, which carries the
    // same flat field.
    if let Some(value) = message.get("agent_response") {
        return match transcript_text(value, "agent_response") {
            Some(text) => ConvAiEvent::AgentResponse(text),
            None => ConvAiEvent::Ignored,
        };
    }

    if message.get("interruption").is_some() {
        return ConvAiEvent::Interruption;
    }

    if let Some(ping) = message.get("ping_event") {
        return ConvAiEvent::Ping {
            event_id: ping.get("event_id").cloned().unwrap_or(Value::Null),
        };
    }

    match message.get("type").and_then(Value::as_str) {
        Some("conversation_initiation_metadata") => ConvAiEvent::ConversationInitiated,

        Some("user_transcript") => match message.get("user_transcript").and_then(Value::as_str) {
            Some(text) => ConvAiEvent::UserTranscript(text.to_string()),
            None => ConvAiEvent::Ignored,
        },

        Some("audio") => match message
            .get("audio_event")
            .and_then(|event| event.get("audio_base_64"))
            .and_then(Value::as_str)
        {
            Some(audio) => ConvAiEvent::Audio {
                audio_base64: audio.to_string(),
            },
            None => ConvAiEvent::Ignored,
        },

        Some("interruption") => ConvAiEvent::Interruption,

        Some("ping") => ConvAiEvent::Ping {
            event_id: message.get("event_id").cloned().unwrap_or(Value::Null),
        },

        Some("tool_call") => tool_call_event(message),

        Some("client_tool_call") => match message.get("client_tool_call") {
            Some(inner) => tool_call_event(inner),
            None => ConvAiEvent::Ignored,
        },

        Some("error") => ConvAiEvent::ProviderError(
            message
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error")
                .to_string(),
        ),

        _ => ConvAiEvent::Ignored,
    }
}

fn tool_call_event(payload: &Value) -> ConvAiEvent {
    let Some(tool_name) = payload.get("tool_name").and_then(Value::as_str) else {
        return ConvAiEvent::Ignored;
    };
    ConvAiEvent::ToolCall {
        tool_name: tool_name.to_string(),
        parameters: payload
            .get("parameters")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default())),
        tool_call_id: payload
            .get("tool_call_id")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// Legacy transcript payloads are usually plain strings but some runtimes
/// wrap them in an object keyed by the event name.
fn transcript_text(value: &Value, nested_key: &str) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => map
            .get(nested_key)
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_audio_chunk_shape() {
        let chunk = UserAudioChunk {
            user_audio_chunk: "AAAA".to_string(),
        };
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value, json!({"user_audio_chunk": "AAAA"}));
    }

    #[test]
    fn test_pong_shape() {
        let pong = Pong::new(json!(17));
        let value = serde_json::to_value(&pong).unwrap();
        assert_eq!(value, json!({"type": "pong", "event_id": 17}));
    }

    #[test]
    fn test_legacy_audio() {
        let event = parse_event(r#"{"audio": "UklGRg=="}"#).unwrap();
        assert_eq!(
            event,
            ConvAiEvent::Audio {
                audio_base64: "UklGRg==".to_string()
            }
        );
    }

    #[test]
    fn test_typed_audio_nested() {
        let event = parse_event(
            r#"{"type": "audio", "audio_event": {"audio_base_64": "UklGRg==", "event_id": 3}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ConvAiEvent::Audio {
                audio_base64: "UklGRg==".to_string()
            }
        );
    }

    #[test]
    fn test_legacy_user_transcription_string() {
        let event = parse_event(r#"{"user_transcription": "find me pizza"}"#).unwrap();
        assert_eq!(
            event,
            ConvAiEvent::UserTranscript("find me pizza".to_string())
        );
    }

    #[test]
    fn test_legacy_user_transcription_object() {
        let event =
            parse_event(r#"{"user_transcription": {"user_transcript": "find me pizza"}}"#).unwrap();
        assert_eq!(
            event,
            ConvAiEvent::UserTranscript("find me pizza".to_string())
        );
    }

    #[test]
    fn test_typed_user_transcript_flat() {
        let event =
            parse_event(r#"{"type": "user_transcript", "user_transcript": "coffee nearby"}"#)
                .unwrap();
        assert_eq!(
            event,
            ConvAiEvent::UserTranscript("coffee nearby".to_string())
        );
    }

    #[test]
    fn test_agent_response_both_dialects() {
        let legacy = parse_event(r#"{"agent_response": "Here are three options."}"#).unwrap();
        let typed =
            parse_event(r#"{"type": "agent_response", "agent_response": "Here are three options."}"#)
                .unwrap();
        assert_eq!(legacy, typed);
        assert_eq!(
            legacy,
            ConvAiEvent::AgentResponse("Here are three options.".to_string())
        );
    }

    #[test]
    fn test_legacy_ping_event_nested() {
        let event = parse_event(r#"{"ping_event": {"event_id": 41}}"#).unwrap();
        assert_eq!(
            event,
            ConvAiEvent::Ping {
                event_id: json!(41)
            }
        );
    }

    #[test]
    fn test_typed_ping_flat() {
        let event = parse_event(r#"{"type": "ping", "event_id": 42, "ping_ms": 25}"#).unwrap();
        assert_eq!(
            event,
            ConvAiEvent::Ping {
                event_id: json!(42)
            }
        );
    }

    #[test]
    fn test_interruption_both_dialects() {
        let legacy = parse_event(r#"{"interruption": {"reason": "user speech"}}"#).unwrap();
        let typed = parse_event(r#"{"type": "interruption", "interruption_event": {}}"#).unwrap();
        assert_eq!(legacy, ConvAiEvent::Interruption);
        assert_eq!(typed, ConvAiEvent::Interruption);
    }

    #[test]
    fn test_flat_tool_call() {
        let event = parse_event(
            r#"{
                "type": "tool_call",
                "tool_name": "search_nearby_business",
                "parameters": {"query": "tacos", "latitude": 38.6},
                "tool_call_id": "tc_1"
            }"#,
        )
        .unwrap();
        match event {
            ConvAiEvent::ToolCall {
                tool_name,
                parameters,
                tool_call_id,
            } => {
                assert_eq!(tool_name, "search_nearby_business");
                assert_eq!(parameters["query"], "tacos");
                assert_eq!(tool_call_id.as_deref(), Some("tc_1"));
            }
            other => panic!("expected tool call, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_client_tool_call() {
        let event = parse_event(
            r#"{
                "type": "client_tool_call",
                "client_tool_call": {
                    "tool_name": "search_nearby_business",
                    "parameters": {"query": "tacos"},
                    "tool_call_id": "tc_2"
                }
            }"#,
        )
        .unwrap();
        match event {
            ConvAiEvent::ToolCall {
                tool_name,
                tool_call_id,
                ..
            } => {
                assert_eq!(tool_name, "search_nearby_business");
                assert_eq!(tool_call_id.as_deref(), Some("tc_2"));
            }
            other => panic!("expected tool call, got {other:?}"),
        }
    }

    #[test]
    fn test_error_event() {
        let event = parse_event(r#"{"type": "error", "message": "agent not found"}"#).unwrap();
        assert_eq!(
            event,
            ConvAiEvent::ProviderError("agent not found".to_string())
        );
    }

    #[test]
    fn test_metadata_both_dialects() {
        let legacy =
            parse_event(r#"{"conversation_initiation_metadata_event": {"conversation_id": "c1"}}"#)
                .unwrap();
        let typed = parse_event(r#"{"type": "conversation_initiation_metadata"}"#).unwrap();
        assert_eq!(legacy, ConvAiEvent::ConversationInitiated);
        assert_eq!(typed, ConvAiEvent::ConversationInitiated);
    }

    #[test]
    fn test_unknown_ignored() {
        let event = parse_event(r#"{"type": "vad_score", "vad_score_event": {"score": 0.9}}"#)
            .unwrap();
        assert_eq!(event, ConvAiEvent::Ignored);
    }
}
