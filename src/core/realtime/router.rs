//! Shared event-routing helpers used by both session clients.
//!
//! Providers speak different wire formats; the clients normalize them into
//! the shared event types from `base` before anything reaches a callback.
//! The pieces common to both live here: single-slot callback storage and
//! per-utterance transcript accumulation.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::core::realtime::base::{
    AudioOutputCallback, ConnectionState, InterruptionCallback, RealtimeAudioData,
    ReconnectionCallback, ReconnectionEvent, SearchResultsCallback, StateChangeCallback,
    ToolCallCallback, ToolCallRequest, TranscriptCallback, TranscriptResult,
};
use crate::core::search::BusinessHit;

// =============================================================================
// Callback slots
// =============================================================================

/// Single-slot callback storage for a session.
///
/// Registration is synchronous (slots sit behind `parking_lot::Mutex`);
/// dispatch clones the callback out of the slot and awaits it outside the
/// lock. Registering twice replaces the previous callback.
#[derive(Default)]
pub struct SessionCallbacks {
    transcript: Mutex<Option<TranscriptCallback>>,
    audio: Mutex<Option<AudioOutputCallback>>,
    tool_call: Mutex<Option<ToolCallCallback>>,
    state_change: Mutex<Option<StateChangeCallback>>,
    search_results: Mutex<Option<SearchResultsCallback>>,
    interruption: Mutex<Option<InterruptionCallback>>,
    reconnection: Mutex<Option<ReconnectionCallback>>,
}

impl SessionCallbacks {
    pub fn set_transcript(&self, callback: TranscriptCallback) {
        *self.transcript.lock() = Some(callback);
    }

    pub fn set_audio(&self, callback: AudioOutputCallback) {
        *self.audio.lock() = Some(callback);
    }

    pub fn set_tool_call(&self, callback: ToolCallCallback) {
        *self.tool_call.lock() = Some(callback);
    }

    pub fn set_state_change(&self, callback: StateChangeCallback) {
        *self.state_change.lock() = Some(callback);
    }

    pub fn set_search_results(&self, callback: SearchResultsCallback) {
        *self.search_results.lock() = Some(callback);
    }

    pub fn set_interruption(&self, callback: InterruptionCallback) {
        *self.interruption.lock() = Some(callback);
    }

    pub fn set_reconnection(&self, callback: ReconnectionCallback) {
        *self.reconnection.lock() = Some(callback);
    }

    pub async fn emit_transcript(&self, transcript: TranscriptResult) {
        let cb = self.transcript.lock().clone();
        if let Some(cb) = cb {
            cb(transcript).await;
        }
    }

    pub async fn emit_audio(&self, audio: RealtimeAudioData) {
        let cb = self.audio.lock().clone();
        if let Some(cb) = cb {
            cb(audio).await;
        }
    }

    pub async fn emit_tool_call(&self, request: ToolCallRequest) {
        let cb = self.tool_call.lock().clone();
        if let Some(cb) = cb {
            cb(request).await;
        }
    }

    pub async fn emit_state_change(&self, state: ConnectionState) {
        let cb = self.state_change.lock().clone();
        if let Some(cb) = cb {
            cb(state).await;
        }
    }

    pub async fn emit_search_results(&self, results: Vec<BusinessHit>) {
        let cb = self.search_results.lock().clone();
        if let Some(cb) = cb {
            cb(results).await;
        }
    }

    pub async fn emit_interruption(&self) {
        let cb = self.interruption.lock().clone();
        if let Some(cb) = cb {
            cb().await;
        }
    }

    pub async fn emit_reconnection(&self, event: ReconnectionEvent) {
        let cb = self.reconnection.lock().clone();
        if let Some(cb) = cb {
            cb(event).await;
        }
    }
}

// =============================================================================
// Transcript accumulation
// =============================================================================

/// Accumulates streamed transcript deltas per utterance.
///
/// Deltas for the same key (item or response ID) append to one buffer;
/// `finish` drains the buffer so exactly one final transcript is produced
/// per utterance no matter how many deltas preceded it.
#[derive(Debug, Default)]
pub struct TranscriptAccumulator {
    buffers: HashMap<String, String>,
}

impl TranscriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta and return the text accumulated so far.
    pub fn push_delta(&mut self, key: &str, delta: &str) -> String {
        let buffer = self.buffers.entry(key.to_string()).or_default();
        buffer.push_str(delta);
        buffer.clone()
    }

    /// Finish the utterance for `key`, consuming its buffer.
    ///
    /// The provider's own final text wins when present and non-empty;
    /// otherwise the accumulated deltas are used.
    pub fn finish(&mut self, key: &str, provider_final: Option<&str>) -> String {
        let accumulated = self.buffers.remove(key).unwrap_or_default();
        match provider_final {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => accumulated,
        }
    }

    /// Drop all in-progress buffers. Used on reconnect.
    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    /// Number of utterances currently accumulating.
    pub fn in_progress(&self) -> usize {
        self.buffers.len()
    }
}

/// Key for transcript accumulation: prefer the item ID, fall back to the
/// response ID, then a fixed key for providers that send neither.
pub fn accumulation_key(item_id: Option<&str>, response_id: Option<&str>) -> String {
    item_id
        .or(response_id)
        .unwrap_or("current")
        .to_string()
}
