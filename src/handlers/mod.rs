//! HTTP request handlers
//!
//! This module organizes the API handlers into logical groups:
//! - `health` - Health check endpoint
//! - `search` - Business search endpoint
//! - `session` - Ephemeral provider credential endpoints

pub mod health;
pub mod search;
pub mod session;

pub use health::health_check;
pub use search::search_handler;
pub use session::{elevenlabs_session_handler, openai_session_handler};

use serde::{Deserialize, Serialize};

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
