//! Signed WebSocket URL minting for ElevenLabs Conversational AI.

use serde::Deserialize;

use super::CredentialsError;

pub const DEFAULT_ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";

/// Fetches signed conversation URLs for a configured agent.
#[derive(Clone)]
pub struct ElevenLabsCredentials {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    agent_id: Option<String>,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    signed_url: String,
}

impl ElevenLabsCredentials {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        api_key: Option<String>,
        agent_id: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url,
            api_key,
            agent_id,
        }
    }

    /// Fetch a signed WebSocket URL for one conversation.
    pub async fn signed_url(&self) -> Result<String, CredentialsError> {
        let agent_id = self
            .agent_id
            .as_deref()
            .ok_or_else(|| CredentialsError::NotConfigured("ELEVENLABS_AGENT_ID".to_string()))?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CredentialsError::NotConfigured("ELEVENLABS_API_KEY".to_string()))?;

        let response = self
            .http
            .get(format!(
                "{}/v1/convai/conversation/get_signed_url",
                self.base_url
            ))
            .query(&[("agent_id", agent_id)])
            .header("xi-api-key", api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialsError::RequestFailed(format!(
                "signed URL request returned {status}: {body}"
            )));
        }

        let parsed: SignedUrlResponse = response.json().await.map_err(|e| {
            CredentialsError::RequestFailed(format!("invalid signed URL response: {e}"))
        })?;

        Ok(parsed.signed_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_url_response_parsing() {
        let parsed: SignedUrlResponse = serde_json::from_value(serde_json::json!({
            "signed_url": "wss://api.elevenlabs.io/v1/convai/conversation?token=abc"
        }))
        .unwrap();
        assert!(parsed.signed_url.starts_with("wss://"));
    }
}
