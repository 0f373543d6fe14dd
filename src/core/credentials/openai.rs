//! Ephemeral token minting for the OpenAI Realtime API.

use serde::{Deserialize, Serialize};

use super::CredentialsError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Mints ephemeral Realtime session tokens.
///
/// The returned token authorizes exactly one WebRTC session and expires
/// after about a minute, so it is safe to hand to an untrusted client.
#[derive(Clone)]
pub struct OpenAiCredentials {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    voice: String,
}

#[derive(Serialize)]
struct SessionRequest<'a> {
    model: &'a str,
    voice: &'a str,
}

#[derive(Deserialize)]
struct SessionResponse {
    client_secret: ClientSecret,
}

#[derive(Deserialize)]
struct ClientSecret {
    value: String,
}

impl OpenAiCredentials {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        api_key: Option<String>,
        model: String,
        voice: String,
    ) -> Self {
        Self {
            http,
            base_url,
            api_key,
            model,
            voice,
        }
    }

    /// Mint an ephemeral token for one Realtime session.
    pub async fn mint_session_token(&self) -> Result<String, CredentialsError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CredentialsError::NotConfigured("OPENAI_API_KEY".to_string()))?;

        let response = self
            .http
            .post(format!("{}/v1/realtime/sessions", self.base_url))
            .bearer_auth(api_key)
            .json(&SessionRequest {
                model: &self.model,
                voice: &self.voice,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialsError::RequestFailed(format!(
                "session mint returned {status}: {body}"
            )));
        }

        let parsed: SessionResponse = response.json().await.map_err(|e| {
            CredentialsError::RequestFailed(format!("invalid session response: {e}"))
        })?;

        Ok(parsed.client_secret.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_response_parsing() {
        let parsed: SessionResponse = serde_json::from_value(serde_json::json!({
            "id": "sess_001",
            "client_secret": {"value": "ek_test", "expires_at": 1234567890}
        }))
        .unwrap();
        assert_eq!(parsed.client_secret.value, "ek_test");
    }

    #[test]
    fn test_session_request_shape() {
        let body = serde_json::to_value(&SessionRequest {
            model: "gpt-4o-realtime-preview-2024-10-01",
            voice: "alloy",
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"model": "gpt-4o-realtime-preview-2024-10-01", "voice": "alloy"})
        );
    }
}
