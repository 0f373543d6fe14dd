//! Configuration for the BizVoice gateway.
//!
//! Configuration loads from a YAML file or from environment variables.
//! Priority: YAML > ENV vars > .env values > defaults. Every knob is an
//! explicit typed field; nothing reads the process environment after
//! startup.
//!
//! # Example
//! ```rust,no_run
//! use bizvoice_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable fallback
//! let config = ServerConfig::from_file(&PathBuf::from("config.yaml"))?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::core::search::{GeoBounds, GeoPoint, SACRAMENTO_BOUNDS, SACRAMENTO_CENTER};

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Configuration file could not be read
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// An API secret, zeroed on drop and redacted in debug output.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The underlying secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(****)")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// TLS configuration for HTTPS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains everything needed to run the gateway: bind address and TLS,
/// provider API keys (OpenAI, ElevenLabs, Google Places, Supabase), search
/// pipeline tuning, and security settings (CORS, rate limiting). Provider
/// base URLs are overridable so tests can point at local stubs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // Provider credentials
    /// OpenAI API key for embeddings and Realtime session minting
    pub openai_api_key: Option<Secret>,
    /// ElevenLabs API key for signed conversation URLs
    pub elevenlabs_api_key: Option<Secret>,
    /// ElevenLabs Conversational AI agent to mint URLs for
    pub elevenlabs_agent_id: Option<String>,
    /// Google Places API key for the geographic fallback search
    pub google_places_api_key: Option<Secret>,
    /// Supabase project URL holding the business directory
    pub supabase_url: Option<String>,
    /// Supabase service role key
    pub supabase_service_key: Option<Secret>,

    // Model selection
    /// Model requested when minting ephemeral Realtime session tokens
    pub openai_session_model: String,
    /// Voice requested for Realtime sessions
    pub openai_voice: String,
    /// Embedding model for query vectorization
    pub embedding_model: String,

    // Search pipeline tuning
    /// Minimum cosine similarity for a directory match
    pub match_threshold: f64,
    /// Result cap for the merged result list
    pub match_count: usize,
    /// Fewer directory results than this triggers the Places fallback
    pub fallback_min_results: usize,
    /// Radius for the Places text search, in meters
    pub places_radius_m: u32,
    /// Serviced region; fallback results outside it are dropped
    pub region_bounds: GeoBounds,
    /// Search center used when the caller supplies no usable coordinates
    pub default_center: GeoPoint,

    // Provider base URL overrides (tests point these at stubs)
    pub openai_base_url: String,
    pub elevenlabs_base_url: String,
    pub places_base_url: String,

    // Security settings
    /// CORS origins: `*`, a comma-separated list, or unset for same-origin
    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: u32,
    pub rate_limit_burst_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            tls: None,
            openai_api_key: None,
            elevenlabs_api_key: None,
            elevenlabs_agent_id: None,
            google_places_api_key: None,
            supabase_url: None,
            supabase_service_key: None,
            openai_session_model: "gpt-4o-realtime-preview-2024-10-01".to_string(),
            openai_voice: "alloy".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            match_threshold: 0.4,
            match_count: 5,
            fallback_min_results: 3,
            places_radius_m: 15000,
            region_bounds: SACRAMENTO_BOUNDS,
            default_center: SACRAMENTO_CENTER,
            openai_base_url: "https://api.openai.com".to_string(),
            elevenlabs_base_url: "https://api.elevenlabs.io".to_string(),
            places_base_url: "https://maps.googleapis.com".to_string(),
            cors_allowed_origins: None,
            rate_limit_requests_per_second: 100,
            rate_limit_burst_size: 50,
        }
    }
}

/// Raw YAML layout. Every field optional; missing fields fall back to the
/// environment-derived value.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlConfig {
    host: Option<String>,
    port: Option<u16>,
    tls_cert_path: Option<PathBuf>,
    tls_key_path: Option<PathBuf>,
    openai_api_key: Option<String>,
    elevenlabs_api_key: Option<String>,
    elevenlabs_agent_id: Option<String>,
    google_places_api_key: Option<String>,
    supabase_url: Option<String>,
    supabase_service_key: Option<String>,
    openai_session_model: Option<String>,
    openai_voice: Option<String>,
    embedding_model: Option<String>,
    match_threshold: Option<f64>,
    match_count: Option<usize>,
    fallback_min_results: Option<usize>,
    places_radius_m: Option<u32>,
    openai_base_url: Option<String>,
    elevenlabs_base_url: Option<String>,
    places_base_url: Option<String>,
    cors_allowed_origins: Option<String>,
    rate_limit_requests_per_second: Option<u32>,
    rate_limit_burst_size: Option<u32>,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(host) = env_string("HOST") {
            config.host = host;
        }
        if let Some(port) = env_parsed::<u16>("PORT")? {
            config.port = port;
        }

        let cert_path = env_string("TLS_CERT_PATH").map(PathBuf::from);
        let key_path = env_string("TLS_KEY_PATH").map(PathBuf::from);
        config.tls = match (cert_path, key_path) {
            (Some(cert_path), Some(key_path)) => Some(TlsConfig {
                cert_path,
                key_path,
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid(
                    "TLS_CERT_PATH and TLS_KEY_PATH must be set together".to_string(),
                ));
            }
        };

        config.openai_api_key = env_string("OPENAI_API_KEY").map(Secret::from);
        config.elevenlabs_api_key = env_string("ELEVENLABS_API_KEY").map(Secret::from);
        config.elevenlabs_agent_id = env_string("ELEVENLABS_AGENT_ID");
        config.google_places_api_key = env_string("GOOGLE_PLACES_API_KEY").map(Secret::from);
        config.supabase_url = env_string("SUPABASE_URL");
        config.supabase_service_key = env_string("SUPABASE_SERVICE_KEY").map(Secret::from);

        if let Some(model) = env_string("OPENAI_SESSION_MODEL") {
            config.openai_session_model = model;
        }
        if let Some(voice) = env_string("OPENAI_VOICE") {
            config.openai_voice = voice;
        }
        if let Some(model) = env_string("EMBEDDING_MODEL") {
            config.embedding_model = model;
        }

        if let Some(threshold) = env_parsed::<f64>("MATCH_THRESHOLD")? {
            config.match_threshold = threshold;
        }
        if let Some(count) = env_parsed::<usize>("MATCH_COUNT")? {
            config.match_count = count;
        }
        if let Some(min) = env_parsed::<usize>("FALLBACK_MIN_RESULTS")? {
            config.fallback_min_results = min;
        }
        if let Some(radius) = env_parsed::<u32>("PLACES_RADIUS_M")? {
            config.places_radius_m = radius;
        }

        if let Some(url) = env_string("OPENAI_BASE_URL") {
            config.openai_base_url = url;
        }
        if let Some(url) = env_string("ELEVENLABS_BASE_URL") {
            config.elevenlabs_base_url = url;
        }
        if let Some(url) = env_string("PLACES_BASE_URL") {
            config.places_base_url = url;
        }

        config.cors_allowed_origins = env_string("CORS_ALLOWED_ORIGINS");
        if let Some(rps) = env_parsed::<u32>("RATE_LIMIT_REQUESTS_PER_SECOND")? {
            config.rate_limit_requests_per_second = rps;
        }
        if let Some(burst) = env_parsed::<u32>("RATE_LIMIT_BURST_SIZE")? {
            config.rate_limit_burst_size = burst;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, with environment variables
    /// filling any field the file does not set.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let yaml: YamlConfig = serde_yaml::from_str(&contents)?;

        let mut config = Self::from_env()?;

        if let Some(host) = yaml.host {
            config.host = host;
        }
        if let Some(port) = yaml.port {
            config.port = port;
        }
        match (yaml.tls_cert_path, yaml.tls_key_path) {
            (Some(cert_path), Some(key_path)) => {
                config.tls = Some(TlsConfig {
                    cert_path,
                    key_path,
                });
            }
            (None, None) => {}
            _ => {
                return Err(ConfigError::Invalid(
                    "tls_cert_path and tls_key_path must be set together".to_string(),
                ));
            }
        }

        if let Some(key) = yaml.openai_api_key {
            config.openai_api_key = Some(Secret::from(key));
        }
        if let Some(key) = yaml.elevenlabs_api_key {
            config.elevenlabs_api_key = Some(Secret::from(key));
        }
        if let Some(agent_id) = yaml.elevenlabs_agent_id {
            config.elevenlabs_agent_id = Some(agent_id);
        }
        if let Some(key) = yaml.google_places_api_key {
            config.google_places_api_key = Some(Secret::from(key));
        }
        if let Some(url) = yaml.supabase_url {
            config.supabase_url = Some(url);
        }
        if let Some(key) = yaml.supabase_service_key {
            config.supabase_service_key = Some(Secret::from(key));
        }

        if let Some(model) = yaml.openai_session_model {
            config.openai_session_model = model;
        }
        if let Some(voice) = yaml.openai_voice {
            config.openai_voice = voice;
        }
        if let Some(model) = yaml.embedding_model {
            config.embedding_model = model;
        }
        if let Some(threshold) = yaml.match_threshold {
            config.match_threshold = threshold;
        }
        if let Some(count) = yaml.match_count {
            config.match_count = count;
        }
        if let Some(min) = yaml.fallback_min_results {
            config.fallback_min_results = min;
        }
        if let Some(radius) = yaml.places_radius_m {
            config.places_radius_m = radius;
        }
        if let Some(url) = yaml.openai_base_url {
            config.openai_base_url = url;
        }
        if let Some(url) = yaml.elevenlabs_base_url {
            config.elevenlabs_base_url = url;
        }
        if let Some(url) = yaml.places_base_url {
            config.places_base_url = url;
        }
        if let Some(origins) = yaml.cors_allowed_origins {
            config.cors_allowed_origins = Some(origins);
        }
        if let Some(rps) = yaml.rate_limit_requests_per_second {
            config.rate_limit_requests_per_second = rps;
        }
        if let Some(burst) = yaml.rate_limit_burst_size {
            config.rate_limit_burst_size = burst;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be nonzero".to_string()));
        }
        if !(self.match_threshold > 0.0 && self.match_threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "match_threshold must be in (0, 1], got {}",
                self.match_threshold
            )));
        }
        if self.match_count == 0 {
            return Err(ConfigError::Invalid(
                "match_count must be at least 1".to_string(),
            ));
        }
        if self.fallback_min_results > self.match_count {
            return Err(ConfigError::Invalid(format!(
                "fallback_min_results ({}) cannot exceed match_count ({})",
                self.fallback_min_results, self.match_count
            )));
        }
        if self.region_bounds.north < self.region_bounds.south {
            return Err(ConfigError::Invalid(
                "region bounds north edge is south of the south edge".to_string(),
            ));
        }
        Ok(())
    }

    /// The socket address string to bind.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether TLS serving is configured.
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid(format!("{key}={raw}: {e}"))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.address(), "0.0.0.0:3001");
        assert!(!config.is_tls_enabled());
        assert_eq!(config.match_threshold, 0.4);
        assert_eq!(config.match_count, 5);
        assert_eq!(config.fallback_min_results, 3);
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let config = ServerConfig {
            port: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        for threshold in [0.0, -0.1, 1.5] {
            let config = ServerConfig {
                match_threshold: threshold,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "threshold {threshold} accepted");
        }

        let config = ServerConfig {
            match_threshold: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_fallback_above_cap() {
        let config = ServerConfig {
            match_count: 3,
            fallback_min_results: 4,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::new("sk-very-secret");
        assert_eq!(format!("{secret:?}"), "Secret(****)");
        assert_eq!(secret.expose(), "sk-very-secret");
    }

    #[test]
    fn test_config_debug_does_not_leak_secrets() {
        let config = ServerConfig {
            openai_api_key: Some(Secret::new("sk-leakme")),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-leakme"));
    }

    #[test]
    fn test_yaml_parses_partial_file() {
        let yaml: YamlConfig = serde_yaml::from_str("port: 8080\nopenai_voice: verse\n").unwrap();
        assert_eq!(yaml.port, Some(8080));
        assert_eq!(yaml.openai_voice.as_deref(), Some("verse"));
        assert!(yaml.openai_api_key.is_none());
    }

    #[test]
    fn test_yaml_rejects_unknown_fields() {
        let result: Result<YamlConfig, _> = serde_yaml::from_str("no_such_knob: true\n");
        assert!(result.is_err());
    }
}
