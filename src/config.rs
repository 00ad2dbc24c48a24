//! Application Configuration Module
//!
//! Loads settings from environment variables (and `.env` when present) into a
//! single struct the host hands to the transport client and the reviewer.

use secrecy::SecretString;
use std::env;
use tracing::Level;
use tutor_live_types::audio::Voice;

pub const DEFAULT_BASE_URL: &str = "wss://generativelanguage.googleapis.com";
pub const DEFAULT_REST_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_LIVE_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-09-2025";
pub const DEFAULT_FEEDBACK_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: SecretString,
    pub base_url: String,
    pub rest_url: String,
    pub live_model: String,
    pub feedback_model: String,
    pub voice: Voice,
    pub log_level: Level,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `GEMINI_API_KEY`: Secret key for the Gemini API. Required.
    // *   `GEMINI_BASE_URL`: (Optional) Websocket endpoint for the Live API.
    // *   `GEMINI_REST_URL`: (Optional) HTTP endpoint for feedback and summaries.
    // *   `LIVE_MODEL`: (Optional) Model used for the spoken conversation.
    // *   `FEEDBACK_MODEL`: (Optional) Model used for grammar feedback and summaries.
    // *   `TUTOR_VOICE`: (Optional) Prebuilt voice name. Defaults to "Zephyr".
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let api_key = env::var("GEMINI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;

        let log_level_str = env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            api_key: SecretString::from(api_key),
            base_url: env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            rest_url: env::var("GEMINI_REST_URL").unwrap_or_else(|_| DEFAULT_REST_URL.to_string()),
            live_model: env::var("LIVE_MODEL").unwrap_or_else(|_| DEFAULT_LIVE_MODEL.to_string()),
            feedback_model: env::var("FEEDBACK_MODEL")
                .unwrap_or_else(|_| DEFAULT_FEEDBACK_MODEL.to_string()),
            voice: env::var("TUTOR_VOICE")
                .map(|v| Voice::from(v.as_str()))
                .unwrap_or_default(),
            log_level,
        })
    }
}
