//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! provider constants.

use crate::bot::router::RegistrationPolicy;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Web search backend used by `/websearch`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    /// DuckDuckGo HTML web results (no key required)
    #[default]
    #[serde(alias = "ddg")]
    DuckDuckGo,
    /// Tavily search API (`TAVILY_API_KEY` required)
    Tavily,
}

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    #[serde(alias = "telegram_bot_token")]
    pub telegram_token: String,

    /// Gemini API key
    pub gemini_api_key: Option<String>,
    /// Gemini model used for text chat
    #[serde(default = "default_gemini_chat_model")]
    pub gemini_chat_model: String,
    /// Gemini model used for image analysis
    #[serde(default = "default_gemini_vision_model")]
    pub gemini_vision_model: String,
    /// Base URL of the Gemini REST API
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,

    /// Selected web search backend
    #[serde(default)]
    pub search_backend: SearchBackend,
    /// Tavily API key
    pub tavily_api_key: Option<String>,

    /// Whether chat, image analysis and web search require `/register` first
    #[serde(default = "default_registration_required")]
    pub registration_required: bool,

    /// Upper bound for every external call made while handling an update
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// R2 Storage access key ID
    pub r2_access_key_id: Option<String>,
    /// R2 Storage secret access key
    pub r2_secret_access_key: Option<String>,
    /// R2 Storage endpoint URL
    pub r2_endpoint_url: Option<String>,
    /// R2 Storage bucket name
    pub r2_bucket_name: Option<String>,
}

fn default_gemini_chat_model() -> String {
    DEFAULT_GEMINI_CHAT_MODEL.to_string()
}

fn default_gemini_vision_model() -> String {
    DEFAULT_GEMINI_VISION_MODEL.to_string()
}

fn default_gemini_base_url() -> String {
    GEMINI_BASE_URL.to_string()
}

const fn default_registration_required() -> bool {
    true
}

fn default_provider_timeout_secs() -> u64 {
    get_provider_timeout_secs()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use gemini_scout::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or `provider_timeout_secs` is zero.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Not checked into git
            .add_source(File::with_name("config/local").required(false))
            // Eg. `APP__SEARCH_BACKEND=tavily ./target/gemini-scout`
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Bare UPPER_SNAKE_CASE variables map onto snake_case keys;
            // empty values are treated as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let settings: Self = s.try_deserialize()?;
        if settings.provider_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "provider_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(settings)
    }

    /// Registration gate derived from `registration_required`
    #[must_use]
    pub const fn registration_policy(&self) -> RegistrationPolicy {
        if self.registration_required {
            RegistrationPolicy::Required
        } else {
            RegistrationPolicy::Disabled
        }
    }

    /// Timeout applied to every provider call
    #[must_use]
    pub const fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// Returns true when every R2 credential is present
    #[must_use]
    pub const fn has_r2_credentials(&self) -> bool {
        self.r2_endpoint_url.is_some()
            && self.r2_access_key_id.is_some()
            && self.r2_secret_access_key.is_some()
            && self.r2_bucket_name.is_some()
    }
}

// Gemini configuration
/// Gemini REST endpoint
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Default model for text chat
pub const DEFAULT_GEMINI_CHAT_MODEL: &str = "gemini-2.5-flash-lite";
/// Default model for image analysis
pub const DEFAULT_GEMINI_VISION_MODEL: &str = "gemini-2.5-flash";
/// Temperature for text chat
pub const GEMINI_CHAT_TEMPERATURE: f32 = 0.7;
/// Temperature for image descriptions
pub const GEMINI_IMAGE_TEMPERATURE: f32 = 0.4;
/// Output token cap for a single reply
pub const GEMINI_MAX_OUTPUT_TOKENS: u32 = 4000;
/// Instruction sent alongside every analyzed photo
pub const IMAGE_ANALYSIS_PROMPT: &str = "Describe this image.";

// Search configuration
/// Number of results requested for `/websearch`
pub const SEARCH_MAX_RESULTS: usize = 3;
/// DuckDuckGo HTML results host
pub const DUCKDUCKGO_BASE_URL: &str = "https://html.duckduckgo.com";

// Telegram configuration
/// Telegram's hard limit for a single text message
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;
/// Retries for Telegram API calls
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
/// Initial backoff for Telegram API retries
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Backoff ceiling for Telegram API retries
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;

// Storage configuration
/// Maximum cached objects in the R2 read-through cache
pub const STORAGE_CACHE_CAPACITY: u64 = 10_000;
/// TTL of cached R2 objects
pub const STORAGE_CACHE_TTL_SECS: u64 = 60 * 60;

/// Default HTTP timeout for LLM and search requests
pub const LLM_HTTP_TIMEOUT_SECS: u64 = 30;
/// Default per-call provider timeout enforced by the router
pub const PROVIDER_TIMEOUT_SECS: u64 = 45;

/// Get the HTTP client timeout from env or default.
///
/// Environment variable: `LLM_HTTP_TIMEOUT_SECS`.
#[must_use]
pub fn get_llm_http_timeout_secs() -> u64 {
    std::env::var("LLM_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LLM_HTTP_TIMEOUT_SECS)
}

/// Get the router's provider timeout from env or default.
///
/// Environment variable: `PROVIDER_TIMEOUT_SECS`.
#[must_use]
pub fn get_provider_timeout_secs() -> u64 {
    std::env::var("PROVIDER_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(PROVIDER_TIMEOUT_SECS)
}
