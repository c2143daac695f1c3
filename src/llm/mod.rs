//! Generative-AI responder abstraction and the Gemini implementation

pub mod http_utils;
pub mod media;
pub mod providers;

pub use media::ImageInput;

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by AI responders
#[derive(Debug, Error)]
pub enum LlmError {
    /// Non-success response from the API
    #[error("API error: {0}")]
    ApiError(String),
    /// Connectivity problem
    #[error("Network error: {0}")]
    NetworkError(String),
    /// Response body could not be parsed
    #[error("JSON error: {0}")]
    JsonError(String),
    /// Missing API key or other configuration
    #[error("Missing client/API key: {0}")]
    MissingConfig(String),
    /// Anything else
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// The hosted text/vision model.
///
/// `Ok(None)` means the call succeeded but produced no usable text
/// (e.g. the candidate was blocked or empty).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AiResponder: Send + Sync {
    /// Generate a reply for a plain text prompt
    async fn generate_text(&self, prompt: &str) -> Result<Option<String>, LlmError>;

    /// Generate a reply for an instruction and an attached image
    async fn generate_from_image(
        &self,
        instruction: &str,
        image: ImageInput,
    ) -> Result<Option<String>, LlmError>;
}
