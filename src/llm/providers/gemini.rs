use crate::config::{
    Settings, GEMINI_CHAT_TEMPERATURE, GEMINI_IMAGE_TEMPERATURE, GEMINI_MAX_OUTPUT_TOKENS,
};
use crate::llm::http_utils::{create_http_client, extract_candidate_text, send_json_request};
use crate::llm::{AiResponder, ImageInput, LlmError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use tracing::debug;

/// AI responder backed by the Google Gemini `generateContent` API
pub struct GeminiProvider {
    http_client: HttpClient,
    api_key: String,
    base_url: String,
    chat_model: String,
    vision_model: String,
}

impl GeminiProvider {
    /// Create a new Gemini provider instance
    #[must_use]
    pub fn new(
        api_key: String,
        base_url: impl Into<String>,
        chat_model: impl Into<String>,
        vision_model: impl Into<String>,
    ) -> Self {
        Self {
            http_client: create_http_client(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            chat_model: chat_model.into(),
            vision_model: vision_model.into(),
        }
    }

    /// Build the provider from application settings
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingConfig` if `GEMINI_API_KEY` is not set.
    pub fn from_settings(settings: &Settings) -> Result<Self, LlmError> {
        let api_key = settings
            .gemini_api_key
            .clone()
            .ok_or_else(|| LlmError::MissingConfig("GEMINI_API_KEY".to_string()))?;

        Ok(Self::new(
            api_key,
            settings.gemini_base_url.as_str(),
            settings.gemini_chat_model.as_str(),
            settings.gemini_vision_model.as_str(),
        ))
    }

    async fn generate(&self, model_id: &str, body: &Value) -> Result<Option<String>, LlmError> {
        let url = format!("{}/models/{model_id}:generateContent", self.base_url);
        debug!(model = model_id, "Gemini generateContent request");

        let res_json = send_json_request(
            &self.http_client,
            &url,
            body,
            &[("x-goog-api-key", self.api_key.as_str())],
        )
        .await?;

        Ok(extract_candidate_text(&res_json))
    }
}

#[async_trait]
impl AiResponder for GeminiProvider {
    async fn generate_text(&self, prompt: &str) -> Result<Option<String>, LlmError> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": prompt}]
            }],
            "generationConfig": {
                "temperature": GEMINI_CHAT_TEMPERATURE,
                "maxOutputTokens": GEMINI_MAX_OUTPUT_TOKENS
            }
        });

        self.generate(&self.chat_model, &body).await
    }

    async fn generate_from_image(
        &self,
        instruction: &str,
        image: ImageInput,
    ) -> Result<Option<String>, LlmError> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {"text": instruction},
                    {
                        "inline_data": {
                            "mime_type": image.mime_type,
                            "data": BASE64.encode(&image.bytes)
                        }
                    }
                ]
            }],
            "generationConfig": {
                "temperature": GEMINI_IMAGE_TEMPERATURE,
                "maxOutputTokens": GEMINI_MAX_OUTPUT_TOKENS
            }
        });

        self.generate(&self.vision_model, &body).await
    }
}
