//! HTTP utilities for the AI and search providers
//!
//! Common request/response handling shared by the provider implementations.

use crate::config::get_llm_http_timeout_secs;
use crate::llm::LlmError;
use crate::utils::truncate_str;
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::time::Duration;

/// Maximum characters of an error body kept in error messages
const ERROR_BODY_LIMIT: usize = 500;

/// Creates an HTTP client configured with the standard provider timeout.
///
/// Uses `LLM_HTTP_TIMEOUT_SECS` environment variable or 30s default.
#[must_use]
pub fn create_http_client() -> HttpClient {
    let timeout = Duration::from_secs(get_llm_http_timeout_secs());
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// Sends an HTTP POST request with JSON body and returns parsed JSON response.
///
/// # Errors
///
/// Returns `LlmError::NetworkError` on connectivity issues, `LlmError::ApiError` on non-success status codes,
/// or `LlmError::JsonError` if parsing fails.
pub async fn send_json_request(
    client: &HttpClient,
    url: &str,
    body: &Value,
    extra_headers: &[(&str, &str)],
) -> Result<Value, LlmError> {
    let mut request = client.post(url).json(body);

    for (key, value) in extra_headers {
        request = request.header(*key, *value);
    }

    let response = request
        .send()
        .await
        .map_err(|e| LlmError::NetworkError(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        return Err(LlmError::ApiError(describe_error_body(status, &error_text)));
    }

    response
        .json()
        .await
        .map_err(|e| LlmError::JsonError(e.to_string()))
}

/// Builds a short, log-safe description of a failed response.
///
/// HTML error pages from proxies are not echoed back; long bodies are cut.
#[must_use]
pub fn describe_error_body(status: reqwest::StatusCode, error_text: &str) -> String {
    let trimmed = error_text.trim_start();
    let is_html = trimmed.starts_with("<!DOCTYPE")
        || trimmed.starts_with("<html")
        || trimmed.starts_with("<HTML");

    if is_html {
        return format!("{status} (Server returned HTML error page)");
    }

    if error_text.chars().count() > ERROR_BODY_LIMIT {
        format!(
            "{status} - {}... (truncated)",
            truncate_str(error_text, ERROR_BODY_LIMIT)
        )
    } else {
        format!("{status} - {error_text}")
    }
}

/// Joins every `text` part of the first Gemini candidate.
///
/// Returns `None` when there is no candidate (blocked prompt) or the joined
/// text is blank.
#[must_use]
pub fn extract_candidate_text(response: &Value) -> Option<String> {
    let parts = response
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
