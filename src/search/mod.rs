//! Web search providers used by `/websearch`
//!
//! The router depends only on [`SearchProvider`]; the backend is chosen from
//! [`SearchBackend`] at startup.

pub mod duckduckgo;
#[cfg(feature = "tavily")]
pub mod tavily;

pub use self::duckduckgo::DuckDuckGoProvider;
#[cfg(feature = "tavily")]
pub use self::tavily::TavilyProvider;

use crate::config::{SearchBackend, Settings};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by search providers
#[derive(Debug, Error)]
pub enum SearchError {
    /// Connectivity problem
    #[error("Network error: {0}")]
    Network(String),
    /// Non-success response from the API
    #[error("API error: {0}")]
    Api(String),
    /// HTML results page could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),
    /// Missing API key or disabled backend
    #[error("Search backend not configured: {0}")]
    MissingConfig(String),
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    /// Page title
    pub title: String,
    /// Page URL
    pub link: String,
}

impl SearchResult {
    /// Convenience constructor
    #[must_use]
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
        }
    }
}

/// A third-party web search API
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Return at most `max_results` hits in ranking order
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError>;
}

/// Build the configured search backend
///
/// # Errors
///
/// Returns `SearchError::MissingConfig` if the selected backend lacks its API
/// key or was compiled out.
pub fn build_search_provider(settings: &Settings) -> Result<Arc<dyn SearchProvider>, SearchError> {
    match settings.search_backend {
        SearchBackend::DuckDuckGo => Ok(Arc::new(DuckDuckGoProvider::default())),
        #[cfg(feature = "tavily")]
        SearchBackend::Tavily => {
            let api_key = settings
                .tavily_api_key
                .as_deref()
                .ok_or_else(|| SearchError::MissingConfig("TAVILY_API_KEY".to_string()))?;
            Ok(Arc::new(TavilyProvider::new(api_key)?))
        }
        #[cfg(not(feature = "tavily"))]
        SearchBackend::Tavily => Err(SearchError::MissingConfig(
            "built without the `tavily` feature".to_string(),
        )),
    }
}
