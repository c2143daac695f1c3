//! Tavily Provider - web search through the native Tavily Rust SDK

use super::{SearchError, SearchProvider, SearchResult};
use async_trait::async_trait;
use std::time::Duration;
use tavily::Tavily;
use tracing::debug;

/// Search provider for the Tavily API
pub struct TavilyProvider {
    client: Tavily,
    api_key: String,
}

impl TavilyProvider {
    /// Create a new Tavily provider with the given API key
    ///
    /// # Errors
    ///
    /// Returns an error if the Tavily client cannot be created.
    pub fn new(api_key: &str) -> Result<Self, SearchError> {
        let client = Tavily::builder(api_key)
            .timeout(Duration::from_secs(crate::config::get_llm_http_timeout_secs()))
            .max_retries(2)
            .build()
            .map_err(|e| SearchError::MissingConfig(format!("Failed to create Tavily client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl SearchProvider for TavilyProvider {
    fn name(&self) -> &'static str {
        "tavily"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let max_results = i32::try_from(max_results.clamp(1, 10)).unwrap_or(10);
        debug!(query = %query, max_results = max_results, "Tavily web search");

        let request = tavily::SearchRequest::new(&self.api_key, query)
            .max_results(max_results)
            .search_depth("basic");

        let response = self
            .client
            .call(&request)
            .await
            .map_err(|e| SearchError::Api(e.to_string()))?;

        Ok(response
            .results
            .into_iter()
            .map(|result| {
                SearchResult::new(html_escape::decode_html_entities(&result.title), result.url)
            })
            .collect())
    }
}
