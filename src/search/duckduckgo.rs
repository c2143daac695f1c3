//! DuckDuckGo Provider - keyless web search through the HTML results page
//!
//! `html.duckduckgo.com/html/` serves organic results as plain markup. Each
//! `div.result` carries an `a.result__a` whose `href` is a redirect of the
//! form `//duckduckgo.com/l/?uddg=<encoded target>`. Sponsored blocks are
//! marked `result--ad` and skipped.

use super::{SearchError, SearchProvider, SearchResult};
use crate::config::DUCKDUCKGO_BASE_URL;
use crate::llm::http_utils::{create_http_client, describe_error_body};
use async_trait::async_trait;
use reqwest::{Client as HttpClient, Url};
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::debug;

/// Browser-like agent; the HTML endpoint rejects empty or library agents
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// One organic hit as it appears on the page
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawHit {
    title: String,
    href: String,
}

/// Search provider for DuckDuckGo
pub struct DuckDuckGoProvider {
    http_client: HttpClient,
    base_url: String,
}

impl Default for DuckDuckGoProvider {
    fn default() -> Self {
        Self::new(DUCKDUCKGO_BASE_URL)
    }
}

impl DuckDuckGoProvider {
    /// Create a provider against a custom endpoint
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http_client: create_http_client(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

fn selector(css: &str) -> Result<Selector, SearchError> {
    Selector::parse(css).map_err(|e| SearchError::Parse(format!("bad selector {css}: {e}")))
}

/// Extract organic hits in page order
fn parse_hits(page: &str) -> Result<Vec<RawHit>, SearchError> {
    let document = Html::parse_document(page);
    let result_sel = selector("div.result")?;
    let link_sel = selector("a.result__a")?;

    let mut hits = Vec::new();
    for result in document.select(&result_sel) {
        if result.value().classes().any(|class| class == "result--ad") {
            continue;
        }
        let Some(link) = result.select(&link_sel).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let title = link.text().collect::<String>();
        hits.push(RawHit {
            title: title.split_whitespace().collect::<Vec<_>>().join(" "),
            href: href.to_string(),
        });
    }
    Ok(hits)
}

/// Turn a result `href` into the target URL, unwrapping the `/l/?uddg=` redirect.
fn resolve_link(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    let url = Url::parse(&absolute).ok()?;

    let is_redirect = url
        .host_str()
        .is_some_and(|host| host.ends_with("duckduckgo.com"));
    if is_redirect {
        if url.path() != "/l/" {
            return None;
        }
        let (_, target) = url.query_pairs().find(|(key, _)| key == "uddg")?;
        return resolve_link(&target);
    }

    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

fn collect_results(hits: Vec<RawHit>, max_results: usize) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    let mut results = Vec::new();

    for hit in hits {
        if results.len() >= max_results {
            break;
        }
        if hit.title.is_empty() {
            continue;
        }
        let Some(link) = resolve_link(&hit.href) else {
            continue;
        };
        if seen.insert(link.clone()) {
            results.push(SearchResult::new(hit.title, link));
        }
    }

    results
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    fn name(&self) -> &'static str {
        "duckduckgo"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        debug!(query = %query, max_results = max_results, "DuckDuckGo web search");

        let response = self
            .http_client
            .get(format!("{}/html/", self.base_url))
            .query(&[("q", query)])
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(SearchError::Api(describe_error_body(status, &body)));
        }

        let hits = parse_hits(&body)?;
        debug!(hits = hits.len(), "DuckDuckGo page parsed");
        Ok(collect_results(hits, max_results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // Trimmed copy of a results page for "AI news"
    const RESULTS_PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>AI news at DuckDuckGo</title></head>
<body>
<div class="serp__results"><div id="links" class="results">
  <div class="result results_links results_links_deep result--ad">
    <div class="links_main links_deep result__body">
      <h2 class="result__title">
        <a rel="nofollow" class="result__a" href="https://duckduckgo.com/y.js?ad_domain=example.com&amp;ad_provider=bing">Sponsored AI Tool</a>
      </h2>
    </div>
  </div>
  <div class="result results_links results_links_deep web-result">
    <div class="links_main links_deep result__body">
      <h2 class="result__title">
        <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.reuters.com%2Ftechnology%2Fartificial%2Dintelligence%2F&amp;rut=1a2b">
          <b>AI</b> <b>News</b> | Latest Headlines &amp; Developments | Reuters
        </a>
      </h2>
      <a class="result__snippet" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.reuters.com%2F">Latest <b>AI</b> news.</a>
    </div>
  </div>
  <div class="result results_links results_links_deep web-result">
    <div class="links_main links_deep result__body">
      <h2 class="result__title">
        <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.theverge.com%2Fai%2Dartificial%2Dintelligence&amp;rut=3c4d">AI | The Verge</a>
      </h2>
    </div>
  </div>
  <div class="result results_links results_links_deep web-result">
    <div class="links_main links_deep result__body">
      <h2 class="result__title">
        <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.reuters.com%2Ftechnology%2Fartificial%2Dintelligence%2F&amp;rut=5e6f">Reuters AI again</a>
      </h2>
    </div>
  </div>
  <div class="result results_links results_links_deep web-result">
    <div class="links_main links_deep result__body">
      <h2 class="result__title">
        <a rel="nofollow" class="result__a" href="https://techcrunch.com/category/artificial-intelligence/">AI News &amp; Artificial Intelligence | TechCrunch</a>
      </h2>
    </div>
  </div>
  <div class="result results_links results_links_deep web-result">
    <div class="links_main links_deep result__body">
      <h2 class="result__title">
        <a rel="nofollow" class="result__a" href="https://www.wired.com/tag/artificial-intelligence/">Artificial Intelligence | WIRED</a>
      </h2>
    </div>
  </div>
</div></div>
</body></html>"#;

    const NO_RESULTS_PAGE: &str = r#"<html><body>
<div id="links" class="results"><div class="no-results">No results.</div></div>
</body></html>"#;

    #[test]
    fn test_parse_hits_skips_ads_and_normalizes_titles() -> Result<(), SearchError> {
        let hits = parse_hits(RESULTS_PAGE)?;
        assert_eq!(hits.len(), 5);
        assert_eq!(
            hits[0].title,
            "AI News | Latest Headlines & Developments | Reuters"
        );
        Ok(())
    }

    #[test]
    fn test_resolve_link_unwraps_redirects() {
        assert_eq!(
            resolve_link("//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.org%2Fa%3Fb%3Dc&rut=x"),
            Some("https://example.org/a?b=c".to_string())
        );
        assert_eq!(
            resolve_link("https://www.rust-lang.org/"),
            Some("https://www.rust-lang.org/".to_string())
        );
        assert_eq!(resolve_link("https://duckduckgo.com/y.js?ad_domain=x"), None);
        assert_eq!(resolve_link("javascript:void(0)"), None);
    }

    #[tokio::test]
    async fn test_search_dedups_and_caps_results() -> Result<(), SearchError> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/html/"))
            .and(query_param("q", "AI news"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(RESULTS_PAGE.as_bytes().to_vec(), "text/html; charset=utf-8"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = DuckDuckGoProvider::new(server.uri());
        let results = provider.search("AI news", 3).await?;

        assert_eq!(
            results,
            vec![
                SearchResult::new(
                    "AI News | Latest Headlines & Developments | Reuters",
                    "https://www.reuters.com/technology/artificial-intelligence/"
                ),
                SearchResult::new(
                    "AI | The Verge",
                    "https://www.theverge.com/ai-artificial-intelligence"
                ),
                SearchResult::new(
                    "AI News & Artificial Intelligence | TechCrunch",
                    "https://techcrunch.com/category/artificial-intelligence/"
                ),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_search_without_hits_is_empty() -> Result<(), SearchError> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(NO_RESULTS_PAGE.as_bytes().to_vec(), "text/html"),
            )
            .mount(&server)
            .await;

        let results = DuckDuckGoProvider::new(server.uri())
            .search("xyzzy123nonexistent", 3)
            .await?;
        assert!(results.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_search_reports_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let err = DuckDuckGoProvider::new(server.uri()).search("cats", 3).await;
        assert!(matches!(err, Err(SearchError::Api(msg)) if msg.contains("busy")));
    }
}
