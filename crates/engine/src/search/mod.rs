//! Web search collaborator.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use courtroom_common::config::SearchConfig;

/// One search hit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub relevance_score: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search HTTP error: {0}")]
    Http(String),

    #[error("search API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("search response parse error: {0}")]
    Parse(String),

    #[error("search timed out")]
    Timeout,

    #[error("search circuit open")]
    CircuitOpen,
}

impl From<SearchError> for courtroom_common::CourtroomError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::CircuitOpen => courtroom_common::CourtroomError::CircuitOpen("search".into()),
            other => courtroom_common::CourtroomError::Search(other.to_string()),
        }
    }
}

/// `search(query, result_count)`; may return fewer results than asked, or none.
pub trait SearchService: Send + Sync {
    fn search<'a>(
        &'a self,
        query: &'a str,
        max_results: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SearchResult>, SearchError>> + Send + 'a>>;
}

// ---------------------------------------------------------------------------
// Tavily
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    search_depth: &'static str,
    max_results: usize,
    include_answer: bool,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
}

/// Tavily search API client (advanced depth).
pub struct TavilyClient {
    http: reqwest::Client,
    config: SearchConfig,
    api_key: String,
}

impl TavilyClient {
    /// Returns None if TAVILY_API_KEY is not set.
    pub fn new(config: SearchConfig) -> Option<Self> {
        let api_key = match std::env::var("TAVILY_API_KEY") {
            Ok(key) if !key.is_empty() => key,
            _ => {
                tracing::warn!("TAVILY_API_KEY not set, web search disabled");
                return None;
            }
        };
        Some(Self {
            http: reqwest::Client::new(),
            config,
            api_key,
        })
    }

    async fn search_once(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let limit = max_results.min(self.config.max_results);
        let request = TavilyRequest {
            query,
            search_depth: "advanced",
            max_results: limit,
            include_answer: false,
        };

        let response = self
            .http
            .post(format!("{}/search", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SearchError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Api { status, body });
        }

        let body: TavilyResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Parse(e.to_string()))?;

        Ok(filter_results(body, self.config.min_relevance, limit))
    }
}

fn filter_results(body: TavilyResponse, min_relevance: f64, limit: usize) -> Vec<SearchResult> {
    body.results
        .into_iter()
        .filter(|r| r.score >= min_relevance)
        .take(limit)
        .map(|r| SearchResult {
            url: r.url,
            title: r.title,
            snippet: r.content,
            relevance_score: r.score,
        })
        .collect()
}

impl SearchService for TavilyClient {
    fn search<'a>(
        &'a self,
        query: &'a str,
        max_results: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SearchResult>, SearchError>> + Send + 'a>> {
        Box::pin(self.search_once(query, max_results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relevance_filter_and_limit() {
        let body: TavilyResponse = serde_json::from_str(
            r#"{"query": "q", "results": [
                {"url": "https://a.org", "title": "A", "content": "alpha", "score": 0.91},
                {"url": "https://b.org", "title": "B", "content": "beta", "score": 0.32},
                {"url": "https://c.org", "title": "C", "content": "gamma", "score": 0.77},
                {"url": "https://d.org", "title": "D", "content": "delta", "score": 0.60}
            ]}"#,
        )
        .unwrap();

        let results = filter_results(body, 0.5, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].snippet, "alpha");
        assert_eq!(results[1].url, "https://c.org");
    }

    #[test]
    fn test_request_wire_format() {
        let req = TavilyRequest {
            query: "is it true that \"x\" -site:reddit.com",
            search_depth: "advanced",
            max_results: 10,
            include_answer: false,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["search_depth"], "advanced");
        assert_eq!(v["max_results"], 10);
    }
}
