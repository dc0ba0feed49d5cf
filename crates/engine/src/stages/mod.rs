//! The five pipeline stages. Each takes a shared [`StageContext`] and always
//! returns a well-formed value of its output type, degrading instead of
//! failing.

pub mod decompose;
pub mod extract;
pub mod judge;
pub mod promote;
pub mod verify;

use std::sync::Arc;
use std::time::Duration;

use courtroom_common::config::PipelineConfig;
use courtroom_common::trust::TrustCatalog;

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::invoke::Invoker;
use crate::registry::{FactCheckRegistry, RegistryMatch};
use crate::search::{SearchError, SearchResult, SearchService};

pub use decompose::decompose;
pub use extract::{extract, ExtractMode};
pub use judge::judge;
pub use promote::promote;
pub use verify::verify;

/// Collaborators and knobs shared by every stage of a run.
pub struct StageContext {
    pub pipeline: PipelineConfig,
    pub catalog: Arc<TrustCatalog>,
    /// Decomposition, extraction and promotion.
    pub decomposer: Invoker,
    /// Tier 3 consensus voting.
    pub analyzer: Invoker,
    pub judge: Invoker,
    pub search: Arc<dyn SearchService>,
    /// Tier 1 is skipped entirely when absent.
    pub registry: Option<Arc<dyn FactCheckRegistry>>,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub call_timeout: Duration,
}

impl StageContext {
    /// Search behind the search circuit breaker and the call timeout.
    pub async fn try_search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let breaker = &self.breakers.search;
        if !breaker.allow() {
            return Err(SearchError::CircuitOpen);
        }

        let result = match tokio::time::timeout(
            self.call_timeout,
            self.search.search(query, max_results),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SearchError::Timeout),
        };

        match &result {
            Ok(_) => breaker.record_success(),
            Err(e) => {
                breaker.record_failure();
                tracing::warn!(error = %e, query, "Search failed");
            }
        }
        result
    }

    /// Search where a failure simply means "no results".
    pub async fn search_or_empty(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        self.try_search(query, max_results).await.unwrap_or_default()
    }

    /// Registry lookup. `None` covers no match, no registry, open circuit
    /// and lookup failure alike.
    pub async fn registry_lookup(&self, text: &str) -> Option<RegistryMatch> {
        let registry = self.registry.as_ref()?;
        let breaker = &self.breakers.registry;
        if !breaker.allow() {
            tracing::debug!("Registry circuit open, skipping Tier 1");
            return None;
        }

        match tokio::time::timeout(self.call_timeout, registry.lookup(text)).await {
            Ok(Ok(found)) => {
                breaker.record_success();
                found
            }
            Ok(Err(e)) => {
                breaker.record_failure();
                tracing::warn!(error = %e, "Registry lookup failed");
                None
            }
            Err(_) => {
                breaker.record_failure();
                tracing::warn!("Registry lookup timed out");
                None
            }
        }
    }
}

/// First `max` characters of `text`, on a char boundary.
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    use courtroom_common::trust::UNTRUSTED_CATEGORY;

    use super::*;
    use crate::invoke::testing::invoker;
    use crate::llm::ReasoningService;
    use crate::registry::RegistryError;

    /// Canned search results keyed by exact query; unknown queries return
    /// nothing. Every query is recorded.
    #[derive(Default)]
    pub struct MockSearch {
        pub results: HashMap<String, Vec<SearchResult>>,
        pub queries: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl SearchService for MockSearch {
        fn search<'a>(
            &'a self,
            query: &'a str,
            max_results: usize,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<SearchResult>, SearchError>> + Send + 'a>>
        {
            self.queries.lock().unwrap().push(query.to_string());
            let out = if self.fail {
                Err(SearchError::Http("down".into()))
            } else {
                let mut hits = self.results.get(query).cloned().unwrap_or_default();
                hits.truncate(max_results);
                Ok(hits)
            };
            Box::pin(async move { out })
        }
    }

    /// Matches any text containing one of the keys.
    #[derive(Default)]
    pub struct MockRegistry {
        pub matches: Vec<(String, RegistryMatch)>,
    }

    impl FactCheckRegistry for MockRegistry {
        fn lookup<'a>(
            &'a self,
            text: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Option<RegistryMatch>, RegistryError>> + Send + 'a>>
        {
            let found = self
                .matches
                .iter()
                .find(|(key, _)| text.contains(key.as_str()))
                .map(|(_, m)| m.clone());
            Box::pin(async move { Ok(found) })
        }
    }

    pub fn hit(url: &str, snippet: &str) -> SearchResult {
        SearchResult {
            url: url.into(),
            title: format!("About {url}"),
            snippet: snippet.into(),
            relevance_score: 0.9,
        }
    }

    pub fn catalog() -> TrustCatalog {
        let mut categories = std::collections::BTreeMap::new();
        categories.insert(
            "international_orgs".to_string(),
            vec!["who.int".to_string(), "un.org".to_string()],
        );
        categories.insert("government".to_string(), vec!["gov".to_string()]);
        categories.insert(
            UNTRUSTED_CATEGORY.to_string(),
            vec!["reddit.com".to_string(), "quora.com".to_string()],
        );
        TrustCatalog {
            categories,
            medium_domains: vec!["wikipedia.org".into()],
            extra_consensus_exclusions: vec!["stackexchange.com".into()],
        }
    }

    /// Context whose three roles all share one scripted service.
    pub fn context(
        llm: Arc<dyn ReasoningService>,
        search: Arc<dyn SearchService>,
        registry: Option<Arc<dyn FactCheckRegistry>>,
    ) -> StageContext {
        StageContext {
            pipeline: PipelineConfig::default(),
            catalog: Arc::new(catalog()),
            decomposer: invoker(vec![llm.clone()]),
            analyzer: invoker(vec![llm.clone()]),
            judge: invoker(vec![llm]),
            search,
            registry,
            breakers: Arc::new(CircuitBreakerRegistry::new()),
            call_timeout: Duration::from_secs(120),
        }
    }
}
