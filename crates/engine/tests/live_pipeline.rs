///! Runs against the real reasoning, search and fact-check services.
///! All tests are `#[ignore]`; run with `cargo test -- --ignored`.
///!
///! Requirements: GEMINI_API_KEY (or the keys for the configured providers),
///! TAVILY_API_KEY. FACT_CHECK_API_KEY is optional.
use std::sync::Arc;

use courtroom_engine::config;
use courtroom_engine::registry::{FactCheckRegistry, FactCheckToolsClient};
use courtroom_engine::search::{SearchService, TavilyClient};
use courtroom_engine::Pipeline;

fn setup() -> Pipeline {
    let config_dir = std::env::var("COURTROOM_CONFIG_DIR")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("../../config"));
    let engine_config = config::load_config(&config_dir).expect("Failed to load config");

    let search: Arc<dyn SearchService> = Arc::new(
        TavilyClient::new(engine_config.system.search.clone()).expect("TAVILY_API_KEY not set"),
    );
    let registry = FactCheckToolsClient::new(engine_config.system.registry.clone())
        .map(|c| Arc::new(c) as Arc<dyn FactCheckRegistry>);

    Pipeline::from_config(&engine_config, search, registry, None)
}

#[tokio::test]
#[ignore]
async fn test_live_run_produces_analysis_per_claim() {
    let pipeline = setup();

    let verdict = pipeline
        .run_pipeline(
            "The Eiffel Tower was completed in 1889 for the World's Fair and was meant to be torn down after 20 years.",
            None,
        )
        .await;

    println!("{}", serde_json::to_string_pretty(&verdict).unwrap());
    assert!(!verdict.implication_connection.is_empty());
    assert!(!verdict.claim_analyses.is_empty());
    for analysis in &verdict.claim_analyses {
        assert!(!analysis.claim_text.is_empty());
        assert!(analysis.prosecutor_evidence.len() <= 2);
        assert!(analysis.defender_evidence.len() <= 2);
    }
    assert!(pipeline.call_count() > 0);
}
