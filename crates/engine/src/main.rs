use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use courtroom_common::ids::CaseId;
use courtroom_common::{CourtroomError, Result};
use courtroom_engine::config;
use courtroom_engine::registry::{FactCheckRegistry, FactCheckToolsClient};
use courtroom_engine::search::{SearchService, TavilyClient};
use courtroom_engine::store::{CaseStore, PgCaseStore};
use courtroom_engine::Pipeline;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Courtroom engine starting");

    if let Err(e) = run().await {
        tracing::error!(error = %e, external = e.is_external(), "Courtroom engine failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load configuration. Fail loudly on misconfiguration.
    let config_dir = std::env::var("COURTROOM_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config"));
    let engine_config = config::load_config(&config_dir)?;

    let transcript = read_transcript(std::env::args().nth(1))
        .map_err(|e| CourtroomError::Internal(format!("failed to read transcript: {e}")))?;
    if transcript.trim().is_empty() {
        return Err(CourtroomError::Validation("transcript is empty".into()));
    }

    let search: Arc<dyn SearchService> = TavilyClient::new(engine_config.system.search.clone())
        .map(Arc::new)
        .ok_or_else(|| CourtroomError::Config("TAVILY_API_KEY is required".into()))?;

    // Tier 1 is optional.
    let registry = FactCheckToolsClient::new(engine_config.system.registry.clone())
        .map(|c| Arc::new(c) as Arc<dyn FactCheckRegistry>);

    // Archiving is optional.
    let store: Option<Arc<dyn CaseStore>> = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.is_empty() => {
            let client = PgCaseStore::connect(&url, 5).await?;
            client.migrate().await?;
            Some(Arc::new(client))
        }
        _ => None,
    };

    let case_id = std::env::var("COURTROOM_CASE_ID")
        .ok()
        .and_then(|raw| raw.parse::<CaseId>().ok());

    let pipeline = Pipeline::from_config(&engine_config, search, registry, store);
    let verdict = pipeline.run_pipeline(&transcript, case_id).await;

    tracing::info!(llm_calls = pipeline.call_count(), "Courtroom engine finished");

    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}

/// Transcript from the file named by the first argument, or stdin.
fn read_transcript(path: Option<String>) -> std::io::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}
