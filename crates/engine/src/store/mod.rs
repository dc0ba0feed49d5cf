//! Optional archive for finished verdicts.

mod cases;

pub use cases::ArchivedCase;

use std::future::Future;
use std::pin::Pin;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use courtroom_common::ids::CaseId;
use courtroom_common::types::FinalVerdict;

/// `save(case_id, verdict) -> case_id`. The pipeline behaves identically
/// whether or not a store is configured.
pub trait CaseStore: Send + Sync {
    fn save<'a>(
        &'a self,
        case_id: CaseId,
        verdict: &'a FinalVerdict,
    ) -> Pin<Box<dyn Future<Output = Result<CaseId, StoreError>> + Send + 'a>>;
}

/// PostgreSQL-backed case archive.
pub struct PgCaseStore {
    pool: PgPool,
}

impl PgCaseStore {
    /// Connect to PostgreSQL and return a client with a connection pool.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let client = Self { pool };
        client.health_check().await?;
        tracing::info!("PostgreSQL connection established");

        Ok(client)
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        tracing::info!("Running PostgreSQL migrations");

        sqlx::migrate!("src/store/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        tracing::info!("PostgreSQL migrations complete");
        Ok(())
    }
}

impl CaseStore for PgCaseStore {
    fn save<'a>(
        &'a self,
        case_id: CaseId,
        verdict: &'a FinalVerdict,
    ) -> Pin<Box<dyn Future<Output = Result<CaseId, StoreError>> + Send + 'a>> {
        Box::pin(self.save_case(case_id, verdict))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("PostgreSQL connection error: {0}")]
    Connection(String),

    #[error("PostgreSQL query error: {0}")]
    Query(String),

    #[error("PostgreSQL migration error: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<StoreError> for courtroom_common::CourtroomError {
    fn from(e: StoreError) -> Self {
        courtroom_common::CourtroomError::Store(e.to_string())
    }
}
