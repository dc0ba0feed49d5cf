use chrono::{DateTime, Utc};
use uuid::Uuid;

use courtroom_common::ids::CaseId;
use courtroom_common::types::FinalVerdict;

use super::{PgCaseStore, StoreError};

impl PgCaseStore {
    /// Insert or replace the verdict archived under `case_id`.
    pub async fn save_case(
        &self,
        case_id: CaseId,
        verdict: &FinalVerdict,
    ) -> Result<CaseId, StoreError> {
        let body =
            serde_json::to_value(verdict).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO cases (id, overall_verdict, implication_connection, claim_count,
                               verdict, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (id) DO UPDATE
            SET overall_verdict = EXCLUDED.overall_verdict,
                implication_connection = EXCLUDED.implication_connection,
                claim_count = EXCLUDED.claim_count,
                verdict = EXCLUDED.verdict,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(case_id.0)
        .bind(verdict.overall_verdict.to_string())
        .bind(&verdict.implication_connection)
        .bind(verdict.claim_analyses.len() as i32)
        .bind(&body)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        tracing::info!(case_id = %case_id, verdict = %verdict.overall_verdict, "Case archived");
        Ok(case_id)
    }

    /// Load an archived verdict.
    pub async fn get_case(&self, case_id: CaseId) -> Result<ArchivedCase, StoreError> {
        let row = sqlx::query_as::<_, CaseRow>(
            r#"
            SELECT id, verdict, created_at
            FROM cases
            WHERE id = $1
            "#,
        )
        .bind(case_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?
        .ok_or_else(|| StoreError::NotFound(format!("Case {}", case_id)))?;

        row.try_into()
    }
}

/// A verdict as read back from the archive.
#[derive(Debug, Clone)]
pub struct ArchivedCase {
    pub case_id: CaseId,
    pub verdict: FinalVerdict,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CaseRow {
    id: Uuid,
    verdict: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<CaseRow> for ArchivedCase {
    type Error = StoreError;

    fn try_from(row: CaseRow) -> Result<Self, Self::Error> {
        let verdict = serde_json::from_value(row.verdict)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Self {
            case_id: CaseId::from_uuid(row.id),
            verdict,
            created_at: row.created_at,
        })
    }
}
