//! Run journal: one `etl_runs` row per pipeline run, closed with the step
//! outcomes as JSON.

use crate::schema::ETL_RUNS;
use crate::store::Store;
use crate::Result;
use chrono::Utc;
use uuid::Uuid;

/// Open a journal entry in `running` state.
pub async fn create_run(store: &Store) -> Result<Uuid> {
    let run_id = Uuid::new_v4();
    sqlx::query(&format!(
        "INSERT INTO {} (run_id, started_at, status, detail) VALUES (?, ?, 'running', '{{}}')",
        ETL_RUNS
    ))
    .bind(run_id.to_string())
    .bind(Utc::now())
    .execute(store.pool())
    .await?;
    Ok(run_id)
}

/// Close a journal entry with its final status and step detail.
pub async fn finish_run(
    store: &Store,
    run_id: Uuid,
    status: &str,
    detail: &serde_json::Value,
) -> Result<()> {
    sqlx::query(&format!(
        "UPDATE {} SET finished_at = ?, status = ?, detail = ? WHERE run_id = ?",
        ETL_RUNS
    ))
    .bind(Utc::now())
    .bind(status)
    .bind(detail.to_string())
    .bind(run_id.to_string())
    .execute(store.pool())
    .await?;
    Ok(())
}
