//! Staging loads: full delete/reload of `stg_revenues` and `stg_movies`.

use crate::flatten::{flatten, leaf_text, FlatRecord};
use crate::schema::{STAGING_MOVIE_COLUMNS, STG_MOVIES, STG_REVENUES};
use crate::store::Store;
use crate::{Error, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// One daily box-office observation as it arrives from the revenue file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RevenueRecord {
    pub id: String,
    pub date: NaiveDate,
    pub title: String,
    pub revenue: i64,
    #[serde(default)]
    pub theaters: Option<i64>,
    pub distributor: String,
}

/// Columns the revenue file must declare in its header
pub const REVENUE_COLUMNS: [&str; 6] = ["id", "date", "title", "revenue", "theaters", "distributor"];

/// Parse revenue CSV content (`id,date,title,revenue,theaters,distributor`).
///
/// A header missing any of those columns rejects the whole file. Rows that
/// fail to deserialize are skipped with a warning naming the line.
pub fn parse_revenue_csv(content: &str) -> Result<Vec<RevenueRecord>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();
    if let Some(missing) = REVENUE_COLUMNS
        .iter()
        .find(|column| !headers.iter().any(|h| h == **column))
    {
        return Err(Error::InvalidRecord(format!(
            "revenue header has no '{}' column",
            missing
        )));
    }

    let mut records = Vec::new();
    for (line_num, result) in reader.deserialize::<RevenueRecord>().enumerate() {
        match result {
            Ok(record) => records.push(record),
            Err(e) => {
                // +2: 1-indexed plus header
                warn!("Skipping revenue line {}: {}", line_num + 2, e);
            }
        }
    }
    Ok(records)
}

pub async fn read_revenue_csv(path: &Path) -> Result<Vec<RevenueRecord>> {
    let content = tokio::fs::read_to_string(path).await?;
    let records = parse_revenue_csv(&content)?;
    info!("Read {} revenue records from {}", records.len(), path.display());
    Ok(records)
}

/// Read every `*.json` payload in `dir`, sorted by file name.
///
/// Files that are not valid JSON are skipped with a warning.
pub async fn read_payload_dir(dir: &Path) -> Result<Vec<Value>> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut payloads = Vec::with_capacity(paths.len());
    for path in paths {
        let content = tokio::fs::read_to_string(&path).await?;
        match serde_json::from_str::<Value>(&content) {
            Ok(value) => payloads.push(value),
            Err(e) => warn!("Skipping payload {}: {}", path.display(), e),
        }
    }
    info!("Read {} metadata payloads from {}", payloads.len(), dir.display());
    Ok(payloads)
}

/// Replace the revenue staging contents with `records`.
pub async fn stage_revenues(store: &Store, records: &[RevenueRecord]) -> Result<u64> {
    let mut tx = store.begin().await?;
    sqlx::query(&format!("DELETE FROM {}", STG_REVENUES))
        .execute(&mut *tx)
        .await?;

    for record in records {
        sqlx::query(&format!(
            "INSERT INTO {} (id, date, title, revenue, theaters, distributor) VALUES (?, ?, ?, ?, ?, ?)",
            STG_REVENUES
        ))
        .bind(&record.id)
        .bind(record.date)
        .bind(&record.title)
        .bind(record.revenue)
        .bind(record.theaters)
        .bind(&record.distributor)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!("Staged {} revenue records", records.len());
    Ok(records.len() as u64)
}

/// Result of staging metadata payloads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovieStaging {
    pub rows: u64,
    /// Flattened keys with no staging column, dropped
    pub dropped_keys: BTreeSet<String>,
}

/// Flatten `payloads` and replace the movie staging contents.
///
/// Rows are unioned on the declared column set: a key absent from a payload
/// is stored as NULL.
pub async fn stage_movies(store: &Store, payloads: &[Value]) -> Result<MovieStaging> {
    let records: Vec<FlatRecord> = payloads.iter().map(flatten).collect();

    let mut staging = MovieStaging::default();
    for record in &records {
        for key in record.keys() {
            if !STAGING_MOVIE_COLUMNS.contains(&key.as_str()) {
                staging.dropped_keys.insert(key.clone());
            }
        }
    }
    if !staging.dropped_keys.is_empty() {
        debug!("Dropping unmapped metadata keys: {:?}", staging.dropped_keys);
    }

    let columns = STAGING_MOVIE_COLUMNS
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; STAGING_MOVIE_COLUMNS.len()].join(", ");
    let insert = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        STG_MOVIES, columns, placeholders
    );

    let mut tx = store.begin().await?;
    sqlx::query(&format!("DELETE FROM {}", STG_MOVIES))
        .execute(&mut *tx)
        .await?;

    for record in &records {
        let mut query = sqlx::query(&insert);
        for column in STAGING_MOVIE_COLUMNS {
            query = query.bind(record.get(*column).and_then(leaf_text));
        }
        query.execute(&mut *tx).await?;
        staging.rows += 1;
    }

    tx.commit().await?;
    info!("Staged {} movie metadata records", staging.rows);
    Ok(staging)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_revenue_csv_basic() {
        let csv = "id,date,title,revenue,theaters,distributor\n\
                   r1,2024-01-05,Foo,1000,10,Acme\n";
        let records = parse_revenue_csv(csv).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "r1");
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(records[0].revenue, 1000);
        assert_eq!(records[0].theaters, Some(10));
        assert_eq!(records[0].distributor, "Acme");
    }

    #[test]
    fn test_parse_revenue_csv_skips_bad_lines() {
        let csv = "id,date,title,revenue,theaters,distributor\n\
                   r1,2024-01-05,Foo,1000,10,Acme\n\
                   r2,not-a-date,Foo,1000,10,Acme\n\
                   r3,2024-01-06,Foo,lots,10,Acme\n\
                   r4,2024-01-07,Foo,2000,11,Acme\n";
        let records = parse_revenue_csv(csv).unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r4"]);
    }

    #[test]
    fn test_parse_revenue_csv_empty_theaters_and_bom() {
        let csv = "\u{feff}id,date,title,revenue,theaters,distributor\n\
                   r1,2024-01-05,Foo,1000,,Acme\n";
        let records = parse_revenue_csv(csv).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].theaters, None);
    }

    #[test]
    fn test_parse_revenue_csv_whitespace_trimming() {
        let csv = "id,date,title,revenue,theaters,distributor\n  r1 , 2024-01-05 ,  Foo  , 1000 , 10 ,  Acme \n";
        let records = parse_revenue_csv(csv).unwrap();
        assert_eq!(records[0].title, "Foo");
        assert_eq!(records[0].distributor, "Acme");
    }

    #[test]
    fn test_parse_revenue_csv_rejects_missing_column() {
        let csv = "id,date,title,revenue,distributor\nr1,2024-01-05,Foo,1000,Acme\n";
        let err = parse_revenue_csv(csv).unwrap_err();
        assert!(matches!(err, Error::InvalidRecord(ref msg) if msg.contains("theaters")));
    }

    #[test]
    fn test_parse_revenue_csv_header_only() {
        let csv = "id,date,title,revenue,theaters,distributor\n";
        assert!(parse_revenue_csv(csv).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_payload_dir_sorted_and_skips_invalid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), r#"{"Title":"B"}"#).unwrap();
        std::fs::write(dir.path().join("a.json"), r#"{"Title":"A"}"#).unwrap();
        std::fs::write(dir.path().join("c.json"), "not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let payloads = read_payload_dir(dir.path()).await.unwrap();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0]["Title"], "A");
        assert_eq!(payloads[1]["Title"], "B");
    }
}
