//! Revenue fact loading.

use crate::date_dim::date_id;
use crate::dimension::{movie_ids_by_title, name_ids, resolve_unique_title};
use crate::normalize::match_key;
use crate::schema::{DIM_DATE, DIM_DISTRIBUTION, FACT_REVENUE, STG_REVENUES};
use crate::store::Store;
use crate::{LoadCounts, Result};
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{info, warn};

/// Staged revenue row as read back for fact loading
#[derive(Debug, sqlx::FromRow)]
struct StagedRevenue {
    id: Option<String>,
    date: Option<NaiveDate>,
    title: Option<String>,
    revenue: Option<i64>,
    theaters: Option<i64>,
    distributor: Option<String>,
}

/// Insert one fact per staged revenue record whose keys all resolve.
///
/// Records whose id is already in `fact_revenue`, or repeated within the
/// batch, are skipped. Records with an unresolved movie, date or distributor
/// are dropped and counted as unresolved.
pub async fn load_revenue_facts(store: &Store) -> Result<LoadCounts> {
    let mut tx = store.begin().await?;

    let staged: Vec<StagedRevenue> = sqlx::query_as(&format!(
        "SELECT id, date, title, revenue, theaters, distributor FROM {} ORDER BY rowid",
        STG_REVENUES
    ))
    .fetch_all(&mut *tx)
    .await?;

    let movies = movie_ids_by_title(&mut *tx).await?;
    let distributors = name_ids(&mut *tx, DIM_DISTRIBUTION).await?;
    let dates: HashSet<i64> = sqlx::query_scalar::<_, i64>(&format!("SELECT date_id FROM {}", DIM_DATE))
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();
    let mut loaded: HashSet<String> =
        sqlx::query_scalar::<_, String>(&format!("SELECT revenue_id FROM {}", FACT_REVENUE))
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .collect();

    let insert = format!(
        "INSERT INTO {} (revenue_id, movie_id, date_id, distribution_id, revenue, theaters) VALUES (?, ?, ?, ?, ?, ?)",
        FACT_REVENUE
    );

    let mut counts = LoadCounts::default();
    for row in staged {
        let (Some(id), Some(revenue)) = (row.id, row.revenue) else {
            warn!("Revenue record without id or amount, dropped");
            counts.unresolved += 1;
            continue;
        };
        if loaded.contains(&id) {
            counts.skipped += 1;
            continue;
        }

        let title = row.title.unwrap_or_default();
        let Some(movie_id) = resolve_unique_title(&movies, &title) else {
            warn!("Revenue {}: no unique movie for title '{}'", id, title);
            counts.unresolved += 1;
            continue;
        };

        let Some(day_id) = row.date.map(date_id).filter(|d| dates.contains(d)) else {
            warn!("Revenue {}: date {:?} outside the date dimension", id, row.date);
            counts.unresolved += 1;
            continue;
        };

        let distributor = row.distributor.unwrap_or_default();
        let Some(&distribution_id) = match_key(&distributor).and_then(|key| distributors.get(&key)) else {
            warn!("Revenue {}: unknown distributor '{}'", id, distributor);
            counts.unresolved += 1;
            continue;
        };

        sqlx::query(&insert)
            .bind(&id)
            .bind(movie_id)
            .bind(day_id)
            .bind(distribution_id)
            .bind(revenue)
            .bind(row.theaters)
            .execute(&mut *tx)
            .await?;
        loaded.insert(id);
        counts.inserted += 1;
    }

    tx.commit().await?;
    info!(
        "Loaded {}: {} new, {} already present, {} unresolved",
        FACT_REVENUE, counts.inserted, counts.skipped, counts.unresolved
    );
    Ok(counts)
}
