//! Calendar dimension over a fixed horizon.

use crate::schema::DIM_DATE;
use crate::store::Store;
use crate::{LoadCounts, Result};
use chrono::{Datelike, NaiveDate};
use tracing::info;

/// First and last day covered by `dim_date`, inclusive
pub const HORIZON_START: (i32, u32, u32) = (2000, 1, 1);
pub const HORIZON_END: (i32, u32, u32) = (2030, 12, 31);

/// `YYYYMMDD` integer key of a calendar date
pub fn date_id(date: NaiveDate) -> i64 {
    date.year() as i64 * 10_000 + date.month() as i64 * 100 + date.day() as i64
}

fn horizon() -> (NaiveDate, NaiveDate) {
    let (ys, ms, ds) = HORIZON_START;
    let (ye, me, de) = HORIZON_END;
    let start = NaiveDate::from_ymd_opt(ys, ms, ds).expect("HORIZON_START is a calendar date");
    let end = NaiveDate::from_ymd_opt(ye, me, de).expect("HORIZON_END is a calendar date");
    (start, end)
}

/// Populate `dim_date` once. Returns `None` when rows already exist.
pub async fn generate_date_dimension(store: &Store) -> Result<Option<LoadCounts>> {
    let mut tx = store.begin().await?;

    let existing: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", DIM_DATE))
        .fetch_one(&mut *tx)
        .await?;
    if existing > 0 {
        info!("{} already populated ({} rows). Skipping.", DIM_DATE, existing);
        return Ok(None);
    }

    let (start, end) = horizon();
    let insert = format!(
        "INSERT INTO {} (date_id, full_date, year, month, day) VALUES (?, ?, ?, ?, ?)",
        DIM_DATE
    );

    let mut counts = LoadCounts::default();
    for day in start.iter_days().take_while(|d| *d <= end) {
        sqlx::query(&insert)
            .bind(date_id(day))
            .bind(day)
            .bind(day.year())
            .bind(day.month() as i32)
            .bind(day.day() as i32)
            .execute(&mut *tx)
            .await?;
        counts.inserted += 1;
    }

    tx.commit().await?;
    info!("Generated {} rows in {}", counts.inserted, DIM_DATE);
    Ok(Some(counts))
}
