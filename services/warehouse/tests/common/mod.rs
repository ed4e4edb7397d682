//! Shared fixtures for warehouse integration tests

#![allow(dead_code)]

use chrono::NaiveDate;
use serde_json::{json, Value};
use warehouse::schema::create_relations;
use warehouse::staging::{stage_movies, stage_revenues, RevenueRecord};
use warehouse::Store;

/// In-memory warehouse with every relation created
pub async fn setup_store() -> Store {
    let store = Store::open_in_memory().await.expect("Should open in-memory store");
    create_relations(&store).await.expect("Should create relations");
    store
}

pub fn revenue(id: &str, date: (i32, u32, u32), title: &str, amount: i64, distributor: &str) -> RevenueRecord {
    RevenueRecord {
        id: id.to_string(),
        date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).expect("valid date"),
        title: title.to_string(),
        revenue: amount,
        theaters: Some(10),
        distributor: distributor.to_string(),
    }
}

/// Minimal OMDb-shaped payload
pub fn movie(title: &str, year: &str, genre: &str) -> Value {
    json!({
        "Title": title,
        "Year": year,
        "Rated": "PG-13",
        "Released": "05 Jan 2024",
        "Runtime": "120 min",
        "Genre": genre,
        "Director": "Jane Roe",
        "Writer": "John Doe, Jane Roe",
        "Actors": "Ann Lee, Bob Ray",
        "Ratings": [
            { "Source": "Internet Movie Database", "Value": "7.1/10" }
        ],
        "Response": "True"
    })
}

pub async fn stage(store: &Store, revenues: &[RevenueRecord], payloads: &[Value]) {
    stage_revenues(store, revenues).await.expect("Should stage revenues");
    stage_movies(store, payloads).await.expect("Should stage movies");
}

pub async fn names(store: &Store, sql: &str) -> Vec<(i64, String)> {
    sqlx::query_as(sql)
        .fetch_all(store.pool())
        .await
        .expect("Should query names")
}

pub async fn count(store: &Store, table: &str) -> i64 {
    store.count(table).await.expect("Should count rows")
}
