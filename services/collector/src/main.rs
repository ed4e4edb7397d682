//! Collector Service - Captures movie metadata payloads from OMDb
//!
//! Responsibilities:
//! - Read the titles to look up from the daily revenue CSV
//! - Fetch one metadata payload per title, with a fixed delay between requests
//! - Keep only found-movie JSON objects
//! - Store accepted payloads content-addressed under RAW_FS_DIR
//!
//! Usage:
//!   API_KEY=... cargo run --bin collector -- --revenues data/revenues_per_day.csv --max-titles 5

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::time::sleep;
use tracing::{error, info, warn};
use warehouse::normalize::match_key;
use warehouse::staging::{read_revenue_csv, RevenueRecord};

#[derive(Parser, Debug)]
#[command(name = "collector", about = "Captures OMDb metadata for the titles in the revenue file")]
struct Args {
    /// Daily revenue CSV whose titles are looked up
    #[arg(long, env = "REVENUES_CSV", default_value = "./data/revenues_per_day.csv")]
    revenues: PathBuf,

    /// Upper bound on distinct titles fetched per run
    #[arg(long, default_value = "5")]
    max_titles: usize,
}

#[derive(Debug, thiserror::Error)]
enum ConfigError {
    #[error("{0} environment variable is not set")]
    MissingCredential(&'static str),
    #[error("{name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
struct Config {
    api_key: String,
    omdb_url: String,
    raw_fs_dir: PathBuf,
    rate_limit_ms: u64,
    request_timeout_secs: u64,
}

impl Config {
    fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> std::result::Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingCredential("API_KEY"))?;

        Ok(Self {
            api_key,
            omdb_url: lookup("OMDB_URL").unwrap_or_else(|| "http://www.omdbapi.com/".to_string()),
            raw_fs_dir: PathBuf::from(
                lookup("RAW_FS_DIR").unwrap_or_else(|| "./data/raw".to_string()),
            ),
            rate_limit_ms: parse_number(&lookup, "RATE_LIMIT_MS", 1000)?,
            request_timeout_secs: parse_number(&lookup, "REQUEST_TIMEOUT_SECS", 30)?,
        })
    }
}

fn parse_number<F>(lookup: &F, name: &'static str, default: u64) -> std::result::Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

/// Distinct titles in first-seen order, at most `max`.
fn unique_titles(records: &[RevenueRecord], max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|r| match_key(&r.title).is_some_and(|key| seen.insert(key)))
        .map(|r| r.title.trim().to_string())
        .take(max)
        .collect()
}

/// Why a response body was not kept
#[derive(Debug, thiserror::Error, PartialEq)]
enum Rejection {
    #[error("response is not valid JSON")]
    NotJson,
    #[error("response is not a JSON object")]
    NotObject,
    #[error("no match: {0}")]
    NotFound(String),
}

/// Keep a response body only if it is a JSON object describing a found movie.
fn accept_payload(body: &[u8]) -> std::result::Result<Value, Rejection> {
    let value: Value = serde_json::from_slice(body).map_err(|_| Rejection::NotJson)?;
    let Some(object) = value.as_object() else {
        return Err(Rejection::NotObject);
    };
    if object.get("Response").and_then(Value::as_str) == Some("False") {
        let reason = object
            .get("Error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(Rejection::NotFound(reason));
    }
    Ok(value)
}

fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn payload_path(dir: &Path, hash: &str) -> PathBuf {
    dir.join(format!("{}.json", hash))
}

/// Write `bytes` under its content hash. Returns the path and whether it was newly written.
async fn save_payload(dir: &Path, bytes: &[u8]) -> Result<(PathBuf, bool)> {
    fs::create_dir_all(dir).await?;
    let path = payload_path(dir, &content_hash(bytes));
    if fs::try_exists(&path).await? {
        return Ok((path, false));
    }
    fs::write(&path, bytes).await?;
    Ok((path, true))
}

/// Outcome of one title lookup
#[derive(Debug, PartialEq)]
enum Capture {
    Saved(PathBuf),
    AlreadyPresent(PathBuf),
    Rejected(Rejection),
}

async fn fetch_title(client: &reqwest::Client, config: &Config, title: &str) -> Result<Capture> {
    sleep(Duration::from_millis(config.rate_limit_ms)).await;

    info!("Fetching metadata for '{}'", title);
    let resp = client
        .get(&config.omdb_url)
        .query(&[("t", title), ("apikey", config.api_key.as_str())])
        .send()
        .await?
        .error_for_status()
        .context("HTTP request failed")?;

    let bytes = resp.bytes().await?;
    if let Err(rejection) = accept_payload(&bytes) {
        return Ok(Capture::Rejected(rejection));
    }

    let (path, written) = save_payload(&config.raw_fs_dir, &bytes).await?;
    Ok(if written {
        Capture::Saved(path)
    } else {
        Capture::AlreadyPresent(path)
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;

    info!("=== Movie Metadata Collector ===");
    info!("Source: {}", config.omdb_url);
    info!("Storage: {}", config.raw_fs_dir.display());

    let records = read_revenue_csv(&args.revenues)
        .await
        .context("Failed to read revenue CSV")?;
    let titles = unique_titles(&records, args.max_titles);
    info!("Looking up {} title(s)", titles.len());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .user_agent("MovieRevenueWarehouse/1.0")
        .build()?;

    let mut saved = 0;
    let mut present = 0;
    let mut rejected = 0;
    let mut failed = 0;

    for title in &titles {
        match fetch_title(&client, &config, title).await {
            Ok(Capture::Saved(path)) => {
                info!("  ✓ '{}' saved to {}", title, path.display());
                saved += 1;
            }
            Ok(Capture::AlreadyPresent(path)) => {
                info!("  = '{}' unchanged at {}", title, path.display());
                present += 1;
            }
            Ok(Capture::Rejected(reason)) => {
                warn!("  - '{}' skipped: {}", title, reason);
                rejected += 1;
            }
            Err(e) => {
                error!("  ✗ '{}' failed: {:#}", title, e);
                failed += 1;
            }
        }
    }

    info!("=== Collection Summary ===");
    info!("Saved: {}", saved);
    info!("Already present: {}", present);
    info!("Skipped: {}", rejected);
    info!("Failed: {}", failed);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use warehouse::staging::parse_revenue_csv;

    fn records(titles: &[&str]) -> Vec<RevenueRecord> {
        let mut csv = String::from("id,date,title,revenue,theaters,distributor\n");
        for (i, title) in titles.iter().enumerate() {
            csv.push_str(&format!("r{},2024-01-05,{},100,1,Acme\n", i, title));
        }
        parse_revenue_csv(&csv).unwrap()
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let err = Config::from_lookup(env(&[("OMDB_URL", "http://localhost/")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential("API_KEY")));
        assert_eq!(err.to_string(), "API_KEY environment variable is not set");

        let blank = Config::from_lookup(env(&[("API_KEY", "  ")]));
        assert!(blank.is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(env(&[("API_KEY", "k")])).unwrap();
        assert_eq!(config.omdb_url, "http://www.omdbapi.com/");
        assert_eq!(config.raw_fs_dir, PathBuf::from("./data/raw"));
        assert_eq!(config.rate_limit_ms, 1000);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_config_rejects_bad_numbers() {
        let err = Config::from_lookup(env(&[("API_KEY", "k"), ("RATE_LIMIT_MS", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "RATE_LIMIT_MS", .. }));
    }

    #[test]
    fn test_unique_titles_first_seen_and_capped() {
        let records = records(&["Foo", "Bar", "foo.", "Baz", "Qux", "Quux", "Corge"]);
        assert_eq!(unique_titles(&records, 5), vec!["Foo", "Bar", "Baz", "Qux", "Quux"]);
        assert_eq!(unique_titles(&records, 2), vec!["Foo", "Bar"]);
    }

    #[test]
    fn test_accept_payload() {
        let found = br#"{"Title":"Foo","Genre":"Drama","Response":"True"}"#;
        assert_eq!(accept_payload(found).unwrap()["Title"], "Foo");

        let missing = br#"{"Response":"False","Error":"Movie not found!"}"#;
        assert_eq!(
            accept_payload(missing),
            Err(Rejection::NotFound("Movie not found!".to_string()))
        );

        assert_eq!(accept_payload(b"[1,2]"), Err(Rejection::NotObject));
        assert_eq!(accept_payload(b"<html>"), Err(Rejection::NotJson));
    }

    #[test]
    fn test_payload_path_uses_content_hash() {
        let hash = content_hash(b"{}");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            payload_path(Path::new("/raw"), &hash),
            PathBuf::from(format!("/raw/{}.json", hash))
        );
    }

    #[tokio::test]
    async fn test_save_payload_does_not_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw");

        let (path, written) = save_payload(&raw, b"{\"Title\":\"Foo\"}").await.unwrap();
        assert!(written);
        assert!(path.exists());

        let (again, written) = save_payload(&raw, b"{\"Title\":\"Foo\"}").await.unwrap();
        assert_eq!(again, path);
        assert!(!written);
        assert_eq!(std::fs::read_dir(&raw).unwrap().count(), 1);
    }
}
