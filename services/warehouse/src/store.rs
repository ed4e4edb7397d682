//! Store handle for the warehouse.
//!
//! One `Store` is opened per run, passed by reference to every loader and
//! closed explicitly when the run ends.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the SQLite file at `db_path`.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let newly_created = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);

        // Single writer: one connection keeps every step strictly serial
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        if newly_created {
            info!("Initialized new warehouse: {}", db_path.display());
        } else {
            info!("Opened existing warehouse: {}", db_path.display());
        }

        Ok(Self { pool })
    }

    /// Open an existing SQLite file for queries only.
    ///
    /// Fails when the file is missing; never creates it. Readers do not
    /// serialize behind the loader, so the pool may hold several connections.
    pub async fn open_read_only(db_path: &Path, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(false)
            .read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        info!(
            "Opened warehouse read-only: {} ({} connections)",
            db_path.display(),
            max_connections.max(1)
        );
        Ok(Self { pool })
    }

    /// Private in-memory warehouse, lives as long as the handle.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // The database vanishes with its connection, so never recycle it
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Row count of `table`. Table names are internal constants, never input.
    pub async fn count(&self, table: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Release the connection pool at the end of a run.
    pub async fn close(self) {
        self.pool.close().await;
    }
}
