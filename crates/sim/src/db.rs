use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;

/// Durable store for rendered observation lines.
#[derive(Clone)]
pub struct Db {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredObservation {
    pub id: i64,
    /// Host wall-clock time of the write (unix seconds).
    pub logged_at: i64,
    pub line: String,
}

impl Db {
    /// db_url examples:
    /// - "sqlite:greenhouse.db?mode=rwc"
    /// - "sqlite::memory:" (tests)
    pub async fn connect(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("invalid sqlite connection string: {db_url}"))?
            .journal_mode(SqliteJournalMode::Wal);

        let mut pool_options = SqlitePoolOptions::new().max_connections(5);
        if db_url.contains(":memory:") {
            // Every in-memory connection is its own database: pin a single one.
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to sqlite db: {db_url}"))?;

        Ok(Self { pool })
    }

    /// Runs SQLx migrations from ./migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run migrations")?;
        Ok(())
    }

    // ----------------------------
    // Observations
    // ----------------------------

    pub async fn insert_observation(&self, logged_at: i64, line: &str) -> Result<()> {
        sqlx::query("INSERT INTO observations (logged_at, line) VALUES (?, ?)")
            .bind(logged_at)
            .bind(line)
            .execute(&self.pool)
            .await
            .context("insert_observation failed")?;
        Ok(())
    }

    /// Newest observations first.
    pub async fn recent_observations(&self, limit: i64) -> Result<Vec<StoredObservation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, logged_at, line
            FROM observations
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("recent_observations failed")?;

        rows.into_iter()
            .map(|r| -> Result<StoredObservation, sqlx::Error> {
                Ok(StoredObservation {
                    id: r.try_get("id")?,
                    logged_at: r.try_get("logged_at")?,
                    line: r.try_get("line")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .context("recent_observations: bad row")
    }

    pub async fn count_observations(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM observations")
            .fetch_one(&self.pool)
            .await
            .context("count_observations failed")?;
        Ok(row.try_get("n")?)
    }
}

pub fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

// ===========================================================================
// Tests
// ===========================================================================
