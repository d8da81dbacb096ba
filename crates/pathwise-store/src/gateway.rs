use std::collections::BTreeMap;
use std::str::FromStr;

use pathwise_core::{GatewayError, LearnerState, PersistenceGateway, VersionedState};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::StoreError;

/// [`PersistenceGateway`] backed by a `learner_state` table with one row per developer.
///
/// Profile, path and difficulty state are stored as JSON columns and always written in
/// the same statement.
#[derive(Debug, Clone)]
pub struct SqliteGateway {
    pool: SqlitePool,
}

type StateRow = (i64, String, String, String);

impl SqliteGateway {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) the database at `path` and initialize the schema.
    ///
    /// Pass `:memory:` for a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema cannot be created.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let in_memory = path == ":memory:";
        let url = if in_memory {
            String::from("sqlite::memory:")
        } else {
            if let Some(parent) = std::path::Path::new(path).parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
            }
            format!("sqlite:{path}?mode=rwc")
        };

        let opts = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
        // every connection to `sqlite::memory:` is a separate database
        let max_connections = if in_memory { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let gateway = Self::new(pool);
        gateway.init().await?;
        tracing::debug!(path, "learner state store ready");
        Ok(gateway)
    }

    /// Initialize the `learner_state` table.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL statement fails.
    pub async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS learner_state (
                developer_id TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                profile TEXT NOT NULL,
                path TEXT NOT NULL,
                difficulty TEXT NOT NULL DEFAULT '{}',
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Ids of every developer with a stored snapshot, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL query fails.
    pub async fn developers(&self) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT developer_id FROM learner_state ORDER BY developer_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn load_row(&self, developer_id: &str) -> Result<Option<VersionedState>, StoreError> {
        let row: Option<StateRow> = sqlx::query_as(
            "SELECT version, profile, path, difficulty FROM learner_state WHERE developer_id = ?",
        )
        .bind(developer_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((version, profile, path, difficulty)) = row else {
            return Ok(None);
        };
        let difficulty: BTreeMap<_, _> = serde_json::from_str(&difficulty)?;
        Ok(Some(VersionedState {
            state: LearnerState {
                profile: serde_json::from_str(&profile)?,
                path: serde_json::from_str(&path)?,
                difficulty,
            },
            version: to_version(developer_id, version)?,
        }))
    }

    async fn save_row(
        &self,
        developer_id: &str,
        state: &LearnerState,
        expected_version: u64,
    ) -> Result<Result<u64, u64>, StoreError> {
        let profile = serde_json::to_string(&state.profile)?;
        let path = serde_json::to_string(&state.path)?;
        let difficulty = serde_json::to_string(&state.difficulty)?;
        let updated_at = state.profile.updated_at.to_rfc3339();

        let mut tx = self.pool.begin().await?;
        let current: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM learner_state WHERE developer_id = ?")
                .bind(developer_id)
                .fetch_optional(&mut *tx)
                .await?;
        let actual = match current {
            Some((v,)) => to_version(developer_id, v)?,
            None => 0,
        };
        if actual != expected_version {
            return Ok(Err(actual));
        }

        let version = actual + 1;
        let new_version = i64::try_from(version).map_err(|_| StoreError::CorruptVersion {
            developer_id: developer_id.to_owned(),
            version: i64::MAX,
        })?;
        let written = if actual == 0 {
            sqlx::query(
                "INSERT INTO learner_state (developer_id, version, profile, path, difficulty, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(developer_id) DO NOTHING",
            )
            .bind(developer_id)
            .bind(new_version)
            .bind(&profile)
            .bind(&path)
            .bind(&difficulty)
            .bind(&updated_at)
            .execute(&mut *tx)
            .await?
        } else {
            sqlx::query(
                "UPDATE learner_state
                 SET version = ?, profile = ?, path = ?, difficulty = ?, updated_at = ?
                 WHERE developer_id = ? AND version = ?",
            )
            .bind(new_version)
            .bind(&profile)
            .bind(&path)
            .bind(&difficulty)
            .bind(&updated_at)
            .bind(developer_id)
            .bind(new_version - 1)
            .execute(&mut *tx)
            .await?
        };
        if written.rows_affected() != 1 {
            return Ok(Err(actual + 1));
        }
        tx.commit().await?;
        Ok(Ok(version))
    }
}

fn to_version(developer_id: &str, version: i64) -> Result<u64, StoreError> {
    u64::try_from(version).map_err(|_| StoreError::CorruptVersion {
        developer_id: developer_id.to_owned(),
        version,
    })
}

impl PersistenceGateway for SqliteGateway {
    async fn load(&self, developer_id: &str) -> Result<Option<VersionedState>, GatewayError> {
        Ok(self.load_row(developer_id).await?)
    }

    async fn save(
        &self,
        developer_id: &str,
        state: &LearnerState,
        expected_version: u64,
    ) -> Result<u64, GatewayError> {
        match self.save_row(developer_id, state, expected_version).await? {
            Ok(version) => {
                tracing::debug!(developer_id, version, "saved learner state");
                Ok(version)
            }
            Err(actual) => Err(GatewayError::VersionConflict {
                developer_id: developer_id.to_owned(),
                expected: expected_version,
                actual,
            }),
        }
    }
}
