//! Audience storage repository.

use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};

use super::model::{Audience, AudienceId, FilterSet};
use crate::Result;
use crate::subscriber::SubscriberId;

/// Repository for audiences and static membership junction rows.
pub struct AudienceRepository {
    pool: SqlitePool,
}

impl AudienceRepository {
    /// Create a new repository with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        Self::from_pool(pool).await
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Self::from_pool(pool).await
    }

    /// Create a repository over an existing pool.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS email_audiences (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                filters TEXT NOT NULL DEFAULT '{}',
                subscriber_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS email_audience_subscribers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                audience_id INTEGER NOT NULL,
                subscriber_id INTEGER NOT NULL,
                added_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(audience_id, subscriber_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_audience_subscribers_audience
            ON email_audience_subscribers(audience_id)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Create an audience.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter set does not serialize or the database
    /// query fails.
    pub async fn create(&self, name: &str, filter_set: &FilterSet) -> Result<Audience> {
        let filters = serde_json::to_string(filter_set)?;

        let result = sqlx::query(r"INSERT INTO email_audiences (name, filters) VALUES (?, ?)")
            .bind(name)
            .bind(&filters)
            .execute(&self.pool)
            .await?;

        Ok(Audience {
            id: AudienceId(result.last_insert_rowid()),
            name: name.to_string(),
            filter_set: filter_set.clone(),
            subscriber_count: 0,
        })
    }

    /// Get an audience by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: AudienceId) -> Result<Option<Audience>> {
        let row = sqlx::query(
            r"SELECT id, name, filters, subscriber_count FROM email_audiences WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_audience))
    }

    /// Get audiences by ID set; unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_by_ids(&self, ids: &[AudienceId]) -> Result<Vec<Audience>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT id, name, filters, subscriber_count FROM email_audiences WHERE id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.0);
        }
        builder.push(")");

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_audience).collect())
    }

    /// Add a subscriber to a static audience's membership.
    ///
    /// Adding an existing member is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn add_member(&self, audience: AudienceId, subscriber: SubscriberId) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO email_audience_subscribers (audience_id, subscriber_id)
            VALUES (?, ?)
            ON CONFLICT(audience_id, subscriber_id) DO NOTHING
            ",
        )
        .bind(audience.0)
        .bind(subscriber.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a subscriber from a static audience's membership.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn remove_member(
        &self,
        audience: AudienceId,
        subscriber: SubscriberId,
    ) -> Result<()> {
        sqlx::query(
            r"DELETE FROM email_audience_subscribers WHERE audience_id = ? AND subscriber_id = ?",
        )
        .bind(audience.0)
        .bind(subscriber.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the junction-table membership of a static audience.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn static_member_ids(&self, audience: AudienceId) -> Result<Vec<SubscriberId>> {
        let rows = sqlx::query(
            r"SELECT subscriber_id FROM email_audience_subscribers WHERE audience_id = ?",
        )
        .bind(audience.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SubscriberId(row.get::<i64, _>("subscriber_id")))
            .collect())
    }

    /// Refresh the cached display count for an audience.
    ///
    /// The cached count is a display optimization and is never consulted by
    /// the resolver or the send path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn refresh_subscriber_count(&self, id: AudienceId, count: i64) -> Result<()> {
        sqlx::query(r"UPDATE email_audiences SET subscriber_count = ? WHERE id = ?")
            .bind(count)
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Convert a database row to an audience.
///
/// Unparseable filter JSON degrades to the default (dynamic, zero rules)
/// filter set rather than erroring.
fn row_to_audience(row: &sqlx::sqlite::SqliteRow) -> Audience {
    let filters: String = row.get("filters");
    let filter_set = serde_json::from_str(&filters).unwrap_or_default();

    Audience {
        id: AudienceId(row.get::<i64, _>("id")),
        name: row.get("name"),
        filter_set,
        subscriber_count: row.get::<i64, _>("subscriber_count"),
    }
}
