//! Subscriber and profile storage repository.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite};

use super::model::{
    NewSubscriber, Profile, ProfileId, Subscriber, SubscriberId, SubscriberStatus, TrialStatus,
};
use crate::Result;

/// Repository for subscriber and profile storage.
pub struct SubscriberRepository {
    pool: SqlitePool,
}

impl SubscriberRepository {
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
    /// Lets several repositories share one database connection.
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
            CREATE TABLE IF NOT EXISTS subscribers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'active',
                user_id INTEGER,
                first_name TEXT,
                last_name TEXT,
                subscribe_date TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subscription TEXT NOT NULL DEFAULT 'none',
                trial_expiration TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_subscribers_status
            ON subscribers(status)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a subscriber.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails (including a duplicate
    /// email address).
    pub async fn insert(&self, subscriber: &NewSubscriber) -> Result<SubscriberId> {
        let result = sqlx::query(
            r"
            INSERT INTO subscribers (email, status, user_id, first_name, last_name, subscribe_date)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&subscriber.email)
        .bind(subscriber.status.as_str())
        .bind(subscriber.profile_id.map(|p| p.0))
        .bind(&subscriber.first_name)
        .bind(&subscriber.last_name)
        .bind(subscriber.subscribe_date.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(SubscriberId(result.last_insert_rowid()))
    }

    /// Get subscriber by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: SubscriberId) -> Result<Option<Subscriber>> {
        let row = sqlx::query(
            r"
            SELECT id, email, status, user_id, first_name, last_name, subscribe_date
            FROM subscribers
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().and_then(row_to_subscriber))
    }

    /// Get subscriber by email address.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn by_email(&self, email: &str) -> Result<Option<Subscriber>> {
        let row = sqlx::query(
            r"
            SELECT id, email, status, user_id, first_name, last_name, subscribe_date
            FROM subscribers
            WHERE email = ?
            ",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().and_then(row_to_subscriber))
    }

    /// Get subscribers by ID set.
    ///
    /// Unknown ids are silently skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn by_ids(&self, ids: &[SubscriberId]) -> Result<Vec<Subscriber>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT id, email, status, user_id, first_name, last_name, subscribe_date \
             FROM subscribers WHERE id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.0);
        }
        builder.push(")");

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().filter_map(row_to_subscriber).collect())
    }

    /// Update a subscriber's lifecycle status.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn set_status(&self, id: SubscriberId, status: SubscriberStatus) -> Result<()> {
        sqlx::query(r"UPDATE subscribers SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Mark a subscriber unsubscribed by email address.
    ///
    /// No-op when the address is not on record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn mark_unsubscribed(&self, email: &str) -> Result<()> {
        sqlx::query(r"UPDATE subscribers SET status = 'unsubscribed' WHERE email = ?")
            .bind(email)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Mark a subscriber bounced by email address.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn mark_bounced(&self, email: &str) -> Result<()> {
        sqlx::query(r"UPDATE subscribers SET status = 'bounced' WHERE email = ?")
            .bind(email)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert or update a profile row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO profiles (id, subscription, trial_expiration)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                subscription = excluded.subscription,
                trial_expiration = excluded.trial_expiration
            ",
        )
        .bind(profile.id.0)
        .bind(&profile.subscription)
        .bind(profile.trial_expiration.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a profile by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_profile(&self, id: ProfileId) -> Result<Option<Profile>> {
        let row = sqlx::query(
            r"SELECT id, subscription, trial_expiration FROM profiles WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let trial_expiration: Option<String> = row.get("trial_expiration");
            Profile {
                id: ProfileId(row.get::<i64, _>("id")),
                subscription: row.get("subscription"),
                trial_expiration: trial_expiration
                    .as_deref()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|t| t.with_timezone(&Utc)),
            }
        }))
    }

    /// Get profile ids matching subscription and trial-status constraints.
    ///
    /// Used by the audience resolver as a pre-filter before constraining
    /// subscribers by linked profile id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn profile_ids_matching(
        &self,
        subscription: Option<&str>,
        trial_status: Option<TrialStatus>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProfileId>> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT id FROM profiles WHERE 1 = 1");

        if let Some(subscription) = subscription {
            builder.push(" AND subscription = ");
            builder.push_bind(subscription);
        }

        match trial_status {
            Some(TrialStatus::Active) => {
                builder.push(" AND subscription = 'none' AND trial_expiration > ");
                builder.push_bind(now.to_rfc3339());
            }
            Some(TrialStatus::Expired) => {
                builder.push(" AND trial_expiration IS NOT NULL AND trial_expiration <= ");
                builder.push_bind(now.to_rfc3339());
            }
            None => {}
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| ProfileId(row.get::<i64, _>("id")))
            .collect())
    }

    /// Get subscribers matching the committed base-set constraints of a
    /// dynamic audience: status equality, optional linked-profile set, and
    /// optional signup-date lower bound.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn subscribers_matching(
        &self,
        status: &str,
        profile_ids: Option<&[ProfileId]>,
        signup_cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<Subscriber>> {
        // An empty matching-profile set can never match any subscriber.
        if matches!(profile_ids, Some([])) {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT id, email, status, user_id, first_name, last_name, subscribe_date \
             FROM subscribers WHERE status = ",
        );
        builder.push_bind(status.to_string());

        if let Some(profile_ids) = profile_ids {
            builder.push(" AND user_id IN (");
            let mut separated = builder.separated(", ");
            for id in profile_ids {
                separated.push_bind(id.0);
            }
            builder.push(")");
        }

        if let Some(cutoff) = signup_cutoff {
            builder.push(" AND subscribe_date >= ");
            builder.push_bind(cutoff.to_rfc3339());
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().filter_map(row_to_subscriber).collect())
    }
}

/// Convert a database row to a subscriber, skipping rows with unparseable
/// timestamps.
fn row_to_subscriber(row: &sqlx::sqlite::SqliteRow) -> Option<Subscriber> {
    let subscribe_date: String = row.get("subscribe_date");
    let subscribe_date = DateTime::parse_from_rfc3339(&subscribe_date)
        .ok()?
        .with_timezone(&Utc);

    let status: String = row.get("status");

    Some(Subscriber {
        id: SubscriberId(row.get::<i64, _>("id")),
        email: row.get("email"),
        status: SubscriberStatus::parse(&status),
        profile_id: row.get::<Option<i64>, _>("user_id").map(ProfileId),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        subscribe_date,
    })
}
