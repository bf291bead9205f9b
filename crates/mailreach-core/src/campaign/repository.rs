//! Campaign, send-record, and opens-log storage repository.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::model::{
    AudienceLink, Campaign, CampaignId, CampaignStatus, EmailSend, NewCampaign, SendId, SendStatus,
};
use crate::Result;
use crate::audience::AudienceId;
use crate::subscriber::SubscriberId;

/// Repository for campaigns, per-recipient send records, and the opens log.
pub struct CampaignRepository {
    pool: SqlitePool,
}

impl CampaignRepository {
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
            CREATE TABLE IF NOT EXISTS email_campaigns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                subject TEXT NOT NULL,
                sender_name TEXT NOT NULL DEFAULT '',
                sender_email TEXT NOT NULL DEFAULT '',
                preheader TEXT,
                html_content TEXT,
                text_content TEXT,
                status TEXT NOT NULL DEFAULT 'draft',
                scheduled_at TEXT,
                sent_at TEXT,
                emails_sent INTEGER NOT NULL DEFAULT 0,
                total_recipients INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS email_campaign_audiences (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                campaign_id INTEGER NOT NULL,
                audience_id INTEGER NOT NULL,
                is_excluded INTEGER NOT NULL DEFAULT 0,
                UNIQUE(campaign_id, audience_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS email_sends (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                campaign_id INTEGER NOT NULL,
                subscriber_id INTEGER NOT NULL,
                email TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                sent_at TEXT,
                message_id TEXT,
                error_message TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS email_opens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                campaign_id INTEGER NOT NULL,
                subscriber_id INTEGER NOT NULL,
                send_id INTEGER,
                opened_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_sends_campaign
            ON email_sends(campaign_id)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_opens_opened_at
            ON email_opens(opened_at)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Create a campaign.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn create(&self, campaign: &NewCampaign) -> Result<CampaignId> {
        let result = sqlx::query(
            r"
            INSERT INTO email_campaigns
                (name, subject, sender_name, sender_email, preheader,
                 html_content, text_content, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&campaign.name)
        .bind(&campaign.subject)
        .bind(&campaign.sender_name)
        .bind(&campaign.sender_email)
        .bind(&campaign.preheader)
        .bind(&campaign.html_content)
        .bind(&campaign.text_content)
        .bind(campaign.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(CampaignId(result.last_insert_rowid()))
    }

    /// Get a campaign by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        let row = sqlx::query(
            r"
            SELECT id, name, subject, sender_name, sender_email, preheader,
                   html_content, text_content, status, scheduled_at, sent_at,
                   emails_sent, total_recipients
            FROM email_campaigns
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_campaign))
    }

    /// Persist a schedule: sets `scheduled_at` and status `scheduled`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn set_schedule(&self, id: CampaignId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r"UPDATE email_campaigns SET scheduled_at = ?, status = 'scheduled' WHERE id = ?",
        )
        .bind(at.to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Link an audience to a campaign, included or excluded.
    ///
    /// Relinking an audience replaces its direction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn link_audience(
        &self,
        campaign: CampaignId,
        audience: AudienceId,
        is_excluded: bool,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO email_campaign_audiences (campaign_id, audience_id, is_excluded)
            VALUES (?, ?, ?)
            ON CONFLICT(campaign_id, audience_id) DO UPDATE SET
                is_excluded = excluded.is_excluded
            ",
        )
        .bind(campaign.0)
        .bind(audience.0)
        .bind(is_excluded)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a campaign's audience links.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn audience_links(&self, campaign: CampaignId) -> Result<Vec<AudienceLink>> {
        let rows = sqlx::query(
            r"SELECT audience_id, is_excluded FROM email_campaign_audiences WHERE campaign_id = ?",
        )
        .bind(campaign.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| AudienceLink {
                audience_id: AudienceId(row.get::<i64, _>("audience_id")),
                is_excluded: row.get::<bool, _>("is_excluded"),
            })
            .collect())
    }

    /// Create a pending send record for a recipient.
    ///
    /// Must happen before the transport call for that recipient so a crash
    /// never loses the fact that a send was attempted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn create_send(
        &self,
        campaign: CampaignId,
        subscriber: SubscriberId,
        email: &str,
    ) -> Result<SendId> {
        let result = sqlx::query(
            r"
            INSERT INTO email_sends (campaign_id, subscriber_id, email, status)
            VALUES (?, ?, ?, 'pending')
            ",
        )
        .bind(campaign.0)
        .bind(subscriber.0)
        .bind(email)
        .execute(&self.pool)
        .await?;

        Ok(SendId(result.last_insert_rowid()))
    }

    /// Mark a send record sent with its provider message id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn mark_send_sent(
        &self,
        send: SendId,
        message_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r"UPDATE email_sends SET status = 'sent', sent_at = ?, message_id = ? WHERE id = ?",
        )
        .bind(at.to_rfc3339())
        .bind(message_id)
        .bind(send.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Mark a send record failed with an error message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn mark_send_failed(&self, send: SendId, error: &str) -> Result<()> {
        sqlx::query(r"UPDATE email_sends SET status = 'failed', error_message = ? WHERE id = ?")
            .bind(error)
            .bind(send.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Get all send records for a campaign.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn sends_for_campaign(&self, campaign: CampaignId) -> Result<Vec<EmailSend>> {
        let rows = sqlx::query(
            r"
            SELECT id, campaign_id, subscriber_id, email, status, sent_at,
                   message_id, error_message
            FROM email_sends
            WHERE campaign_id = ?
            ORDER BY id ASC
            ",
        )
        .bind(campaign.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_send).collect())
    }

    /// Record post-run aggregates on the campaign row.
    ///
    /// `sent_at` is set only when at least one send succeeded, and the HTML
    /// snapshot (one representative recipient's tracked template) replaces
    /// the stored body when present.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn finalize(
        &self,
        id: CampaignId,
        status: CampaignStatus,
        emails_sent: i64,
        total_recipients: i64,
        sent_at: Option<DateTime<Utc>>,
        html_snapshot: Option<&str>,
    ) -> Result<()> {
        if let Some(html) = html_snapshot {
            sqlx::query(
                r"
                UPDATE email_campaigns
                SET status = ?, emails_sent = ?, total_recipients = ?, sent_at = ?,
                    html_content = ?
                WHERE id = ?
                ",
            )
            .bind(status.as_str())
            .bind(emails_sent)
            .bind(total_recipients)
            .bind(sent_at.map(|t| t.to_rfc3339()))
            .bind(html)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                r"
                UPDATE email_campaigns
                SET status = ?, emails_sent = ?, total_recipients = ?, sent_at = ?
                WHERE id = ?
                ",
            )
            .bind(status.as_str())
            .bind(emails_sent)
            .bind(total_recipients)
            .bind(sent_at.map(|t| t.to_rfc3339()))
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    /// Record an open event for a send.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn record_open(
        &self,
        campaign: CampaignId,
        subscriber: SubscriberId,
        send: Option<SendId>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO email_opens (campaign_id, subscriber_id, send_id, opened_at)
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(campaign.0)
        .bind(subscriber.0)
        .bind(send.map(|s| s.0))
        .bind(at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get subscribers who opened any email since `cutoff`.
    ///
    /// Powers the `last_email_open older_than` subtractive post-filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn recent_opener_ids(&self, cutoff: DateTime<Utc>) -> Result<HashSet<SubscriberId>> {
        let rows = sqlx::query(
            r"SELECT DISTINCT subscriber_id FROM email_opens WHERE opened_at >= ?",
        )
        .bind(cutoff.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SubscriberId(row.get::<i64, _>("subscriber_id")))
            .collect())
    }

    /// Get scheduled campaigns whose release time has passed.
    ///
    /// Consumed by the external scheduler collaborator.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn due_for_sending(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        let rows = sqlx::query(
            r"
            SELECT id, name, subject, sender_name, sender_email, preheader,
                   html_content, text_content, status, scheduled_at, sent_at,
                   emails_sent, total_recipients
            FROM email_campaigns
            WHERE status = 'scheduled' AND scheduled_at IS NOT NULL AND scheduled_at <= ?
            ORDER BY scheduled_at ASC
            ",
        )
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_campaign).collect())
    }

    /// Move a campaign into the `sending` state.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn mark_sending(&self, id: CampaignId) -> Result<()> {
        sqlx::query(r"UPDATE email_campaigns SET status = 'sending' WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Convert a database row to a campaign.
fn row_to_campaign(row: &sqlx::sqlite::SqliteRow) -> Campaign {
    let status: String = row.get("status");

    Campaign {
        id: CampaignId(row.get::<i64, _>("id")),
        name: row.get("name"),
        subject: row.get("subject"),
        sender_name: row.get("sender_name"),
        sender_email: row.get("sender_email"),
        preheader: row.get("preheader"),
        html_content: row.get("html_content"),
        text_content: row.get("text_content"),
        status: CampaignStatus::parse(&status),
        scheduled_at: parse_timestamp(row.get("scheduled_at")),
        sent_at: parse_timestamp(row.get("sent_at")),
        emails_sent: row.get::<i64, _>("emails_sent"),
        total_recipients: row.get::<i64, _>("total_recipients"),
    }
}

/// Convert a database row to a send record.
fn row_to_send(row: &sqlx::sqlite::SqliteRow) -> EmailSend {
    let status: String = row.get("status");

    EmailSend {
        id: SendId(row.get::<i64, _>("id")),
        campaign_id: CampaignId(row.get::<i64, _>("campaign_id")),
        subscriber_id: SubscriberId(row.get::<i64, _>("subscriber_id")),
        email: row.get("email"),
        status: SendStatus::parse(&status),
        sent_at: parse_timestamp(row.get("sent_at")),
        message_id: row.get("message_id"),
        error_message: row.get("error_message"),
    }
}
