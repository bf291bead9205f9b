//! Campaign and send-record models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audience::AudienceId;
use crate::subscriber::SubscriberId;

/// Unique identifier for a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CampaignId(pub i64);

impl CampaignId {
    /// Create a new campaign ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for CampaignId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a per-recipient send record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SendId(pub i64);

impl SendId {
    /// Create a new send ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SendId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CampaignStatus {
    /// Saved but not scheduled or sent.
    #[default]
    Draft,
    /// Queued for an external scheduler to release.
    Scheduled,
    /// A send run is in progress.
    Sending,
    /// At least one recipient was sent to.
    Sent,
}

impl CampaignStatus {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "scheduled" => Self::Scheduled,
            "sending" => Self::Sending,
            "sent" => Self::Sent,
            _ => Self::Draft,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Sending => "sending",
            Self::Sent => "sent",
        }
    }
}

/// An email campaign.
#[derive(Debug, Clone)]
pub struct Campaign {
    /// Unique identifier.
    pub id: CampaignId,
    /// Internal name.
    pub name: String,
    /// Subject line (may contain `{{...}}` personalization variables).
    pub subject: String,
    /// Sender display name.
    pub sender_name: String,
    /// Sender address.
    pub sender_email: String,
    /// Inbox preview text.
    pub preheader: Option<String>,
    /// HTML body; after a completed run this holds the tracked template
    /// snapshot of one representative recipient.
    pub html_content: Option<String>,
    /// Plain-text body.
    pub text_content: Option<String>,
    /// Lifecycle state.
    pub status: CampaignStatus,
    /// When a scheduled campaign should be released.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// When the first successful send of a run completed.
    pub sent_at: Option<DateTime<Utc>>,
    /// Successful sends recorded by the last run.
    pub emails_sent: i64,
    /// Total recipients targeted by the last run.
    pub total_recipients: i64,
}

/// Input for creating a campaign row.
#[derive(Debug, Clone)]
pub struct NewCampaign {
    /// Internal name.
    pub name: String,
    /// Subject line.
    pub subject: String,
    /// Sender display name.
    pub sender_name: String,
    /// Sender address.
    pub sender_email: String,
    /// Inbox preview text.
    pub preheader: Option<String>,
    /// HTML body.
    pub html_content: Option<String>,
    /// Plain-text body.
    pub text_content: Option<String>,
    /// Initial lifecycle state.
    pub status: CampaignStatus,
}

impl NewCampaign {
    /// Creates a draft campaign.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        subject: impl Into<String>,
        sender_name: impl Into<String>,
        sender_email: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            subject: subject.into(),
            sender_name: sender_name.into(),
            sender_email: sender_email.into(),
            preheader: None,
            html_content: None,
            text_content: None,
            status: CampaignStatus::Draft,
        }
    }

    /// Sets the initial status.
    #[must_use]
    pub const fn status(mut self, status: CampaignStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the rendered content.
    #[must_use]
    pub fn content(mut self, html: impl Into<String>, text: impl Into<String>) -> Self {
        self.html_content = Some(html.into());
        self.text_content = Some(text.into());
        self
    }

    /// Sets the preheader.
    #[must_use]
    pub fn preheader(mut self, preheader: impl Into<String>) -> Self {
        self.preheader = Some(preheader.into());
        self
    }
}

/// State of one per-recipient dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendStatus {
    /// Row created, transport not yet confirmed.
    #[default]
    Pending,
    /// Transport accepted the message.
    Sent,
    /// Transport failed or timed out.
    Failed,
}

impl SendStatus {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "sent" => Self::Sent,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

/// One per-recipient dispatch-attempt record.
///
/// Created with status `pending` before the transport call so a crash
/// mid-send leaves an auditable row rather than silent loss.
#[derive(Debug, Clone)]
pub struct EmailSend {
    /// Unique identifier (embedded in tracking URLs).
    pub id: SendId,
    /// Campaign this send belongs to.
    pub campaign_id: CampaignId,
    /// Recipient subscriber.
    pub subscriber_id: SubscriberId,
    /// Recipient address at dispatch time.
    pub email: String,
    /// Attempt state.
    pub status: SendStatus,
    /// When the transport confirmed delivery handoff.
    pub sent_at: Option<DateTime<Utc>>,
    /// Provider message id on success.
    pub message_id: Option<String>,
    /// Error message on failure.
    pub error_message: Option<String>,
}

/// A campaign's directional relation to an audience.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudienceLink {
    /// Linked audience.
    pub audience_id: AudienceId,
    /// Whether the audience is excluded rather than included.
    pub is_excluded: bool,
}
