//! Subscriber and profile models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberId(pub i64);

impl SubscriberId {
    /// Create a new subscriber ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an account profile linked to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileId(pub i64);

impl ProfileId {
    /// Create a new profile ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ProfileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a subscriber.
///
/// Status transitions are the only lifecycle change tracked here; subscriber
/// rows are never merged or deleted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriberStatus {
    /// Receiving mail.
    #[default]
    Active,
    /// Opted out; must never receive campaign mail.
    Unsubscribed,
    /// Delivery permanently failed.
    Bounced,
    /// Signed up but not yet confirmed.
    Pending,
}

impl SubscriberStatus {
    /// Parse from database string representation.
    ///
    /// Accepts the legacy `INACTIVE` marker as [`Self::Unsubscribed`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "unsubscribed" | "inactive" => Self::Unsubscribed,
            "bounced" => Self::Bounced,
            "pending" => Self::Pending,
            _ => Self::Active,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Unsubscribed => "unsubscribed",
            Self::Bounced => "bounced",
            Self::Pending => "pending",
        }
    }
}

/// Trial state used by `trial_status` filter rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialStatus {
    /// On a trial: no paid subscription and the trial has not expired.
    Active,
    /// Trial expiration has passed.
    Expired,
}

impl TrialStatus {
    /// Parse from a rule value string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// A mailing-list subscriber.
#[derive(Debug, Clone)]
pub struct Subscriber {
    /// Unique identifier.
    pub id: SubscriberId,
    /// Email address (unique).
    pub email: String,
    /// Lifecycle status.
    pub status: SubscriberStatus,
    /// Linked account profile, if the subscriber has an account.
    pub profile_id: Option<ProfileId>,
    /// First name, if known.
    pub first_name: Option<String>,
    /// Last name, if known.
    pub last_name: Option<String>,
    /// When the subscriber signed up.
    pub subscribe_date: DateTime<Utc>,
}

impl Subscriber {
    /// Returns a display name for personalization.
    ///
    /// Falls back to the mailbox part of the email address when no name is
    /// on record.
    #[must_use]
    pub fn display_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            self.email.split('@').next().unwrap_or_default().to_string()
        } else {
            name
        }
    }
}

/// Input for creating a subscriber row.
#[derive(Debug, Clone)]
pub struct NewSubscriber {
    /// Email address (unique).
    pub email: String,
    /// Initial lifecycle status.
    pub status: SubscriberStatus,
    /// Linked account profile, if any.
    pub profile_id: Option<ProfileId>,
    /// First name, if known.
    pub first_name: Option<String>,
    /// Last name, if known.
    pub last_name: Option<String>,
    /// Signup timestamp.
    pub subscribe_date: DateTime<Utc>,
}

impl NewSubscriber {
    /// Creates an active subscriber signing up now.
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            status: SubscriberStatus::Active,
            profile_id: None,
            first_name: None,
            last_name: None,
            subscribe_date: Utc::now(),
        }
    }

    /// Sets the lifecycle status.
    #[must_use]
    pub const fn status(mut self, status: SubscriberStatus) -> Self {
        self.status = status;
        self
    }

    /// Links an account profile.
    #[must_use]
    pub const fn profile(mut self, id: ProfileId) -> Self {
        self.profile_id = Some(id);
        self
    }

    /// Sets first and last name.
    #[must_use]
    pub fn name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    /// Sets the signup timestamp.
    #[must_use]
    pub const fn subscribed_at(mut self, at: DateTime<Utc>) -> Self {
        self.subscribe_date = at;
        self
    }
}

/// Account data linked 1:1 to a subscriber.
///
/// Owned by the account system; read-only from this engine's perspective.
#[derive(Debug, Clone)]
pub struct Profile {
    /// Unique identifier (referenced by `Subscriber::profile_id`).
    pub id: ProfileId,
    /// Subscription tier (`none` when unpaid).
    pub subscription: String,
    /// When the account's trial expires, if a trial was started.
    pub trial_expiration: Option<DateTime<Utc>>,
}
