//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Request input was rejected before any side effect.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Safety mode blocked a send to non-test audiences.
    #[error("Safety block: cannot send to non-test audiences: {}", audiences.join(", "))]
    SafetyBlock {
        /// Names of the offending audiences.
        audiences: Vec<String>,
    },

    /// Scheduling input was invalid or too close to now.
    #[error("Schedule error: {0}")]
    Schedule(String),

    /// Resolution produced no sendable recipients.
    #[error("{}", if *safety_mode {
        "No subscribers found for the selected audiences; safety mode restricts sends to allow-listed addresses"
    } else {
        "No active subscribers found for the selected audiences"
    })]
    NoRecipients {
        /// Whether safety mode was active when resolution came up empty.
        safety_mode: bool,
    },

    /// Content generation failed before dispatch started.
    #[error("Content error: {0}")]
    Content(String),

    /// Campaign record could not be created or updated.
    #[error("Campaign record error: {0}")]
    CampaignRecord(String),

    /// Transport rejected a message outside the per-recipient loop.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
