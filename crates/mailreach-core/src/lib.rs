//! # mailreach-core
//!
//! Audience targeting and campaign dispatch for the `MailReach` email
//! marketing engine.
//!
//! This crate provides:
//! - Subscriber and account-profile records with `SQLite` storage
//! - Static and rule-based (dynamic) audiences
//! - **Audience Resolution** - filter rules compiled to storage queries
//! - **Reach Estimation** - unique-recipient counts across audience
//!   combinations
//! - **Campaign Dispatch** - scheduling, safety gating, worker-pool
//!   delivery, and durable per-recipient send records
//! - Tracked, personalized email content generation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod audience;
pub mod campaign;
pub mod content;
mod error;
pub mod service;
pub mod subscriber;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use audience::{
    Audience, AudienceId, AudienceRepository, AudienceType, FilterRule, FilterSet, RuleField,
    RuleOperator,
};
pub use campaign::{
    AudienceLink, Campaign, CampaignId, CampaignRepository, CampaignStatus, EmailSend,
    NewCampaign, SendId, SendStatus,
};
pub use content::{ContentGenerator, ElementGenerator, EmailElement, TrackingContext};
pub use error::{Error, Result};
pub use service::{
    AudienceReach, AudienceResolver, CancelToken, DispatchStats, ReachCalculator, ReachDetails,
    ReachEstimate, ReachRequest, RecipientResult, ResolutionMode, ResolvedMembers,
    ResolvedSubscribers, SafetyConfig, ScheduleType, SendConfig, SendOrchestrator, SendOutcome,
    SendRequest, TokenBucket,
};
pub use subscriber::{
    NewSubscriber, Profile, ProfileId, Subscriber, SubscriberId, SubscriberRepository,
    SubscriberStatus, TrialStatus,
};
pub use transport::{DeliveryReceipt, EmailTransport, OutboundEmail, TransportError};
