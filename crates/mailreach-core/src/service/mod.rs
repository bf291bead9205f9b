//! Campaign services.
//!
//! This module provides the service layer over the repositories:
//! audience resolution, reach estimation, rate limiting, and the send
//! orchestrator.

pub mod limiter;
pub mod reach;
pub mod resolver;
pub mod send;

pub use limiter::TokenBucket;
pub use reach::{AudienceReach, ReachCalculator, ReachDetails, ReachEstimate, ReachRequest};
pub use resolver::{AudienceResolver, ResolutionMode, ResolvedMembers, ResolvedSubscribers};
pub use send::{
    CancelToken, DispatchStats, RecipientResult, SafetyConfig, ScheduleType, SendConfig,
    SendOrchestrator, SendOutcome, SendRequest,
};
