//! Audience membership resolution.
//!
//! Turns an audience definition into the concrete subscriber set it names
//! right now. Static audiences read the junction table verbatim; dynamic
//! audiences compile their rule list into a storage query plus in-memory
//! post-filters. Resolution never fails outward: a storage error degrades
//! to an empty membership with the `degraded` flag raised, so a broken
//! query can widen nobody's audience.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::audience::{
    Audience, AudienceRepository, FilterRule, LAST_OPEN_DEFAULT_DAYS, RuleField, RuleOperator,
    SIGNUP_WITHIN_DEFAULT_DAYS, parse_days,
};
use crate::campaign::CampaignRepository;
use crate::error::Result;
use crate::subscriber::{ProfileId, Subscriber, SubscriberId, SubscriberRepository, TrialStatus};

/// How an empty dynamic rule list is interpreted.
///
/// Commit paths (dispatch) use [`ResolutionMode::Strict`] so that a
/// half-configured audience can never address every active subscriber.
/// Display paths (reach counts) use [`ResolutionMode::DisplayDefault`],
/// which substitutes the implicit `status = active` rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionMode {
    /// An empty rule list resolves to nobody.
    #[default]
    Strict,
    /// An empty rule list falls back to `status = active`.
    DisplayDefault,
}

/// Resolved membership as a set of subscriber ids.
#[derive(Debug, Clone, Default)]
pub struct ResolvedMembers {
    /// The member ids.
    pub ids: HashSet<SubscriberId>,
    /// True when a storage failure forced an empty result.
    pub degraded: bool,
}

/// Resolved membership as full subscriber records.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSubscribers {
    /// The member records.
    pub subscribers: Vec<Subscriber>,
    /// True when a storage failure forced an empty result.
    pub degraded: bool,
}

/// Resolves audience definitions to concrete subscriber sets.
#[derive(Clone)]
pub struct AudienceResolver {
    subscribers: Arc<SubscriberRepository>,
    audiences: Arc<AudienceRepository>,
    campaigns: Arc<CampaignRepository>,
}

impl AudienceResolver {
    /// Creates a resolver over the given stores.
    #[must_use]
    pub const fn new(
        subscribers: Arc<SubscriberRepository>,
        audiences: Arc<AudienceRepository>,
        campaigns: Arc<CampaignRepository>,
    ) -> Self {
        Self {
            subscribers,
            audiences,
            campaigns,
        }
    }

    /// Resolve an audience to the set of member subscriber ids.
    ///
    /// Storage errors are logged and recovered as an empty set with
    /// `degraded` set; callers that must not silently shrink (dispatch)
    /// check the flag.
    pub async fn resolve_member_ids(
        &self,
        audience: &Audience,
        mode: ResolutionMode,
    ) -> ResolvedMembers {
        let result = if audience.filter_set.is_static() {
            self.audiences
                .static_member_ids(audience.id)
                .await
                .map(|ids| ids.into_iter().collect())
        } else {
            self.dynamic_members(audience, mode)
                .await
                .map(|members| members.iter().map(|sub| sub.id).collect())
        };

        match result {
            Ok(ids) => ResolvedMembers {
                ids,
                degraded: false,
            },
            Err(error) => {
                warn!(
                    audience = audience.id.0,
                    %error,
                    "audience resolution failed, treating membership as empty"
                );
                ResolvedMembers {
                    ids: HashSet::new(),
                    degraded: true,
                }
            }
        }
    }

    /// Resolve an audience to full subscriber records.
    ///
    /// Same degradation contract as [`Self::resolve_member_ids`].
    pub async fn resolve_subscribers(
        &self,
        audience: &Audience,
        mode: ResolutionMode,
    ) -> ResolvedSubscribers {
        let result = if audience.filter_set.is_static() {
            match self.audiences.static_member_ids(audience.id).await {
                Ok(ids) => self.subscribers.by_ids(&ids).await,
                Err(error) => Err(error),
            }
        } else {
            self.dynamic_members(audience, mode).await
        };

        match result {
            Ok(subscribers) => ResolvedSubscribers {
                subscribers,
                degraded: false,
            },
            Err(error) => {
                warn!(
                    audience = audience.id.0,
                    %error,
                    "audience resolution failed, treating membership as empty"
                );
                ResolvedSubscribers {
                    subscribers: Vec::new(),
                    degraded: true,
                }
            }
        }
    }

    /// Compile a dynamic rule list into a base-set query plus in-memory
    /// post-filters, and run it.
    async fn dynamic_members(
        &self,
        audience: &Audience,
        mode: ResolutionMode,
    ) -> Result<Vec<Subscriber>> {
        let filter_set = match mode {
            ResolutionMode::Strict if audience.filter_set.rules.is_empty() => {
                return Ok(Vec::new());
            }
            ResolutionMode::Strict => audience.filter_set.clone(),
            ResolutionMode::DisplayDefault => audience.filter_set.with_display_default(),
        };

        let now = Utc::now();

        let mut status = "active";
        let mut subscription: Option<&str> = None;
        let mut trial: Option<TrialStatus> = None;
        let mut signup_cutoff: Option<DateTime<Utc>> = None;
        let mut open_cutoff: Option<DateTime<Utc>> = None;
        let mut residual: Vec<&FilterRule> = Vec::new();

        for rule in &filter_set.rules {
            match (rule.field, rule.operator) {
                (RuleField::Status, _) => status = &rule.value,
                (RuleField::Subscription, _) => subscription = Some(&rule.value),
                (RuleField::TrialStatus, _) => match TrialStatus::parse(&rule.value) {
                    Some(parsed) => trial = Some(parsed),
                    // Unparseable trial tokens match nobody; the per-record
                    // evaluator decides that uniformly.
                    None => residual.push(rule),
                },
                (RuleField::SignupDate, RuleOperator::Within) => {
                    let days = parse_days(&rule.value, SIGNUP_WITHIN_DEFAULT_DAYS);
                    signup_cutoff = Some(now - Duration::days(days));
                }
                (RuleField::LastEmailOpen, RuleOperator::OlderThan) => {
                    let days = parse_days(&rule.value, LAST_OPEN_DEFAULT_DAYS);
                    open_cutoff = Some(now - Duration::days(days));
                }
                // The per-record evaluator treats the whole field as
                // neutral, so unsupported operators are ignored here too
                // rather than emptying the membership.
                (RuleField::LastEmailOpen, operator) => {
                    warn!(?operator, "unsupported last_email_open operator, rule ignored");
                }
                _ => residual.push(rule),
            }
        }

        let matching_profiles: Option<Vec<ProfileId>> =
            if subscription.is_some() || trial.is_some() {
                let ids = self
                    .subscribers
                    .profile_ids_matching(subscription, trial, now)
                    .await?;
                if ids.is_empty() {
                    debug!(
                        audience = audience.id.0,
                        "no profiles satisfy the profile rules, membership is empty"
                    );
                    return Ok(Vec::new());
                }
                Some(ids)
            } else {
                None
            };

        let mut members = self
            .subscribers
            .subscribers_matching(status, matching_profiles.as_deref(), signup_cutoff)
            .await?;

        if !residual.is_empty() {
            members.retain(|sub| residual.iter().all(|rule| rule.matches(sub, None, now)));
        }

        if let Some(cutoff) = open_cutoff {
            let recent = self.campaigns.recent_opener_ids(cutoff).await?;
            members.retain(|sub| !recent.contains(&sub.id));
        }

        Ok(members)
    }
}
