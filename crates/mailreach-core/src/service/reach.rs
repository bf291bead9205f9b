//! Reach estimation: unique recipient counts across audience combinations.
//!
//! Reach is display math over resolved memberships. Inclusion is set
//! union, exclusion is set difference, and exclusion always wins for a
//! subscriber on both sides. Estimation is infallible: failures degrade
//! to a zero estimate with the `degraded` flag raised rather than
//! surfacing an error to the caller.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::warn;

use crate::audience::{AudienceId, AudienceRepository};
use crate::service::resolver::{AudienceResolver, ResolutionMode};
use crate::subscriber::SubscriberId;

/// Per-audience contribution to a reach estimate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudienceReach {
    /// The audience.
    pub id: AudienceId,
    /// Its display name.
    pub name: String,
    /// Its resolved member count, before any cross-audience set math.
    pub count: usize,
}

/// Breakdown behind a reach number.
#[derive(Debug, Clone, Default)]
pub struct ReachDetails {
    /// Size of the union of all included memberships.
    pub total_included: usize,
    /// Size of the union of all excluded memberships.
    pub total_excluded: usize,
    /// Per-audience counts for the included side.
    pub included_audiences: Vec<AudienceReach>,
    /// Per-audience counts for the excluded side.
    pub excluded_audiences: Vec<AudienceReach>,
}

/// A unique-recipient estimate for one audience combination.
#[derive(Debug, Clone, Default)]
pub struct ReachEstimate {
    /// Unique recipients after union and subtraction.
    pub unique_count: usize,
    /// Per-side and per-audience breakdown.
    pub details: ReachDetails,
    /// True when any underlying resolution or lookup failed and the
    /// numbers are a floor, not a count.
    pub degraded: bool,
}

/// One named audience combination in a batch estimate.
#[derive(Debug, Clone)]
pub struct ReachRequest {
    /// Caller-chosen key for the result map.
    pub key: String,
    /// Audiences whose members are counted in.
    pub included: Vec<AudienceId>,
    /// Audiences whose members are subtracted.
    pub excluded: Vec<AudienceId>,
}

/// Computes reach estimates over resolved audience memberships.
#[derive(Clone)]
pub struct ReachCalculator {
    resolver: AudienceResolver,
    audiences: Arc<AudienceRepository>,
}

impl ReachCalculator {
    /// Creates a calculator backed by the given resolver and audience store.
    #[must_use]
    pub const fn new(resolver: AudienceResolver, audiences: Arc<AudienceRepository>) -> Self {
        Self {
            resolver,
            audiences,
        }
    }

    /// Estimate unique recipients for one inclusion/exclusion combination.
    ///
    /// Resolution runs in [`ResolutionMode::DisplayDefault`], so an
    /// unconfigured dynamic audience counts its active subscribers the way
    /// the rest of the product displays it. When no included audience
    /// contributes a member the excluded side is not resolved at all.
    pub async fn calculate_reach(
        &self,
        included: &[AudienceId],
        excluded: &[AudienceId],
    ) -> ReachEstimate {
        let mut degraded = false;

        let included_list = match self.audiences.list_by_ids(included).await {
            Ok(list) => list,
            Err(error) => {
                warn!(%error, "audience lookup failed, reporting zero reach");
                return ReachEstimate {
                    degraded: true,
                    ..ReachEstimate::default()
                };
            }
        };

        let mut included_ids: HashSet<SubscriberId> = HashSet::new();
        let mut included_audiences = Vec::with_capacity(included_list.len());
        for audience in &included_list {
            let resolved = self
                .resolver
                .resolve_member_ids(audience, ResolutionMode::DisplayDefault)
                .await;
            degraded |= resolved.degraded;
            included_audiences.push(AudienceReach {
                id: audience.id,
                name: audience.name.clone(),
                count: resolved.ids.len(),
            });
            included_ids.extend(resolved.ids);
        }

        if included_ids.is_empty() {
            return ReachEstimate {
                unique_count: 0,
                details: ReachDetails {
                    total_included: 0,
                    total_excluded: 0,
                    included_audiences,
                    excluded_audiences: Vec::new(),
                },
                degraded,
            };
        }

        let excluded_list = match self.audiences.list_by_ids(excluded).await {
            Ok(list) => list,
            Err(error) => {
                warn!(%error, "audience lookup failed, reporting zero reach");
                return ReachEstimate {
                    degraded: true,
                    ..ReachEstimate::default()
                };
            }
        };

        let mut excluded_ids: HashSet<SubscriberId> = HashSet::new();
        let mut excluded_audiences = Vec::with_capacity(excluded_list.len());
        for audience in &excluded_list {
            let resolved = self
                .resolver
                .resolve_member_ids(audience, ResolutionMode::DisplayDefault)
                .await;
            degraded |= resolved.degraded;
            excluded_audiences.push(AudienceReach {
                id: audience.id,
                name: audience.name.clone(),
                count: resolved.ids.len(),
            });
            excluded_ids.extend(resolved.ids);
        }

        let unique_count = included_ids.difference(&excluded_ids).count();

        ReachEstimate {
            unique_count,
            details: ReachDetails {
                total_included: included_ids.len(),
                total_excluded: excluded_ids.len(),
                included_audiences,
                excluded_audiences,
            },
            degraded,
        }
    }

    /// Estimate reach for several combinations, keyed by the caller's names.
    ///
    /// Each combination is computed in isolation; a degraded entry never
    /// contaminates its neighbors.
    pub async fn calculate_batch_reach(
        &self,
        requests: &[ReachRequest],
    ) -> HashMap<String, ReachEstimate> {
        let mut estimates = HashMap::with_capacity(requests.len());
        for request in requests {
            let estimate = self
                .calculate_reach(&request.included, &request.excluded)
                .await;
            estimates.insert(request.key.clone(), estimate);
        }
        estimates
    }
}
