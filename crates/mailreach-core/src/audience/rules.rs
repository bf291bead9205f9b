//! Pure filter-rule evaluation.
//!
//! Decides boolean membership for one subscriber against a filter set.
//! All rules are AND-combined; the first failing rule short-circuits.
//! Evaluation is total: unknown fields and operators never match, and
//! nothing here can fail or panic.

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use super::model::{FilterRule, FilterSet, RuleField, RuleOperator, parse_days};
use crate::subscriber::{Profile, Subscriber, TrialStatus};

/// Default day window for `signup_date within` when the value token does
/// not parse.
pub const SIGNUP_WITHIN_DEFAULT_DAYS: i64 = 7;

/// Default day window for `last_email_open older_than` when the value token
/// does not parse.
pub const LAST_OPEN_DEFAULT_DAYS: i64 = 60;

impl FilterSet {
    /// Strict membership check: does the subscriber match every rule?
    ///
    /// An empty rule list matches nobody. Callers that want the display
    /// default substitute [`FilterSet::with_display_default`] first.
    ///
    /// `last_email_open` rules are not per-record predicates (they require a
    /// join against the opens log) and are applied by the resolver as a
    /// subtractive post-filter; this check treats them as neutral.
    #[must_use]
    pub fn matches(
        &self,
        subscriber: &Subscriber,
        profile: Option<&Profile>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.rules.is_empty() {
            return false;
        }

        self.rules
            .iter()
            .filter(|rule| rule.field != RuleField::LastEmailOpen)
            .all(|rule| rule.matches(subscriber, profile, now))
    }
}

impl FilterRule {
    /// Evaluate this rule against one subscriber record.
    #[must_use]
    pub fn matches(
        &self,
        subscriber: &Subscriber,
        profile: Option<&Profile>,
        now: DateTime<Utc>,
    ) -> bool {
        match (self.field, self.operator) {
            (RuleField::Status, _) => subscriber.status.as_str() == self.value,

            (RuleField::Subscription, _) => {
                profile.is_some_and(|p| p.subscription == self.value)
            }

            (RuleField::TrialStatus, _) => self.matches_trial(profile, now),

            (RuleField::Email, RuleOperator::Contains) => subscriber.email.contains(&self.value),
            (RuleField::Email, RuleOperator::Equals) => subscriber.email == self.value,

            (RuleField::SignupDate, RuleOperator::Within) => {
                let days = parse_days(&self.value, SIGNUP_WITHIN_DEFAULT_DAYS);
                subscriber.subscribe_date >= now - Duration::days(days)
            }

            (field, operator) => {
                warn!(?field, ?operator, "unknown filter rule, treating as non-match");
                false
            }
        }
    }

    fn matches_trial(&self, profile: Option<&Profile>, now: DateTime<Utc>) -> bool {
        let Some(profile) = profile else {
            return false;
        };

        match TrialStatus::parse(&self.value) {
            Some(TrialStatus::Active) => {
                profile.subscription == "none"
                    && profile.trial_expiration.is_some_and(|t| t > now)
            }
            Some(TrialStatus::Expired) => {
                profile.trial_expiration.is_some_and(|t| t <= now)
            }
            None => false,
        }
    }
}
