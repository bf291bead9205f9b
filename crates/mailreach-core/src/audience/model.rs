//! Audience and filter-rule models.

use serde::{Deserialize, Serialize};

/// Unique identifier for an audience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudienceId(pub i64);

impl AudienceId {
    /// Create a new audience ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AudienceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How an audience's membership is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudienceType {
    /// Membership is an explicit stored list (junction rows).
    Static,
    /// Membership is computed on demand from filter rules.
    #[default]
    Dynamic,
}

/// Field a filter rule applies to.
///
/// Unrecognized fields deserialize to [`Self::Unknown`] rather than failing,
/// and never match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleField {
    /// Subscriber lifecycle status.
    Status,
    /// Linked profile's subscription tier.
    Subscription,
    /// Linked profile's trial state.
    TrialStatus,
    /// Subscriber email address.
    Email,
    /// Subscriber signup date.
    SignupDate,
    /// Engagement recency against the opens log.
    LastEmailOpen,
    /// Field not recognized by this engine.
    #[serde(other)]
    Unknown,
}

/// Comparison operator of a filter rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
    /// Exact equality.
    Equals,
    /// Substring match (case-sensitive).
    Contains,
    /// Within the last N days.
    Within,
    /// Older than N days.
    OlderThan,
    /// Operator not recognized by this engine.
    #[serde(other)]
    Unknown,
}

/// A single declarative membership rule.
///
/// Rules in a filter set are implicitly AND-combined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    /// Field the rule applies to.
    pub field: RuleField,
    /// Comparison operator.
    pub operator: RuleOperator,
    /// Comparison value; day-count fields use a `"<N>_days"` token.
    pub value: String,
    /// Optional timeframe qualifier (display metadata, not evaluated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
}

impl FilterRule {
    /// Creates a rule.
    #[must_use]
    pub fn new(field: RuleField, operator: RuleOperator, value: impl Into<String>) -> Self {
        Self {
            field,
            operator,
            value: value.into(),
            timeframe: None,
        }
    }

    /// The implicit display-count default: `status = active`.
    #[must_use]
    pub fn default_active() -> Self {
        Self::new(RuleField::Status, RuleOperator::Equals, "active")
    }
}

/// An audience's membership definition, stored as JSON on the audience row.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterSet {
    /// Static (junction-backed) or dynamic (rule-backed).
    #[serde(default)]
    pub audience_type: AudienceType,
    /// Declarative membership rules (dynamic audiences only).
    #[serde(default)]
    pub rules: Vec<FilterRule>,
}

impl FilterSet {
    /// Creates a static filter set.
    #[must_use]
    pub const fn static_set() -> Self {
        Self {
            audience_type: AudienceType::Static,
            rules: Vec::new(),
        }
    }

    /// Creates a dynamic filter set with the given rules.
    #[must_use]
    pub const fn dynamic(rules: Vec<FilterRule>) -> Self {
        Self {
            audience_type: AudienceType::Dynamic,
            rules,
        }
    }

    /// Whether this is a static audience.
    #[must_use]
    pub const fn is_static(&self) -> bool {
        matches!(self.audience_type, AudienceType::Static)
    }

    /// Returns a copy with an empty rule list replaced by the implicit
    /// `status = active` rule.
    ///
    /// This substitution is caller policy for display-count paths; strict
    /// membership checks evaluate the rule list as stored.
    #[must_use]
    pub fn with_display_default(&self) -> Self {
        if self.rules.is_empty() {
            Self {
                audience_type: self.audience_type,
                rules: vec![FilterRule::default_active()],
            }
        } else {
            self.clone()
        }
    }
}

/// An audience: a named set of subscribers, static or dynamic.
#[derive(Debug, Clone)]
pub struct Audience {
    /// Unique identifier.
    pub id: AudienceId,
    /// Display name (safety gating matches against this).
    pub name: String,
    /// Membership definition.
    pub filter_set: FilterSet,
    /// Cached member count, refreshed out-of-band.
    ///
    /// Display optimization only; never ground truth for resolution.
    pub subscriber_count: i64,
}

/// Parse a `"<N>_days"` value token, falling back to `default` when the
/// token does not parse.
#[must_use]
pub fn parse_days(value: &str, default: i64) -> i64 {
    value
        .trim()
        .trim_end_matches("_days")
        .parse()
        .unwrap_or(default)
}
