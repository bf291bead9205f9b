//! Audience management module.
//!
//! Audiences, their declarative filter rules, the pure rule evaluator, and
//! junction-backed static membership storage.

mod model;
mod repository;
mod rules;

pub use model::{
    Audience, AudienceId, AudienceType, FilterRule, FilterSet, RuleField, RuleOperator, parse_days,
};
pub use repository::AudienceRepository;
pub use rules::{LAST_OPEN_DEFAULT_DAYS, SIGNUP_WITHIN_DEFAULT_DAYS};
