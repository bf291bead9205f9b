//! Subscriber management module.
//!
//! Subscriber records, linked account profiles, and their storage.

mod model;
mod repository;

pub use model::{
    NewSubscriber, Profile, ProfileId, Subscriber, SubscriberId, SubscriberStatus, TrialStatus,
};
pub use repository::SubscriberRepository;
