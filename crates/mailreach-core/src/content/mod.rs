//! Campaign content generation.
//!
//! Element lists become tracked, personalized HTML and plain text. The
//! tracking-pixel and click-redirect behavior lives here; the dispatch loop
//! only supplies the ids to embed.

mod generator;
mod model;

pub use generator::{ContentGenerator, ElementGenerator};
pub use model::{EmailElement, TrackingContext};
