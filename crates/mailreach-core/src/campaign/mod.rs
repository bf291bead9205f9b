//! Campaign management module.
//!
//! Campaign records, per-recipient send bookkeeping, the opens log, and the
//! campaign/audience junction.

mod model;
mod repository;

pub use model::{
    AudienceLink, Campaign, CampaignId, CampaignStatus, EmailSend, NewCampaign, SendId, SendStatus,
};
pub use repository::CampaignRepository;
