//! Shared test fixtures: all three repositories over one in-memory database.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;

use crate::audience::AudienceRepository;
use crate::campaign::CampaignRepository;
use crate::subscriber::SubscriberRepository;

pub(crate) struct Stores {
    pub subscribers: Arc<SubscriberRepository>,
    pub audiences: Arc<AudienceRepository>,
    pub campaigns: Arc<CampaignRepository>,
}

/// Opens a single-connection in-memory database shared by all repositories,
/// so junction rows written through one are visible through the others.
pub(crate) async fn stores() -> Stores {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    Stores {
        subscribers: Arc::new(SubscriberRepository::from_pool(pool.clone()).await.unwrap()),
        audiences: Arc::new(AudienceRepository::from_pool(pool.clone()).await.unwrap()),
        campaigns: Arc::new(CampaignRepository::from_pool(pool).await.unwrap()),
    }
}
