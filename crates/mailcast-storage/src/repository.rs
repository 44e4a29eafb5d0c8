//! Repository layer for data access

pub mod campaigns;
pub mod subscribers;

// Re-export concrete repository implementations with simple names
pub use campaigns::DbCampaignRepository;
pub use subscribers::DbSubscriberRepository;

// Re-export repository traits
pub use campaigns::CampaignRepository;
pub use subscribers::SubscriberRepository;
