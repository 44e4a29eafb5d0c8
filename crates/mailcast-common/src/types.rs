//! Common types for Mailcast

use uuid::Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for subscribers
pub type SubscriberId = Uuid;

/// Unique identifier for mailing lists
pub type ListId = Uuid;

/// Unique identifier for templates
pub type TemplateId = Uuid;
