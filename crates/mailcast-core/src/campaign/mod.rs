//! Campaign Module - Lifecycle rules, content validation, rendering and test sends

mod manager;
mod rate;
mod render;
mod test_send;
mod transition;
mod validate;

pub use manager::{CampaignManager, PreviewBody};
pub use rate::estimate_rate;
pub use render::{
    placeholder_subscriber, PlaceholderRenderer, RenderError, RenderedMessage, Renderer,
};
pub use test_send::{TestSendError, TestSendRequest, TestSender};
pub use transition::{is_allowed, is_content_immutable, validate_transition, TRANSITIONS};
pub use validate::{is_valid_from, normalize_tags, FieldRules, MAX_INPUT_LEN};

use mailcast_storage::models::CampaignStatus;
use thiserror::Error;

/// Campaign errors
#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Campaign not found")]
    NotFound,

    #[error("Cannot change campaign status from {from} to {to}")]
    InvalidTransition {
        from: CampaignStatus,
        to: CampaignStatus,
    },

    #[error("A future send_at is required to schedule a campaign")]
    SendAtRequired,

    #[error("Campaign content cannot be changed while {0}")]
    ImmutableState(CampaignStatus),

    #[error("Invalid campaign: {0}")]
    Validation(String),

    #[error("Campaign was changed by another request")]
    Conflict,

    #[error("Failed to render campaign: {0}")]
    Render(#[from] RenderError),

    #[error("Storage error: {0}")]
    Storage(#[from] mailcast_common::Error),
}
