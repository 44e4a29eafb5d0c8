//! Mailcast Core - Campaign delivery
//!
//! This crate provides the delivery side of Mailcast: the messenger
//! backends and their SMTP server pool, campaign creation and status rules,
//! previews, send rate estimation and the test-send path.

pub mod campaign;
pub mod messenger;

pub use campaign::{
    estimate_rate, CampaignError, CampaignManager, PlaceholderRenderer, PreviewBody, Renderer,
    TestSendError, TestSendRequest, TestSender,
};
pub use messenger::{
    Backend, Emailer, Message, Messenger, MessengerError, MessengerRegistry, EMAIL_MESSENGER,
};
