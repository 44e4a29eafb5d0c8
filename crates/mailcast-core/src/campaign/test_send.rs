//! Test sends - deliver a campaign preview to a few known subscribers

use super::manager::CampaignManager;
use super::render::RenderError;
use super::CampaignError;
use crate::messenger::{Message, Messenger, MessengerError};
use chrono::Utc;
use mailcast_common::types::CampaignId;
use mailcast_storage::models::{Campaign, Subscriber, UpdateCampaign};
use mailcast_storage::repository::SubscriberRepository;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Test send errors
#[derive(Error, Debug)]
pub enum TestSendError {
    #[error("No subscribers to send the test to")]
    NoSubscribers,

    #[error("None of the test addresses belong to a known subscriber")]
    NoKnownSubscribers,

    #[error("Campaign not found")]
    CampaignNotFound,

    #[error(transparent)]
    Campaign(#[from] CampaignError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Send failed: {0}")]
    Messenger(#[from] MessengerError),

    #[error("Storage error: {0}")]
    Storage(#[from] mailcast_common::Error),
}

/// A test send request. Set fields in `overrides` replace the stored
/// campaign's values for this send only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestSendRequest {
    #[serde(default)]
    pub overrides: UpdateCampaign,
    pub subscriber_emails: Vec<String>,
}

/// Sends campaign previews synchronously, one message per subscriber
pub struct TestSender {
    campaigns: Arc<CampaignManager>,
    subscribers: Arc<dyn SubscriberRepository>,
}

impl TestSender {
    pub fn new(campaigns: Arc<CampaignManager>, subscribers: Arc<dyn SubscriberRepository>) -> Self {
        Self {
            campaigns,
            subscribers,
        }
    }

    /// Render and push the campaign to every requested subscriber. Stops at
    /// the first failure. Returns the number of messages sent.
    pub async fn send(
        &self,
        id: CampaignId,
        request: TestSendRequest,
    ) -> Result<usize, TestSendError> {
        let emails: Vec<String> = request
            .subscriber_emails
            .iter()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        if emails.is_empty() {
            return Err(TestSendError::NoSubscribers);
        }

        let subscribers = self.subscribers.get_by_emails(&emails).await?;
        if subscribers.is_empty() {
            return Err(TestSendError::NoKnownSubscribers);
        }

        let mut campaign = match self.campaigns.get(id).await {
            Ok(c) => c,
            Err(CampaignError::NotFound) => return Err(TestSendError::CampaignNotFound),
            Err(e) => return Err(e.into()),
        };
        campaign.apply(request.overrides);
        // A preview may keep a stale schedule; only content matters here.
        campaign.send_at = None;
        self.campaigns
            .field_rules()
            .validate(&mut campaign, Utc::now())?;

        let messenger = self.campaigns.messengers().get(&campaign.messenger)?;

        for subscriber in &subscribers {
            let message = self.build_message(&campaign, subscriber)?;
            if let Err(e) = messenger.push(&message).await {
                warn!(
                    campaign_id = %campaign.id,
                    subscriber = %subscriber.email,
                    error = %e,
                    "Test send failed"
                );
                return Err(e.into());
            }
        }

        info!(
            campaign_id = %campaign.id,
            messenger = %campaign.messenger,
            count = subscribers.len(),
            "Test messages sent"
        );

        Ok(subscribers.len())
    }

    fn build_message(
        &self,
        campaign: &Campaign,
        subscriber: &Subscriber,
    ) -> Result<Message, TestSendError> {
        let rendered = self.campaigns.renderer().render(campaign, subscriber)?;

        Ok(Message {
            from: campaign.from_email.clone(),
            to: vec![subscriber.email.clone()],
            subject: rendered.subject,
            content_type: campaign.content_type,
            body: rendered.body,
            alt_body: rendered.alt_body,
            campaign_id: Some(campaign.id),
            subscriber_id: Some(subscriber.id),
            ..Default::default()
        })
    }
}
