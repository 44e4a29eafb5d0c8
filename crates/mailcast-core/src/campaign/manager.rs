//! Campaign Manager - Creation, status transitions, content updates,
//! previews and send rates

use super::rate::estimate_rate;
use super::render::{placeholder_subscriber, RenderedMessage, Renderer};
use super::transition::{is_content_immutable, validate_transition};
use super::validate::FieldRules;
use super::CampaignError;
use crate::messenger::{MessengerRegistry, EMAIL_MESSENGER};
use chrono::Utc;
use mailcast_common::types::CampaignId;
use mailcast_storage::models::{
    Campaign, CampaignStats, CampaignStatus, ContentType, CreateCampaign, UpdateCampaign,
};
use mailcast_storage::repository::CampaignRepository;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Unsaved body to preview in place of the stored one
#[derive(Debug, Clone)]
pub struct PreviewBody {
    pub body: String,
    pub content_type: ContentType,
}

/// Campaign Manager - Applies client requests to stored campaigns
pub struct CampaignManager {
    repo: Arc<dyn CampaignRepository>,
    messengers: Arc<MessengerRegistry>,
    renderer: Arc<dyn Renderer>,
    default_from_email: String,
}

impl CampaignManager {
    pub fn new(
        repo: Arc<dyn CampaignRepository>,
        messengers: Arc<MessengerRegistry>,
        renderer: Arc<dyn Renderer>,
        default_from_email: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            messengers,
            renderer,
            default_from_email: default_from_email.into(),
        }
    }

    pub fn messengers(&self) -> &MessengerRegistry {
        &self.messengers
    }

    pub fn renderer(&self) -> &dyn Renderer {
        self.renderer.as_ref()
    }

    /// Rules content updates and test sends are validated against
    pub fn field_rules(&self) -> FieldRules<'_> {
        FieldRules {
            default_from_email: &self.default_from_email,
            messengers: &self.messengers,
            renderer: self.renderer.as_ref(),
        }
    }

    pub async fn get(&self, id: CampaignId) -> Result<Campaign, CampaignError> {
        self.repo.get(id).await?.ok_or(CampaignError::NotFound)
    }

    /// Validate and store a new campaign. New campaigns are always drafts.
    pub async fn create(&self, input: CreateCampaign) -> Result<Campaign, CampaignError> {
        let now = Utc::now();
        let mut campaign = Campaign {
            id: Uuid::now_v7(),
            name: input.name,
            subject: input.subject,
            from_email: input.from_email,
            body: input.body,
            alt_body: input.alt_body,
            content_type: input.content_type,
            messenger: input
                .messenger
                .unwrap_or_else(|| EMAIL_MESSENGER.to_string()),
            template_id: input.template_id,
            list_ids: input.list_ids,
            tags: input.tags,
            send_at: input.send_at,
            status: CampaignStatus::Draft,
            to_send: 0,
            sent: 0,
            started_at: None,
            created_at: now,
            updated_at: now,
        };
        self.field_rules().validate(&mut campaign, now)?;

        let created = self.repo.insert(&campaign).await?;

        info!(
            campaign_id = %created.id,
            name = %created.name,
            "Campaign created"
        );

        Ok(created)
    }

    /// Render a campaign for a stand-in subscriber, optionally with an
    /// unsaved body. Nothing is stored.
    pub async fn preview(
        &self,
        id: CampaignId,
        body: Option<PreviewBody>,
    ) -> Result<RenderedMessage, CampaignError> {
        let mut campaign = self.get(id).await?;
        if let Some(preview) = body {
            campaign.body = preview.body;
            campaign.content_type = preview.content_type;
        }

        Ok(self
            .renderer
            .render(&campaign, &placeholder_subscriber())?)
    }

    /// Move a campaign to `target`.
    ///
    /// The write only succeeds if the campaign still has the status it was
    /// validated against; otherwise `Conflict` is returned and nothing changes.
    pub async fn update_status(
        &self,
        id: CampaignId,
        target: CampaignStatus,
    ) -> Result<Campaign, CampaignError> {
        let campaign = self.get(id).await?;
        validate_transition(campaign.status, target, campaign.send_at, Utc::now())?;

        let updated = self
            .repo
            .update_status(id, campaign.status, target)
            .await?
            .ok_or(CampaignError::Conflict)?;

        info!(
            campaign_id = %id,
            from = %campaign.status,
            to = %target,
            "Campaign status changed"
        );

        Ok(updated)
    }

    /// Change the content of a campaign that has not started yet
    pub async fn update_content(
        &self,
        id: CampaignId,
        input: UpdateCampaign,
    ) -> Result<Campaign, CampaignError> {
        let mut campaign = self.get(id).await?;
        if is_content_immutable(campaign.status) {
            return Err(CampaignError::ImmutableState(campaign.status));
        }

        let expected = campaign.status;
        campaign.apply(input);
        self.field_rules().validate(&mut campaign, Utc::now())?;

        let updated = self
            .repo
            .update_content(&campaign, expected)
            .await?
            .ok_or(CampaignError::Conflict)?;

        debug!(campaign_id = %id, "Campaign content updated");

        Ok(updated)
    }

    /// Counters of every running campaign with the estimated send rate
    pub async fn running_stats(&self) -> Result<Vec<CampaignStats>, CampaignError> {
        let mut stats = self.repo.running_stats().await?;
        for s in &mut stats {
            s.rate = estimate_rate(s.sent, s.to_send, s.started_at, s.updated_at);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::render::PlaceholderRenderer;
    use crate::campaign::tests::{campaign, registry, InMemoryCampaigns};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    async fn manager(repo: Arc<InMemoryCampaigns>) -> CampaignManager {
        let (messengers, _) = registry().await;
        CampaignManager::new(
            repo,
            Arc::new(messengers),
            Arc::new(PlaceholderRenderer::new()),
            "Mailcast <noreply@example.com>",
        )
    }

    fn create_input() -> CreateCampaign {
        CreateCampaign {
            name: "Autumn sale".to_string(),
            subject: "Leaves are falling".to_string(),
            body: "<p>Hello {{ name }}</p>".to_string(),
            list_ids: vec![Uuid::new_v4()],
            tags: vec![" seasonal ".to_string(), "big sale".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_makes_draft_with_defaults() {
        let repo = Arc::new(InMemoryCampaigns::default());
        let manager = manager(repo.clone()).await;

        let created = manager.create(create_input()).await.unwrap();

        assert_eq!(created.status, CampaignStatus::Draft);
        assert_eq!(created.messenger, EMAIL_MESSENGER);
        assert_eq!(created.from_email, "Mailcast <noreply@example.com>");
        assert_eq!(created.tags, vec!["seasonal", "big-sale"]);
        assert_eq!(created.send_at, None);
        assert_eq!(created.sent, 0);
        assert_eq!(repo.get_stored(created.id).name, "Autumn sale");
    }

    #[tokio::test]
    async fn test_create_validates_before_storing() {
        let repo = Arc::new(InMemoryCampaigns::default());
        let manager = manager(repo.clone()).await;

        let inputs = [
            CreateCampaign {
                list_ids: vec![],
                ..create_input()
            },
            CreateCampaign {
                messenger: Some("sms".to_string()),
                ..create_input()
            },
            CreateCampaign {
                send_at: Some(Utc::now() - Duration::hours(1)),
                ..create_input()
            },
        ];
        for input in inputs {
            assert!(matches!(
                manager.create(input).await,
                Err(CampaignError::Validation(_))
            ));
        }
        assert!(manager.running_stats().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_created_campaign_can_be_scheduled() {
        let repo = Arc::new(InMemoryCampaigns::default());
        let manager = manager(repo.clone()).await;

        let created = manager
            .create(CreateCampaign {
                send_at: Some(Utc::now() + Duration::hours(2)),
                ..create_input()
            })
            .await
            .unwrap();

        let scheduled = manager
            .update_status(created.id, CampaignStatus::Scheduled)
            .await
            .unwrap();
        assert_eq!(scheduled.status, CampaignStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_preview_renders_stored_body() {
        let repo = Arc::new(InMemoryCampaigns::default());
        let c = repo.seed(campaign());
        let manager = manager(repo.clone()).await;

        let rendered = manager.preview(c.id, None).await.unwrap();
        assert_eq!(rendered.body, b"<p>Hello Demo Subscriber</p>".to_vec());
    }

    #[tokio::test]
    async fn test_preview_unsaved_body() {
        let repo = Arc::new(InMemoryCampaigns::default());
        let c = repo.seed(campaign());
        let manager = manager(repo.clone()).await;

        let rendered = manager
            .preview(
                c.id,
                Some(PreviewBody {
                    body: "Hi {{ first_name }} from {{ attribs.city }}".to_string(),
                    content_type: ContentType::Plain,
                }),
            )
            .await
            .unwrap();
        assert_eq!(rendered.body, b"Hi Demo from Bengaluru".to_vec());
        assert_eq!(repo.get_stored(c.id).body, "<p>Hello {{ name }}</p>");

        assert!(matches!(
            manager
                .preview(
                    c.id,
                    Some(PreviewBody {
                        body: "Hi {{ name".to_string(),
                        content_type: ContentType::Html,
                    }),
                )
                .await,
            Err(CampaignError::Render(_))
        ));
        assert!(matches!(
            manager.preview(Uuid::new_v4(), None).await,
            Err(CampaignError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_update_status() {
        let repo = Arc::new(InMemoryCampaigns::default());
        let c = repo.seed(campaign());
        let manager = manager(repo.clone()).await;

        let updated = manager.update_status(c.id, CampaignStatus::Running).await.unwrap();
        assert_eq!(updated.status, CampaignStatus::Running);
        assert!(updated.started_at.is_some());

        let updated = manager.update_status(c.id, CampaignStatus::Paused).await.unwrap();
        assert_eq!(updated.status, CampaignStatus::Paused);
    }

    #[tokio::test]
    async fn test_invalid_transition_leaves_campaign_unchanged() {
        let repo = Arc::new(InMemoryCampaigns::default());
        let c = repo.seed(campaign());
        let manager = manager(repo.clone()).await;

        let err = manager
            .update_status(c.id, CampaignStatus::Paused)
            .await
            .unwrap_err();
        match err {
            CampaignError::InvalidTransition { from, to } => {
                assert_eq!(from, CampaignStatus::Draft);
                assert_eq!(to, CampaignStatus::Paused);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(repo.status(c.id), CampaignStatus::Draft);
    }

    #[tokio::test]
    async fn test_schedule_requires_send_at() {
        let repo = Arc::new(InMemoryCampaigns::default());
        let mut draft = campaign();
        draft.send_at = None;
        let c = repo.seed(draft);
        let manager = manager(repo.clone()).await;

        assert!(matches!(
            manager.update_status(c.id, CampaignStatus::Scheduled).await,
            Err(CampaignError::SendAtRequired)
        ));

        let mut later = campaign();
        later.send_at = Some(Utc::now() + Duration::days(1));
        let c = repo.seed(later);
        let updated = manager
            .update_status(c.id, CampaignStatus::Scheduled)
            .await
            .unwrap();
        assert_eq!(updated.status, CampaignStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_unknown_campaign() {
        let repo = Arc::new(InMemoryCampaigns::default());
        let manager = manager(repo).await;
        assert!(matches!(
            manager.update_status(uuid::Uuid::new_v4(), CampaignStatus::Running).await,
            Err(CampaignError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_transitions_one_wins() {
        let repo = Arc::new(InMemoryCampaigns::default());
        let c = repo.seed(campaign());
        let manager = Arc::new(manager(repo.clone()).await);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager.update_status(c.id, CampaignStatus::Running).await
            }));
        }

        let mut won = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => won += 1,
                Err(CampaignError::Conflict) | Err(CampaignError::InvalidTransition { .. }) => {}
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }
        assert_eq!(won, 1);
        assert_eq!(repo.status(c.id), CampaignStatus::Running);
    }

    #[tokio::test]
    async fn test_stale_read_is_a_conflict() {
        let repo = Arc::new(InMemoryCampaigns::default());
        let c = repo.seed(campaign());
        let manager = manager(repo.clone()).await;

        // Another writer moves the campaign between our read and write.
        repo.race_next_write(CampaignStatus::Running);

        assert!(matches!(
            manager.update_status(c.id, CampaignStatus::Running).await,
            Err(CampaignError::Conflict)
        ));
    }

    #[tokio::test]
    async fn test_content_frozen_once_started() {
        let repo = Arc::new(InMemoryCampaigns::default());
        let manager = manager(repo.clone()).await;

        for status in [
            CampaignStatus::Running,
            CampaignStatus::Cancelled,
            CampaignStatus::Finished,
        ] {
            let mut stored = campaign();
            stored.status = status;
            let c = repo.seed(stored);

            let updates = [
                UpdateCampaign {
                    name: Some("Renamed".to_string()),
                    ..Default::default()
                },
                UpdateCampaign {
                    tags: Some(vec!["x".to_string()]),
                    ..Default::default()
                },
                UpdateCampaign::default(),
            ];
            for input in updates {
                match manager.update_content(c.id, input).await {
                    Err(CampaignError::ImmutableState(s)) => assert_eq!(s, status),
                    other => panic!("{}: unexpected {:?}", status, other),
                }
            }
            assert_eq!(repo.get_stored(c.id).name, "Spring sale");
        }
    }

    #[tokio::test]
    async fn test_update_content() {
        let repo = Arc::new(InMemoryCampaigns::default());
        let c = repo.seed(campaign());
        let manager = manager(repo.clone()).await;

        let updated = manager
            .update_content(
                c.id,
                UpdateCampaign {
                    subject: Some("Summer is here".to_string()),
                    from_email: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.subject, "Summer is here");
        assert_eq!(updated.from_email, "Mailcast <noreply@example.com>");
        assert_eq!(repo.get_stored(c.id).subject, "Summer is here");
    }

    #[tokio::test]
    async fn test_update_content_validates() {
        let repo = Arc::new(InMemoryCampaigns::default());
        let c = repo.seed(campaign());
        let manager = manager(repo.clone()).await;

        let err = manager
            .update_content(
                c.id,
                UpdateCampaign {
                    list_ids: Some(vec![]),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CampaignError::Validation(_)));
        assert_eq!(repo.get_stored(c.id).list_ids.len(), 1);
    }

    #[tokio::test]
    async fn test_running_stats_fill_in_rate() {
        let repo = Arc::new(InMemoryCampaigns::default());
        let start = Utc::now() - Duration::minutes(10);

        let mut running = campaign();
        running.status = CampaignStatus::Running;
        running.to_send = 100;
        running.sent = 100;
        running.started_at = Some(start);
        running.updated_at = start + Duration::minutes(10);
        let running = repo.seed(running);
        repo.seed(campaign());

        let manager = manager(repo).await;
        let stats = manager.running_stats().await.unwrap();

        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].id, running.id);
        assert_eq!(stats[0].rate, 10.0);
    }
}
