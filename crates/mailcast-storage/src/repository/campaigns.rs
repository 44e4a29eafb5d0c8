//! Campaign repository

use crate::db::DatabasePool;
use crate::models::{Campaign, CampaignStats, CampaignStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailcast_common::types::CampaignId;
use mailcast_common::{Error, Result};

/// Campaign repository trait.
///
/// Status and content writes are conditional on the status the caller read,
/// so two concurrent requests acting on the same stale read cannot both win.
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>>;

    /// Store a new campaign and return it as written
    async fn insert(&self, campaign: &Campaign) -> Result<Campaign>;

    /// Move `id` from `expected` to `target`. Returns `None` when the campaign
    /// no longer has the `expected` status (or does not exist).
    async fn update_status(
        &self,
        id: CampaignId,
        expected: CampaignStatus,
        target: CampaignStatus,
    ) -> Result<Option<Campaign>>;

    /// Write the content fields of `campaign`, provided its stored status is
    /// still `expected` and content is still mutable.
    async fn update_content(
        &self,
        campaign: &Campaign,
        expected: CampaignStatus,
    ) -> Result<Option<Campaign>>;

    /// Counters of every running campaign. `rate` is left at zero.
    async fn running_stats(&self) -> Result<Vec<CampaignStats>>;
}

/// Database campaign repository
#[derive(Clone)]
pub struct DbCampaignRepository {
    pool: DatabasePool,
}

impl DbCampaignRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignRepository for DbCampaignRepository {
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn insert(&self, campaign: &Campaign) -> Result<Campaign> {
        sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO campaigns (
                id, name, subject, from_email, body, alt_body, content_type,
                messenger, template_id, list_ids, tags, send_at, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(campaign.id)
        .bind(&campaign.name)
        .bind(&campaign.subject)
        .bind(&campaign.from_email)
        .bind(&campaign.body)
        .bind(&campaign.alt_body)
        .bind(campaign.content_type)
        .bind(&campaign.messenger)
        .bind(campaign.template_id)
        .bind(&campaign.list_ids)
        .bind(&campaign.tags)
        .bind(campaign.send_at)
        .bind(campaign.status)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn update_status(
        &self,
        id: CampaignId,
        expected: CampaignStatus,
        target: CampaignStatus,
    ) -> Result<Option<Campaign>> {
        let starting = target == CampaignStatus::Running;

        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                status = $3,
                started_at = CASE WHEN $4 AND started_at IS NULL THEN NOW() ELSE started_at END,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(target)
        .bind(starting)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn update_content(
        &self,
        campaign: &Campaign,
        expected: CampaignStatus,
    ) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                name = $3,
                subject = $4,
                from_email = $5,
                body = $6,
                alt_body = $7,
                content_type = $8,
                messenger = $9,
                template_id = $10,
                list_ids = $11,
                tags = $12,
                send_at = $13,
                updated_at = NOW()
            WHERE id = $1
              AND status = $2
              AND status NOT IN ('running', 'cancelled', 'finished')
            RETURNING *
            "#,
        )
        .bind(campaign.id)
        .bind(expected)
        .bind(&campaign.name)
        .bind(&campaign.subject)
        .bind(&campaign.from_email)
        .bind(&campaign.body)
        .bind(&campaign.alt_body)
        .bind(campaign.content_type)
        .bind(&campaign.messenger)
        .bind(campaign.template_id)
        .bind(&campaign.list_ids)
        .bind(&campaign.tags)
        .bind(campaign.send_at)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn running_stats(&self) -> Result<Vec<CampaignStats>> {
        let rows: Vec<(
            CampaignId,
            CampaignStatus,
            i32,
            i32,
            Option<DateTime<Utc>>,
            Option<DateTime<Utc>>,
        )> = sqlx::query_as(
            r#"
            SELECT id, status, to_send, sent, started_at, updated_at
            FROM campaigns
            WHERE status = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(CampaignStatus::Running)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(id, status, to_send, sent, started_at, updated_at)| CampaignStats {
                id,
                status,
                to_send,
                sent,
                started_at,
                updated_at,
                rate: 0.0,
            })
            .collect())
    }
}
