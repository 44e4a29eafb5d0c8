//! Subscriber repository

use crate::db::DatabasePool;
use crate::models::Subscriber;
use async_trait::async_trait;
use mailcast_common::{Error, Result};

/// Subscriber repository trait
#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    /// Look up subscribers by address. Matching is case-insensitive and
    /// unknown addresses are left out of the result.
    async fn get_by_emails(&self, emails: &[String]) -> Result<Vec<Subscriber>>;
}

/// Database subscriber repository
#[derive(Clone)]
pub struct DbSubscriberRepository {
    pool: DatabasePool,
}

impl DbSubscriberRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriberRepository for DbSubscriberRepository {
    async fn get_by_emails(&self, emails: &[String]) -> Result<Vec<Subscriber>> {
        if emails.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, Subscriber>(
            "SELECT * FROM subscribers WHERE LOWER(email) = ANY($1) ORDER BY email",
        )
        .bind(emails)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
