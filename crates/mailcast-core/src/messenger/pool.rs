//! Connection pool seam between the emailer and the mail transport

use super::message::OutboundEmail;
use super::server::ServerSettings;
use super::MessengerError;
use async_trait::async_trait;
use std::sync::Arc;

/// A live pool of connections to one mail server.
///
/// Concurrent sends are queued or parallelised by the pool itself.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Transmit one email. Transport failures come back as
    /// `MessengerError::Delivery`.
    async fn send(&self, email: OutboundEmail) -> Result<(), MessengerError>;

    /// Release every connection. Sends after close fail with
    /// `MessengerError::Closed`.
    async fn close(&self) -> Result<(), MessengerError>;
}

/// Opens connection pools for resolved server settings
#[async_trait]
pub trait PoolConnector: Send + Sync {
    async fn connect(
        &self,
        server: &ServerSettings,
    ) -> Result<Arc<dyn ConnectionPool>, MessengerError>;
}
