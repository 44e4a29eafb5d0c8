//! Emailer - the SMTP messenger
//!
//! Holds one connection pool per configured server and spreads messages
//! across them at random.

use super::message::{Message, OutboundEmail};
use super::pool::{ConnectionPool, PoolConnector};
use super::server::ServerSettings;
use super::smtp::SmtpConnector;
use super::{Messenger, MessengerError};
use async_trait::async_trait;
use mailcast_common::config::SmtpServerConfig;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Name the email messenger is registered under
pub const EMAIL_MESSENGER: &str = "email";

/// Line width of the plain-text rendering of HTML bodies
const TEXT_WIDTH: usize = 78;

/// One configured server and its live connection pool
struct ServerEntry {
    settings: ServerSettings,
    pool: Arc<dyn ConnectionPool>,
}

/// SMTP e-mail messenger
pub struct Emailer {
    servers: HashMap<String, ServerEntry>,
    /// Server names in configuration order, for random selection
    names: Vec<String>,
    /// Held for reading by every push and for writing by close
    closed: RwLock<bool>,
}

impl Emailer {
    /// Create an emailer that talks SMTP to every configured server
    pub async fn new(servers: &[SmtpServerConfig]) -> Result<Self, MessengerError> {
        Self::with_connector(servers, &SmtpConnector).await
    }

    /// Create an emailer whose pools are opened by `connector`.
    ///
    /// Every descriptor is resolved before any pool is opened, so a bad
    /// descriptor opens nothing. If opening a pool fails, the pools opened
    /// so far are closed before the error is returned.
    pub async fn with_connector(
        servers: &[SmtpServerConfig],
        connector: &dyn PoolConnector,
    ) -> Result<Self, MessengerError> {
        if servers.is_empty() {
            return Err(MessengerError::Config(
                "at least one SMTP server is required".to_string(),
            ));
        }

        let mut resolved = Vec::with_capacity(servers.len());
        let mut seen = HashSet::new();
        for config in servers {
            let settings = ServerSettings::resolve(config)?;
            if !seen.insert(settings.name.clone()) {
                return Err(MessengerError::Config(format!(
                    "duplicate SMTP server name '{}'",
                    settings.name
                )));
            }
            resolved.push(settings);
        }

        let mut opened: Vec<ServerEntry> = Vec::with_capacity(resolved.len());
        for settings in resolved {
            match connector.connect(&settings).await {
                Ok(pool) => opened.push(ServerEntry { settings, pool }),
                Err(e) => {
                    warn!(server = %settings.name, error = %e, "Failed to open SMTP pool");
                    for entry in &opened {
                        if let Err(close_err) = entry.pool.close().await {
                            warn!(
                                server = %entry.settings.name,
                                error = %close_err,
                                "Failed to close SMTP pool"
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }

        let names = opened.iter().map(|e| e.settings.name.clone()).collect();
        let servers = opened
            .into_iter()
            .map(|e| (e.settings.name.clone(), e))
            .collect();

        Ok(Self {
            servers,
            names,
            closed: RwLock::new(false),
        })
    }

    /// Configured server names, in configuration order
    pub fn server_names(&self) -> &[String] {
        &self.names
    }

    /// Pick a server: the only one, or one uniformly at random
    fn select(&self) -> &ServerEntry {
        let name = if self.names.len() > 1 {
            let i = rand::rng().random_range(0..self.names.len());
            &self.names[i]
        } else {
            &self.names[0]
        };

        &self.servers[name]
    }

    /// Turn a message into what the selected server's pool sends
    fn build_email(
        &self,
        settings: &ServerSettings,
        message: &Message,
    ) -> Result<OutboundEmail, MessengerError> {
        let attachments = message.attachments.iter().map(|a| a.copy()).collect();

        let text = if settings.email_format.wants_text() {
            Some(plain_text(message)?)
        } else {
            None
        };

        let html = if settings.email_format.wants_html() {
            Some(String::from_utf8_lossy(&message.body).into_owned())
        } else {
            None
        };

        let mut headers = message.headers.clone();
        headers.extend(settings.inject_headers.iter().cloned());

        Ok(OutboundEmail {
            from: message.from.clone(),
            to: message.to.clone(),
            subject: message.subject.clone(),
            headers,
            html,
            text,
            attachments,
        })
    }
}

/// Plain-text body of a message: the body itself when it is already plain
/// text, otherwise a text rendering of the HTML.
fn plain_text(message: &Message) -> Result<String, MessengerError> {
    if !message.content_type.is_html() {
        return Ok(String::from_utf8_lossy(&message.body).into_owned());
    }

    html_to_text(&message.body)
}

/// Render HTML as plain text, keeping table layout
pub fn html_to_text(html: &[u8]) -> Result<String, MessengerError> {
    html2text::config::plain()
        .string_from_read(html, TEXT_WIDTH)
        .map_err(|e| MessengerError::Render(format!("HTML to text conversion failed: {}", e)))
}

#[async_trait]
impl Messenger for Emailer {
    fn name(&self) -> &str {
        EMAIL_MESSENGER
    }

    async fn push(&self, message: &Message) -> Result<(), MessengerError> {
        let closed = self.closed.read().await;
        if *closed {
            return Err(MessengerError::Closed);
        }

        let entry = self.select();
        let email = self.build_email(&entry.settings, message)?;

        debug!(
            server = %entry.settings.name,
            recipients = message.to.len(),
            attachments = message.attachments.len(),
            campaign_id = ?message.campaign_id,
            subscriber_id = ?message.subscriber_id,
            "Pushing message"
        );

        let result = entry.pool.send(email).await;
        drop(closed);
        result
    }

    async fn flush(&self) -> Result<(), MessengerError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), MessengerError> {
        let mut closed = self.closed.write().await;
        if *closed {
            return Ok(());
        }
        *closed = true;

        let mut first_err = None;
        for name in &self.names {
            let entry = &self.servers[name];
            if let Err(e) = entry.pool.close().await {
                warn!(server = %name, error = %e, "Failed to close SMTP pool");
                first_err.get_or_insert(e);
            }
        }

        info!(servers = self.names.len(), "Emailer closed");

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
