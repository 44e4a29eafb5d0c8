//! Messenger registry - process-wide name to backend mapping
//!
//! Built once at startup and passed to whatever needs to send. Closing the
//! registry closes every backend.

use super::emailer::Emailer;
use super::message::Message;
use super::pool::PoolConnector;
use super::smtp::SmtpConnector;
use super::{Messenger, MessengerError};
use async_trait::async_trait;
use mailcast_common::Config;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Every delivery backend the application knows about
pub enum Backend {
    Email(Emailer),
}

#[async_trait]
impl Messenger for Backend {
    fn name(&self) -> &str {
        match self {
            Backend::Email(e) => e.name(),
        }
    }

    async fn push(&self, message: &Message) -> Result<(), MessengerError> {
        match self {
            Backend::Email(e) => e.push(message).await,
        }
    }

    async fn flush(&self) -> Result<(), MessengerError> {
        match self {
            Backend::Email(e) => e.flush().await,
        }
    }

    async fn close(&self) -> Result<(), MessengerError> {
        match self {
            Backend::Email(e) => e.close().await,
        }
    }
}

/// Registered messengers, keyed by name
#[derive(Default)]
pub struct MessengerRegistry {
    backends: BTreeMap<String, Backend>,
}

impl MessengerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every messenger the configuration enables
    pub async fn from_config(config: &Config) -> Result<Self, MessengerError> {
        Self::from_config_with_connector(config, &SmtpConnector).await
    }

    pub async fn from_config_with_connector(
        config: &Config,
        connector: &dyn PoolConnector,
    ) -> Result<Self, MessengerError> {
        let mut registry = Self::new();

        let servers = config.enabled_smtp_servers();
        if servers.is_empty() {
            warn!("No SMTP servers enabled, e-mail messenger not registered");
        } else {
            let emailer = Emailer::with_connector(&servers, connector).await?;
            info!(servers = servers.len(), "E-mail messenger ready");
            registry.register(Backend::Email(emailer))?;
        }

        Ok(registry)
    }

    /// Add a backend under its own name
    pub fn register(&mut self, backend: Backend) -> Result<(), MessengerError> {
        let name = backend.name().to_string();
        if self.backends.contains_key(&name) {
            return Err(MessengerError::Config(format!(
                "messenger '{}' is already registered",
                name
            )));
        }

        self.backends.insert(name, backend);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Backend, MessengerError> {
        self.backends
            .get(name)
            .ok_or_else(|| MessengerError::UnknownMessenger(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Close every backend, returning the first failure
    pub async fn close_all(&self) -> Result<(), MessengerError> {
        let mut first_err = None;

        for (name, backend) in &self.backends {
            if let Err(e) = backend.close().await {
                warn!(messenger = %name, error = %e, "Failed to close messenger");
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
