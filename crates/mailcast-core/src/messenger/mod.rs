//! Messenger Module - Outbound delivery backends and the SMTP server pool

mod emailer;
mod message;
mod pool;
mod registry;
mod server;
mod smtp;

pub use emailer::{html_to_text, Emailer, EMAIL_MESSENGER};
pub use message::{Attachment, Headers, Message, OutboundEmail};
pub use pool::{ConnectionPool, PoolConnector};
pub use registry::{Backend, MessengerRegistry};
pub use server::{
    parse_header_rule, AuthProtocol, Authenticator, EmailFormat, PoolOptions, ServerSettings,
    SmtpCredentials, TlsPolicy,
};
pub use smtp::SmtpConnector;

use async_trait::async_trait;
use thiserror::Error;

/// Messenger errors
#[derive(Error, Debug)]
pub enum MessengerError {
    #[error("Messenger configuration error: {0}")]
    Config(String),

    #[error("Cannot connect to SMTP server '{server}': {reason}")]
    Connection { server: String, reason: String },

    #[error("Render error: {0}")]
    Render(String),

    #[error("Delivery through '{server}' failed: {reason}")]
    Delivery { server: String, reason: String },

    #[error("Messenger is closed")]
    Closed,

    #[error("Unknown messenger '{0}'")]
    UnknownMessenger(String),
}

/// A delivery backend that campaigns can be sent through
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Name campaigns refer to this messenger by
    fn name(&self) -> &str;

    /// Send one message
    async fn push(&self, message: &Message) -> Result<(), MessengerError>;

    /// Send anything buffered by earlier pushes
    async fn flush(&self) -> Result<(), MessengerError>;

    /// Release every resource. Pushes after close fail with
    /// `MessengerError::Closed`.
    async fn close(&self) -> Result<(), MessengerError>;
}
