//! Server Pool Entry settings, resolved from configuration

use super::MessengerError;
use mailcast_common::config::SmtpServerConfig;
use std::time::Duration;
use tracing::warn;

/// SMTP authentication protocol named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProtocol {
    None,
    CramMd5,
    Plain,
    Login,
}

impl std::str::FromStr for AuthProtocol {
    type Err = MessengerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "none" => Ok(AuthProtocol::None),
            "cram" => Ok(AuthProtocol::CramMd5),
            "plain" => Ok(AuthProtocol::Plain),
            "login" => Ok(AuthProtocol::Login),
            other => Err(MessengerError::Config(format!(
                "unknown SMTP auth type '{}'",
                other
            ))),
        }
    }
}

/// Username and password for SMTP authentication
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for SmtpCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Concrete authenticator for one server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authenticator {
    None,
    CramMd5(SmtpCredentials),
    Plain(SmtpCredentials),
    Login(SmtpCredentials),
}

impl Authenticator {
    pub fn resolve(protocol: AuthProtocol, username: &str, password: &str) -> Self {
        let credentials = || SmtpCredentials {
            username: username.to_string(),
            password: password.to_string(),
        };

        match protocol {
            AuthProtocol::None => Authenticator::None,
            AuthProtocol::CramMd5 => Authenticator::CramMd5(credentials()),
            AuthProtocol::Plain => Authenticator::Plain(credentials()),
            AuthProtocol::Login => Authenticator::Login(credentials()),
        }
    }
}

/// Which body parts are sent through a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmailFormat {
    Html,
    Plain,
    #[default]
    Both,
}

impl EmailFormat {
    pub fn wants_html(&self) -> bool {
        matches!(self, EmailFormat::Html | EmailFormat::Both)
    }

    pub fn wants_text(&self) -> bool {
        matches!(self, EmailFormat::Plain | EmailFormat::Both)
    }
}

impl std::str::FromStr for EmailFormat {
    type Err = MessengerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "html" => Ok(EmailFormat::Html),
            "plain" => Ok(EmailFormat::Plain),
            "" | "both" => Ok(EmailFormat::Both),
            other => Err(MessengerError::Config(format!(
                "unknown email format '{}'",
                other
            ))),
        }
    }
}

/// TLS policy for a server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsPolicy {
    /// Accept any certificate
    SkipVerify,
    /// Verify the certificate against `server_name`
    Verify { server_name: String },
}

/// Connection pool sizing, passed through to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    pub max_conns: u32,
    pub idle_timeout: Duration,
    pub wait_timeout: Duration,
    pub hello_hostname: Option<String>,
}

/// Fully resolved settings of one Server Pool Entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub auth: Authenticator,
    pub tls: Option<TlsPolicy>,
    pub email_format: EmailFormat,
    /// Parsed injection rules, in configuration order
    pub inject_headers: Vec<(String, String)>,
    pub pool: PoolOptions,
}

impl ServerSettings {
    /// Resolve a server descriptor. Fails with `MessengerError::Config` on an
    /// unknown auth protocol or email format, or a missing name/host.
    pub fn resolve(config: &SmtpServerConfig) -> Result<Self, MessengerError> {
        if config.name.trim().is_empty() {
            return Err(MessengerError::Config(
                "SMTP server name is required".to_string(),
            ));
        }
        if config.host.trim().is_empty() {
            return Err(MessengerError::Config(format!(
                "SMTP server '{}' has no host",
                config.name
            )));
        }

        let protocol: AuthProtocol = config.auth_protocol.parse()?;
        let email_format: EmailFormat = config.email_format.parse()?;

        let tls = if config.tls_enabled {
            if config.tls_skip_verify {
                Some(TlsPolicy::SkipVerify)
            } else {
                Some(TlsPolicy::Verify {
                    server_name: config.host.clone(),
                })
            }
        } else {
            None
        };

        let inject_headers = config
            .inject_headers
            .iter()
            .filter_map(|rule| {
                let parsed = parse_header_rule(rule);
                if parsed.is_none() {
                    warn!(server = %config.name, rule = %rule, "Skipping malformed header rule");
                }
                parsed
            })
            .collect();

        Ok(Self {
            name: config.name.clone(),
            host: config.host.clone(),
            port: config.port,
            auth: Authenticator::resolve(protocol, &config.username, &config.password),
            tls,
            email_format,
            inject_headers,
            pool: PoolOptions {
                max_conns: config.max_conns,
                idle_timeout: Duration::from_secs(config.idle_timeout_secs),
                wait_timeout: Duration::from_secs(config.wait_timeout_secs),
                hello_hostname: config.hello_hostname.clone(),
            },
        })
    }
}

/// Parse a `Key: Value` header rule, splitting on the first colon.
/// Returns `None` when the key or value is empty after trimming.
pub fn parse_header_rule(rule: &str) -> Option<(String, String)> {
    let (key, value) = rule.split_once(':')?;
    let (key, value) = (key.trim(), value.trim());

    if key.is_empty() || value.is_empty() {
        return None;
    }

    Some((key.to_string(), value.to_string()))
}
