//! SMTP connection pools
//!
//! PLAIN, LOGIN and unauthenticated servers go through a pooled lettre
//! transport. CRAM-MD5 servers go through mail-send, which lettre cannot
//! authenticate against.

use super::message::{Headers, OutboundEmail};
use super::pool::{ConnectionPool, PoolConnector};
use super::server::{Authenticator, ServerSettings, SmtpCredentials, TlsPolicy};
use super::MessengerError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use lettre::{
    address::Envelope,
    message::{
        header::ContentType as MimeContentType, Attachment as MimeAttachment, Mailbox,
        MultiPart, SinglePart,
    },
    transport::smtp::{
        authentication::{Credentials, Mechanism},
        client::{Tls, TlsParameters},
        extension::ClientId,
        PoolConfig,
    },
    AsyncSmtpTransport, AsyncTransport, Message as MimeMessage, Tokio1Executor,
};
use mail_send::smtp::message::Message as SmtpEnvelope;
use mail_send::SmtpClientBuilder;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, info};

type LettreTransport = AsyncSmtpTransport<Tokio1Executor>;

/// Headers RFC 5322 allows at most once. A custom value replaces the
/// generated one.
const SINGLE_INSTANCE_HEADERS: [&str; 11] = [
    "Date",
    "From",
    "Sender",
    "Reply-To",
    "To",
    "Cc",
    "Bcc",
    "Message-ID",
    "In-Reply-To",
    "References",
    "Subject",
];

/// Headers describing the MIME structure, which custom headers may not touch
const STRUCTURAL_HEADERS: [&str; 3] = ["MIME-Version", "Content-Type", "Content-Transfer-Encoding"];

/// Bytes of UTF-8 per RFC 2047 encoded word, keeping each word under 75
/// characters
const ENCODED_WORD_BYTES: usize = 45;

/// Opens SMTP transports and checks that the server answers
#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpConnector;

#[async_trait]
impl PoolConnector for SmtpConnector {
    async fn connect(
        &self,
        server: &ServerSettings,
    ) -> Result<Arc<dyn ConnectionPool>, MessengerError> {
        let transport = build_transport(server)?;

        transport
            .verify()
            .await
            .map_err(|reason| MessengerError::Connection {
                server: server.name.clone(),
                reason,
            })?;

        info!(
            server = %server.name,
            host = %server.host,
            port = server.port,
            max_conns = server.pool.max_conns,
            "SMTP pool opened"
        );

        Ok(Arc::new(SmtpPool {
            server: server.name.clone(),
            transport: RwLock::new(Some(Arc::new(transport))),
        }))
    }
}

/// The client behind one server's pool
enum Transport {
    Lettre(LettreTransport),
    CramMd5(CramMd5Transport),
}

impl Transport {
    async fn verify(&self) -> Result<(), String> {
        match self {
            Transport::Lettre(t) => match t.test_connection().await {
                Ok(true) => Ok(()),
                Ok(false) => Err("server did not accept the connection".to_string()),
                Err(e) => Err(e.to_string()),
            },
            Transport::CramMd5(t) => t.verify().await,
        }
    }

    async fn send(&self, envelope: &Envelope, raw: &[u8]) -> Result<(), String> {
        match self {
            Transport::Lettre(t) => {
                let response = t.send_raw(envelope, raw).await.map_err(|e| e.to_string())?;
                debug!(code = %response.code(), "SMTP server accepted message");
                Ok(())
            }
            Transport::CramMd5(t) => t.send(envelope, raw).await,
        }
    }

    fn close(&self) {
        // Lettre shuts its pool down when the last clone is dropped.
        if let Transport::CramMd5(t) = self {
            t.permits.close();
        }
    }
}

/// Build the transport for a server
fn build_transport(server: &ServerSettings) -> Result<Transport, MessengerError> {
    match &server.auth {
        Authenticator::CramMd5(credentials) => {
            Ok(Transport::CramMd5(CramMd5Transport::new(server, credentials)))
        }
        _ => build_lettre_transport(server).map(Transport::Lettre),
    }
}

fn build_lettre_transport(server: &ServerSettings) -> Result<LettreTransport, MessengerError> {
    let pool_config = PoolConfig::new()
        .max_size(server.pool.max_conns)
        .idle_timeout(server.pool.idle_timeout);

    let mut builder = LettreTransport::builder_dangerous(server.host.as_str())
        .port(server.port)
        .timeout(Some(server.pool.wait_timeout))
        .pool_config(pool_config);

    if let Some(hello) = &server.pool.hello_hostname {
        builder = builder.hello_name(ClientId::Domain(hello.clone()));
    }

    if let Some(policy) = &server.tls {
        let parameters = match policy {
            TlsPolicy::SkipVerify => TlsParameters::builder(server.host.clone())
                .dangerous_accept_invalid_certs(true)
                .build_rustls(),
            TlsPolicy::Verify { server_name } => {
                TlsParameters::builder(server_name.clone()).build_rustls()
            }
        }
        .map_err(|e| {
            MessengerError::Config(format!("invalid TLS settings for '{}': {}", server.name, e))
        })?;

        builder = builder.tls(Tls::Required(parameters));
    }

    builder = match &server.auth {
        Authenticator::Plain(c) => builder
            .credentials(Credentials::new(c.username.clone(), c.password.clone()))
            .authentication(vec![Mechanism::Plain]),
        Authenticator::Login(c) => builder
            .credentials(Credentials::new(c.username.clone(), c.password.clone()))
            .authentication(vec![Mechanism::Login]),
        Authenticator::None | Authenticator::CramMd5(_) => builder,
    };

    Ok(builder.build())
}

/// mail-send client for CRAM-MD5 servers.
///
/// mail-send tries the server's advertised mechanisms strongest first, so
/// CRAM-MD5 is used whenever the server offers it. Each send opens its own
/// session; `permits` caps the number of open sessions at `max_conns`.
struct CramMd5Transport {
    host: String,
    port: u16,
    starttls: bool,
    skip_verify: bool,
    credentials: SmtpCredentials,
    hello_hostname: Option<String>,
    timeout: Duration,
    permits: Semaphore,
}

impl CramMd5Transport {
    fn new(server: &ServerSettings, credentials: &SmtpCredentials) -> Self {
        Self {
            host: server.host.clone(),
            port: server.port,
            starttls: server.tls.is_some(),
            skip_verify: matches!(server.tls, Some(TlsPolicy::SkipVerify)),
            credentials: credentials.clone(),
            hello_hostname: server.pool.hello_hostname.clone(),
            timeout: server.pool.wait_timeout,
            permits: Semaphore::new(server.pool.max_conns.max(1) as usize),
        }
    }

    fn builder(&self) -> SmtpClientBuilder<String> {
        let mut builder = SmtpClientBuilder::new(self.host.clone(), self.port)
            .implicit_tls(false)
            .timeout(self.timeout)
            .credentials((
                self.credentials.username.clone(),
                self.credentials.password.clone(),
            ));

        if self.skip_verify {
            builder = builder.allow_invalid_certs();
        }
        if let Some(hello) = &self.hello_hostname {
            builder = builder.helo_host(hello.clone());
        }

        builder
    }

    /// Open and authenticate one session
    async fn verify(&self) -> Result<(), String> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| "pool is closed".to_string())?;

        let connected = if self.starttls {
            self.builder().connect().await.map(drop)
        } else {
            self.builder().connect_plain().await.map(drop)
        };
        connected.map_err(|e| e.to_string())
    }

    async fn send(&self, envelope: &Envelope, raw: &[u8]) -> Result<(), String> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| "pool is closed".to_string())?;

        let from = envelope.from().map(|a| a.to_string()).unwrap_or_default();
        let recipients: Vec<String> = envelope.to().iter().map(|a| a.to_string()).collect();

        let mut message = SmtpEnvelope::empty().from(from.as_str()).body(raw);
        for rcpt in &recipients {
            message = message.to(rcpt.as_str());
        }

        let sent = if self.starttls {
            match self.builder().connect().await {
                Ok(mut client) => client.send(message).await,
                Err(e) => Err(e),
            }
        } else {
            match self.builder().connect_plain().await {
                Ok(mut client) => client.send(message).await,
                Err(e) => Err(e),
            }
        };
        sent.map_err(|e| e.to_string())?;

        debug!(host = %self.host, "SMTP server accepted message");
        Ok(())
    }
}

/// One server's pooled transport
struct SmtpPool {
    server: String,
    transport: RwLock<Option<Arc<Transport>>>,
}

#[async_trait]
impl ConnectionPool for SmtpPool {
    async fn send(&self, email: OutboundEmail) -> Result<(), MessengerError> {
        let transport = self
            .transport
            .read()
            .await
            .clone()
            .ok_or(MessengerError::Closed)?;

        let (envelope, raw) = format_email(&email).map_err(|reason| MessengerError::Delivery {
            server: self.server.clone(),
            reason,
        })?;

        transport
            .send(&envelope, &raw)
            .await
            .map_err(|reason| MessengerError::Delivery {
                server: self.server.clone(),
                reason,
            })
    }

    async fn close(&self) -> Result<(), MessengerError> {
        if let Some(transport) = self.transport.write().await.take() {
            transport.close();
            info!(server = %self.server, "SMTP pool closed");
        }
        Ok(())
    }
}

enum Body {
    Single(SinglePart),
    Multi(MultiPart),
}

/// Assemble the wire form of an email: the custom headers in order, then
/// the message lettre formats, minus any generated header a custom one
/// replaces.
pub(crate) fn format_email(email: &OutboundEmail) -> Result<(Envelope, Vec<u8>), String> {
    let from: Mailbox = email
        .from
        .parse()
        .map_err(|e| format!("invalid from address '{}': {}", email.from, e))?;

    let mut builder = MimeMessage::builder()
        .from(from)
        .subject(email.subject.clone());

    for to in &email.to {
        let mailbox: Mailbox = to
            .parse()
            .map_err(|e| format!("invalid recipient address '{}': {}", to, e))?;
        builder = builder.to(mailbox);
    }

    let message = match build_body(email)? {
        Body::Single(part) => builder.singlepart(part),
        Body::Multi(part) => builder.multipart(part),
    }
    .map_err(|e| format!("failed to build email: {}", e))?;

    let custom = custom_headers(&email.headers);
    let replaced: Vec<&str> = custom
        .iter()
        .map(|(name, _)| name.as_str())
        .filter(|name| is_single_instance(name))
        .collect();

    let formatted = message.formatted();
    let mut raw = Vec::with_capacity(formatted.len());
    for (name, value) in &custom {
        raw.extend_from_slice(name.as_bytes());
        raw.extend_from_slice(b": ");
        raw.extend_from_slice(value.as_bytes());
        raw.extend_from_slice(b"\r\n");
    }
    raw.extend_from_slice(&strip_headers(&formatted, &replaced));

    Ok((message.envelope().clone(), raw))
}

fn build_body(email: &OutboundEmail) -> Result<Body, String> {
    let body = match (&email.html, &email.text) {
        (Some(html), Some(text)) => Body::Multi(
            MultiPart::alternative()
                .singlepart(SinglePart::plain(text.clone()))
                .singlepart(SinglePart::html(html.clone())),
        ),
        (Some(html), None) => Body::Single(SinglePart::html(html.clone())),
        (None, Some(text)) => Body::Single(SinglePart::plain(text.clone())),
        (None, None) => Body::Single(SinglePart::plain(String::new())),
    };

    if email.attachments.is_empty() {
        return Ok(body);
    }

    let mut mixed = match body {
        Body::Single(part) => MultiPart::mixed().singlepart(part),
        Body::Multi(part) => MultiPart::mixed().multipart(part),
    };

    for attachment in &email.attachments {
        let content_type = match attachment.content_type() {
            Some(ct) => ct.to_string(),
            None => mime_guess::from_path(&attachment.name)
                .first_or_octet_stream()
                .to_string(),
        };
        let content_type = MimeContentType::parse(&content_type).map_err(|e| {
            format!(
                "invalid content type '{}' for attachment '{}': {}",
                content_type, attachment.name, e
            )
        })?;

        mixed = mixed.singlepart(
            MimeAttachment::new(attachment.name.clone())
                .body(attachment.content.clone(), content_type),
        );
    }

    Ok(Body::Multi(mixed))
}

/// Custom headers ready to write: names cleaned, values encoded, MIME
/// structure headers dropped, and single-instance headers reduced to their
/// last value.
fn custom_headers(headers: &Headers) -> Vec<(String, String)> {
    let cleaned: Vec<(String, String)> = headers
        .iter()
        .filter_map(|(name, value)| {
            let name = sanitize_header_name(name);
            if name.is_empty() || is_structural(&name) {
                return None;
            }
            Some((name, encode_header_value(&sanitize_header_value(value))))
        })
        .collect();

    let mut kept = Vec::with_capacity(cleaned.len());
    for (i, (name, value)) in cleaned.iter().enumerate() {
        let superseded = is_single_instance(name)
            && cleaned[i + 1..]
                .iter()
                .any(|(later, _)| later.eq_ignore_ascii_case(name));
        if !superseded {
            kept.push((name.clone(), value.clone()));
        }
    }
    kept
}

/// Drop the named header fields, folded continuation lines included, from
/// the header block of a formatted message
fn strip_headers(formatted: &[u8], names: &[&str]) -> Vec<u8> {
    if names.is_empty() {
        return formatted.to_vec();
    }
    let Some(end) = formatted.windows(4).position(|w| w == b"\r\n\r\n") else {
        return formatted.to_vec();
    };

    let (head, body) = formatted.split_at(end + 2);
    let mut out = Vec::with_capacity(formatted.len());
    let mut skipping = false;

    for line in head.split_inclusive(|b| *b == b'\n') {
        let continuation = matches!(line.first(), Some(b' ' | b'\t'));
        if !continuation {
            let name = line.split(|b| *b == b':').next().unwrap_or_default();
            skipping = names
                .iter()
                .any(|n| n.as_bytes().eq_ignore_ascii_case(name));
        }
        if !skipping {
            out.extend_from_slice(line);
        }
    }

    out.extend_from_slice(body);
    out
}

fn is_single_instance(name: &str) -> bool {
    SINGLE_INSTANCE_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

fn is_structural(name: &str) -> bool {
    STRUCTURAL_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

fn sanitize_header_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_graphic() && *c != ':')
        .collect()
}

fn sanitize_header_value(value: &str) -> String {
    value.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

/// RFC 2047 encoding for values that are not plain ASCII, folded into
/// encoded words of at most `ENCODED_WORD_BYTES` bytes each
fn encode_header_value(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for c in value.chars() {
        if chunk.len() + c.len_utf8() > ENCODED_WORD_BYTES {
            words.push(encoded_word(&chunk));
            chunk.clear();
        }
        chunk.push(c);
    }
    if !chunk.is_empty() {
        words.push(encoded_word(&chunk));
    }

    words.join("\r\n ")
}

fn encoded_word(s: &str) -> String {
    format!("=?utf-8?b?{}?=", BASE64.encode(s.as_bytes()))
}
