//! Campaign Renderer - Personalizes campaign content per subscriber

use chrono::Utc;
use mailcast_storage::models::{Campaign, Subscriber};
use regex::{Captures, Regex};
use serde_json::{json, Value};
use std::sync::LazyLock;
use thiserror::Error;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^}]*)\}\}").expect("placeholder pattern"));

/// Template errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("unclosed placeholder at byte {0}")]
    Unclosed(usize),

    #[error("template error: {0}")]
    Template(String),
}

/// A campaign rendered for one subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: Vec<u8>,
    pub alt_body: Vec<u8>,
}

/// Produces the per-subscriber content of a campaign
pub trait Renderer: Send + Sync {
    /// Check that a template body is well-formed
    fn check(&self, template: &str) -> Result<(), RenderError>;

    fn render(
        &self,
        campaign: &Campaign,
        subscriber: &Subscriber,
    ) -> Result<RenderedMessage, RenderError>;
}

/// Renderer substituting `{{ email }}`, `{{ name }}`, `{{ first_name }}`,
/// `{{ last_name }}` and `{{ attribs.KEY }}`. Unknown placeholders render
/// as nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderRenderer;

impl PlaceholderRenderer {
    pub fn new() -> Self {
        Self
    }

    fn render_str(&self, template: &str, subscriber: &Subscriber) -> Result<String, RenderError> {
        self.check(template)?;

        Ok(PLACEHOLDER
            .replace_all(template, |caps: &Captures| {
                lookup(caps[1].trim(), subscriber).unwrap_or_default()
            })
            .into_owned())
    }
}

impl Renderer for PlaceholderRenderer {
    fn check(&self, template: &str) -> Result<(), RenderError> {
        let mut last = 0;
        for m in PLACEHOLDER.find_iter(template) {
            if let Some(pos) = template[last..m.start()].find("{{") {
                return Err(RenderError::Unclosed(last + pos));
            }
            last = m.end();
        }

        match template[last..].find("{{") {
            Some(pos) => Err(RenderError::Unclosed(last + pos)),
            None => Ok(()),
        }
    }

    fn render(
        &self,
        campaign: &Campaign,
        subscriber: &Subscriber,
    ) -> Result<RenderedMessage, RenderError> {
        let subject = self.render_str(&campaign.subject, subscriber)?;
        let body = self.render_str(&campaign.body, subscriber)?;
        let alt_body = match &campaign.alt_body {
            Some(alt) => self.render_str(alt, subscriber)?,
            None => String::new(),
        };

        Ok(RenderedMessage {
            subject,
            body: body.into_bytes(),
            alt_body: alt_body.into_bytes(),
        })
    }
}

/// Stand-in recipient for previews. Its nil id keeps previews out of any
/// per-subscriber tracking.
pub fn placeholder_subscriber() -> Subscriber {
    let now = Utc::now();
    Subscriber {
        id: uuid::Uuid::nil(),
        email: "demo@mailcast.example".to_string(),
        name: "Demo Subscriber".to_string(),
        attribs: json!({ "city": "Bengaluru" }),
        status: "enabled".to_string(),
        created_at: now,
        updated_at: now,
    }
}

fn lookup(key: &str, subscriber: &Subscriber) -> Option<String> {
    let mut parts = subscriber.name.split_whitespace();

    match key {
        "email" => Some(subscriber.email.clone()),
        "name" => Some(subscriber.name.clone()),
        "first_name" => parts.next().map(str::to_string),
        "last_name" => {
            parts.next();
            Some(parts.collect::<Vec<_>>().join(" "))
        }
        _ => {
            let attr = key.strip_prefix("attribs.")?;
            match subscriber.attribs.get(attr)? {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::tests::{campaign, subscriber};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_subscriber_fields() {
        let mut c = campaign();
        c.subject = "Hi {{ first_name }}".to_string();
        c.body = "<p>{{name}} / {{ last_name }} / {{ email }} / {{ attribs.city }} / {{ attribs.vip }}</p>"
            .to_string();
        c.alt_body = Some("Dear {{ first_name }}{{ unknown }}".to_string());

        let rendered = PlaceholderRenderer::new()
            .render(&c, &subscriber("alice@example.com"))
            .unwrap();

        assert_eq!(rendered.subject, "Hi Alice");
        assert_eq!(
            String::from_utf8(rendered.body).unwrap(),
            "<p>Alice van Dyke / van Dyke / alice@example.com / Lisbon / true</p>"
        );
        assert_eq!(rendered.alt_body, b"Dear Alice".to_vec());
    }

    #[test]
    fn test_missing_alt_body_renders_empty() {
        let c = campaign();
        let rendered = PlaceholderRenderer::new()
            .render(&c, &subscriber("alice@example.com"))
            .unwrap();
        assert!(rendered.alt_body.is_empty());
    }

    #[test]
    fn test_unclosed_placeholder() {
        let renderer = PlaceholderRenderer::new();
        assert_eq!(renderer.check("Hi {{ name"), Err(RenderError::Unclosed(3)));
        assert_eq!(
            renderer.check("{{ name }} and {{ email"),
            Err(RenderError::Unclosed(15))
        );
        assert!(renderer.check("{{ name }} and {{ email }}").is_ok());
        assert!(renderer.check("no placeholders").is_ok());
    }

    #[test]
    fn test_render_fails_on_bad_template() {
        let mut c = campaign();
        c.subject = "Hi {{ first_name".to_string();
        assert!(PlaceholderRenderer::new()
            .render(&c, &subscriber("alice@example.com"))
            .is_err());
    }
}
