//! Data models for Mailcast storage

use chrono::{DateTime, Utc};
use mailcast_common::types::{CampaignId, ListId, SubscriberId, TemplateId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "campaign_status", rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Running,
    Paused,
    Cancelled,
    Finished,
}

impl CampaignStatus {
    /// Every status, in lifecycle order
    pub const ALL: [CampaignStatus; 6] = [
        CampaignStatus::Draft,
        CampaignStatus::Scheduled,
        CampaignStatus::Running,
        CampaignStatus::Paused,
        CampaignStatus::Cancelled,
        CampaignStatus::Finished,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Scheduled => "scheduled",
            CampaignStatus::Running => "running",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Cancelled => "cancelled",
            CampaignStatus::Finished => "finished",
        }
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "scheduled" => Ok(CampaignStatus::Scheduled),
            "running" => Ok(CampaignStatus::Running),
            "paused" => Ok(CampaignStatus::Paused),
            "cancelled" => Ok(CampaignStatus::Cancelled),
            "finished" => Ok(CampaignStatus::Finished),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Format of a campaign body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "content_type", rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Richtext,
    Html,
    Markdown,
    Plain,
}

impl ContentType {
    /// Whether the rendered body is HTML
    pub fn is_html(&self) -> bool {
        !matches!(self, ContentType::Plain)
    }
}

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub subject: String,
    pub from_email: String,
    pub body: String,
    pub alt_body: Option<String>,
    pub content_type: ContentType,
    pub messenger: String,
    pub template_id: Option<TemplateId>,
    pub list_ids: Vec<ListId>,
    pub tags: Vec<String>,
    pub send_at: Option<DateTime<Utc>>,
    pub status: CampaignStatus,
    pub to_send: i32,
    pub sent: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Apply a content update in place. Fields absent from the update keep
    /// their current value.
    pub fn apply(&mut self, input: UpdateCampaign) {
        if let Some(name) = input.name {
            self.name = name;
        }
        if let Some(subject) = input.subject {
            self.subject = subject;
        }
        if let Some(from_email) = input.from_email {
            self.from_email = from_email;
        }
        if let Some(body) = input.body {
            self.body = body;
        }
        if let Some(alt_body) = input.alt_body {
            self.alt_body = Some(alt_body);
        }
        if let Some(content_type) = input.content_type {
            self.content_type = content_type;
        }
        if let Some(messenger) = input.messenger {
            self.messenger = messenger;
        }
        if let Some(template_id) = input.template_id {
            self.template_id = Some(template_id);
        }
        if let Some(list_ids) = input.list_ids {
            self.list_ids = list_ids;
        }
        if let Some(tags) = input.tags {
            self.tags = tags;
        }
        match input.send_later {
            Some(true) => self.send_at = input.send_at.or(self.send_at),
            Some(false) => self.send_at = None,
            None => {
                if input.send_at.is_some() {
                    self.send_at = input.send_at;
                }
            }
        }
    }
}

/// Create campaign input. New campaigns always start as drafts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateCampaign {
    pub name: String,
    pub subject: String,
    /// Empty uses the configured default sender
    #[serde(default)]
    pub from_email: String,
    #[serde(default)]
    pub body: String,
    pub alt_body: Option<String>,
    #[serde(default)]
    pub content_type: ContentType,
    /// Defaults to the e-mail messenger
    pub messenger: Option<String>,
    pub template_id: Option<TemplateId>,
    pub list_ids: Vec<ListId>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub send_at: Option<DateTime<Utc>>,
}

/// Update campaign input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCampaign {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub from_email: Option<String>,
    pub body: Option<String>,
    pub alt_body: Option<String>,
    pub content_type: Option<ContentType>,
    pub messenger: Option<String>,
    pub template_id: Option<TemplateId>,
    pub list_ids: Option<Vec<ListId>>,
    pub tags: Option<Vec<String>>,
    pub send_at: Option<DateTime<Utc>>,
    /// `Some(false)` clears `send_at`
    pub send_later: Option<bool>,
}

/// Subscriber model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub email: String,
    pub name: String,
    pub attribs: serde_json::Value,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Delivery counters of a campaign, with the estimated send rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignStats {
    pub id: CampaignId,
    pub status: CampaignStatus,
    pub to_send: i32,
    pub sent: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Messages per minute
    pub rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn campaign() -> Campaign {
        let now = Utc::now();
        Campaign {
            id: uuid::Uuid::new_v4(),
            name: "Spring sale".to_string(),
            subject: "Spring is here".to_string(),
            from_email: "Shop <shop@example.com>".to_string(),
            body: "<p>Hello</p>".to_string(),
            alt_body: None,
            content_type: ContentType::Html,
            messenger: "email".to_string(),
            template_id: None,
            list_ids: vec![uuid::Uuid::new_v4()],
            tags: vec![],
            send_at: Some(now + Duration::hours(1)),
            status: CampaignStatus::Draft,
            to_send: 0,
            sent: 0,
            started_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_status_roundtrip() {
        for status in CampaignStatus::ALL {
            assert_eq!(status.to_string().parse::<CampaignStatus>(), Ok(status));
        }
        assert!("sending".parse::<CampaignStatus>().is_err());
    }

    #[test]
    fn test_apply_keeps_absent_fields() {
        let mut c = campaign();
        c.apply(UpdateCampaign {
            subject: Some("New subject".to_string()),
            ..Default::default()
        });

        assert_eq!(c.subject, "New subject");
        assert_eq!(c.name, "Spring sale");
        assert!(c.send_at.is_some());
    }

    #[test]
    fn test_apply_send_later_false_clears_send_at() {
        let mut c = campaign();
        c.apply(UpdateCampaign {
            send_later: Some(false),
            ..Default::default()
        });
        assert_eq!(c.send_at, None);
    }
}
