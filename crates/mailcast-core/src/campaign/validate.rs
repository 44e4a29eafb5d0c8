//! Campaign field validation

use super::render::Renderer;
use super::CampaignError;
use crate::messenger::MessengerRegistry;
use chrono::{DateTime, Utc};
use mailcast_storage::models::Campaign;
use regex::Regex;
use std::sync::LazyLock;

/// Longest accepted campaign name or subject, in characters
pub const MAX_INPUT_LEN: usize = 200;

static FROM_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s<(.+?)@(.+?)>$").expect("from address pattern"));

static BARE_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@<>]+@[^\s@<>]+\.[^\s@<>]+$").expect("bare address pattern")
});

/// What field validation checks campaigns against
pub struct FieldRules<'a> {
    /// Sender used when a campaign leaves `from_email` empty
    pub default_from_email: &'a str,
    pub messengers: &'a MessengerRegistry,
    pub renderer: &'a dyn Renderer,
}

impl FieldRules<'_> {
    /// Validate the content fields of `campaign`, filling in the default
    /// sender if none is set.
    pub fn validate(&self, campaign: &mut Campaign, now: DateTime<Utc>) -> Result<(), CampaignError> {
        if campaign.from_email.trim().is_empty() {
            campaign.from_email = self.default_from_email.to_string();
        } else if !is_valid_from(&campaign.from_email) {
            return Err(invalid(format!("invalid from address '{}'", campaign.from_email)));
        }

        if !has_len(&campaign.name, 1, MAX_INPUT_LEN) {
            return Err(invalid(format!(
                "name must be 1 to {} characters",
                MAX_INPUT_LEN
            )));
        }
        if !has_len(&campaign.subject, 1, MAX_INPUT_LEN) {
            return Err(invalid(format!(
                "subject must be 1 to {} characters",
                MAX_INPUT_LEN
            )));
        }

        if let Some(send_at) = campaign.send_at {
            if send_at < now {
                return Err(invalid("send_at must be in the future".to_string()));
            }
        }

        if campaign.list_ids.is_empty() {
            return Err(invalid("at least one list is required".to_string()));
        }

        campaign.tags = normalize_tags(&campaign.tags);

        if !self.messengers.contains(&campaign.messenger) {
            return Err(invalid(format!("unknown messenger '{}'", campaign.messenger)));
        }

        self.renderer
            .check(&campaign.body)
            .map_err(|e| invalid(format!("invalid body: {}", e)))?;

        Ok(())
    }
}

fn invalid(reason: String) -> CampaignError {
    CampaignError::Validation(reason)
}

fn has_len(s: &str, min: usize, max: usize) -> bool {
    let len = s.trim().chars().count();
    len >= min && len <= max
}

/// Trim tags, join inner whitespace with hyphens and drop empty or repeated
/// tags
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.split_whitespace().collect::<Vec<_>>().join("-");
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// `Name <local@domain>` or a bare address
pub fn is_valid_from(from: &str) -> bool {
    FROM_ADDRESS.is_match(from) || BARE_ADDRESS.is_match(from)
}
