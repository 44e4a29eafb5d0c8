//! Outbound message types

use mailcast_common::types::{CampaignId, SubscriberId};
use mailcast_storage::models::ContentType;

/// Ordered, multi-valued header list. Header names compare
/// case-insensitively; adding a name twice keeps both values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any existing values for the same name
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// All values for `name`, in insertion order
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// First value for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Extend<(String, String)> for Headers {
    fn extend<T: IntoIterator<Item = (String, String)>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A file attached to a message. The content is always owned by the
/// attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub header: Headers,
    pub content: Vec<u8>,
}

impl Attachment {
    /// Create an attachment holding its own copy of `content`
    pub fn new(name: impl Into<String>, header: Headers, content: &[u8]) -> Self {
        Self {
            name: name.into(),
            header,
            content: content.to_vec(),
        }
    }

    /// Deep copy into a buffer sized exactly to the content
    pub(crate) fn copy(&self) -> Self {
        let mut content = Vec::with_capacity(self.content.len());
        content.extend_from_slice(&self.content);

        Self {
            name: self.name.clone(),
            header: self.header.clone(),
            content,
        }
    }

    /// Content type from the attachment header, if one was given
    pub fn content_type(&self) -> Option<&str> {
        self.header.get("Content-Type")
    }
}

/// A rendered message handed to a messenger, one per send
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub content_type: ContentType,
    pub body: Vec<u8>,
    pub alt_body: Vec<u8>,
    pub headers: Headers,
    pub attachments: Vec<Attachment>,

    // Context for logging only
    pub campaign_id: Option<CampaignId>,
    pub subscriber_id: Option<SubscriberId>,
}

/// A fully assembled email as handed to a connection pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub headers: Headers,
    pub html: Option<String>,
    pub text: Option<String>,
    pub attachments: Vec<Attachment>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_headers_keep_repeated_names() {
        let mut headers = Headers::new();
        headers.add("X-Test", "xyz");
        headers.add("x-test", "abc");
        headers.add("X-Other", "1");

        assert_eq!(headers.get_all("X-TEST"), vec!["xyz", "abc"]);
        assert_eq!(headers.get("x-other"), Some("1"));
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn test_attachment_owns_content() {
        let mut buf = b"report".to_vec();
        let attachment = Attachment::new("report.txt", Headers::new(), &buf);
        buf[0] = b'X';

        assert_eq!(attachment.content, b"report".to_vec());
    }

    #[test]
    fn test_attachment_copy_is_exact() {
        let mut content = Vec::with_capacity(1024);
        content.extend_from_slice(b"abc");
        let attachment = Attachment {
            name: "a.bin".to_string(),
            header: Headers::from_iter([("Content-Type", "application/octet-stream")]),
            content,
        };

        let copy = attachment.copy();
        assert_eq!(copy, attachment);
        assert_eq!(copy.content_type(), Some("application/octet-stream"));
    }
}
