// src/notify/format.rs
//! Turns an accepted entry into the chat message shown to users.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::OutgoingMessage;
use crate::config::catalog::FeedSource;
use crate::ingest::types::{CanonicalLink, FeedItem};
use crate::ingest::{clean_html, extract_image, truncate_chars, KeywordHighlighter};

pub const SUMMARY_MAX_CHARS: usize = 350;
pub const FOOTER_PREFIX: &str = "BIG GAMING ANNOUNCEMENT";
// Discord embed title limit.
const TITLE_MAX_CHARS: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: u32,
    pub timestamp: DateTime<Utc>,
    pub footer: EmbedFooter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl Embed {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Formatter {
    highlighter: KeywordHighlighter,
}

impl Formatter {
    pub fn new(include_keywords: &[String]) -> Self {
        Self {
            highlighter: KeywordHighlighter::new(include_keywords),
        }
    }

    pub fn format(
        &self,
        source: &FeedSource,
        item: &FeedItem,
        link: &CanonicalLink,
        event: Option<&str>,
        now: DateTime<Utc>,
    ) -> OutgoingMessage {
        let cleaned = clean_html(&item.summary);
        let description = (!cleaned.is_empty())
            .then(|| self.highlighter.highlight(&truncate_chars(&cleaned, SUMMARY_MAX_CHARS)));

        let title = match item.title.trim() {
            "" => link.to_string(),
            t => truncate_chars(t, TITLE_MAX_CHARS - 3),
        };

        let mut fields = Vec::new();
        if let Some(platform) = source.platform.as_deref() {
            fields.push(EmbedField {
                name: "Platform".into(),
                value: platform.to_string(),
                inline: true,
            });
        }
        if let Some(ev) = event {
            fields.push(EmbedField {
                name: "Event".into(),
                value: ev.to_string(),
                inline: true,
            });
        }

        let icon_url = source
            .icon
            .as_deref()
            .and_then(|p| p.file_name())
            .map(|f| format!("attachment://{}", f.to_string_lossy()));

        let embed = Embed {
            title,
            url: link.to_string(),
            description,
            color: source.accent_color(),
            timestamp: now,
            footer: EmbedFooter {
                text: format!("{FOOTER_PREFIX} • {}", source.name),
            },
            author: Some(EmbedAuthor {
                name: source.name.clone(),
                icon_url,
            }),
            image: extract_image(item).map(|url| EmbedImage { url }),
            fields,
        };

        OutgoingMessage {
            content: Some(format!("🔗 **Direct link:** {link}")),
            embed: Some(embed),
            icon: source.icon.clone(),
        }
    }
}
