// src/ingest/types.rs
use anyhow::Result;
use std::fmt;

use crate::config::catalog::FeedSource;

/// One `media:content` / `media:thumbnail` attachment on a feed entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaRef {
    pub url: String,
    pub medium: Option<String>, // e.g. "image", "video"
    pub mime: Option<String>,   // e.g. "image/jpeg"
}

impl MediaRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            medium: None,
            mime: None,
        }
    }

    /// Attachments without any type hint are assumed to be images.
    pub fn looks_like_image(&self) -> bool {
        match (self.medium.as_deref(), self.mime.as_deref()) {
            (Some(m), _) => m.eq_ignore_ascii_case("image"),
            (None, Some(t)) => t.to_ascii_lowercase().starts_with("image/"),
            (None, None) => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub summary: String,           // raw, may contain markup
    pub link: Option<String>,      // as published, before normalization
    pub published_at: Option<u64>, // unix seconds
    pub media_content: Vec<MediaRef>,
    pub media_thumbnails: Vec<MediaRef>,
}

/// Link with query, fragment and userinfo removed. Used as the dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalLink(String);

impl CanonicalLink {
    pub(crate) fn from_normalized(s: String) -> Self {
        Self(s)
    }

    /// Wrap a line read back from the seen-links file. The value is trusted
    /// to be normalized already.
    pub fn from_persisted(s: &str) -> Self {
        Self(s.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalLink {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<&str> for CanonicalLink {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[async_trait::async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, source: &FeedSource) -> Result<Vec<FeedItem>>;
}
