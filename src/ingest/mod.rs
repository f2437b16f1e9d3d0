// src/ingest/mod.rs
pub mod feed;
pub mod providers;
pub mod scheduler;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::ingest::types::{CanonicalLink, FeedItem};

/// One-time metrics registration (so series show up on the exporter).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "feed_fetch_errors_total",
            "Feed fetch/parse failures; the source is skipped for the cycle."
        );
        describe_counter!("feed_entries_total", "Entries considered after the per-source cap.");
        describe_counter!(
            "announcements_duplicate_total",
            "Entries skipped because their canonical link was already seen."
        );
        describe_counter!(
            "announcements_rejected_total",
            "Entries rejected by the relevance gate."
        );
        describe_counter!(
            "announcements_accepted_total",
            "Entries accepted as big announcements."
        );
        describe_counter!("deliveries_total", "Notifications delivered to chat.");
        describe_counter!("delivery_errors_total", "Notifications that failed to deliver.");
        describe_counter!("event_threads_created_total", "Per-event threads created.");
        describe_counter!(
            "seen_store_write_errors_total",
            "Failures persisting the seen-links file."
        );
        describe_histogram!("feed_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!("poll_last_cycle_ts", "Unix ts when the last poll cycle finished.");
    });
}

/// Strip markup from an entry summary: drop `<img>` tags, drop every other
/// tag, decode entities, collapse whitespace.
pub fn clean_html(raw: &str) -> String {
    static RE_IMG: OnceCell<Regex> = OnceCell::new();
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_img = RE_IMG.get_or_init(|| Regex::new(r"(?is)<img\b[^>]*>").unwrap());
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z!][^>]*>").unwrap());
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());

    let out = re_img.replace_all(raw, "");
    let out = re_tags.replace_all(&out, " ");
    let out = html_escape::decode_html_entities(&out);
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Wraps include keywords in `**` so they stand out in the chat embed.
#[derive(Debug, Clone)]
pub struct KeywordHighlighter {
    re: Option<Regex>,
}

impl KeywordHighlighter {
    pub fn new(keywords: &[String]) -> Self {
        let mut words: Vec<&str> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect();
        // Longest first so "gameplay reveal" wins over "reveal".
        words.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        words.dedup();
        if words.is_empty() {
            return Self { re: None };
        }
        let alternation = words
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join("|");
        // Escaped literals only; cannot fail to compile.
        let re = Regex::new(&format!("(?i)(?:{alternation})")).ok();
        Self { re }
    }

    pub fn highlight(&self, text: &str) -> String {
        match &self.re {
            Some(re) => re.replace_all(text, "**$0**").into_owned(),
            None => text.to_string(),
        }
    }
}

/// First illustrative image for an entry: media content, then media
/// thumbnail, then the first `<img src>` in the raw summary.
pub fn extract_image(item: &FeedItem) -> Option<String> {
    if let Some(m) = item
        .media_content
        .iter()
        .find(|m| !m.url.trim().is_empty() && m.looks_like_image())
    {
        return Some(m.url.trim().to_string());
    }
    if let Some(m) = item
        .media_thumbnails
        .iter()
        .find(|m| !m.url.trim().is_empty())
    {
        return Some(m.url.trim().to_string());
    }
    static RE_IMG_SRC: OnceCell<Regex> = OnceCell::new();
    let re = RE_IMG_SRC.get_or_init(|| {
        Regex::new(r#"(?is)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).unwrap()
    });
    re.captures(&item.summary)
        .and_then(|c| c.get(1))
        .map(|m| html_escape::decode_html_entities(m.as_str().trim()).into_owned())
}

/// Absolute form of an item link. Relative links are joined onto the feed url;
/// `None` when neither parses.
pub fn resolve_link(feed_url: &str, raw: &str) -> Option<String> {
    let raw = raw.trim();
    match url::Url::parse(raw) {
        Ok(u) => Some(u.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => url::Url::parse(feed_url.trim())
            .and_then(|base| base.join(raw))
            .ok()
            .map(|u| u.to_string()),
        Err(_) => None,
    }
}

/// Canonical dedup key: scheme + host + path, no query/fragment/userinfo.
pub fn normalize_link(raw: &str) -> CanonicalLink {
    let raw = raw.trim();
    match url::Url::parse(raw) {
        Ok(mut u) => {
            u.set_query(None);
            u.set_fragment(None);
            // Fails only for cannot-be-a-base urls, which carry no userinfo.
            let _ = u.set_username("");
            let _ = u.set_password(None);
            CanonicalLink::from_normalized(u.to_string())
        }
        Err(_) => {
            let cut = raw.find(['?', '#']).unwrap_or(raw.len());
            CanonicalLink::from_normalized(raw[..cut].to_string())
        }
    }
}

/// Cap at `max` chars, appending `...` when something was cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.truncate(out.trim_end().len());
    out.push_str("...");
    out
}

/// Most recent `n` entries. Ordered newest first when every entry is dated,
/// document order otherwise.
pub fn recent_entries(mut items: Vec<FeedItem>, n: usize) -> Vec<FeedItem> {
    if items.iter().all(|i| i.published_at.is_some()) {
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    }
    items.truncate(n);
    items
}
