// src/ingest/feed.rs
//! RSS 2.0 / RSS 1.0 (RDF) / Atom documents into [`FeedItem`]s.
//!
//! `feed-rs` does the parsing. Before it runs, text nodes are rewritten so
//! HTML-only entities (`&eacute;`, `&nbsp;`, ...) and bare ampersands, which
//! real feeds are full of, do not abort the whole document.

use anyhow::{bail, Context, Result};
use feed_rs::model::Entry;
use metrics::histogram;
use once_cell::sync::OnceCell;
use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::{Captures, Regex};

use crate::ingest::types::{FeedItem, MediaRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Rss,
    Rdf,
    Atom,
}

/// Parse a fetched document. Fails on unknown roots or malformed XML.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>> {
    let t0 = std::time::Instant::now();
    detect_kind(xml)?;
    let xml = normalize_entities(xml)?;
    let feed = feed_rs::parser::parse(xml.as_bytes()).context("parsing feed xml")?;
    let items = feed.entries.into_iter().map(feed_item).collect();
    histogram!("feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(items)
}

/// Look at the root element name only.
pub fn detect_kind(xml: &str) -> Result<FeedKind> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().context("reading feed root element")? {
            Event::Start(e) | Event::Empty(e) => {
                let name = e.local_name();
                return match name.as_ref() {
                    b"rss" => Ok(FeedKind::Rss),
                    b"RDF" => Ok(FeedKind::Rdf),
                    b"feed" => Ok(FeedKind::Atom),
                    other => bail!(
                        "unsupported feed root element <{}>",
                        String::from_utf8_lossy(other)
                    ),
                };
            }
            Event::Eof => bail!("empty feed document"),
            _ => continue,
        }
    }
}

/// Rewrites entity references in text nodes into something any XML parser
/// accepts: XML's own five and numeric references stay, known HTML names
/// become numeric references, anything else (and a bare `&`) is escaped.
/// CDATA sections and markup pass through untouched.
pub fn normalize_entities(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    loop {
        let ev = reader.read_event().context("scanning feed xml")?;
        match ev {
            Event::Eof => break,
            Event::Text(t) => {
                let raw = t.into_inner();
                let raw = std::str::from_utf8(&raw).context("feed text is not utf-8")?;
                let fixed = rewrite_entities(raw);
                writer
                    .write_event(Event::Text(BytesText::from_escaped(fixed)))
                    .context("rewriting feed text")?;
            }
            other => writer.write_event(other).context("rewriting feed xml")?,
        }
    }
    String::from_utf8(writer.into_inner()).context("rewritten feed is not utf-8")
}

fn rewrite_entities(text: &str) -> String {
    static RE_ENTITY: OnceCell<Regex> = OnceCell::new();
    let re = RE_ENTITY.get_or_init(|| Regex::new(r"&(#?[A-Za-z0-9]{1,32};)?").unwrap());
    re.replace_all(text, |caps: &Captures| {
        let Some(body) = caps.get(1).map(|m| m.as_str()) else {
            return "&amp;".to_string();
        };
        let name = &body[..body.len() - 1];
        if name.starts_with('#') || matches!(name, "amp" | "lt" | "gt" | "quot" | "apos") {
            return format!("&{body}");
        }
        let reference = format!("&{body}");
        let decoded = html_escape::decode_html_entities(&reference);
        if decoded == reference {
            format!("&amp;{body}")
        } else {
            decoded.chars().map(|c| format!("&#{};", c as u32)).collect()
        }
    })
    .into_owned()
}

fn feed_item(e: Entry) -> FeedItem {
    // rel="alternate" is the default when rel is absent.
    let link = e
        .links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
        .or_else(|| e.links.first())
        .map(|l| l.href.trim().to_string())
        .filter(|h| !h.is_empty());
    let summary = e
        .summary
        .map(|s| s.content)
        .filter(|s| !s.trim().is_empty())
        .or_else(|| e.content.and_then(|c| c.body))
        .unwrap_or_default();
    let published_at = e
        .published
        .or(e.updated)
        .and_then(|dt| u64::try_from(dt.timestamp()).ok());

    let mut media_content = Vec::new();
    let mut media_thumbnails = Vec::new();
    for m in e.media {
        for c in m.content {
            let Some(url) = c.url else { continue };
            media_content.push(MediaRef {
                url: url.to_string(),
                medium: None,
                mime: c.content_type.map(|t| t.to_string()),
            });
        }
        for t in m.thumbnails {
            let url = t.image.uri.trim();
            if !url.is_empty() {
                media_thumbnails.push(MediaRef::new(url));
            }
        }
    }

    FeedItem {
        title: e.title.map(|t| t.content).unwrap_or_default().trim().to_string(),
        summary,
        link,
        published_at,
        media_content,
        media_thumbnails,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rss_with_media_and_dates() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Blog</title>
    <link>https://blog.test/</link>
    <item>
      <title>New trailer</title>
      <link>https://blog.test/a?utm_source=rss</link>
      <description><![CDATA[<p>Watch the <b>trailer</b></p>]]></description>
      <pubDate>Tue, 10 Jun 2025 18:00:00 +0000</pubDate>
      <media:content url="https://cdn.test/a.jpg" medium="image"/>
      <media:thumbnail url="https://cdn.test/a-thumb.jpg"/>
    </item>
    <item>
      <title>Second&nbsp;post</title>
      <link>https://blog.test/b</link>
    </item>
  </channel>
</rss>"#;
        let items = parse_feed(xml).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "New trailer");
        assert_eq!(items[0].summary, "<p>Watch the <b>trailer</b></p>");
        assert_eq!(items[0].published_at, Some(1_749_578_400));
        assert_eq!(items[0].media_content[0].url, "https://cdn.test/a.jpg");
        assert_eq!(items[0].media_thumbnails[0].url, "https://cdn.test/a-thumb.jpg");
        assert_eq!(items[1].title, "Second\u{a0}post");
        assert_eq!(items[1].summary, "");
        assert!(items[1].published_at.is_none());
    }

    #[test]
    fn atom_prefers_alternate_link_and_summary() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>News</title>
  <entry>
    <title type="html">Expansion announced</title>
    <link rel="self" href="https://news.test/api/1"/>
    <link rel="alternate" href="https://news.test/posts/1"/>
    <summary type="html">&lt;p&gt;Big news&lt;/p&gt;</summary>
    <published>2025-06-10T18:00:00Z</published>
  </entry>
  <entry>
    <title>Only content</title>
    <link href="https://news.test/posts/2"/>
    <content type="html">Body text</content>
    <updated>2025-06-11T18:00:00+02:00</updated>
  </entry>
</feed>"#;
        let items = parse_feed(xml).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].link.as_deref(), Some("https://news.test/posts/1"));
        assert!(items[0].summary.contains("<p>Big news</p>"), "{}", items[0].summary);
        assert_eq!(items[0].published_at, Some(1_749_578_400));
        assert_eq!(items[1].link.as_deref(), Some("https://news.test/posts/2"));
        assert_eq!(items[1].summary.trim(), "Body text");
        assert_eq!(items[1].published_at, Some(1_749_657_600));
    }

    #[test]
    fn rdf_items_sit_beside_channel() {
        let xml = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns="http://purl.org/rss/1.0/">
  <channel><title>Old school</title></channel>
  <item>
    <title>Launch date set</title>
    <link>https://rdf.test/1</link>
    <description>Soon</description>
  </item>
</rdf:RDF>"#;
        let items = parse_feed(xml).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link.as_deref(), Some("https://rdf.test/1"));
    }

    #[test]
    fn unknown_root_and_garbage_are_errors() {
        assert!(parse_feed("<html><body>nope</body></html>").is_err());
        assert!(parse_feed("").is_err());
        assert!(parse_feed("<rss><channel><item><title>x</channel></rss>").is_err());
    }

    #[test]
    fn item_level_atom_link_beside_rss_link() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Mixed</title>
    <atom:link href="https://mixed.test/feed" rel="self" type="application/rss+xml"/>
    <item>
      <title>Trailer drop</title>
      <link>https://mixed.test/posts/1</link>
      <atom:link href="https://mixed.test/posts/1/amp" rel="amphtml"/>
    </item>
  </channel>
</rss>"#;
        let items = parse_feed(xml).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link.as_deref(), Some("https://mixed.test/posts/1"));
    }

    #[test]
    fn atom_xhtml_content_keeps_its_text() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>News</title>
  <entry>
    <title>Studio news</title>
    <link href="https://news.test/posts/9"/>
    <content type="xhtml"><div xmlns="http://www.w3.org/1999/xhtml"><p>Big reveal <b>today</b></p></div></content>
    <updated>2025-06-11T18:00:00Z</updated>
  </entry>
</feed>"#;
        let items = parse_feed(xml).unwrap();
        assert_eq!(items.len(), 1);
        let text = crate::ingest::clean_html(&items[0].summary);
        assert!(text.contains("Big reveal today"), "{text:?}");
    }

    #[test]
    fn html_named_entities_do_not_sink_the_feed() {
        let xml = r#"<rss version="2.0"><channel><title>Blog</title>
<item><title>Pok&eacute;mon Presents &mdash; live</title><link>https://blog.test/p</link></item>
<item><title>Rock & Roll &copy; &bogus; &amp; more</title><link>https://blog.test/r</link></item>
</channel></rss>"#;
        let items = parse_feed(xml).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Pok\u{e9}mon Presents \u{2014} live");
        assert_eq!(items[1].title, "Rock & Roll \u{a9} &bogus; & more");
    }

    #[test]
    fn entity_rewrite_leaves_cdata_and_xml_entities_alone() {
        let xml = "<a>&eacute;&#233;&lt;&amp;x & y<![CDATA[&eacute; & raw]]></a>";
        let out = normalize_entities(xml).unwrap();
        assert_eq!(out, "<a>&#233;&#233;&lt;&amp;x &amp; y<![CDATA[&eacute; & raw]]></a>");
    }

    #[test]
    fn channel_without_items_is_empty_not_error() {
        let xml = r#"<rss version="2.0"><channel><title>Quiet</title></channel></rss>"#;
        assert!(parse_feed(xml).unwrap().is_empty());
    }
}
