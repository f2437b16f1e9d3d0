// src/config/catalog.rs
//! Static data the pipeline runs on: feed sources, include/exclude keywords and
//! event triggers. Built-in defaults can be overridden from a TOML file.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::events::EventClassifier;

pub const DEFAULT_ACCENT_COLOR: u32 = 0xF39C12;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub color: Option<u32>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub icon: Option<PathBuf>,
}

impl FeedSource {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            color: None,
            platform: None,
            icon: None,
        }
    }

    pub fn with_color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_platform(mut self, platform: &str) -> Self {
        self.platform = Some(platform.to_string());
        self
    }

    pub fn with_icon(mut self, icon: impl Into<PathBuf>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn accent_color(&self) -> u32 {
        self.color.unwrap_or(DEFAULT_ACCENT_COLOR)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeywordSets {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventRule {
    pub name: String,
    pub triggers: Vec<String>,
}

impl EventRule {
    pub fn new(name: &str, triggers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    pub sources: Vec<FeedSource>,
    pub keywords: KeywordSets,
    pub events: Vec<EventRule>,
}

/* ----------------------------
Built-in data
---------------------------- */

fn builtin_sources() -> Vec<FeedSource> {
    vec![
        FeedSource::new("PlayStation", "https://blog.playstation.com/feed/")
            .with_color(0x003791)
            .with_platform("PlayStation"),
        FeedSource::new("Xbox", "https://news.xbox.com/en-us/feed/")
            .with_color(0x107C10)
            .with_platform("Xbox"),
        FeedSource::new("Nintendo", "https://www.nintendo.com/whatsnew/rss/")
            .with_color(0xE60012)
            .with_platform("Nintendo Switch"),
        FeedSource::new("Steam", "https://store.steampowered.com/feeds/news.xml")
            .with_color(0x1B2838)
            .with_platform("PC"),
        FeedSource::new("IGN", "https://feeds.ign.com/ign/games-all").with_color(0xBF1313),
        FeedSource::new("GameSpot", "https://www.gamespot.com/feeds/news/"),
        FeedSource::new("Polygon", "https://www.polygon.com/rss/index.xml").with_color(0xFF0052),
        FeedSource::new("Kotaku", "https://kotaku.com/rss"),
        FeedSource::new("Game Informer", "https://www.gameinformer.com/rss"),
        FeedSource::new("Eurogamer", "https://www.eurogamer.net/?format=rss"),
        FeedSource::new("PC Gamer", "https://www.pcgamer.com/rss/").with_platform("PC"),
        FeedSource::new("Rock Paper Shotgun", "https://www.rockpapershotgun.com/feed")
            .with_platform("PC"),
        FeedSource::new("Bethesda", "https://bethesda.net/en/rss"),
        FeedSource::new("Blizzard", "https://news.blizzard.com/en-us/rss.xml")
            .with_color(0x148EFF),
        FeedSource::new("Ubisoft", "https://www.ubisoft.com/en-us/rss"),
        FeedSource::new("Riot Games", "https://www.riotgames.com/en/rss").with_color(0xD13639),
        FeedSource::new("Capcom Unity", "https://www.capcom-unity.com/rss/"),
        FeedSource::new("Devolver Digital", "https://www.devolverdigital.com/rss"),
        FeedSource::new("Gearbox Software", "https://gearboxsoftware.com/feed"),
        FeedSource::new("CD Projekt Red", "https://en.cdprojektred.com/feed/"),
    ]
}

fn builtin_keywords() -> KeywordSets {
    let include = [
        "announce",
        "announced",
        "reveal",
        "trailer",
        "world premiere",
        "new game",
        "launch",
        "release date",
        "expansion",
        "dlc",
        "gameplay reveal",
    ];
    let exclude = [
        "review",
        "patch",
        "update",
        "hotfix",
        "sale",
        "interview",
        "opinion",
        "guide",
        "rumor",
        "leak",
    ];
    KeywordSets {
        include: include.iter().map(|s| s.to_string()).collect(),
        exclude: exclude.iter().map(|s| s.to_string()).collect(),
    }
}

// Order matters: first matching entry wins.
fn builtin_events() -> Vec<EventRule> {
    vec![
        EventRule::new("Nintendo Direct", &["nintendo direct"]),
        EventRule::new("State of Play", &["state of play"]),
        EventRule::new("Xbox Showcase", &["xbox showcase"]),
        EventRule::new("Summer Game Fest", &["summer game fest"]),
        EventRule::new("The Game Awards", &["the game awards"]),
        EventRule::new("Gamescom", &["gamescom"]),
        EventRule::new("E3", &["e3"]),
        EventRule::new("PAX", &["pax"]),
        EventRule::new("BlizzCon", &["blizzcon"]),
        EventRule::new("Tokyo Game Show", &["tokyo game show"]),
        EventRule::new("Ubisoft Forward", &["ubisoft forward"]),
        EventRule::new("Bethesda Showcase", &["bethesda showcase"]),
        EventRule::new("Devolver Direct", &["devolver direct"]),
        EventRule::new("Sony State of Play", &["state of play"]),
        EventRule::new("Microsoft Build", &["microsoft build"]),
        EventRule::new("CD Projekt RED Night City Wire", &["night city wire"]),
        EventRule::new("Capcom Showcase", &["capcom showcase"]),
    ]
}

/* ----------------------------
TOML override schema
---------------------------- */

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    sources: Option<Vec<FeedSource>>,
    #[serde(default)]
    keywords: Option<KeywordSets>,
    #[serde(default)]
    events: Option<Vec<EventRule>>,
}

impl Catalog {
    pub fn builtin() -> Self {
        Self {
            sources: builtin_sources(),
            keywords: builtin_keywords(),
            events: builtin_events(),
        }
        .normalized()
    }

    /// Load from `path` when given, otherwise use the built-in catalog.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let catalog = match path {
            Some(p) => {
                let content = fs::read_to_string(p)
                    .with_context(|| format!("reading feeds config from {}", p.display()))?;
                Self::from_toml_str(&content)
                    .with_context(|| format!("parsing feeds config {}", p.display()))?
            }
            None => Self::builtin(),
        };
        catalog.validate()?;
        catalog.report_shadowed_events();
        info!(
            sources = catalog.sources.len(),
            include = catalog.keywords.include.len(),
            exclude = catalog.keywords.exclude.len(),
            events = catalog.events.len(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    /// Sections missing from the file keep the built-in defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(s)?;
        let catalog = Self {
            sources: file.sources.unwrap_or_else(builtin_sources),
            keywords: file.keywords.unwrap_or_else(builtin_keywords),
            events: file.events.unwrap_or_else(builtin_events),
        }
        .normalized();
        catalog.validate()?;
        Ok(catalog)
    }

    // Keywords and triggers are matched against lowercased text.
    fn normalized(mut self) -> Self {
        let clean = |v: Vec<String>| -> Vec<String> {
            v.into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect()
        };
        self.keywords.include = clean(self.keywords.include);
        self.keywords.exclude = clean(self.keywords.exclude);
        for ev in &mut self.events {
            ev.name = ev.name.trim().to_string();
            ev.triggers = clean(std::mem::take(&mut ev.triggers));
        }
        for src in &mut self.sources {
            src.name = src.name.trim().to_string();
            src.url = src.url.trim().to_string();
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            bail!("catalog has no feed sources");
        }
        let mut names = HashSet::new();
        for src in &self.sources {
            if src.name.is_empty() {
                bail!("feed source with url `{}` has an empty name", src.url);
            }
            if !names.insert(src.name.as_str()) {
                bail!("duplicate feed source name `{}`", src.name);
            }
            url::Url::parse(&src.url)
                .map_err(|e| anyhow!("feed source `{}` has invalid url: {e}", src.name))?;
        }
        if self.keywords.include.is_empty() {
            bail!("include keyword list is empty; nothing would ever be announced");
        }
        for ev in &self.events {
            if ev.name.is_empty() {
                bail!("event rule with an empty display name");
            }
            if ev.triggers.is_empty() {
                bail!("event `{}` has no trigger phrases", ev.name);
            }
        }
        Ok(())
    }

    fn report_shadowed_events(&self) {
        for shadowed in EventClassifier::new(&self.events).shadowed() {
            warn!(
                event = %shadowed,
                "event can never match: all of its triggers belong to an earlier entry"
            );
        }
    }

    pub fn source(&self, name: &str) -> Option<&FeedSource> {
        self.sources.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_is_valid_and_lowercased() {
        let c = Catalog::builtin();
        c.validate().expect("builtin catalog validates");
        assert_eq!(c.sources.len(), 20);
        assert!(c
            .keywords
            .include
            .iter()
            .chain(c.keywords.exclude.iter())
            .all(|k| k == &k.to_lowercase()));
        assert_eq!(c.events[0].name, "Nintendo Direct");
    }

    #[test]
    fn platform_lookup_for_console_makers_and_pc_store() {
        let c = Catalog::builtin();
        assert_eq!(
            c.source("PlayStation").and_then(|s| s.platform.as_deref()),
            Some("PlayStation")
        );
        assert_eq!(
            c.source("Steam").and_then(|s| s.platform.as_deref()),
            Some("PC")
        );
        assert_eq!(c.source("IGN").and_then(|s| s.platform.as_deref()), None);
    }

    #[test]
    fn accent_color_falls_back_to_default() {
        let plain = FeedSource::new("X", "https://x.test/feed");
        assert_eq!(plain.accent_color(), DEFAULT_ACCENT_COLOR);
        assert_eq!(plain.with_color(0x123456).accent_color(), 0x123456);
    }

    #[test]
    fn toml_sections_override_only_what_they_name() {
        let toml = r#"
[[sources]]
name = "Test Feed"
url = "https://feeds.test/rss"
color = 0x00FF00
platform = "PC"

[keywords]
include = [" Reveal ", "", "TRAILER"]
exclude = ["leak"]
"#;
        let c = Catalog::from_toml_str(toml).unwrap();
        assert_eq!(c.sources.len(), 1);
        assert_eq!(c.sources[0].color, Some(0x00FF00));
        assert_eq!(c.keywords.include, vec!["reveal", "trailer"]);
        assert_eq!(c.events, builtin_events());
    }

    #[test]
    fn duplicate_source_names_are_rejected() {
        let toml = r#"
[[sources]]
name = "Dup"
url = "https://a.test/rss"

[[sources]]
name = "Dup"
url = "https://b.test/rss"
"#;
        let err = Catalog::from_toml_str(toml).unwrap_err();
        assert!(format!("{err:#}").contains("duplicate feed source name"));
    }

    #[test]
    fn event_without_triggers_is_rejected() {
        let toml = r#"
[[events]]
name = "Empty"
triggers = ["  "]
"#;
        assert!(Catalog::from_toml_str(toml).is_err());
    }
}
