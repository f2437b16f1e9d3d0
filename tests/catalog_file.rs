// tests/catalog_file.rs
use std::io::Write;

use gaming_announce_bot::config::Catalog;

fn write_toml(body: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(body.as_bytes()).unwrap();
    f
}

#[test]
fn no_path_means_builtin() {
    let c = Catalog::load(None).unwrap();
    assert_eq!(c.sources.len(), 20);
    assert!(c.source("Nintendo").is_some());
}

#[test]
fn file_overrides_sources_and_keeps_other_defaults() {
    let f = write_toml(
        r#"
[[sources]]
name = "Indie Wire"
url = "https://indie.test/rss"
color = 0x00FF00
platform = "PC"
"#,
    );
    let c = Catalog::load(Some(f.path())).unwrap();
    assert_eq!(c.sources.len(), 1);
    assert_eq!(c.sources[0].accent_color(), 0x00FF00);
    assert_eq!(c.keywords, Catalog::builtin().keywords);
    assert_eq!(c.events.len(), Catalog::builtin().events.len());
}

#[test]
fn duplicate_source_names_fail_to_load() {
    let f = write_toml(
        r#"
[[sources]]
name = "Same"
url = "https://a.test/rss"

[[sources]]
name = "Same"
url = "https://b.test/rss"
"#,
    );
    let err = Catalog::load(Some(f.path())).unwrap_err();
    assert!(format!("{err:#}").contains("duplicate feed source name"));
}

#[test]
fn missing_file_is_an_error() {
    assert!(Catalog::load(Some(std::path::Path::new("/nonexistent/feeds.toml"))).is_err());
}

#[test]
fn shipped_example_config_loads() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/feeds.example.toml");
    let c = Catalog::load(Some(&path)).unwrap();
    assert_eq!(c.sources.len(), 2);
    assert_eq!(c.events[1].name, "State of Play");
    assert!(c.keywords.include.contains(&"trailer".to_string()));
}
