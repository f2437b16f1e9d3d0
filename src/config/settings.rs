// src/config/settings.rs
use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DISCORD_TOKEN: &str = "DISCORD_TOKEN";
pub const ENV_CHANNEL_ID: &str = "CHANNEL_ID";

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 900;
pub const DEFAULT_MAX_ENTRIES_PER_SOURCE: usize = 10;
pub const DEFAULT_SEEN_LINKS_PATH: &str = "posted_links.txt";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_DELIVERY_DELAY_MIN_MS: u64 = 1_000;
pub const DEFAULT_DELIVERY_DELAY_MAX_MS: u64 = 3_000;

#[derive(Clone)]
pub struct Settings {
    pub discord_token: String,
    pub channel_id: u64,
    pub port: u16,
    pub poll_interval: Duration,
    pub max_entries_per_source: usize,
    pub seen_links_path: PathBuf,
    pub feeds_config_path: Option<PathBuf>,
    pub delivery_delay_ms: (u64, u64),
    pub fetch_timeout: Duration,
    pub metrics_addr: Option<SocketAddr>,
    pub log_json: bool,
}

// Never print the token itself.
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("discord_token_len", &self.discord_token.len())
            .field("channel_id", &self.channel_id)
            .field("port", &self.port)
            .field("poll_interval", &self.poll_interval)
            .field("max_entries_per_source", &self.max_entries_per_source)
            .field("seen_links_path", &self.seen_links_path)
            .field("feeds_config_path", &self.feeds_config_path)
            .field("delivery_delay_ms", &self.delivery_delay_ms)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("metrics_addr", &self.metrics_addr)
            .field("log_json", &self.log_json)
            .finish()
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// `LOG_FORMAT=json` selects JSON logs. Read on its own so logging can be
    /// up before the rest of the settings emit warnings.
    pub fn json_logs<F>(get: F) -> bool
    where
        F: Fn(&str) -> Option<String>,
    {
        get("LOG_FORMAT").is_some_and(|v| v.trim().eq_ignore_ascii_case("json"))
    }

    /// Build settings from an arbitrary key lookup (env, map in tests).
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow!("missing required environment variable {key}"))
        };

        let discord_token = required(ENV_DISCORD_TOKEN)?;
        let channel_id = required(ENV_CHANNEL_ID)?
            .parse::<u64>()
            .with_context(|| format!("{ENV_CHANNEL_ID} must be a numeric channel id"))?;

        let port = parse_or(&get, "PORT", DEFAULT_PORT);
        let poll_interval = Duration::from_secs(
            parse_or(&get, "POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS).max(1),
        );
        let max_entries_per_source =
            parse_or(&get, "MAX_ENTRIES_PER_SOURCE", DEFAULT_MAX_ENTRIES_PER_SOURCE).max(1);
        let seen_links_path = get("SEEN_LINKS_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SEEN_LINKS_PATH));
        let feeds_config_path = get("FEEDS_CONFIG_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let mut lo = parse_or(&get, "DELIVERY_DELAY_MIN_MS", DEFAULT_DELIVERY_DELAY_MIN_MS);
        let mut hi = parse_or(&get, "DELIVERY_DELAY_MAX_MS", DEFAULT_DELIVERY_DELAY_MAX_MS);
        if lo > hi {
            std::mem::swap(&mut lo, &mut hi);
        }

        let fetch_timeout =
            Duration::from_secs(parse_or(&get, "FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS).max(1));
        let metrics_addr = get("METRICS_ADDR").and_then(|v| {
            let parsed = v.trim().parse::<SocketAddr>();
            if parsed.is_err() {
                tracing::warn!(value = %v, "ignoring unparsable METRICS_ADDR");
            }
            parsed.ok()
        });
        let log_json = Self::json_logs(&get);

        Ok(Self {
            discord_token,
            channel_id,
            port,
            poll_interval,
            max_entries_per_source,
            seen_links_path,
            feeds_config_path,
            delivery_delay_ms: (lo, hi),
            fetch_timeout,
            metrics_addr,
            log_json,
        })
    }
}

fn parse_or<F, T>(get: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy,
{
    match get(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "unparsable value, using default");
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_apply_when_only_required_vars_set() {
        let s = Settings::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "abc"),
            ("CHANNEL_ID", "123456789012345678"),
        ]))
        .unwrap();
        assert_eq!(s.channel_id, 123456789012345678);
        assert_eq!(s.port, DEFAULT_PORT);
        assert_eq!(s.poll_interval, Duration::from_secs(900));
        assert_eq!(s.max_entries_per_source, 10);
        assert_eq!(s.seen_links_path, PathBuf::from("posted_links.txt"));
        assert_eq!(s.delivery_delay_ms, (1_000, 3_000));
        assert!(s.feeds_config_path.is_none());
        assert!(!s.log_json);
    }

    #[test]
    fn missing_token_or_channel_is_an_error() {
        let err = Settings::from_lookup(lookup(&[("CHANNEL_ID", "1")])).unwrap_err();
        assert!(err.to_string().contains("DISCORD_TOKEN"));

        let err = Settings::from_lookup(lookup(&[("DISCORD_TOKEN", "t")])).unwrap_err();
        assert!(err.to_string().contains("CHANNEL_ID"));

        let err =
            Settings::from_lookup(lookup(&[("DISCORD_TOKEN", "t"), ("CHANNEL_ID", "  ")]))
                .unwrap_err();
        assert!(err.to_string().contains("CHANNEL_ID"));
    }

    #[test]
    fn non_numeric_channel_id_is_an_error() {
        let err = Settings::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "t"),
            ("CHANNEL_ID", "general"),
        ]))
        .unwrap_err();
        assert!(format!("{err:#}").contains("numeric"));
    }

    #[test]
    fn bad_optional_values_fall_back_and_delay_bounds_are_ordered() {
        let s = Settings::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "t"),
            ("CHANNEL_ID", "42"),
            ("PORT", "not-a-port"),
            ("DELIVERY_DELAY_MIN_MS", "500"),
            ("DELIVERY_DELAY_MAX_MS", "100"),
            ("LOG_FORMAT", "JSON"),
            ("METRICS_ADDR", "0.0.0.0:9000"),
        ]))
        .unwrap();
        assert_eq!(s.port, DEFAULT_PORT);
        assert_eq!(s.delivery_delay_ms, (100, 500));
        assert!(s.log_json);
        assert_eq!(s.metrics_addr, Some("0.0.0.0:9000".parse().unwrap()));
    }

    #[test]
    fn debug_output_redacts_token() {
        let s = Settings::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "super-secret-token"),
            ("CHANNEL_ID", "42"),
        ]))
        .unwrap();
        let dbg = format!("{s:?}");
        assert!(!dbg.contains("super-secret-token"));
        assert!(dbg.contains("discord_token_len"));
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Captured {
        type Writer = Captured;
        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn fallback_warnings_reach_an_installed_subscriber() {
        let out = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(out.clone())
            .with_ansi(false)
            .finish();
        let s = tracing::subscriber::with_default(subscriber, || {
            Settings::from_lookup(lookup(&[
                ("DISCORD_TOKEN", "abc"),
                ("CHANNEL_ID", "1"),
                ("POLL_INTERVAL_SECS", "soon"),
            ]))
        })
        .unwrap();
        assert_eq!(s.poll_interval, Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS));

        let logged = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("POLL_INTERVAL_SECS"), "{logged}");
        assert!(logged.contains("using default"), "{logged}");
    }

    #[test]
    fn json_logs_only_for_json() {
        assert!(Settings::json_logs(lookup(&[("LOG_FORMAT", " Json ")])));
        assert!(!Settings::json_logs(lookup(&[("LOG_FORMAT", "compact")])));
        assert!(!Settings::json_logs(lookup(&[])));
    }
}
