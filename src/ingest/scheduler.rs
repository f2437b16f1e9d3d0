// src/ingest/scheduler.rs
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{Catalog, FeedSource, Settings};
use crate::dedup::{DedupStore, SeenLinks};
use crate::events::EventClassifier;
use crate::ingest::types::{FeedFetcher, FeedItem};
use crate::ingest::{clean_html, normalize_link, recent_entries, resolve_link};
use crate::notify::{ChannelId, ChatClient, Formatter, OutgoingMessage, ThreadRouter};
use crate::relevance::{RelevanceFilter, Verdict};

#[derive(Clone, Copy, Debug)]
pub struct PollerCfg {
    pub interval: Duration,
    pub max_entries_per_source: usize,
    /// Inclusive bounds of the random pause between two deliveries.
    pub delivery_delay_ms: (u64, u64),
}

impl PollerCfg {
    pub fn from_settings(s: &Settings) -> Self {
        Self {
            interval: s.poll_interval,
            max_entries_per_source: s.max_entries_per_source,
            delivery_delay_ms: s.delivery_delay_ms,
        }
    }
}

/// Counts for one pass over every source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub sources_fetched: usize,
    pub sources_failed: usize,
    pub entries: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub accepted: usize,
    pub delivered: usize,
    pub delivery_failures: usize,
    pub persisted: bool,
}

const LOOKUP_ATTEMPTS: u8 = 5;
const LOOKUP_BACKOFF: Duration = Duration::from_secs(2);

/// Owns the seen-link set and the thread registry; one instance per process.
pub struct Poller<F, C: ChatClient + ?Sized> {
    catalog: Arc<Catalog>,
    fetcher: F,
    client: Arc<C>,
    router: ThreadRouter<C>,
    relevance: RelevanceFilter,
    events: EventClassifier,
    formatter: Formatter,
    store: DedupStore,
    seen: SeenLinks,
    /// Seen links not yet on disk.
    dirty: bool,
    cfg: PollerCfg,
    lookup_attempts: u8,
    lookup_backoff: Duration,
}

impl<F, C> Poller<F, C>
where
    F: FeedFetcher,
    C: ChatClient + ?Sized,
{
    pub fn new(
        catalog: Arc<Catalog>,
        fetcher: F,
        client: Arc<C>,
        channel: ChannelId,
        store: DedupStore,
        seen: SeenLinks,
        cfg: PollerCfg,
    ) -> Self {
        let relevance = RelevanceFilter::new(&catalog.keywords);
        let events = EventClassifier::new(&catalog.events);
        let formatter = Formatter::new(&catalog.keywords.include);
        Self {
            router: ThreadRouter::new(Arc::clone(&client), channel),
            catalog,
            fetcher,
            client,
            relevance,
            events,
            formatter,
            store,
            seen,
            dirty: false,
            cfg,
            lookup_attempts: LOOKUP_ATTEMPTS,
            lookup_backoff: LOOKUP_BACKOFF,
        }
    }

    /// Attempts and first backoff for the start-up channel lookup; the
    /// backoff doubles after every failed attempt.
    pub fn with_lookup_retry(mut self, attempts: u8, backoff: Duration) -> Self {
        self.lookup_attempts = attempts.max(1);
        self.lookup_backoff = backoff;
        self
    }

    pub fn seen(&self) -> &SeenLinks {
        &self.seen
    }

    pub fn router(&self) -> &ThreadRouter<C> {
        &self.router
    }

    /// Refuses to poll into a channel the bot cannot see. Lookup errors are
    /// retried with backoff; only a definite "not found" fails at once.
    pub async fn check_destination(&self) -> Result<()> {
        let channel = self.router.main_channel();
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            match self.client.channel_exists(channel).await {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    return Err(anyhow!("channel {channel} not found or not visible to the bot"))
                }
                Err(e) if attempt < self.lookup_attempts => {
                    let wait = self.lookup_backoff * (1u32 << (attempt - 1).min(10));
                    warn!(%channel, attempt, wait_ms = wait.as_millis() as u64, error = %format!("{e:#}"), "channel lookup failed, retrying");
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("looking up channel {channel} ({attempt} attempts)")
                    })
                }
            }
        }
    }

    /// Verify the destination, then poll until `shutdown` flips or its sender
    /// goes away. Unsaved seen links are flushed on the way out.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        tokio::select! {
            biased;
            _ = shutdown.changed() => return Ok(()),
            res = self.check_destination() => res?,
        }
        info!(
            channel = %self.router.main_channel(),
            sources = self.catalog.sources.len(),
            interval_secs = self.cfg.interval.as_secs(),
            "poller started"
        );
        while !*shutdown.borrow() {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                report = self.run_cycle() => info!(
                    fetched = report.sources_fetched,
                    failed = report.sources_failed,
                    accepted = report.accepted,
                    delivered = report.delivered,
                    duplicates = report.duplicates,
                    "poll cycle done"
                ),
            }
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.cfg.interval) => {}
            }
        }
        info!("poller stopping");
        self.flush().await
    }

    /// Writes the seen set if it changed since the last successful save.
    pub async fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.store.save(&self.seen).await?;
        self.dirty = false;
        Ok(())
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        self.run_cycle_at(Utc::now()).await
    }

    /// One pass over all sources, sequentially. `now` stamps embeds and names threads.
    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();
        let catalog = Arc::clone(&self.catalog);

        for source in &catalog.sources {
            let items = match self.fetcher.fetch(source).await {
                Ok(items) => items,
                Err(e) => {
                    report.sources_failed += 1;
                    counter!("feed_fetch_errors_total").increment(1);
                    warn!(source = %source.name, error = %format!("{e:#}"), "feed fetch failed, skipping");
                    continue;
                }
            };
            report.sources_fetched += 1;

            let items = recent_entries(items, self.cfg.max_entries_per_source);
            counter!("feed_entries_total").increment(items.len() as u64);
            for item in items {
                self.process_item(source, item, now, &mut report).await;
            }
        }

        if self.dirty {
            match self.flush().await {
                Ok(()) => report.persisted = true,
                Err(e) => {
                    counter!("seen_store_write_errors_total").increment(1);
                    warn!(path = %self.store.path().display(), error = %format!("{e:#}"), "could not persist seen links");
                }
            }
        }

        gauge!("poll_last_cycle_ts").set(Utc::now().timestamp() as f64);
        report
    }

    async fn process_item(
        &mut self,
        source: &FeedSource,
        item: FeedItem,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) {
        report.entries += 1;
        let Some(raw) = item.link.as_deref().map(str::trim).filter(|l| !l.is_empty()) else {
            debug!(source = %source.name, title = %item.title, "entry without link skipped");
            return;
        };
        let Some(absolute) = resolve_link(&source.url, raw) else {
            debug!(source = %source.name, link = raw, "entry link not resolvable, skipped");
            return;
        };
        let link = normalize_link(&absolute);
        if self.seen.contains(&link) {
            report.duplicates += 1;
            counter!("announcements_duplicate_total").increment(1);
            return;
        }

        let summary = clean_html(&item.summary);
        match self.relevance.verdict(&item.title, &summary) {
            Verdict::Included(keyword) => {
                debug!(source = %source.name, %link, %keyword, "entry accepted");
            }
            verdict => {
                report.rejected += 1;
                counter!("announcements_rejected_total").increment(1);
                debug!(source = %source.name, %link, ?verdict, "entry rejected");
                return;
            }
        }

        // Marked before delivery; a failed send is not retried.
        self.seen.insert(link.clone());
        self.dirty = true;
        report.accepted += 1;
        counter!("announcements_accepted_total").increment(1);

        let event = self
            .events
            .detect_event(&format!("{} {}", item.title, summary))
            .map(str::to_owned);
        let message = self
            .formatter
            .format(source, &item, &link, event.as_deref(), now);

        if report.delivered + report.delivery_failures > 0 {
            self.courtesy_pause().await;
        }

        match self.dispatch(event.as_deref(), &message, now).await {
            Ok(channel) => {
                report.delivered += 1;
                counter!("deliveries_total").increment(1);
                info!(source = %source.name, %link, event = event.as_deref().unwrap_or("-"), %channel, "announcement delivered");
            }
            Err(e) => {
                report.delivery_failures += 1;
                counter!("delivery_errors_total").increment(1);
                error!(source = %source.name, %link, error = %format!("{e:#}"), "announcement delivery failed");
            }
        }
    }

    async fn dispatch(
        &mut self,
        event: Option<&str>,
        message: &OutgoingMessage,
        now: DateTime<Utc>,
    ) -> Result<ChannelId> {
        let channel = self.router.destination(event, now).await?;
        self.client
            .send_message(channel, message)
            .await
            .with_context(|| format!("sending to {channel}"))?;
        Ok(channel)
    }

    async fn courtesy_pause(&self) {
        let (a, b) = self.cfg.delivery_delay_ms;
        let (lo, hi) = (a.min(b), a.max(b));
        if hi == 0 {
            return;
        }
        let ms = rand::rng().random_range(lo..=hi);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// Runs the poller on its own task. Errors end the task and are logged;
/// the liveness server is unaffected.
pub fn spawn_poller<F, C>(
    mut poller: Poller<F, C>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    F: FeedFetcher + 'static,
    C: ChatClient + ?Sized + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = poller.run(shutdown).await {
            error!(error = %format!("{e:#}"), "poller stopped");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cfg_follows_settings() {
        let s = Settings::from_lookup(|k| match k {
            "DISCORD_TOKEN" => Some("t".into()),
            "CHANNEL_ID" => Some("1".into()),
            "POLL_INTERVAL_SECS" => Some("60".into()),
            "DELIVERY_DELAY_MIN_MS" => Some("5".into()),
            "DELIVERY_DELAY_MAX_MS" => Some("7".into()),
            _ => None,
        })
        .unwrap();
        let cfg = PollerCfg::from_settings(&s);
        assert_eq!(cfg.interval, Duration::from_secs(60));
        assert_eq!(cfg.max_entries_per_source, 10);
        assert_eq!(cfg.delivery_delay_ms, (5, 7));
    }
}
