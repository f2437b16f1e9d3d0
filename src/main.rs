//! Gaming announcement relay: binary entrypoint.
//! Boots the liveness server, then the feed poller, and runs until Ctrl-C.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::watch;

use gaming_announce_bot::{
    api,
    config::{Catalog, Settings},
    dedup::DedupStore,
    ingest::providers::HttpFeedFetcher,
    metrics::Metrics,
    notify::{ChannelId, DiscordClient},
    spawn_poller, Poller, PollerCfg,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gaming_announce_bot=info,warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();

    init_tracing(Settings::json_logs(|k| std::env::var(k).ok()));
    let settings = match Settings::from_env() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "configuration error");
            std::process::exit(1);
        }
    };
    tracing::info!(?settings, "settings loaded");

    if let Some(addr) = settings.metrics_addr {
        let metrics = Metrics::install()?;
        tokio::spawn(async move {
            if let Err(e) = metrics.serve(addr).await {
                tracing::warn!(error = %format!("{e:#}"), "metrics exporter stopped");
            }
        });
    }

    let catalog = Arc::new(Catalog::load(settings.feeds_config_path.as_deref())?);

    let port = settings.port;
    let mut liveness = tokio::spawn(async move { api::serve(port).await });

    let client = Arc::new(DiscordClient::new(
        &settings.discord_token,
        settings.fetch_timeout,
    )?);
    match client.current_user().await {
        Ok(name) => tracing::info!(bot = %name, "logged in"),
        Err(e) => tracing::warn!(error = %format!("{e:#}"), "could not fetch bot identity"),
    }

    let store = DedupStore::new(&settings.seen_links_path);
    let seen = store.load().await?;
    let fetcher = HttpFeedFetcher::new(settings.fetch_timeout)?;

    let poller = Poller::new(
        catalog,
        fetcher,
        client,
        ChannelId(settings.channel_id),
        store,
        seen,
        PollerCfg::from_settings(&settings),
    );
    let (shutdown, shutdown_rx) = watch::channel(false);
    let poller = spawn_poller(poller, shutdown_rx);

    let outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
            Ok(())
        }
        res = &mut liveness => match res {
            Ok(Ok(())) => Err(anyhow!("liveness server exited")),
            Ok(Err(e)) => Err(e.context("liveness server failed")),
            Err(e) => Err(anyhow!("liveness task panicked: {e}")),
        },
    };

    // Lets the poller write any seen links still pending.
    let _ = shutdown.send(true);
    if let Err(e) = poller.await {
        tracing::error!(error = %e, "poller task panicked");
    }
    outcome
}
