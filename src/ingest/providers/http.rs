// src/ingest/providers/http.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::config::catalog::FeedSource;
use crate::ingest::feed::parse_feed;
use crate::ingest::types::{FeedFetcher, FeedItem};

const USER_AGENT: &str = concat!("gaming-announce-bot/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct HttpFeedFetcher {
    client: Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("building feed http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, source: &FeedSource) -> Result<Vec<FeedItem>> {
        let body = self
            .client
            .get(&source.url)
            .header(
                reqwest::header::ACCEPT,
                "application/rss+xml, application/atom+xml, application/xml;q=0.9, */*;q=0.8",
            )
            .send()
            .await
            .with_context(|| format!("{} http get()", source.name))?
            .error_for_status()
            .with_context(|| format!("{} non-2xx", source.name))?
            .text()
            .await
            .with_context(|| format!("{} http .text()", source.name))?;
        parse_feed(&body).with_context(|| format!("{} feed parse", source.name))
    }
}
