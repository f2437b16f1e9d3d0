// src/ingest/providers/fixture.rs
//! Serves canned XML per source name. Used by tests and local dry runs.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::catalog::FeedSource;
use crate::ingest::feed::parse_feed;
use crate::ingest::types::{FeedFetcher, FeedItem};

#[derive(Default)]
pub struct FixtureFetcher {
    docs: Mutex<HashMap<String, String>>,
    pub calls: Mutex<Vec<String>>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(self, source: &str, xml: &str) -> Self {
        self.set_feed(source, xml);
        self
    }

    /// Replace the document served for `source` (between cycles in tests).
    pub fn set_feed(&self, source: &str, xml: &str) {
        if let Ok(mut docs) = self.docs.lock() {
            docs.insert(source.to_string(), xml.to_string());
        }
    }
}

#[async_trait]
impl FeedFetcher for FixtureFetcher {
    async fn fetch(&self, source: &FeedSource) -> Result<Vec<FeedItem>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(source.name.clone());
        }
        let xml = self
            .docs
            .lock()
            .map_err(|_| anyhow!("fixture lock poisoned"))?
            .get(&source.name)
            .cloned()
            .ok_or_else(|| anyhow!("no fixture for source {}", source.name))?;
        parse_feed(&xml)
    }
}
