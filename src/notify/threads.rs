// src/notify/threads.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::{ChannelId, ChatClient, MessageId, OutgoingMessage};

/// Threads archive after a day without activity.
pub const THREAD_AUTO_ARCHIVE_MINUTES: u32 = 1440;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadHandle {
    pub id: ChannelId,
    pub name: String,
}

pub fn thread_name(event: &str, now: DateTime<Utc>) -> String {
    format!("🎮 {event} – {}", now.format("%b %Y"))
}

pub fn announcement_text(event: &str) -> String {
    format!("🔥 **{event} announcements**")
}

/// One discussion thread per event for the lifetime of the process.
///
/// The first item for an event announces it in the main channel and opens a
/// thread on that message; later items reuse the cached handle. Nothing is
/// persisted, so a restart opens fresh threads.
pub struct ThreadRouter<C: ChatClient + ?Sized> {
    client: Arc<C>,
    main_channel: ChannelId,
    threads: HashMap<String, ThreadHandle>,
    /// Announcements whose thread could not be started yet.
    anchors: HashMap<String, MessageId>,
}

impl<C: ChatClient + ?Sized> ThreadRouter<C> {
    pub fn new(client: Arc<C>, main_channel: ChannelId) -> Self {
        Self {
            client,
            main_channel,
            threads: HashMap::new(),
            anchors: HashMap::new(),
        }
    }

    pub fn main_channel(&self) -> ChannelId {
        self.main_channel
    }

    pub fn thread(&self, event: &str) -> Option<&ThreadHandle> {
        self.threads.get(event)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Where a notification for `event` goes; no event means the main channel.
    pub async fn destination(&mut self, event: Option<&str>, now: DateTime<Utc>) -> Result<ChannelId> {
        match event {
            Some(ev) => Ok(self.thread_for(ev, now).await?.id),
            None => Ok(self.main_channel),
        }
    }

    /// Cached thread for `event`, creating it on first use. A failed creation
    /// caches no thread, so the next item for the event tries again on the
    /// announcement already posted.
    pub async fn thread_for(&mut self, event: &str, now: DateTime<Utc>) -> Result<&ThreadHandle> {
        if !self.threads.contains_key(event) {
            let handle = self.open_thread(event, now).await?;
            self.threads.insert(event.to_string(), handle);
        }
        self.threads
            .get(event)
            .context("event thread missing right after insert")
    }

    async fn open_thread(&mut self, event: &str, now: DateTime<Utc>) -> Result<ThreadHandle> {
        let anchor = match self.anchors.get(event) {
            Some(id) => *id,
            None => {
                let id = self
                    .client
                    .send_message(self.main_channel, &OutgoingMessage::text(announcement_text(event)))
                    .await
                    .with_context(|| format!("announcing {event} thread"))?;
                self.anchors.insert(event.to_string(), id);
                id
            }
        };
        let name = thread_name(event, now);
        let id = self
            .client
            .start_thread(self.main_channel, anchor, &name, THREAD_AUTO_ARCHIVE_MINUTES)
            .await
            .with_context(|| format!("creating thread `{name}`"))?;
        self.anchors.remove(event);
        counter!("event_threads_created_total").increment(1);
        info!(event, thread = %id, %name, "event thread created");
        Ok(ThreadHandle { id, name })
    }
}
