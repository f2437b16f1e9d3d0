pub mod discord;
pub mod format;
pub mod threads;

use anyhow::{anyhow, Result};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

pub use discord::DiscordClient;
pub use format::{Embed, Formatter};
pub use threads::{ThreadHandle, ThreadRouter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chat message: plain content, an optional rich embed and an optional
/// local image uploaded alongside it (referenced by the embed author icon).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub embed: Option<Embed>,
    pub icon: Option<PathBuf>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
pub trait ChatClient: Send + Sync {
    /// `false` when the channel does not resolve (deleted, wrong id, no access).
    async fn channel_exists(&self, channel: ChannelId) -> Result<bool>;

    async fn send_message(&self, channel: ChannelId, message: &OutgoingMessage)
        -> Result<MessageId>;

    /// Start a thread attached to `anchor`. Returns the thread's channel id.
    async fn start_thread(
        &self,
        channel: ChannelId,
        anchor: MessageId,
        name: &str,
        auto_archive_minutes: u32,
    ) -> Result<ChannelId>;
}

// --- Test helper ---

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub channel: ChannelId,
    pub id: MessageId,
    pub message: OutgoingMessage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedThread {
    pub channel: ChannelId,
    pub anchor: MessageId,
    pub name: String,
    pub auto_archive_minutes: u32,
    pub thread: ChannelId,
}

/// In-memory chat backend that records every call.
#[derive(Debug)]
pub struct RecordingChat {
    next_id: AtomicU64,
    pub sent: Mutex<Vec<SentMessage>>,
    pub threads: Mutex<Vec<StartedThread>>,
    pub fail_sends: AtomicBool,
    pub fail_threads: AtomicBool,
    pub channel_missing: AtomicBool,
    /// Number of upcoming channel lookups that fail with a transient error.
    pub lookup_failures: AtomicUsize,
    pub lookups: AtomicUsize,
}

impl Default for RecordingChat {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1_000),
            sent: Mutex::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            fail_threads: AtomicBool::new(false),
            channel_missing: AtomicBool::new(false),
            lookup_failures: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
        }
    }
}

impl RecordingChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn started_threads(&self) -> Vec<StartedThread> {
        self.threads.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, channel: ChannelId) -> Vec<SentMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.channel == channel)
            .collect()
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ChatClient for RecordingChat {
    async fn channel_exists(&self, channel: ChannelId) -> Result<bool> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .lookup_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(anyhow!("lookup of {channel} timed out"));
        }
        Ok(!self.channel_missing.load(Ordering::SeqCst))
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<MessageId> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(anyhow!("send to {channel} refused"));
        }
        let id = MessageId(self.next());
        self.sent
            .lock()
            .map_err(|_| anyhow!("recording lock poisoned"))?
            .push(SentMessage {
                channel,
                id,
                message: message.clone(),
            });
        Ok(id)
    }

    async fn start_thread(
        &self,
        channel: ChannelId,
        anchor: MessageId,
        name: &str,
        auto_archive_minutes: u32,
    ) -> Result<ChannelId> {
        if self.fail_threads.load(Ordering::SeqCst) {
            return Err(anyhow!("thread creation in {channel} refused"));
        }
        let thread = ChannelId(self.next());
        self.threads
            .lock()
            .map_err(|_| anyhow!("recording lock poisoned"))?
            .push(StartedThread {
                channel,
                anchor,
                name: name.to_string(),
                auto_archive_minutes,
                thread,
            });
        Ok(thread)
    }
}
