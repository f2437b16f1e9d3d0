use super::format::Embed;
use super::{ChannelId, ChatClient, MessageId, OutgoingMessage};
use anyhow::{bail, Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
const USER_AGENT: &str = concat!(
    "DiscordBot (https://github.com/gaming-announce-bot, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Bot-token client for the few REST routes the relay needs.
#[derive(Clone)]
pub struct DiscordClient {
    client: Client,
    token: String,
    api_base: String,
    max_attempts: u8,
}

impl DiscordClient {
    pub fn new(token: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("building discord http client")?;
        Ok(Self {
            client,
            token: token.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            max_attempts: 3,
        })
    }

    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_retries(mut self, attempts: u8) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Bot account name, for the startup log line.
    pub async fn current_user(&self) -> Result<String> {
        let rsp = self
            .execute("GET /users/@me", || Ok(self.client.get(self.url("/users/@me"))))
            .await?;
        let user: User = rsp.json().await.context("decoding /users/@me")?;
        Ok(match user.discriminator.as_deref() {
            Some(d) if d != "0" => format!("{}#{d}", user.username),
            _ => user.username,
        })
    }

    /// Sends the request, waiting out HTTP 429 responses up to `max_attempts`.
    /// Other failures are returned as-is; items are never re-sent here.
    async fn execute<F>(&self, what: &str, build: F) -> Result<Response>
    where
        F: Fn() -> Result<RequestBuilder>,
    {
        let rsp = self.send_rate_limited(what, build).await?;
        let status = rsp.status();
        if !status.is_success() {
            let body = rsp.text().await.unwrap_or_default();
            bail!("Discord {what} HTTP {status}; body: {}", truncate_body(&body));
        }
        Ok(rsp)
    }

    /// Response of the last attempt, whatever its status. Only 429 is retried.
    async fn send_rate_limited<F>(&self, what: &str, build: F) -> Result<Response>
    where
        F: Fn() -> Result<RequestBuilder>,
    {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let rsp = build()?
                .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
                .send()
                .await
                .with_context(|| format!("Discord {what} request failed"))?;

            if rsp.status() == StatusCode::TOO_MANY_REQUESTS && attempt < self.max_attempts {
                let wait = retry_after(rsp).await;
                tracing::warn!(what, attempt, wait_ms = wait.as_millis() as u64, "discord rate limited");
                tokio::time::sleep(wait).await;
                continue;
            }
            return Ok(rsp);
        }
    }
}

async fn retry_after(rsp: Response) -> Duration {
    let header_secs = rsp
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok());
    let body_secs = match rsp.json::<RateLimited>().await {
        Ok(r) => Some(r.retry_after),
        Err(_) => None,
    };
    let secs = body_secs.or(header_secs).unwrap_or(1.0).clamp(0.0, 60.0);
    Duration::from_secs_f64(secs)
}

fn truncate_body(body: &str) -> String {
    body.chars().take(300).collect()
}

#[derive(Deserialize)]
struct RateLimited {
    retry_after: f64,
}

#[derive(Deserialize)]
struct User {
    username: String,
    #[serde(default)]
    discriminator: Option<String>,
}

// Discord snowflakes arrive as strings.
#[derive(Deserialize)]
struct Snowflake {
    id: String,
}

impl Snowflake {
    fn parse(&self) -> Result<u64> {
        self.id
            .parse()
            .with_context(|| format!("invalid snowflake `{}`", self.id))
    }
}

#[derive(Serialize)]
struct AllowedMentions {
    parse: [&'static str; 0],
}

#[derive(Serialize)]
struct AttachmentRef {
    id: u32,
    filename: String,
}

#[derive(Serialize)]
struct MessagePayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentRef>,
    // Feed text must never ping anyone.
    allowed_mentions: AllowedMentions,
}

#[derive(Serialize)]
struct StartThreadPayload<'a> {
    name: &'a str,
    auto_archive_duration: u32,
}

struct Icon {
    filename: String,
    bytes: Vec<u8>,
    mime: &'static str,
}

async fn read_icon(path: &Path) -> Option<Icon> {
    let filename = path.file_name()?.to_string_lossy().to_string();
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(Icon {
            mime: mime_for(&filename),
            filename,
            bytes,
        }),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "icon unavailable, sending without it");
            None
        }
    }
}

fn mime_for(filename: &str) -> &'static str {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else if lower.ends_with(".gif") {
        "image/gif"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else {
        "application/octet-stream"
    }
}

fn build_payload<'a>(message: &'a OutgoingMessage, icon: Option<&Icon>) -> MessagePayload<'a> {
    let mut embeds: Vec<Embed> = message.embed.iter().cloned().collect();
    if icon.is_none() {
        // attachment:// refs to a file we could not read would render broken
        for e in &mut embeds {
            if let Some(author) = e.author.as_mut() {
                if author
                    .icon_url
                    .as_deref()
                    .is_some_and(|u| u.starts_with("attachment://"))
                {
                    author.icon_url = None;
                }
            }
        }
    }
    MessagePayload {
        content: message.content.as_deref(),
        embeds,
        attachments: icon
            .map(|i| {
                vec![AttachmentRef {
                    id: 0,
                    filename: i.filename.clone(),
                }]
            })
            .unwrap_or_default(),
        allowed_mentions: AllowedMentions { parse: [] },
    }
}

#[async_trait::async_trait]
impl ChatClient for DiscordClient {
    async fn channel_exists(&self, channel: ChannelId) -> Result<bool> {
        let url = self.url(&format!("/channels/{channel}"));
        let rsp = self
            .send_rate_limited("GET channel", || Ok(self.client.get(&url)))
            .await?;
        match rsp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(false),
            s => {
                let body = rsp.text().await.unwrap_or_default();
                bail!("Discord GET channel HTTP {s}; body: {}", truncate_body(&body))
            }
        }
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<MessageId> {
        let icon = match message.icon.as_deref() {
            Some(p) => read_icon(p).await,
            None => None,
        };
        let payload = build_payload(message, icon.as_ref());
        let url = self.url(&format!("/channels/{channel}/messages"));

        let rsp = match icon.as_ref() {
            None => {
                self.execute("POST message", || Ok(self.client.post(&url).json(&payload)))
                    .await?
            }
            Some(icon) => {
                let json = serde_json::to_string(&payload).context("encoding payload_json")?;
                self.execute("POST message+icon", || {
                    let part = Part::bytes(icon.bytes.clone())
                        .file_name(icon.filename.clone())
                        .mime_str(icon.mime)
                        .context("icon mime")?;
                    let form = Form::new()
                        .text("payload_json", json.clone())
                        .part("files[0]", part);
                    Ok(self.client.post(&url).multipart(form))
                })
                .await?
            }
        };
        let created: Snowflake = rsp.json().await.context("decoding created message")?;
        Ok(MessageId(created.parse()?))
    }

    async fn start_thread(
        &self,
        channel: ChannelId,
        anchor: MessageId,
        name: &str,
        auto_archive_minutes: u32,
    ) -> Result<ChannelId> {
        let url = self.url(&format!("/channels/{channel}/messages/{anchor}/threads"));
        // Discord caps thread names at 100 chars.
        let name: String = name.chars().take(100).collect();
        let payload = StartThreadPayload {
            name: &name,
            auto_archive_duration: auto_archive_minutes,
        };
        let rsp = self
            .execute("POST thread", || Ok(self.client.post(&url).json(&payload)))
            .await?;
        let thread: Snowflake = rsp.json().await.context("decoding created thread")?;
        Ok(ChannelId(thread.parse()?))
    }
}
