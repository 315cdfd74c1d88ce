//! Where board messages live.
//!
//! [`WebhookHost`] posts and edits an embed through a chat webhook.
//! [`MemoryHost`] keeps the latest render of each message in memory and is
//! used when no webhook is configured.

use std::{
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};

use dashmap::DashMap;
use reqwest::{StatusCode, header::HeaderMap};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::render::RenderedBoard;

pub type MessageId = String;

/// Longest wait honoured from a rate limited answer.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Rate limit budget reported alongside a delivered push.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportedRates {
    /// Seconds since the Unix epoch at which the budget resets.
    pub reset_epoch: f64,
    pub remaining: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PushResponse {
    Delivered { rates: Option<ReportedRates> },
    RateLimited { retry_after: Duration },
}

#[derive(Error, Debug)]
pub enum HostError {
    #[error("request to chat host failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("chat host answered with status {0}")]
    Status(u16),
    #[error("chat host did not return a message id")]
    MissingMessageId,
}

#[rocket::async_trait]
pub trait MessageHost: Send + Sync {
    async fn post(&self, board: &RenderedBoard) -> Result<MessageId, HostError>;
    async fn edit(&self, id: &str, board: &RenderedBoard) -> Result<PushResponse, HostError>;
    async fn delete(&self, id: &str) -> Result<(), HostError>;
}

#[derive(Serialize)]
struct EmbedFooter<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Embed<'a> {
    title: &'a str,
    description: &'a str,
    color: u32,
    footer: EmbedFooter<'a>,
}

#[derive(Serialize)]
struct AllowedMentions {
    parse: [&'static str; 0],
}

#[derive(Serialize)]
struct WebhookMessage<'a> {
    embeds: [Embed<'a>; 1],
    allowed_mentions: AllowedMentions,
}

impl<'a> From<&'a RenderedBoard> for WebhookMessage<'a> {
    fn from(board: &'a RenderedBoard) -> Self {
        Self {
            embeds: [Embed {
                title: &board.title,
                description: &board.description,
                color: board.color,
                footer: EmbedFooter {
                    text: &board.footer,
                },
            }],
            allowed_mentions: AllowedMentions { parse: [] },
        }
    }
}

#[derive(Deserialize)]
struct CreatedMessage {
    id: Option<String>,
}

#[derive(Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

pub struct WebhookHost {
    client: reqwest::Client,
    url: String,
}

impl WebhookHost {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into().trim_end_matches('/').to_string(),
        }
    }

    fn message_url(&self, id: &str) -> String {
        format!("{}/messages/{}", self.url, id)
    }
}

fn header<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

pub fn reported_rates(headers: &HeaderMap) -> Option<ReportedRates> {
    let reset_epoch: f64 = header(headers, "x-ratelimit-reset")?;
    let remaining = header(headers, "x-ratelimit-remaining")?;
    reset_epoch.is_finite().then_some(ReportedRates {
        reset_epoch,
        remaining,
    })
}

fn seconds(value: f64) -> Option<Duration> {
    (value >= 0.0).then(|| {
        Duration::try_from_secs_f64(value)
            .unwrap_or(MAX_RETRY_AFTER)
            .min(MAX_RETRY_AFTER)
    })
}

#[rocket::async_trait]
impl MessageHost for WebhookHost {
    #[instrument(level = "trace", skip(self, board))]
    async fn post(&self, board: &RenderedBoard) -> Result<MessageId, HostError> {
        let response = self
            .client
            .post(format!("{}?wait=true", self.url))
            .json(&WebhookMessage::from(board))
            .send()
            .await?;

        if !response.status().is_success() {
            warn!("Webhook rejected new board message: {}", response.status());
            return Err(HostError::Status(response.status().as_u16()));
        }

        let created: CreatedMessage = response.json().await?;
        let id = created.id.ok_or(HostError::MissingMessageId)?;
        info!("Posted board message {}", id);
        Ok(id)
    }

    #[instrument(level = "trace", skip(self, board))]
    async fn edit(&self, id: &str, board: &RenderedBoard) -> Result<PushResponse, HostError> {
        let response = self
            .client
            .patch(self.message_url(id))
            .json(&WebhookMessage::from(board))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let from_header = header::<f64>(response.headers(), "retry-after").and_then(seconds);
            let retry_after = match from_header {
                Some(delay) => delay,
                None => response
                    .json::<RateLimitBody>()
                    .await
                    .ok()
                    .and_then(|body| seconds(body.retry_after))
                    .unwrap_or(Duration::from_secs(1)),
            };
            debug!("Webhook rate limited edit of {} for {:?}", id, retry_after);
            return Ok(PushResponse::RateLimited { retry_after });
        }

        if !status.is_success() {
            return Err(HostError::Status(status.as_u16()));
        }

        Ok(PushResponse::Delivered {
            rates: reported_rates(response.headers()),
        })
    }

    #[instrument(level = "trace", skip(self))]
    async fn delete(&self, id: &str) -> Result<(), HostError> {
        let response = self.client.delete(self.message_url(id)).send().await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            info!("Deleted board message {}", id);
            Ok(())
        } else {
            Err(HostError::Status(status.as_u16()))
        }
    }
}

/// Keeps the latest render of every live message.
#[derive(Default)]
pub struct MemoryHost {
    next_id: AtomicU64,
    messages: DashMap<MessageId, RenderedBoard>,
    edits: AtomicUsize,
    throttled: AtomicUsize,
    retry_after_ms: AtomicU64,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(&self, id: &str) -> Option<RenderedBoard> {
        self.messages.get(id).map(|entry| entry.value().clone())
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Edits that were delivered, across all messages.
    pub fn edit_count(&self) -> usize {
        self.edits.load(Ordering::SeqCst)
    }

    /// Answers the next `count` edits as rate limited.
    pub fn throttle_next(&self, count: usize, retry_after: Duration) {
        self.retry_after_ms
            .store(retry_after.as_millis() as u64, Ordering::SeqCst);
        self.throttled.store(count, Ordering::SeqCst);
    }
}

#[rocket::async_trait]
impl MessageHost for MemoryHost {
    async fn post(&self, board: &RenderedBoard) -> Result<MessageId, HostError> {
        let id = (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        info!("Board message {}: {}", id, board.title);
        self.messages.insert(id.clone(), board.clone());
        Ok(id)
    }

    async fn edit(&self, id: &str, board: &RenderedBoard) -> Result<PushResponse, HostError> {
        let throttled = self
            .throttled
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if throttled {
            let retry_after = Duration::from_millis(self.retry_after_ms.load(Ordering::SeqCst));
            return Ok(PushResponse::RateLimited { retry_after });
        }

        let Some(mut message) = self.messages.get_mut(id) else {
            return Err(HostError::Status(404));
        };
        debug!("Board message {} now: {}", id, board.title);
        *message = board.clone();
        self.edits.fetch_add(1, Ordering::SeqCst);
        Ok(PushResponse::Delivered { rates: None })
    }

    async fn delete(&self, id: &str) -> Result<(), HostError> {
        self.messages.remove(id);
        Ok(())
    }
}
