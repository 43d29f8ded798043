/// Notification delivery
///
/// Sends are best effort: failures are logged by the caller-facing helpers
/// and never retried.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::Telegram;
use crate::core::AccountId;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: AccountId, text: &str) -> Result<()>;
}

/// Awaited send that logs instead of failing
pub async fn notify(notifier: &dyn Notifier, recipient: AccountId, text: &str) {
    if let Err(e) = notifier.send(recipient, text).await {
        warn!(account = recipient, error = %e, "Notification failed");
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: AccountId,
    text: &'a str,
    parse_mode: &'static str,
    link_preview_options: LinkPreviewOptions,
}

#[derive(Debug, Serialize)]
struct LinkPreviewOptions {
    is_disabled: bool,
}

/// Telegram Bot API `sendMessage` in HTML parse mode
pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
}

impl TelegramNotifier {
    pub fn new(config: &Telegram, bot_token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.api_url.trim_end_matches('/'),
                bot_token
            ),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    #[instrument(skip(self, text))]
    async fn send(&self, recipient: AccountId, text: &str) -> Result<()> {
        let body = SendMessage {
            chat_id: recipient,
            text,
            parse_mode: "HTML",
            link_preview_options: LinkPreviewOptions { is_disabled: true },
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .context("Failed to reach Telegram")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Telegram sendMessage failed with status {}: {}", status, error_text);
        }
        Ok(())
    }
}

/// Writes notifications to the log when no bot token is configured
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: AccountId, text: &str) -> Result<()> {
        info!(account = recipient, text = %text, "📨 Notification");
        Ok(())
    }
}

/// Picks the Telegram notifier when a token is available
pub fn build_notifier(config: &Telegram) -> Result<Arc<dyn Notifier>> {
    match config.bot_token.as_deref().filter(|t| !t.trim().is_empty()) {
        Some(token) => Ok(Arc::new(TelegramNotifier::new(config, token)?)),
        None => {
            warn!("No Telegram bot token configured, notifications go to the log");
            Ok(Arc::new(LogNotifier))
        }
    }
}
