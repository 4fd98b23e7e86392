//! HTTPS client for the Telegram Bot API (`getUpdates`, `sendMessage`).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{BotError, MessageSink, StreamError, Update, UpdateSource};

/// Extra seconds added to the HTTP timeout beyond the long-poll timeout,
/// so the TCP socket stays open while Telegram holds the request.
const POLL_TIMEOUT_MARGIN_SECS: u64 = 10;

/// Generic Telegram Bot API response wrapper.
#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Bot API client shared by the poller and every handler task.
#[derive(Clone)]
pub struct BotClient {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl fmt::Debug for BotClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl BotClient {
    /// Create a client for `token` against `api_base` (normally
    /// `https://api.telegram.org`).
    pub fn new(api_base: &str, token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_owned(),
            token: token.to_owned(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token)
    }
}

#[async_trait]
impl UpdateSource for BotClient {
    async fn get_updates(&self, offset: i64, timeout_secs: u32) -> Result<Vec<Update>, StreamError> {
        let params = serde_json::json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });

        let http_timeout_secs = u64::from(timeout_secs).saturating_add(POLL_TIMEOUT_MARGIN_SECS);

        let response: TelegramResponse<Vec<Update>> = self
            .client
            .post(self.method_url("getUpdates"))
            .json(&params)
            .timeout(Duration::from_secs(http_timeout_secs))
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(StreamError::Api(
                response
                    .description
                    .unwrap_or_else(|| "unknown error".to_owned()),
            ));
        }

        Ok(response.result.unwrap_or_default())
    }
}

#[async_trait]
impl MessageSink for BotClient {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), BotError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });

        let response: TelegramResponse<serde_json::Value> = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(BotError::Api(
                response
                    .description
                    .unwrap_or_else(|| "sendMessage failed".to_owned()),
            ));
        }

        debug!(chat_id, "sent Telegram message");
        Ok(())
    }
}
