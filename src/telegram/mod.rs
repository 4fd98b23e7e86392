//! Telegram Bot API surface: update types, the inbound update source and
//! the outbound message sink.
//!
//! [`client::BotClient`] implements both traits over HTTPS. The dispatcher
//! and handlers depend only on the traits.

pub mod client;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub use client::BotClient;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure to fetch the next batch of updates.
///
/// Treated as transient: the poller backs off and retries.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The Bot API answered `ok: false`.
    #[error("Telegram API error: {0}")]
    Api(String),
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failure to deliver an outbound message.
#[derive(Debug, Error)]
pub enum BotError {
    /// The Bot API answered `ok: false`.
    #[error("Telegram API error: {0}")]
    Api(String),
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

// ---------------------------------------------------------------------------
// Telegram API types (minimal subset)
// ---------------------------------------------------------------------------

/// Telegram `Update` object.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Update {
    /// Monotonic update id; the next offset is `update_id + 1`.
    pub update_id: i64,
    /// New incoming message.
    pub message: Option<Message>,
    /// Inline keyboard button press.
    pub callback_query: Option<CallbackQuery>,
}

/// Telegram `Message` object (subset of fields we use).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Message {
    /// Message id within the chat.
    pub message_id: i64,
    /// Sender; absent for channel posts.
    pub from: Option<User>,
    /// Chat the message belongs to.
    pub chat: Chat,
    /// Text body.
    pub text: Option<String>,
}

/// Telegram `User` object.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct User {
    /// User id.
    pub id: i64,
    /// Whether the account is a bot.
    #[serde(default)]
    pub is_bot: bool,
    /// First name.
    #[serde(default)]
    pub first_name: String,
    /// Last name.
    #[serde(default)]
    pub last_name: String,
    /// Username without `@`.
    #[serde(default)]
    pub username: String,
    /// IETF language tag of the client.
    #[serde(default)]
    pub language_code: String,
}

/// Telegram `Chat` object.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Chat {
    /// Chat id.
    pub id: i64,
}

/// Telegram `CallbackQuery` object.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    /// Query id.
    pub id: String,
    /// User who pressed the button.
    pub from: User,
    /// Message the button was attached to.
    pub message: Option<Message>,
    /// Button payload.
    pub data: Option<String>,
}

impl Update {
    /// Whether the update carries a message or a callback query.
    pub fn is_actionable(&self) -> bool {
        self.message.is_some() || self.callback_query.is_some()
    }

    /// The user who caused the update.
    pub fn sender(&self) -> Option<&User> {
        if let Some(msg) = &self.message {
            return msg.from.as_ref();
        }
        self.callback_query.as_ref().map(|cb| &cb.from)
    }

    /// The chat the update originates from.
    pub fn chat(&self) -> Option<&Chat> {
        if let Some(msg) = &self.message {
            return Some(&msg.chat);
        }
        self.callback_query
            .as_ref()
            .and_then(|cb| cb.message.as_ref())
            .map(|m| &m.chat)
    }
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Long-poll source of updates.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Fetch updates with `update_id >= offset`, holding the request open
    /// for up to `timeout_secs` when none are pending.
    async fn get_updates(&self, offset: i64, timeout_secs: u32) -> Result<Vec<Update>, StreamError>;
}

/// Outbound message sink.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Send one plain-text message to a chat.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), BotError>;
}
