//! User and chat-link persistence.
//!
//! Handlers and HTTP endpoints see storage only through the [`UserRepo`] and
//! [`ChatRepo`] traits. [`sqlite`] provides the production implementation.
//! Implementations must be safe to share across concurrently running tasks.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::trace;

use crate::replies;

/// Errors from repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The requested record does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
}

/// A user as stored by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Row id, `0` until persisted.
    pub id: i64,
    /// Telegram user id.
    pub tg_id: i64,
    /// Telegram username (may be empty).
    pub tg_username: String,
    /// Telegram first name.
    pub tg_first_name: String,
    /// Telegram last name.
    pub tg_last_name: String,
    /// IETF language tag reported by Telegram.
    pub tg_lang_code: String,
    /// Reply language resolved from `tg_lang_code`.
    pub lang_code: String,
    /// Whether the account is a bot.
    pub tg_is_bot: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Build an unsaved user from Telegram profile fields.
    pub fn new(
        tg_id: i64,
        tg_username: &str,
        tg_first_name: &str,
        tg_last_name: &str,
        tg_lang_code: &str,
        tg_is_bot: bool,
    ) -> Self {
        Self {
            id: 0,
            tg_id,
            tg_username: tg_username.to_owned(),
            tg_first_name: tg_first_name.to_owned(),
            tg_last_name: tg_last_name.to_owned(),
            tg_lang_code: tg_lang_code.to_owned(),
            lang_code: replies::Lang::from_code(tg_lang_code).code().to_owned(),
            tg_is_bot,
            created_at: Utc::now(),
        }
    }
}

/// A Telegram chat linked to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    /// Telegram chat id.
    pub tg_id: i64,
    /// Owning user row id.
    pub user_id: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Chat {
    /// Build an unsaved chat link.
    pub fn new(tg_id: i64, user_id: i64) -> Self {
        Self {
            tg_id,
            user_id,
            created_at: Utc::now(),
        }
    }
}

/// User persistence.
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Whether a user with the same Telegram id exists.
    async fn exists(&self, user: &User) -> Result<bool, RepoError>;

    /// Insert the user and fill in its row id and creation time.
    ///
    /// Must not fail when the Telegram id was inserted concurrently; the
    /// existing row is refreshed instead.
    async fn create(&self, user: &mut User) -> Result<(), RepoError>;

    /// Update the profile fields by Telegram id and fill in the stored
    /// row id and creation time.
    async fn update(&self, user: &mut User) -> Result<(), RepoError>;

    /// Load a user by row id.
    async fn get_by_id(&self, id: i64) -> Result<User, RepoError>;

    /// Load a user by Telegram id.
    async fn get_by_tg_id(&self, tg_id: i64) -> Result<User, RepoError>;
}

/// Chat-link persistence.
#[async_trait]
pub trait ChatRepo: Send + Sync {
    /// Whether a chat with this Telegram id exists.
    async fn exists_by_tg_id(&self, tg_id: i64) -> Result<bool, RepoError>;

    /// Insert a chat link, re-pointing it if it was inserted concurrently.
    async fn create(&self, chat: &Chat) -> Result<(), RepoError>;

    /// Re-point an existing chat to `chat.user_id`.
    async fn update(&self, chat: &Chat) -> Result<(), RepoError>;
}

/// Create the user or refresh its profile if it already exists.
///
/// # Errors
///
/// Propagates any repository failure.
pub async fn save_user(repo: &dyn UserRepo, user: &mut User) -> Result<(), RepoError> {
    if repo.exists(user).await? {
        repo.update(user).await?;
    } else {
        repo.create(user).await?;
        trace!(user_id = user.id, tg_id = user.tg_id, "user created");
    }
    Ok(())
}

/// Create the chat link or re-point it to `user_id`.
///
/// # Errors
///
/// Propagates any repository failure.
pub async fn save_chat(repo: &dyn ChatRepo, tg_chat_id: i64, user_id: i64) -> Result<Chat, RepoError> {
    let chat = Chat::new(tg_chat_id, user_id);
    if repo.exists_by_tg_id(chat.tg_id).await? {
        repo.update(&chat).await?;
    } else {
        repo.create(&chat).await?;
        trace!(chat_id = chat.tg_id, user_id, "chat link created");
    }
    Ok(chat)
}
