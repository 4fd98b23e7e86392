//! Per-event handler task.
//!
//! A task registers the sender, links the chat and greets the user in their
//! language. Any failure, panics included, is logged and answered with a
//! single "something went wrong" message when the chat is already known.
//! The slot is released through [`CompletionSink`] on every exit path.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{debug, error, warn};

use crate::dispatcher::{CompletionSink, InboundEvent, SlotToken};
use crate::replies::{self, Lang};
use crate::storage::{self, ChatRepo, RepoError, User, UserRepo};
use crate::telegram::{BotError, MessageSink};

/// Shared dependencies handed to every handler task.
#[derive(Clone)]
pub struct Resources {
    /// User records.
    pub users: Arc<dyn UserRepo>,
    /// Chat-link records.
    pub chats: Arc<dyn ChatRepo>,
    /// Outbound messages.
    pub bot: Arc<dyn MessageSink>,
}

/// Why a handler task did not finish normally.
#[derive(Debug, thiserror::Error)]
pub enum HandlerFault {
    /// The event has no sender.
    #[error("event has no sender")]
    MissingSender,

    /// The event has no chat to reply to.
    #[error("event has no chat")]
    MissingChat,

    /// A repository call failed.
    #[error("storage: {0}")]
    Storage(#[from] RepoError),

    /// The reply could not be sent.
    #[error("reply: {0}")]
    Reply(#[from] BotError),

    /// Processing panicked.
    #[error("panic: {0}")]
    Panic(String),
}

/// What processing learned before it stopped.
#[derive(Debug, Default)]
struct Progress {
    chat_id: Option<i64>,
    lang: Lang,
}

/// One admitted handler task.
pub struct HandlerTask {
    token: SlotToken,
    resources: Resources,
}

impl HandlerTask {
    /// Create a task for the slot `token`.
    pub fn new(token: SlotToken, resources: Resources) -> Self {
        Self { token, resources }
    }

    /// Process `event`, then report completion.
    ///
    /// Never fails and never unwinds past this call: faults are logged and
    /// answered with at most one fallback reply.
    pub async fn run(self, event: InboundEvent, completion: CompletionSink) {
        let _completion = completion;
        let mut progress = Progress::default();

        let outcome = AssertUnwindSafe(self.process(&event, &mut progress))
            .catch_unwind()
            .await;
        let fault = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(payload) => Some(HandlerFault::Panic(crate::panic_message(payload.as_ref()))),
        };

        if let Some(fault) = fault {
            error!(
                token = %self.token,
                update_id = event.update_id,
                error = %fault,
                "event handler failed"
            );
            if let Some(chat_id) = progress.chat_id {
                self.send_fallback(chat_id, progress.lang).await;
            }
        }

        debug!(token = %self.token, "event handler finished");
    }

    async fn process(&self, event: &InboundEvent, progress: &mut Progress) -> Result<(), HandlerFault> {
        let sender = event.sender.as_ref().ok_or(HandlerFault::MissingSender)?;

        let mut user = User::new(
            sender.id,
            &sender.username,
            &sender.first_name,
            &sender.last_name,
            &sender.language_code,
            sender.is_bot,
        );
        storage::save_user(self.resources.users.as_ref(), &mut user).await?;
        progress.lang = Lang::from_code(&user.lang_code);
        debug!(user_id = user.id, tg_id = user.tg_id, "user saved");

        let chat_id = event.chat_id.ok_or(HandlerFault::MissingChat)?;
        progress.chat_id = Some(chat_id);
        storage::save_chat(self.resources.chats.as_ref(), chat_id, user.id).await?;
        debug!(chat_id, "chat saved");

        let name = if user.tg_username.is_empty() {
            &user.tg_first_name
        } else {
            &user.tg_username
        };
        self.resources
            .bot
            .send_message(chat_id, &replies::hello(progress.lang, name))
            .await?;
        Ok(())
    }

    /// Best-effort apology; its own failures are logged and dropped.
    async fn send_fallback(&self, chat_id: i64, lang: Lang) {
        let send = self
            .resources
            .bot
            .send_message(chat_id, replies::something_wrong(lang));
        match AssertUnwindSafe(send).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(chat_id, error = %e, "failed to send fallback reply"),
            Err(payload) => warn!(
                chat_id,
                panic = %crate::panic_message(payload.as_ref()),
                "fallback reply panicked"
            ),
        }
    }
}
