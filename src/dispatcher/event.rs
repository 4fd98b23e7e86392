//! Inbound events admitted by the dispatcher.

use crate::telegram::{self, Update};

/// What kind of update produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A new message.
    Message,
    /// An inline keyboard button press.
    Callback,
}

/// An actionable update, reduced to what a handler needs.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Telegram update id.
    pub update_id: i64,
    /// Message or callback.
    pub kind: EventKind,
    /// Chat the event came from, if Telegram reported one.
    pub chat_id: Option<i64>,
    /// User who caused the event.
    pub sender: Option<telegram::User>,
}

impl InboundEvent {
    /// Reduce an update to an event. `None` for updates that carry neither a
    /// message nor a callback query.
    pub fn from_update(update: Update) -> Option<Self> {
        let kind = if update.message.is_some() {
            EventKind::Message
        } else if update.callback_query.is_some() {
            EventKind::Callback
        } else {
            return None;
        };

        Some(Self {
            update_id: update.update_id,
            kind,
            chat_id: update.chat().map(|c| c.id),
            sender: update.sender().cloned(),
        })
    }
}
