//! Concurrency slots: admission tokens and the completion guard.

use std::collections::HashSet;
use std::fmt;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::debug;

/// Length of a generated slot token.
const TOKEN_LEN: usize = 8;

/// Short random token identifying one admitted handler task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotToken(String);

impl SlotToken {
    /// Generate a token not present in `active`.
    pub fn generate(active: &HashSet<SlotToken>) -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let token: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(TOKEN_LEN)
                .map(char::from)
                .collect();
            let token = Self(token);
            if !active.contains(&token) {
                return token;
            }
        }
    }

    /// The token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reports a slot token back to the dispatcher when dropped.
///
/// Dropping happens on every exit path of a handler task, including
/// unwinding, so each admitted task frees its slot exactly once.
#[derive(Debug)]
pub struct CompletionSink {
    tx: mpsc::UnboundedSender<SlotToken>,
    token: SlotToken,
}

impl CompletionSink {
    /// Bind `token` to the dispatcher's completion channel.
    pub fn new(tx: mpsc::UnboundedSender<SlotToken>, token: SlotToken) -> Self {
        Self { tx, token }
    }

    /// The token that will be reported.
    pub fn token(&self) -> &SlotToken {
        &self.token
    }
}

impl Drop for CompletionSink {
    fn drop(&mut self) {
        if self.tx.send(self.token.clone()).is_err() {
            debug!(token = %self.token, "dispatcher gone, completion not delivered");
        }
    }
}
