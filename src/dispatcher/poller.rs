//! Long-poll loop feeding the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::telegram::{Update, UpdateSource};

/// Initial retry delay after a failed poll.
const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Maximum retry delay.
const MAX_BACKOFF_MS: u64 = 30_000;

/// Pull updates from `source` and push them into `updates_tx` one at a time.
///
/// Requesting `offset` confirms every earlier update to Telegram, so the
/// next `get_updates` waits until the channel is empty again, i.e. until the
/// dispatcher has taken (admitted or dropped) everything sent so far. An
/// update still buffered at shutdown stays unconfirmed and is redelivered on
/// the next start. Returns when the receiver is dropped.
pub(crate) async fn poll_updates(
    source: Arc<dyn UpdateSource>,
    mut offset: i64,
    timeout_secs: u32,
    updates_tx: mpsc::Sender<Update>,
) {
    info!(offset, timeout_secs, "update poller started");
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        // Capacity returns only once the dispatcher has received the last
        // buffered update.
        match updates_tx.reserve().await {
            Ok(permit) => drop(permit),
            Err(_) => {
                info!("dispatcher stopped reading, update poller exiting");
                return;
            }
        }

        match source.get_updates(offset, timeout_secs).await {
            Ok(updates) => {
                backoff_ms = INITIAL_BACKOFF_MS;
                if !updates.is_empty() {
                    debug!(count = updates.len(), offset, "received updates");
                }
                for update in updates {
                    let next = update.update_id.saturating_add(1);
                    if updates_tx.send(update).await.is_err() {
                        info!("dispatcher stopped reading, update poller exiting");
                        return;
                    }
                    offset = offset.max(next);
                }
            }
            Err(e) => {
                warn!(error = %e, backoff_ms, "failed to fetch updates, retrying");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = backoff_ms.saturating_mul(2).min(MAX_BACKOFF_MS);
            }
        }
    }
}
