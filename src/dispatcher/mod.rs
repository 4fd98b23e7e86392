//! Update dispatcher: admits inbound events into at most `max_handlers`
//! concurrently running handler tasks.
//!
//! One loop owns the active-slot set and reacts to three sources:
//!
//! - the shutdown signal, which switches the dispatcher to draining;
//! - completion reports from handler tasks, each freeing one slot;
//! - the update stream, read only while a slot is free.
//!
//! Updates are admitted in arrival order. While every slot is busy the
//! stream is not read at all, so Telegram's backlog waits upstream. On
//! shutdown the stream is abandoned and the loop waits for every in-flight
//! task to report before returning.

pub mod event;
mod poller;
pub mod slot;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::handler::{HandlerTask, Resources};
use crate::telegram::UpdateSource;

pub use self::event::{EventKind, InboundEvent};
pub use self::slot::{CompletionSink, SlotToken};

/// Capacity of the channel between the poller and the dispatch loop.
///
/// Must stay 1: the poller treats free capacity as "nothing left unadmitted"
/// before confirming an offset to Telegram.
const UPDATE_BUFFER: usize = 1;

/// Lifecycle of a dispatcher run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// Wiring the poller and channels.
    Starting,
    /// Admitting events.
    Running,
    /// Shutdown requested; waiting for in-flight handlers.
    Draining,
    /// Every admitted handler has completed.
    Stopped,
}

/// Dispatcher tuning.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherOptions {
    /// First update id to request.
    pub offset: i64,
    /// Long-poll timeout passed to Telegram.
    pub poll_timeout_secs: u32,
    /// Maximum number of concurrently running handler tasks.
    pub max_handlers: usize,
}

/// Counters reported once a run has stopped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Events that were given a slot.
    pub admitted: u64,
    /// Handler tasks that reported completion.
    pub completed: u64,
    /// Updates dropped without a slot because they carried nothing to handle.
    pub dropped: u64,
}

/// Admits updates into bounded-concurrency handler tasks.
pub struct Dispatcher {
    source: Arc<dyn UpdateSource>,
    resources: Resources,
    options: DispatcherOptions,
}

impl Dispatcher {
    /// Create a dispatcher reading from `source`. A `max_handlers` of zero is
    /// raised to one.
    pub fn new(source: Arc<dyn UpdateSource>, resources: Resources, mut options: DispatcherOptions) -> Self {
        if options.max_handlers == 0 {
            warn!("max_handlers must be at least 1, using 1");
            options.max_handlers = 1;
        }
        Self {
            source,
            resources,
            options,
        }
    }

    /// Run until `shutdown_rx` flips to `true` (or its sender is dropped),
    /// then wait for every admitted handler and return.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) -> DispatchSummary {
        let max = self.options.max_handlers;
        let mut state = DispatcherState::Starting;
        info!(?state, max_handlers = max, "dispatcher state");

        let (updates_tx, mut updates_rx) = mpsc::channel(UPDATE_BUFFER);
        let poller = tokio::spawn(poller::poll_updates(
            Arc::clone(&self.source),
            self.options.offset,
            self.options.poll_timeout_secs,
            updates_tx,
        ));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<SlotToken>();
        let mut active: HashSet<SlotToken> = HashSet::with_capacity(max);
        let mut summary = DispatchSummary::default();

        state = DispatcherState::Running;
        info!(?state, "dispatcher state");

        let mut stream_open = true;
        let mut cancelled = *shutdown_rx.borrow_and_update();
        while !cancelled {
            let has_free_slot = active.len() < max;
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    cancelled = changed.is_err() || *shutdown_rx.borrow_and_update();
                }

                Some(token) = done_rx.recv() => {
                    retire(&mut active, &token, &mut summary);
                }

                update = updates_rx.recv(), if has_free_slot && stream_open => {
                    // Only cancellation ends a run; a dead poller just stops admission.
                    let Some(update) = update else {
                        error!("update poller exited, no further events will be admitted");
                        stream_open = false;
                        continue;
                    };
                    let update_id = update.update_id;
                    let Some(event) = InboundEvent::from_update(update) else {
                        summary.dropped = summary.dropped.saturating_add(1);
                        debug!(update_id, "dropping update with nothing to handle");
                        continue;
                    };

                    let token = SlotToken::generate(&active);
                    active.insert(token.clone());
                    summary.admitted = summary.admitted.saturating_add(1);
                    debug!(update_id, %token, active = active.len(), "event admitted");

                    let span = info_span!("handler", token = %token, update_id);
                    let completion = CompletionSink::new(done_tx.clone(), token.clone());
                    let task = HandlerTask::new(token, self.resources.clone());
                    tokio::spawn(task.run(event, completion).instrument(span));
                }
            }
        }

        state = DispatcherState::Draining;
        info!(?state, in_flight = active.len(), "dispatcher state");

        // Abandon the stream: nothing further is admitted.
        drop(updates_rx);
        poller.abort();
        if let Err(e) = poller.await {
            if !e.is_cancelled() {
                warn!(error = %e, "update poller failed");
            }
        }

        while !active.is_empty() {
            match done_rx.recv().await {
                Some(token) => retire(&mut active, &token, &mut summary),
                None => break,
            }
        }

        state = DispatcherState::Stopped;
        info!(
            ?state,
            admitted = summary.admitted,
            completed = summary.completed,
            dropped = summary.dropped,
            "dispatcher state"
        );
        summary
    }
}

fn retire(active: &mut HashSet<SlotToken>, token: &SlotToken, summary: &mut DispatchSummary) {
    if active.remove(token) {
        summary.completed = summary.completed.saturating_add(1);
        debug!(%token, active = active.len(), "handler completed");
    } else {
        warn!(%token, "completion for unknown slot");
    }
}
