//! Fakes shared by the dispatcher and handler tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::{watch, Semaphore};

use solidstreak::dispatcher::{DispatchSummary, Dispatcher, DispatcherOptions};
use solidstreak::handler::Resources;
use solidstreak::storage::sqlite::{self, SqliteChatRepo, SqliteUserRepo};
use solidstreak::storage::{Chat, ChatRepo, RepoError, User, UserRepo};
use solidstreak::telegram::{self, BotError, MessageSink, StreamError, Update, UpdateSource};

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

/// A `/start` message from user `user_id` in chat `chat_id`.
pub fn message(update_id: i64, user_id: i64, chat_id: i64) -> Update {
    Update {
        update_id,
        message: Some(telegram::Message {
            message_id: update_id,
            from: Some(telegram::User {
                id: user_id,
                first_name: format!("user{user_id}"),
                username: format!("user{user_id}"),
                language_code: "en".to_owned(),
                ..telegram::User::default()
            }),
            chat: telegram::Chat { id: chat_id },
            text: Some("/start".to_owned()),
        }),
        ..Update::default()
    }
}

/// An update with neither a message nor a callback query.
pub fn empty(update_id: i64) -> Update {
    Update {
        update_id,
        ..Update::default()
    }
}

// ---------------------------------------------------------------------------
// Update source
// ---------------------------------------------------------------------------

/// Serves scripted batches, then holds the long poll open forever.
pub struct ScriptedSource {
    batches: Mutex<VecDeque<Vec<Update>>>,
    offsets: Mutex<Vec<i64>>,
}

impl ScriptedSource {
    pub fn new(batches: Vec<Vec<Update>>) -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(batches.into()),
            offsets: Mutex::new(Vec::new()),
        })
    }

    /// Offsets requested so far.
    pub fn offsets(&self) -> Vec<i64> {
        self.offsets.lock().expect("lock").clone()
    }
}

#[async_trait]
impl UpdateSource for ScriptedSource {
    async fn get_updates(&self, offset: i64, _timeout_secs: u32) -> Result<Vec<Update>, StreamError> {
        self.offsets.lock().expect("lock").push(offset);
        let next = self.batches.lock().expect("lock").pop_front();
        match next {
            Some(batch) => Ok(batch),
            None => std::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// Message sinks
// ---------------------------------------------------------------------------

/// Records sends; each send waits for a permit, so tests decide when
/// handlers finish.
pub struct GatedSink {
    gate: Semaphore,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    entered: Mutex<Vec<i64>>,
    sent: Mutex<Vec<(i64, String)>>,
}

impl GatedSink {
    /// Every send blocks until [`GatedSink::release`].
    pub fn closed() -> Arc<Self> {
        Self::with_permits(0)
    }

    /// Sends never block.
    pub fn open() -> Arc<Self> {
        Self::with_permits(Semaphore::MAX_PERMITS)
    }

    fn with_permits(permits: usize) -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(permits),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            entered: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Let `n` blocked sends finish.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Chats whose send has started, in order.
    pub fn entered(&self) -> Vec<i64> {
        self.entered.lock().expect("lock").clone()
    }

    /// Completed sends, in order.
    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().expect("lock").clone()
    }

    /// Highest number of sends in progress at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageSink for GatedSink {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), BotError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.entered.lock().expect("lock").push(chat_id);

        self.gate.acquire().await.expect("gate open").forget();

        self.sent.lock().expect("lock").push((chat_id, text.to_owned()));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Panics on greetings to `panic_chat`; records every other send.
pub struct PanickySink {
    panic_chat: i64,
    sent: Mutex<Vec<(i64, String)>>,
}

impl PanickySink {
    pub fn new(panic_chat: i64) -> Arc<Self> {
        Arc::new(Self {
            panic_chat,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().expect("lock").clone()
    }
}

#[async_trait]
impl MessageSink for PanickySink {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), BotError> {
        if chat_id == self.panic_chat && text.starts_with("Hello") {
            panic!("sink exploded for chat {chat_id}");
        }
        self.sent.lock().expect("lock").push((chat_id, text.to_owned()));
        Ok(())
    }
}

/// Fails every send.
pub struct FailingSink {
    attempts: Mutex<Vec<(i64, String)>>,
}

impl FailingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            attempts: Mutex::new(Vec::new()),
        })
    }

    pub fn attempts(&self) -> Vec<(i64, String)> {
        self.attempts.lock().expect("lock").clone()
    }
}

#[async_trait]
impl MessageSink for FailingSink {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), BotError> {
        self.attempts
            .lock()
            .expect("lock")
            .push((chat_id, text.to_owned()));
        Err(BotError::Api("Forbidden: bot was blocked by the user".to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

/// SQLite repositories over a fresh in-memory database.
pub async fn sqlite_repos() -> (Arc<dyn UserRepo>, Arc<dyn ChatRepo>) {
    let opts = SqliteConnectOptions::new()
        .filename(":memory:")
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .expect("pool should connect");
    sqlite::migrate(&pool).await.expect("schema should apply");
    (
        Arc::new(SqliteUserRepo::new(pool.clone())),
        Arc::new(SqliteChatRepo::new(pool)),
    )
}

/// User repository whose every call fails.
pub struct BrokenUserRepo;

#[async_trait]
impl UserRepo for BrokenUserRepo {
    async fn exists(&self, _user: &User) -> Result<bool, RepoError> {
        Err(RepoError::Database(sqlx::Error::PoolClosed))
    }

    async fn create(&self, _user: &mut User) -> Result<(), RepoError> {
        Err(RepoError::Database(sqlx::Error::PoolClosed))
    }

    async fn update(&self, _user: &mut User) -> Result<(), RepoError> {
        Err(RepoError::Database(sqlx::Error::PoolClosed))
    }

    async fn get_by_id(&self, _id: i64) -> Result<User, RepoError> {
        Err(RepoError::Database(sqlx::Error::PoolClosed))
    }

    async fn get_by_tg_id(&self, _tg_id: i64) -> Result<User, RepoError> {
        Err(RepoError::Database(sqlx::Error::PoolClosed))
    }
}

/// Chat repository whose every call fails.
pub struct BrokenChatRepo;

#[async_trait]
impl ChatRepo for BrokenChatRepo {
    async fn exists_by_tg_id(&self, _tg_id: i64) -> Result<bool, RepoError> {
        Err(RepoError::Database(sqlx::Error::PoolClosed))
    }

    async fn create(&self, _chat: &Chat) -> Result<(), RepoError> {
        Err(RepoError::Database(sqlx::Error::PoolClosed))
    }

    async fn update(&self, _chat: &Chat) -> Result<(), RepoError> {
        Err(RepoError::Database(sqlx::Error::PoolClosed))
    }
}

pub async fn resources(bot: Arc<dyn MessageSink>) -> Resources {
    let (users, chats) = sqlite_repos().await;
    Resources { users, chats, bot }
}

// ---------------------------------------------------------------------------
// Running
// ---------------------------------------------------------------------------

/// A dispatcher run in the background with its shutdown switch.
pub struct Running {
    pub shutdown_tx: watch::Sender<bool>,
    pub handle: tokio::task::JoinHandle<DispatchSummary>,
}

impl Running {
    /// Request shutdown and wait for the summary.
    pub async fn stop(self) -> DispatchSummary {
        self.shutdown_tx.send(true).expect("dispatcher listening");
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("dispatcher should stop")
            .expect("dispatcher should not panic")
    }
}

pub fn spawn_dispatcher(
    source: Arc<dyn UpdateSource>,
    resources: Resources,
    max_handlers: usize,
) -> Running {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = Dispatcher::new(
        source,
        resources,
        DispatcherOptions {
            offset: 0,
            poll_timeout_secs: 60,
            max_handlers,
        },
    );
    Running {
        shutdown_tx,
        handle: tokio::spawn(dispatcher.run(shutdown_rx)),
    }
}

/// Poll `cond` until it holds, failing after two seconds.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Let spawned tasks make progress for a short while.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Run `fut` with a five second limit.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("should finish in time")
}
