//! Service wiring: storage, the bot dispatcher and the Web App server under
//! one shutdown signal.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::Config;
use crate::dispatcher::{Dispatcher, DispatcherOptions};
use crate::handler::Resources;
use crate::http::{self, AppState};
use crate::storage::sqlite::{self, SqliteChatRepo, SqliteUserRepo};
use crate::storage::{ChatRepo, UserRepo};
use crate::telegram::{BotClient, MessageSink, UpdateSource};

/// Run the service until Ctrl-C, then drain in-flight work and return.
///
/// # Errors
///
/// Returns an error if storage cannot be opened or migrated, or if the web
/// server fails.
pub async fn run(config: Config) -> Result<()> {
    let pool = sqlite::connect(&config.database.url, config.database.max_connections)
        .await
        .context("failed to open database")?;
    sqlite::migrate(&pool)
        .await
        .context("failed to apply database schema")?;
    info!(url = %config.database.url, "database ready");

    let users: Arc<dyn UserRepo> = Arc::new(SqliteUserRepo::new(pool.clone()));
    let chats: Arc<dyn ChatRepo> = Arc::new(SqliteChatRepo::new(pool.clone()));
    let bot = Arc::new(BotClient::new(&config.telegram.api_base, config.bot_token()));
    let source: Arc<dyn UpdateSource> = bot.clone();
    let sink: Arc<dyn MessageSink> = bot;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatcher = Dispatcher::new(
        source,
        Resources {
            users: Arc::clone(&users),
            chats: Arc::clone(&chats),
            bot: sink,
        },
        DispatcherOptions {
            offset: config.telegram.updates_offset,
            poll_timeout_secs: config.telegram.updates_timeout_secs,
            max_handlers: config.dispatcher.max_event_handlers,
        },
    );
    let dispatcher_handle = tokio::spawn(dispatcher.run(shutdown_rx.clone()));

    let app = http::router(AppState { users, chats }, config.bot_token());
    let mut server_handle = tokio::spawn(http::serve(config.http.addr, app, shutdown_rx));

    info!("solidstreak started, press Ctrl-C to stop");
    let early_exit = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!(error = %e, "failed to listen for Ctrl-C");
            }
            info!("shutdown requested");
            None
        }
        // The server only returns on its own when it failed to start.
        res = &mut server_handle => Some(res),
    };
    let _ = shutdown_tx.send(true);

    let summary = dispatcher_handle.await.context("dispatcher task failed")?;
    info!(
        admitted = summary.admitted,
        completed = summary.completed,
        "bot dispatcher drained"
    );

    let served = match early_exit {
        Some(res) => res,
        None => server_handle.await,
    };
    pool.close().await;
    info!("solidstreak stopped");
    served.context("web server task failed")?
}
