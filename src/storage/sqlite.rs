//! SQLite repositories backed by a shared `sqlx` pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use super::{Chat, ChatRepo, RepoError, User, UserRepo};

/// Embedded schema, applied by [`migrate`].
const SCHEMA: &str = include_str!("../../migrations/001_schema.sql");

/// Row type returned by SQLite queries for users.
type UserRow = (
    i64,
    i64,
    String,
    String,
    String,
    String,
    String,
    bool,
    DateTime<Utc>,
);

const USER_COLUMNS: &str = "id, tg_id, tg_username, tg_first_name, tg_last_name, \
                            tg_lang_code, lang_code, tg_is_bot, created_at";

/// Open a connection pool, creating the database file if needed.
///
/// # Errors
///
/// Returns [`RepoError::Database`] if the URL is invalid or the connection fails.
pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool, RepoError> {
    let opts: SqliteConnectOptions = url.parse()?;
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(opts.create_if_missing(true))
        .await?;
    Ok(pool)
}

/// Apply the embedded schema. Safe to run repeatedly.
///
/// # Errors
///
/// Returns [`RepoError::Database`] if a statement fails.
pub async fn migrate(pool: &SqlitePool) -> Result<(), RepoError> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    info!("database schema applied");
    Ok(())
}

fn user_from_row(row: UserRow) -> User {
    User {
        id: row.0,
        tg_id: row.1,
        tg_username: row.2,
        tg_first_name: row.3,
        tg_last_name: row.4,
        tg_lang_code: row.5,
        lang_code: row.6,
        tg_is_bot: row.7,
        created_at: row.8,
    }
}

/// [`UserRepo`] over the `users` table.
#[derive(Debug, Clone)]
pub struct SqliteUserRepo {
    db: SqlitePool,
}

impl SqliteUserRepo {
    /// Wrap a pool.
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    async fn fetch_one_by(&self, column: &str, value: i64) -> Result<User, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
        let row: UserRow = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await?
            .ok_or(RepoError::NotFound("user"))?;
        Ok(user_from_row(row))
    }
}

#[async_trait]
impl UserRepo for SqliteUserRepo {
    async fn exists(&self, user: &User) -> Result<bool, RepoError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM users WHERE tg_id = ?1")
            .bind(user.tg_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.is_some())
    }

    async fn create(&self, user: &mut User) -> Result<(), RepoError> {
        // A concurrent event from the same user may have inserted the row
        // since `exists` was checked; fold into an update then.
        let row: (i64, DateTime<Utc>) = sqlx::query_as(
            "INSERT INTO users (tg_id, tg_username, tg_first_name, tg_last_name, \
             tg_lang_code, lang_code, tg_is_bot, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(tg_id) DO UPDATE SET tg_username = excluded.tg_username, \
             tg_first_name = excluded.tg_first_name, tg_last_name = excluded.tg_last_name, \
             tg_lang_code = excluded.tg_lang_code, lang_code = excluded.lang_code, \
             tg_is_bot = excluded.tg_is_bot \
             RETURNING id, created_at",
        )
        .bind(user.tg_id)
        .bind(&user.tg_username)
        .bind(&user.tg_first_name)
        .bind(&user.tg_last_name)
        .bind(&user.tg_lang_code)
        .bind(&user.lang_code)
        .bind(user.tg_is_bot)
        .bind(user.created_at)
        .fetch_one(&self.db)
        .await?;
        user.id = row.0;
        user.created_at = row.1;
        Ok(())
    }

    async fn update(&self, user: &mut User) -> Result<(), RepoError> {
        let row: (i64, DateTime<Utc>) = sqlx::query_as(
            "UPDATE users SET tg_username = ?1, tg_first_name = ?2, tg_last_name = ?3, \
             tg_lang_code = ?4, lang_code = ?5, tg_is_bot = ?6 \
             WHERE tg_id = ?7 RETURNING id, created_at",
        )
        .bind(&user.tg_username)
        .bind(&user.tg_first_name)
        .bind(&user.tg_last_name)
        .bind(&user.tg_lang_code)
        .bind(&user.lang_code)
        .bind(user.tg_is_bot)
        .bind(user.tg_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(RepoError::NotFound("user"))?;
        user.id = row.0;
        user.created_at = row.1;
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> Result<User, RepoError> {
        self.fetch_one_by("id", id).await
    }

    async fn get_by_tg_id(&self, tg_id: i64) -> Result<User, RepoError> {
        self.fetch_one_by("tg_id", tg_id).await
    }
}

/// [`ChatRepo`] over the `tg_chats` table.
#[derive(Debug, Clone)]
pub struct SqliteChatRepo {
    db: SqlitePool,
}

impl SqliteChatRepo {
    /// Wrap a pool.
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ChatRepo for SqliteChatRepo {
    async fn exists_by_tg_id(&self, tg_id: i64) -> Result<bool, RepoError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM tg_chats WHERE tg_id = ?1")
            .bind(tg_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.is_some())
    }

    async fn create(&self, chat: &Chat) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO tg_chats (tg_id, user_id, created_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(tg_id) DO UPDATE SET user_id = excluded.user_id",
        )
            .bind(chat.tg_id)
            .bind(chat.user_id)
            .bind(chat.created_at)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn update(&self, chat: &Chat) -> Result<(), RepoError> {
        sqlx::query("UPDATE tg_chats SET user_id = ?1 WHERE tg_id = ?2")
            .bind(chat.user_id)
            .bind(chat.tg_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
