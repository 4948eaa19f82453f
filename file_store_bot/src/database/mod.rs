mod expiry;

use std::{path::Path, time::Duration};

use chrono::{DateTime, Utc};
pub use sqlx::Error;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Executor, Row, Sqlite,
};
use teloxide::types::{ChatId, MessageId, UserId};

use crate::types::{MessageLocation, ShareKey, StoredFile};

type Pool = sqlx::Pool<Sqlite>;

/// Name of the setting holding the auto-delete delay, in seconds.
const AUTO_DELETE_SETTING: &str = "auto_delete_secs";

/// Everything the bot keeps on disk: stored files, pending deletions and settings.
///
/// Meant to be opened once at startup and shared around in an `Arc`.
pub struct Database {
    pool: Pool,
}

impl Database {
    /// Open the database at this path, creating it and its tables if needed.
    pub async fn open(path: &Path) -> Result<Self, Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(32)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .pragma("cache_size", "-32768")
                    .busy_timeout(Duration::from_secs(600)),
            )
            .await?;

        // FILES:
        // file_key (unique primary key, string like "file_<hex>")
        // chat_id (i64, the storage channel)
        // message_id (i32 (because telegram bot api is just like that))
        // uploader_id (i64 because sqlite doesn't support u64; may be NULL)
        // title (caption of the upload; may be NULL)
        // created_at (date+time in UTC)
        pool.execute(sqlx::query(
            "CREATE TABLE IF NOT EXISTS files (
                file_key TEXT PRIMARY KEY NOT NULL,
                chat_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                uploader_id INTEGER NULL,
                title TEXT NULL,
                created_at TEXT NOT NULL
            ) STRICT;",
        ))
        .await?;

        // PENDING_DELETIONS:
        // id (key, i64)
        // chat_id (i64)
        // message_id (i32 (because telegram bot api is just like that))
        // due_at (date+time in UTC in RFC3339 format)
        pool.execute(sqlx::query(
            "CREATE TABLE IF NOT EXISTS pending_deletions (
                id INTEGER PRIMARY KEY NOT NULL,
                chat_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                due_at TEXT NOT NULL
            ) STRICT;",
        ))
        .await?;

        // SETTINGS:
        // name (unique primary key, string)
        // value (i64)
        pool.execute(sqlx::query(
            "CREATE TABLE IF NOT EXISTS settings (
                name TEXT PRIMARY KEY NOT NULL,
                value INTEGER NOT NULL
            ) STRICT;",
        ))
        .await?;

        Ok(Database { pool })
    }

    /// Close all connections. Should only be done once nothing uses the database anymore.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Remember a stored file under this key.
    #[allow(clippy::cast_possible_wrap)]
    pub async fn save_file(
        &self,
        key: &ShareKey,
        location: MessageLocation,
        uploader: Option<UserId>,
        title: Option<&str>,
    ) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO files(file_key, chat_id, message_id, uploader_id, title, created_at)
            VALUES (?, ?, ?, ?, ?, ?);",
        )
        .bind(key.as_str())
        .bind(location.chat_id.0)
        .bind(location.message_id.0)
        .bind(uploader.map(|x| x.0 as i64))
        .bind(title)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Look up a stored file by its key. Returns [`None`] if there's no such file.
    #[allow(clippy::cast_sign_loss)]
    pub async fn get_file(&self, key: &ShareKey) -> Result<Option<StoredFile>, Error> {
        sqlx::query(
            "SELECT chat_id, message_id, uploader_id, title, created_at
            FROM files WHERE file_key=?;",
        )
        .bind(key.as_str())
        .map(|row: SqliteRow| StoredFile {
            key: key.clone(),
            location: MessageLocation::new(ChatId(row.get(0)), MessageId(row.get(1))),
            uploader: row.get::<Option<i64>, _>(2).map(|x| UserId(x as u64)),
            title: row.get(3),
            created_at: row.get::<DateTime<Utc>, _>(4),
        })
        .fetch_optional(&self.pool)
        .await
    }

    /// Returns the auto-delete delay an admin has set, if one has been set at all.
    /// Inner [`None`] means an admin has disabled auto-deletion.
    #[allow(clippy::cast_sign_loss)]
    pub async fn get_auto_delete(&self) -> Result<Option<Option<Duration>>, Error> {
        let value: Option<i64> = sqlx::query("SELECT value FROM settings WHERE name=?;")
            .bind(AUTO_DELETE_SETTING)
            .map(|row: SqliteRow| row.get(0))
            .fetch_optional(&self.pool)
            .await?;

        Ok(value.map(|secs| match secs {
            secs if secs <= 0 => None,
            secs => Some(Duration::from_secs(secs as u64)),
        }))
    }

    /// Set the auto-delete delay. [`None`] disables auto-deletion.
    #[allow(clippy::cast_possible_wrap)]
    pub async fn set_auto_delete(&self, delay: Option<Duration>) -> Result<(), Error> {
        let secs = delay.map_or(0, |x| x.as_secs() as i64);
        sqlx::query(
            "INSERT INTO settings(name, value)
            VALUES (?, ?)
        ON CONFLICT DO
            UPDATE SET value=?;",
        )
        .bind(AUTO_DELETE_SETTING)
        .bind(secs)
        .bind(secs)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
