//! Pending deletions: messages that should be deleted at some point in the future.
//!
//! Rows are never updated. A row is created once a message is delivered, and removed
//! once a deletion of that message was attempted, regardless of how the attempt went.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use teloxide::types::{ChatId, MessageId};

use super::{Database, Error};
use crate::types::{MessageLocation, PendingDeletion, StoredDeletion};

/// Due times are kept as text with as many fractional digits as they need,
/// so they come back out exactly as they went in.
fn format_due_at(due_at: DateTime<Utc>) -> String {
    due_at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// 9999-12-31T23:59:59Z, the last second with a four digit year.
const LATEST_DUE_AT_SECS: i64 = 253_402_300_799;

/// Pull `due_at` into the range that survives [`format_due_at`] and [`parse_due_at`].
/// Anything past year 9999 is "never" anyway, and anything before 1970 is long overdue.
fn storable_due_at(due_at: DateTime<Utc>) -> DateTime<Utc> {
    match (
        DateTime::from_timestamp(0, 0),
        DateTime::from_timestamp(LATEST_DUE_AT_SECS, 999_999_999),
    ) {
        (Some(earliest), Some(latest)) => due_at.clamp(earliest, latest),
        _ => due_at,
    }
}

fn parse_due_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|x| x.with_timezone(&Utc))
}

fn stored_deletion_from_row(row: SqliteRow) -> StoredDeletion {
    let id: i64 = row.get("id");
    let location = MessageLocation::new(
        ChatId(row.get("chat_id")),
        MessageId(row.get("message_id")),
    );
    let raw_due_at = row.try_get::<String, _>("due_at").unwrap_or_default();

    match parse_due_at(&raw_due_at) {
        Some(due_at) => StoredDeletion::Pending(PendingDeletion {
            id,
            location,
            due_at,
        }),
        None => StoredDeletion::Malformed { id, raw_due_at },
    }
}

impl Database {
    /// Persist a new pending deletion and return it, with its freshly assigned ID.
    ///
    /// Due times that can't be stored are clamped; the returned deletion has
    /// the due time that was actually stored.
    pub async fn create_deletion(
        &self,
        location: MessageLocation,
        due_at: DateTime<Utc>,
    ) -> Result<PendingDeletion, Error> {
        let due_at = storable_due_at(due_at);
        let id = sqlx::query(
            "INSERT INTO pending_deletions(chat_id, message_id, due_at)
            VALUES (?, ?, ?);",
        )
        .bind(location.chat_id.0)
        .bind(location.message_id.0)
        .bind(format_due_at(due_at))
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(PendingDeletion {
            id,
            location,
            due_at,
        })
    }

    /// Forget about a pending deletion. Does nothing if it's already gone.
    pub async fn remove_deletion(&self, id: i64) -> Result<(), Error> {
        sqlx::query("DELETE FROM pending_deletions WHERE id=?;")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Every pending deletion currently stored, in order of creation.
    pub async fn list_pending_deletions(&self) -> Result<Vec<StoredDeletion>, Error> {
        sqlx::query("SELECT id, chat_id, message_id, due_at FROM pending_deletions ORDER BY id;")
            .map(stored_deletion_from_row)
            .fetch_all(&self.pool)
            .await
    }

    /// Insert a row with whatever text as its due time, bypassing validation.
    #[cfg(test)]
    pub(crate) async fn insert_raw_deletion(
        &self,
        location: MessageLocation,
        raw_due_at: &str,
    ) -> Result<i64, Error> {
        Ok(sqlx::query(
            "INSERT INTO pending_deletions(chat_id, message_id, due_at)
            VALUES (?, ?, ?);",
        )
        .bind(location.chat_id.0)
        .bind(location.message_id.0)
        .bind(raw_due_at)
        .execute(&self.pool)
        .await?
        .last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::{Datelike, TimeDelta};

    use super::*;
    use crate::database::tests::temp_database;

    fn location(message_id: i32) -> MessageLocation {
        MessageLocation::new(ChatId(123456), MessageId(message_id))
    }

    #[tokio::test]
    async fn create_then_list() {
        let (_dir, db) = temp_database().await;

        let due_at = Utc::now() + TimeDelta::seconds(30);
        let created = db.create_deletion(location(1), due_at).await.unwrap();

        let listed = db.list_pending_deletions().await.unwrap();
        assert_eq!(listed, vec![StoredDeletion::Pending(created)]);
        assert_eq!(created.location, location(1));
        assert_eq!(created.due_at, due_at);
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let (_dir, db) = temp_database().await;

        let due_at = Utc::now();
        let a = db.create_deletion(location(1), due_at).await.unwrap();
        let b = db.create_deletion(location(1), due_at).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(db.list_pending_deletions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn removing_twice_is_fine() {
        let (_dir, db) = temp_database().await;

        let created = db.create_deletion(location(1), Utc::now()).await.unwrap();
        let other = db.create_deletion(location(2), Utc::now()).await.unwrap();

        db.remove_deletion(created.id).await.unwrap();
        db.remove_deletion(created.id).await.unwrap();

        let listed = db.list_pending_deletions().await.unwrap();
        assert_eq!(listed, vec![StoredDeletion::Pending(other)]);
    }

    #[tokio::test]
    async fn malformed_due_time() {
        let (_dir, db) = temp_database().await;

        let id = db
            .insert_raw_deletion(location(3), "next tuesday-ish")
            .await
            .unwrap();

        let listed = db.list_pending_deletions().await.unwrap();
        assert_eq!(
            listed,
            vec![StoredDeletion::Malformed {
                id,
                raw_due_at: "next tuesday-ish".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn extreme_due_times_are_still_pending() {
        let (_dir, db) = temp_database().await;

        let latest = db
            .create_deletion(location(4), DateTime::<Utc>::MAX_UTC)
            .await
            .unwrap();
        assert_eq!(latest.due_at.year(), 9999);

        let earliest = db
            .create_deletion(location(5), DateTime::<Utc>::MIN_UTC)
            .await
            .unwrap();
        assert_eq!(earliest.due_at.timestamp(), 0);

        let listed = db.list_pending_deletions().await.unwrap();
        assert_eq!(
            listed,
            vec![
                StoredDeletion::Pending(latest),
                StoredDeletion::Pending(earliest)
            ]
        );
    }

    #[test]
    fn due_time_text_is_exact() {
        let due_at = Utc::now();
        assert_eq!(parse_due_at(&format_due_at(due_at)), Some(due_at));
        assert_eq!(
            parse_due_at("2025-01-02T03:04:05+03:00").unwrap(),
            "2025-01-02T00:04:05Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(parse_due_at(""), None);

        let latest = storable_due_at(DateTime::<Utc>::MAX_UTC);
        assert_eq!(parse_due_at(&format_due_at(latest)), Some(latest));
        assert_eq!(storable_due_at(due_at), due_at);
    }
}
