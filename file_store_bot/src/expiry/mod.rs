//! Deferred deletion of messages.
//!
//! The database is the source of truth on what is to be deleted and when.
//! [`ExpiryScheduler`] only keeps a timer per pending deletion, and those timers
//! can be rebuilt from the database at any point with [`ExpiryScheduler::recover`].

mod endpoint;
pub use endpoint::MessagingEndpoint;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::{task::JoinHandle, time::sleep};

use crate::{
    database::{self, Database},
    types::{MessageLocation, PendingDeletion, StoredDeletion},
};

type Timers = Mutex<HashMap<i64, JoinHandle<()>>>;

fn lock(timers: &Timers) -> MutexGuard<'_, HashMap<i64, JoinHandle<()>>> {
    // Nothing in there can be left half-modified by a panic.
    timers.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How long to wait from `now` until `due_at`. Zero if it's already due.
#[must_use]
pub fn delay_until(due_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (due_at - now).to_std().unwrap_or(Duration::ZERO)
}

/// Deletes messages through `M` once their pending deletions come due.
///
/// Every pending deletion gets exactly one delete attempt, after which it's
/// removed from the database whether the attempt worked or not.
/// There is no way to call off a deletion once it's scheduled.
///
/// Dropping this stops all timers. The deletions they were waiting on stay
/// in the database and are picked up by [`Self::recover`] next time.
pub struct ExpiryScheduler<M: MessagingEndpoint> {
    db: Arc<Database>,
    endpoint: M,
    timers: Arc<Timers>,
}

impl<M: MessagingEndpoint> ExpiryScheduler<M> {
    pub fn new(db: Arc<Database>, endpoint: M) -> Self {
        Self {
            db,
            endpoint,
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a timer for a deletion that is already in the database.
    /// Does not block; the deletion happens in the background.
    ///
    /// Returns `false` and does nothing if this deletion already has a timer running.
    pub fn arm(&self, deletion: PendingDeletion) -> bool {
        let mut timers = lock(&self.timers);

        if timers
            .get(&deletion.id)
            .is_some_and(|timer| !timer.is_finished())
        {
            log::warn!(
                "Deletion #{} of {} is already armed, not arming it again.",
                deletion.id,
                deletion.location
            );
            return false;
        }

        let delay = delay_until(deletion.due_at, Utc::now());
        log::debug!(
            "Arming deletion #{} of {} to fire in {:?}",
            deletion.id,
            deletion.location,
            delay
        );

        // The timer can't remove itself from the map before it's inserted,
        // as that needs the lock we're holding.
        let timer = tokio::spawn(delete_when_due(
            self.db.clone(),
            self.endpoint.clone(),
            Arc::downgrade(&self.timers),
            deletion,
            delay,
        ));
        timers.insert(deletion.id, timer);

        true
    }

    /// Re-arm timers for everything in the database. Meant to be called once
    /// on startup, before anything new is scheduled.
    ///
    /// Deletions that came due while the bot was down fire right away.
    /// Ones with an unreadable due time are dropped without firing.
    /// If the database can't be read, nothing is recovered.
    ///
    /// Returns how many timers were armed.
    pub async fn recover(&self) -> usize {
        let stored = match self.db.list_pending_deletions().await {
            Ok(stored) => stored,
            Err(e) => {
                log::error!("Failed to list pending deletions, recovering none of them: {e}");
                return 0;
            }
        };

        let mut armed = 0;

        for deletion in stored {
            match deletion {
                StoredDeletion::Pending(deletion) => {
                    if self.arm(deletion) {
                        armed += 1;
                    }
                }
                StoredDeletion::Malformed { id, raw_due_at } => {
                    log::warn!("Discarding deletion #{id} with unreadable due time {raw_due_at:?}");
                    if let Err(e) = self.db.remove_deletion(id).await {
                        log::error!("Failed to discard deletion #{id}: {e}");
                    }
                }
            }
        }

        armed
    }

    /// Have the message at this location deleted once `due_at` passes.
    ///
    /// Returns the ID of the new pending deletion.
    pub async fn schedule(
        &self,
        location: MessageLocation,
        due_at: DateTime<Utc>,
    ) -> Result<i64, database::Error> {
        let deletion = self.db.create_deletion(location, due_at).await?;
        self.arm(deletion);
        Ok(deletion.id)
    }

    /// Same as [`Self::schedule`], but `delay` from now.
    /// Delays too long to represent end up at the latest due time the database can store.
    pub async fn schedule_after(
        &self,
        location: MessageLocation,
        delay: Duration,
    ) -> Result<i64, database::Error> {
        let now = Utc::now();
        let due_at = TimeDelta::from_std(delay)
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.schedule(location, due_at).await
    }

    /// How many timers are currently waiting or firing.
    pub fn armed_count(&self) -> usize {
        lock(&self.timers)
            .values()
            .filter(|timer| !timer.is_finished())
            .count()
    }
}

impl<M: MessagingEndpoint> Drop for ExpiryScheduler<M> {
    fn drop(&mut self) {
        for (_, timer) in lock(&self.timers).drain() {
            timer.abort();
        }
    }
}

/// Body of a single timer.
async fn delete_when_due<M: MessagingEndpoint>(
    db: Arc<Database>,
    endpoint: M,
    timers: Weak<Timers>,
    deletion: PendingDeletion,
    delay: Duration,
) {
    sleep(delay).await;

    // Best effort. The message may be gone already, or we may have lost access to the chat.
    match endpoint.delete(deletion.location).await {
        Ok(()) => log::debug!("Deleted {} (deletion #{})", deletion.location, deletion.id),
        Err(e) => log::warn!(
            "Failed to delete {} (deletion #{}), giving up on it: {e}",
            deletion.location,
            deletion.id
        ),
    }

    if let Err(e) = db.remove_deletion(deletion.id).await {
        log::error!("Failed to remove deletion #{} from the database: {e}", deletion.id);
    }

    if let Some(timers) = timers.upgrade() {
        lock(&timers).remove(&deletion.id);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::collections::HashSet;

    use teloxide::{
        types::{ChatId, MessageId},
        ApiError, RequestError,
    };

    use super::*;
    use crate::database::tests::temp_database;

    /// Records every delete, and fails the ones it's told to.
    #[derive(Clone, Default)]
    struct RecordingEndpoint {
        deleted: Arc<Mutex<Vec<MessageLocation>>>,
        failing: Arc<Mutex<HashSet<MessageLocation>>>,
    }

    impl RecordingEndpoint {
        fn fail_for(&self, location: MessageLocation) {
            self.failing.lock().unwrap().insert(location);
        }
        fn deletes_of(&self, location: MessageLocation) -> usize {
            self.deleted
                .lock()
                .unwrap()
                .iter()
                .filter(|x| **x == location)
                .count()
        }
        fn total_deletes(&self) -> usize {
            self.deleted.lock().unwrap().len()
        }
    }

    impl MessagingEndpoint for RecordingEndpoint {
        async fn send_copy(
            &self,
            _from: MessageLocation,
            to: ChatId,
        ) -> Result<MessageLocation, RequestError> {
            Ok(MessageLocation::new(to, MessageId(1)))
        }

        async fn delete(&self, location: MessageLocation) -> Result<(), RequestError> {
            self.deleted.lock().unwrap().push(location);
            let fails = self.failing.lock().unwrap().contains(&location);
            match fails {
                true => Err(RequestError::Api(ApiError::MessageToDeleteNotFound)),
                false => Ok(()),
            }
        }
    }

    fn location(message_id: i32) -> MessageLocation {
        MessageLocation::new(ChatId(987654), MessageId(message_id))
    }

    async fn setup() -> (
        tempfile::TempDir,
        Arc<Database>,
        RecordingEndpoint,
        ExpiryScheduler<RecordingEndpoint>,
    ) {
        let (dir, db) = temp_database().await;
        let db = Arc::new(db);
        let endpoint = RecordingEndpoint::default();
        let scheduler = ExpiryScheduler::new(db.clone(), endpoint.clone());
        (dir, db, endpoint, scheduler)
    }

    /// Wait for up to a couple of seconds for the condition to become true.
    async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if condition() {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }
        condition()
    }

    #[test]
    fn delay_is_clamped_to_zero() {
        let now = Utc::now();
        assert_eq!(
            delay_until(now + TimeDelta::seconds(5), now),
            Duration::from_secs(5)
        );
        assert_eq!(delay_until(now, now), Duration::ZERO);
        assert_eq!(delay_until(now - TimeDelta::hours(3), now), Duration::ZERO);
    }

    #[tokio::test]
    async fn fires_once_after_due_time() {
        let (_dir, db, endpoint, scheduler) = setup().await;

        let id = scheduler
            .schedule(location(1), Utc::now() + TimeDelta::seconds(5))
            .await
            .unwrap();

        sleep(Duration::from_secs(4)).await;
        assert_eq!(endpoint.total_deletes(), 0);
        assert_eq!(db.list_pending_deletions().await.unwrap().len(), 1);
        assert_eq!(db.list_pending_deletions().await.unwrap()[0].id(), id);

        sleep(Duration::from_secs(2)).await;
        assert!(eventually(|| scheduler.armed_count() == 0).await);
        assert_eq!(endpoint.deletes_of(location(1)), 1);
        assert_eq!(endpoint.total_deletes(), 1);
        assert!(db.list_pending_deletions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn same_due_time_does_not_interfere() {
        let (_dir, db, endpoint, scheduler) = setup().await;

        let due_at = Utc::now() + TimeDelta::milliseconds(200);
        scheduler.schedule(location(1), due_at).await.unwrap();
        scheduler.schedule(location(2), due_at).await.unwrap();
        assert_eq!(scheduler.armed_count(), 2);

        assert!(eventually(|| scheduler.armed_count() == 0).await);
        assert_eq!(endpoint.deletes_of(location(1)), 1);
        assert_eq!(endpoint.deletes_of(location(2)), 1);
        assert!(db.list_pending_deletions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_delete_is_not_retried_and_still_removed() {
        let (_dir, db, endpoint, scheduler) = setup().await;
        endpoint.fail_for(location(3));

        scheduler
            .schedule_after(location(3), Duration::from_millis(50))
            .await
            .unwrap();

        assert!(eventually(|| scheduler.armed_count() == 0).await);
        assert!(db.list_pending_deletions().await.unwrap().is_empty());

        sleep(Duration::from_millis(300)).await;
        assert_eq!(endpoint.deletes_of(location(3)), 1);
    }

    #[tokio::test]
    async fn recovered_overdue_deletion_fires_right_away() {
        let (_dir, db, endpoint, scheduler) = setup().await;

        db.create_deletion(location(4), Utc::now() - TimeDelta::hours(1))
            .await
            .unwrap();

        assert_eq!(scheduler.recover().await, 1);
        assert!(eventually(|| endpoint.deletes_of(location(4)) == 1).await);
        assert!(eventually(|| scheduler.armed_count() == 0).await);
        assert!(db.list_pending_deletions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recovered_future_deletion_does_not_fire_early() {
        let (_dir, db, endpoint, scheduler) = setup().await;

        db.create_deletion(location(5), Utc::now() + TimeDelta::hours(1))
            .await
            .unwrap();

        assert_eq!(scheduler.recover().await, 1);
        sleep(Duration::from_millis(500)).await;
        assert_eq!(endpoint.total_deletes(), 0);
        assert_eq!(scheduler.armed_count(), 1);
        assert_eq!(db.list_pending_deletions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recovery_discards_malformed_deletions() {
        let (_dir, db, endpoint, scheduler) = setup().await;

        db.insert_raw_deletion(location(6), "whenever").await.unwrap();

        assert_eq!(scheduler.recover().await, 0);
        assert!(db.list_pending_deletions().await.unwrap().is_empty());
        sleep(Duration::from_millis(100)).await;
        assert_eq!(endpoint.total_deletes(), 0);
    }

    #[tokio::test]
    async fn recovering_twice_does_not_double_arm() {
        let (_dir, db, endpoint, scheduler) = setup().await;

        let deletion = db
            .create_deletion(location(7), Utc::now() + TimeDelta::milliseconds(300))
            .await
            .unwrap();

        assert_eq!(scheduler.recover().await, 1);
        assert_eq!(scheduler.recover().await, 0);
        assert!(!scheduler.arm(deletion));
        assert_eq!(scheduler.armed_count(), 1);

        assert!(eventually(|| scheduler.armed_count() == 0).await);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(endpoint.deletes_of(location(7)), 1);
    }

    #[tokio::test]
    async fn dropped_timers_are_recovered_later() {
        let (_dir, db, endpoint, scheduler) = setup().await;

        scheduler
            .schedule_after(location(8), Duration::from_millis(200))
            .await
            .unwrap();
        drop(scheduler);

        sleep(Duration::from_millis(400)).await;
        assert_eq!(endpoint.total_deletes(), 0);
        assert_eq!(db.list_pending_deletions().await.unwrap().len(), 1);

        // "Restart".
        let scheduler = ExpiryScheduler::new(db.clone(), endpoint.clone());
        assert_eq!(scheduler.recover().await, 1);
        assert!(eventually(|| scheduler.armed_count() == 0).await);
        assert_eq!(endpoint.deletes_of(location(8)), 1);
        assert!(db.list_pending_deletions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn very_long_delay_survives_a_restart() {
        let (_dir, db, endpoint, scheduler) = setup().await;

        let id = scheduler
            .schedule_after(location(9), Duration::from_secs(300_000_000_000))
            .await
            .unwrap();
        drop(scheduler);

        let listed = db.list_pending_deletions().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(matches!(
            listed[0],
            StoredDeletion::Pending(PendingDeletion { id: x, .. }) if x == id
        ));

        let scheduler = ExpiryScheduler::new(db.clone(), endpoint.clone());
        assert_eq!(scheduler.recover().await, 1);
        sleep(Duration::from_millis(200)).await;
        assert_eq!(scheduler.armed_count(), 1);
        assert_eq!(endpoint.total_deletes(), 0);
        assert_eq!(db.list_pending_deletions().await.unwrap().len(), 1);
    }
}
