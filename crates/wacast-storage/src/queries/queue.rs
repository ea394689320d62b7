// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue operations for crash-safe batch processing.
//!
//! Every entry carries an idempotency key; enqueueing the same key twice is
//! a no-op, so a retried dispatch request never schedules a batch twice.
//! The optional group key (the campaign id) lets the orchestrator ask
//! whether any batch for a campaign is still outstanding. An entry with
//! `available_at` stays pending until that instant; throttle retries use
//! it to wait out the sender's cooldown.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use wacast_core::{QueueEntry, WacastError, format_timestamp};

use crate::database::{Database, map_tr_err};

/// Enqueue a new item. Returns the new entry ID, or `None` when the key is taken.
pub async fn enqueue(
    db: &Database,
    queue_name: &str,
    idempotency_key: &str,
    group_key: Option<&str>,
    payload: &str,
    not_before: Option<DateTime<Utc>>,
) -> Result<Option<i64>, WacastError> {
    let queue_name = queue_name.to_string();
    let key = idempotency_key.to_string();
    let group_key = group_key.map(str::to_string);
    let payload = payload.to_string();
    let available_at = not_before.map(format_timestamp);
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO queue
                     (queue_name, idempotency_key, group_key, payload, available_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![queue_name, key, group_key, payload, available_at],
            )?;
            Ok((inserted == 1).then(|| conn.last_insert_rowid()))
        })
        .await
        .map_err(map_tr_err)
}

/// Dequeue the next pending entry from the named queue.
///
/// Atomically selects the oldest pending entry whose `available_at` has
/// passed and marks it as "processing" with a lock of `lock_secs`. Returns
/// `None` if nothing is due.
pub async fn dequeue(
    db: &Database,
    queue_name: &str,
    lock_secs: u64,
) -> Result<Option<QueueEntry>, WacastError> {
    let queue_name = queue_name.to_string();
    let lock = format!("+{lock_secs} seconds");
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let entry = tx
                .query_row(
                    "SELECT id, queue_name, idempotency_key, group_key, payload, status, attempts,
                            max_attempts, created_at, updated_at, locked_until, available_at
                     FROM queue
                     WHERE queue_name = ?1 AND status = 'pending'
                       AND (available_at IS NULL
                            OR available_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                     ORDER BY id ASC
                     LIMIT 1",
                    params![queue_name],
                    |row| {
                        Ok(QueueEntry {
                            id: row.get(0)?,
                            queue_name: row.get(1)?,
                            idempotency_key: row.get(2)?,
                            group_key: row.get(3)?,
                            payload: row.get(4)?,
                            status: row.get(5)?,
                            attempts: row.get(6)?,
                            max_attempts: row.get(7)?,
                            created_at: row.get(8)?,
                            updated_at: row.get(9)?,
                            locked_until: row.get(10)?,
                            available_at: row.get(11)?,
                        })
                    },
                )
                .optional()?;

            let Some(entry) = entry else {
                tx.commit()?;
                return Ok(None);
            };

            let locked_until: String = tx.query_row(
                "UPDATE queue SET status = 'processing',
                     locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?2),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1
                 RETURNING locked_until",
                params![entry.id, lock],
                |row| row.get(0),
            )?;
            tx.commit()?;

            Ok(Some(QueueEntry {
                status: "processing".to_string(),
                locked_until: Some(locked_until),
                ..entry
            }))
        })
        .await
        .map_err(map_tr_err)
}

/// Acknowledge successful processing of a queue entry.
pub async fn ack(db: &Database, id: i64) -> Result<(), WacastError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE queue SET status = 'completed', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a queue entry as failed.
///
/// Increments attempts. If attempts >= max_attempts, sets status to "failed".
/// Otherwise resets to "pending" for retry and clears the lock.
pub async fn fail(db: &Database, id: i64) -> Result<(), WacastError> {
    db.connection()
        .call(move |conn| {
            let (attempts, max_attempts): (i32, i32) = conn.query_row(
                "SELECT attempts, max_attempts FROM queue WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let new_attempts = attempts + 1;
            let status = if new_attempts >= max_attempts {
                "failed"
            } else {
                "pending"
            };
            conn.execute(
                "UPDATE queue SET status = ?1, attempts = ?2, locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?3",
                params![status, new_attempts, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Entries for `group_key` that are still pending or processing.
pub async fn count_outstanding(db: &Database, group_key: &str) -> Result<i64, WacastError> {
    let group_key = group_key.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM queue
                 WHERE group_key = ?1 AND status IN ('pending', 'processing')",
                params![group_key],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Return processing entries whose lock has lapsed to pending.
///
/// A worker that crashed mid-batch leaves its entry locked; this is how
/// the batch gets picked up again.
pub async fn requeue_expired(db: &Database, queue_name: &str) -> Result<usize, WacastError> {
    let queue_name = queue_name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE queue SET status = 'pending', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE queue_name = ?1 AND status = 'processing'
                   AND locked_until < strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![queue_name],
            )
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::setup_db;

    async fn status_of(db: &Database, id: i64) -> (String, i32) {
        db.connection()
            .call(move |conn| -> Result<(String, i32), rusqlite::Error> {
                conn.query_row(
                    "SELECT status, attempts FROM queue WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn enqueue_and_dequeue_lifecycle() {
        let (db, _dir) = setup_db().await;

        let id = enqueue(&db, "dispatch", "c1:1:0", Some("c1"), r#"{"batch":0}"#, None)
            .await
            .unwrap()
            .unwrap();

        let entry = dequeue(&db, "dispatch", 60).await.unwrap().unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(entry.status, "processing");
        assert_eq!(entry.idempotency_key, "c1:1:0");
        assert_eq!(entry.group_key.as_deref(), Some("c1"));
        assert!(entry.locked_until.is_some());

        assert!(dequeue(&db, "dispatch", 60).await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_is_ignored() {
        let (db, _dir) = setup_db().await;
        assert!(enqueue(&db, "dispatch", "k", None, "a", None).await.unwrap().is_some());
        assert!(enqueue(&db, "dispatch", "k", None, "b", None).await.unwrap().is_none());

        let entry = dequeue(&db, "dispatch", 60).await.unwrap().unwrap();
        assert_eq!(entry.payload, "a");
        assert!(dequeue(&db, "dispatch", 60).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ack_marks_completed() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, "test", "k1", None, "payload", None).await.unwrap().unwrap();
        dequeue(&db, "test", 60).await.unwrap().unwrap();
        ack(&db, id).await.unwrap();
        assert_eq!(status_of(&db, id).await.0, "completed");
    }

    #[tokio::test]
    async fn fail_retries_then_gives_up() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, "test", "k1", None, "payload", None).await.unwrap().unwrap();

        dequeue(&db, "test", 60).await.unwrap().unwrap();
        fail(&db, id).await.unwrap();
        assert_eq!(status_of(&db, id).await, ("pending".to_string(), 1));

        for _ in 0..2 {
            dequeue(&db, "test", 60).await.unwrap().unwrap();
            fail(&db, id).await.unwrap();
        }
        assert_eq!(status_of(&db, id).await, ("failed".to_string(), 3));
    }

    #[tokio::test]
    async fn outstanding_counts_pending_and_processing_per_group() {
        let (db, _dir) = setup_db().await;
        let a = enqueue(&db, "q", "a", Some("c1"), "", None).await.unwrap().unwrap();
        enqueue(&db, "q", "b", Some("c1"), "", None).await.unwrap();
        enqueue(&db, "q", "c", Some("c2"), "", None).await.unwrap();
        assert_eq!(count_outstanding(&db, "c1").await.unwrap(), 2);

        dequeue(&db, "q", 60).await.unwrap().unwrap();
        assert_eq!(count_outstanding(&db, "c1").await.unwrap(), 2);
        ack(&db, a).await.unwrap();
        assert_eq!(count_outstanding(&db, "c1").await.unwrap(), 1);
        assert_eq!(count_outstanding(&db, "c2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expired_locks_are_requeued() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, "q", "a", None, "", None).await.unwrap().unwrap();
        dequeue(&db, "q", 0).await.unwrap().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(requeue_expired(&db, "q").await.unwrap(), 1);
        assert_eq!(status_of(&db, id).await.0, "pending");

        // A live lock is left alone.
        dequeue(&db, "q", 300).await.unwrap().unwrap();
        assert_eq!(requeue_expired(&db, "q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn future_entries_wait_for_available_at() {
        let (db, _dir) = setup_db().await;
        let later = Utc::now() + chrono::Duration::seconds(60);
        let held = enqueue(&db, "q", "held", Some("c1"), "", Some(later))
            .await
            .unwrap()
            .unwrap();
        let earlier = Utc::now() - chrono::Duration::seconds(1);
        let due = enqueue(&db, "q", "due", Some("c1"), "", Some(earlier))
            .await
            .unwrap()
            .unwrap();

        let entry = dequeue(&db, "q", 60).await.unwrap().unwrap();
        assert_eq!(entry.id, due);
        assert!(dequeue(&db, "q", 60).await.unwrap().is_none());

        // Still outstanding, so the campaign cannot complete meanwhile.
        assert_eq!(status_of(&db, held).await.0, "pending");
        assert_eq!(count_outstanding(&db, "c1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn concurrent_enqueues_no_sqlite_busy() {
        let (db, _dir) = setup_db().await;
        let db = std::sync::Arc::new(db);
        let mut handles = Vec::new();
        for i in 0..10 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                enqueue(&db, "q", &format!("k{i}"), Some("c1"), "{}", None).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_some());
        }
        assert_eq!(count_outstanding(&db, "c1").await.unwrap(), 10);
    }
}
