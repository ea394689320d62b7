// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-first status event log.
//!
//! The `(message_id, status)` unique key is the webhook dedup guard: a
//! second insert of the same pair is ignored and the caller learns whether
//! the first copy was already settled.

use rusqlite::{params, params_from_iter};
use wacast_core::{EventState, NewStatusEvent, RecordOutcome, StatusEvent, WacastError, now_timestamp};

use super::{in_list, parse_enum, sql_count};
use crate::database::{Database, map_tr_err};

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<StatusEvent> {
    let status: String = row.get(2)?;
    let state: String = row.get(6)?;
    Ok(StatusEvent {
        id: row.get(0)?,
        message_id: row.get(1)?,
        status: parse_enum(2, &status)?,
        event_ts: row.get(3)?,
        recipient_phone: row.get(4)?,
        error_json: row.get(5)?,
        state: parse_enum(6, &state)?,
        attempts: row.get(7)?,
        last_error: row.get(8)?,
        created_at: row.get(9)?,
    })
}

/// Durably record an inbound status event.
pub async fn record_status_event(
    db: &Database,
    event: &NewStatusEvent,
) -> Result<RecordOutcome, WacastError> {
    let event = event.clone();
    db.connection()
        .call(move |conn| {
            let now = now_timestamp();
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO status_events
                     (message_id, status, event_ts, recipient_phone, error, state, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?6)",
                params![
                    event.message_id,
                    event.status.to_string(),
                    event.event_ts,
                    event.recipient_phone,
                    event.error_json,
                    now
                ],
            )?;
            if inserted == 1 {
                return Ok(RecordOutcome::Recorded(conn.last_insert_rowid()));
            }
            let (id, state): (i64, String) = conn.query_row(
                "SELECT id, state FROM status_events WHERE message_id = ?1 AND status = ?2",
                params![event.message_id, event.status.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let state: EventState = parse_enum(1, &state)?;
            Ok(if state.is_settled() {
                RecordOutcome::Duplicate
            } else {
                RecordOutcome::Replay(id)
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Record the outcome of one processing attempt.
pub async fn set_event_state(
    db: &Database,
    id: i64,
    state: EventState,
    last_error: Option<&str>,
) -> Result<(), WacastError> {
    let last_error = last_error.map(str::to_string);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE status_events SET state = ?2, last_error = ?3,
                     attempts = attempts + 1, updated_at = ?4
                 WHERE id = ?1",
                params![id, state.to_string(), last_error, now_timestamp()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Events in one of `states` that have been attempted fewer than `max_attempts` times.
pub async fn list_events(
    db: &Database,
    states: &[EventState],
    max_attempts: i64,
    limit: usize,
) -> Result<Vec<StatusEvent>, WacastError> {
    if states.is_empty() {
        return Ok(Vec::new());
    }
    let mut values: Vec<rusqlite::types::Value> =
        vec![max_attempts.into(), sql_count(limit).into()];
    values.extend(states.iter().map(|s| rusqlite::types::Value::from(s.to_string())));
    let sql = format!(
        "SELECT id, message_id, status, event_ts, recipient_phone, error, state, attempts,
             last_error, created_at
         FROM status_events
         WHERE attempts < ?1 AND state IN ({})
         ORDER BY id ASC
         LIMIT ?2",
        in_list(3, states.len())
    );
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), row_to_event)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::setup_db;
    use wacast_core::DeliveryStatus;

    fn delivered(message_id: &str) -> NewStatusEvent {
        NewStatusEvent {
            message_id: message_id.into(),
            status: DeliveryStatus::Delivered,
            event_ts: Some("2026-01-01T00:00:00.000Z".into()),
            recipient_phone: Some("5511999990000".into()),
            error_json: None,
        }
    }

    #[tokio::test]
    async fn duplicate_pair_is_replayed_until_settled() {
        let (db, _dir) = setup_db().await;
        let RecordOutcome::Recorded(id) = record_status_event(&db, &delivered("wamid.1"))
            .await
            .unwrap()
        else {
            panic!("first sighting should be recorded");
        };

        // Not yet settled: a redelivery is processed again.
        assert_eq!(
            record_status_event(&db, &delivered("wamid.1")).await.unwrap(),
            RecordOutcome::Replay(id)
        );

        set_event_state(&db, id, EventState::Applied, None).await.unwrap();
        assert_eq!(
            record_status_event(&db, &delivered("wamid.1")).await.unwrap(),
            RecordOutcome::Duplicate
        );

        // A different status for the same message is a new event.
        let read = NewStatusEvent {
            status: DeliveryStatus::Read,
            ..delivered("wamid.1")
        };
        assert!(matches!(
            record_status_event(&db, &read).await.unwrap(),
            RecordOutcome::Recorded(_)
        ));
    }

    #[tokio::test]
    async fn list_filters_state_and_attempts() {
        let (db, _dir) = setup_db().await;
        let mut ids = Vec::new();
        for m in ["a", "b", "c"] {
            if let RecordOutcome::Recorded(id) =
                record_status_event(&db, &delivered(m)).await.unwrap()
            {
                ids.push(id);
            }
        }
        set_event_state(&db, ids[0], EventState::Unmatched, None).await.unwrap();
        set_event_state(&db, ids[1], EventState::Error, Some("boom")).await.unwrap();
        set_event_state(&db, ids[1], EventState::Error, Some("boom")).await.unwrap();
        set_event_state(&db, ids[2], EventState::Applied, None).await.unwrap();

        let retry = list_events(&db, &[EventState::Unmatched, EventState::Error], 5, 10)
            .await
            .unwrap();
        assert_eq!(retry.len(), 2);
        assert_eq!(retry[1].last_error.as_deref(), Some("boom"));
        assert_eq!(retry[1].attempts, 2);

        let capped = list_events(&db, &[EventState::Unmatched, EventState::Error], 2, 10)
            .await
            .unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].message_id, "a");

        // usize::MAX saturates instead of wrapping.
        let all = list_events(&db, &[EventState::Unmatched, EventState::Error], 5, usize::MAX)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        let one = list_events(&db, &[EventState::Unmatched, EventState::Error], 5, 1)
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
    }
}
