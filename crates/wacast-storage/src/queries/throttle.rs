// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-sender throttle state.

use rusqlite::{OptionalExtension, params};
use wacast_core::{ThrottleState, WacastError, format_timestamp, now_timestamp};

use super::parse_ts;
use crate::database::{Database, map_tr_err};

/// Load the persisted throttle state for a sender.
pub async fn load_throttle(
    db: &Database,
    sender_id: &str,
) -> Result<Option<ThrottleState>, WacastError> {
    let sender_id = sender_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT sender_id, target_rate, cooldown_until, last_increase_at, last_decrease_at
                 FROM throttle_state WHERE sender_id = ?1",
                params![sender_id],
                |row| {
                    Ok(ThrottleState {
                        sender_id: row.get(0)?,
                        target_rate: row.get(1)?,
                        cooldown_until: parse_ts(row.get(2)?),
                        last_increase_at: parse_ts(row.get(3)?),
                        last_decrease_at: parse_ts(row.get(4)?),
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or overwrite a sender's throttle state.
pub async fn save_throttle(db: &Database, state: &ThrottleState) -> Result<(), WacastError> {
    let state = state.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO throttle_state
                     (sender_id, target_rate, cooldown_until, last_increase_at, last_decrease_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(sender_id) DO UPDATE SET
                     target_rate = excluded.target_rate,
                     cooldown_until = excluded.cooldown_until,
                     last_increase_at = excluded.last_increase_at,
                     last_decrease_at = excluded.last_decrease_at,
                     updated_at = excluded.updated_at",
                params![
                    state.sender_id,
                    state.target_rate,
                    state.cooldown_until.map(format_timestamp),
                    state.last_increase_at.map(format_timestamp),
                    state.last_decrease_at.map(format_timestamp),
                    now_timestamp(),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
