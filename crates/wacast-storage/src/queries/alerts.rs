// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator alert log.

use rusqlite::params;
use wacast_core::{NewAlert, OperatorAlert, WacastError, now_timestamp};

use super::sql_count;
use crate::database::{Database, map_tr_err};

pub async fn insert_alert(db: &Database, alert: &NewAlert) -> Result<i64, WacastError> {
    let alert = alert.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO operator_alerts (campaign_id, message_id, code, title, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    alert.campaign_id,
                    alert.message_id,
                    alert.code,
                    alert.title,
                    alert.message,
                    now_timestamp()
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent alerts first.
pub async fn list_alerts(db: &Database, limit: usize) -> Result<Vec<OperatorAlert>, WacastError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, campaign_id, message_id, code, title, message, created_at
                 FROM operator_alerts ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![sql_count(limit)], |row| {
                Ok(OperatorAlert {
                    id: row.get(0)?,
                    campaign_id: row.get(1)?,
                    message_id: row.get(2)?,
                    code: row.get(3)?,
                    title: row.get(4)?,
                    message: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
