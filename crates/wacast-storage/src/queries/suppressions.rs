// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phone suppressions, failure history, and opt-outs.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params, params_from_iter};
use wacast_core::{
    SuppressionEntry, SuppressionSource, WacastError, format_timestamp, now_timestamp,
};

use super::{in_list, parse_enum, parse_ts, sql_count};
use crate::database::{Database, map_tr_err};

const SUPPRESSION_COLUMNS: &str =
    "phone, reason, source, is_active, expires_at, suppression_count, created_at, updated_at";

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<SuppressionEntry> {
    let source: String = row.get(2)?;
    Ok(SuppressionEntry {
        phone: row.get(0)?,
        reason: row.get(1)?,
        source: parse_enum(2, &source)?,
        is_active: row.get(3)?,
        expires_at: parse_ts(row.get(4)?),
        suppression_count: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub async fn get_suppression(
    db: &Database,
    phone: &str,
) -> Result<Option<SuppressionEntry>, WacastError> {
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {SUPPRESSION_COLUMNS} FROM phone_suppressions WHERE phone = ?1"),
                params![phone],
                row_to_entry,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a suppression, or re-activate an existing one and bump its count.
pub async fn upsert_suppression(
    db: &Database,
    phone: &str,
    reason: &str,
    source: SuppressionSource,
    expires_at: Option<DateTime<Utc>>,
) -> Result<SuppressionEntry, WacastError> {
    let phone = phone.to_string();
    let reason = reason.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let now = now_timestamp();
            tx.execute(
                "INSERT INTO phone_suppressions
                     (phone, reason, source, is_active, expires_at, suppression_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 1, ?4, 1, ?5, ?5)
                 ON CONFLICT(phone) DO UPDATE SET
                     reason = excluded.reason,
                     source = excluded.source,
                     is_active = 1,
                     expires_at = excluded.expires_at,
                     suppression_count = suppression_count + 1,
                     updated_at = excluded.updated_at",
                params![
                    phone,
                    reason,
                    source.to_string(),
                    expires_at.map(format_timestamp),
                    now
                ],
            )?;
            let entry = tx.query_row(
                &format!("SELECT {SUPPRESSION_COLUMNS} FROM phone_suppressions WHERE phone = ?1"),
                params![phone],
                row_to_entry,
            )?;
            tx.commit()?;
            Ok(entry)
        })
        .await
        .map_err(map_tr_err)
}

/// Deactivate a suppression. The row and its count are kept for escalation.
pub async fn deactivate_suppression(db: &Database, phone: &str) -> Result<bool, WacastError> {
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE phone_suppressions SET is_active = 0, updated_at = ?2
                 WHERE phone = ?1 AND is_active = 1",
                params![phone, now_timestamp()],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// List suppressions, most recently updated first.
///
/// `active_only` excludes deactivated and expired entries.
pub async fn list_suppressions(
    db: &Database,
    active_only: bool,
    limit: usize,
) -> Result<Vec<SuppressionEntry>, WacastError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SUPPRESSION_COLUMNS} FROM phone_suppressions
                 WHERE ?1 = 0 OR (is_active = 1 AND (expires_at IS NULL OR expires_at > ?2))
                 ORDER BY updated_at DESC, phone ASC
                 LIMIT ?3"
            ))?;
            let rows = stmt.query_map(
                params![active_only, now_timestamp(), sql_count(limit)],
                row_to_entry,
            )?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn record_failure(
    db: &Database,
    phone: &str,
    code: i64,
    campaign_id: Option<&str>,
    at: DateTime<Utc>,
) -> Result<(), WacastError> {
    let phone = phone.to_string();
    let campaign_id = campaign_id.map(str::to_string);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO phone_failures (phone, code, campaign_id, occurred_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![phone, code, campaign_id, format_timestamp(at)],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn count_failures_since(
    db: &Database,
    phone: &str,
    codes: &[i64],
    since: DateTime<Utc>,
) -> Result<i64, WacastError> {
    if codes.is_empty() {
        return Ok(0);
    }
    let mut values: Vec<rusqlite::types::Value> = vec![
        phone.to_string().into(),
        format_timestamp(since).into(),
    ];
    values.extend(codes.iter().map(|c| rusqlite::types::Value::from(*c)));
    let sql = format!(
        "SELECT COUNT(*) FROM phone_failures
         WHERE phone = ?1 AND occurred_at >= ?2 AND code IN ({})",
        in_list(3, codes.len())
    );
    db.connection()
        .call(move |conn| conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0)))
        .await
        .map_err(map_tr_err)
}

/// Record an opt-out. Returns `true` if the phone was not opted out before.
pub async fn record_opt_out(db: &Database, phone: &str, reason: &str) -> Result<bool, WacastError> {
    let phone = phone.to_string();
    let reason = reason.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO contact_opt_outs (phone, reason, created_at)
                 VALUES (?1, ?2, ?3)",
                params![phone, reason, now_timestamp()],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn is_opted_out(db: &Database, phone: &str) -> Result<bool, WacastError> {
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM contact_opt_outs WHERE phone = ?1)",
                params![phone],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

pub async fn clear_opt_out(db: &Database, phone: &str) -> Result<bool, WacastError> {
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "DELETE FROM contact_opt_outs WHERE phone = ?1",
                params![phone],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::setup_db;
    use chrono::Duration;

    #[tokio::test]
    async fn upsert_reactivates_and_counts() {
        let (db, _dir) = setup_db().await;
        let phone = "5511999990000";
        let first = upsert_suppression(&db, phone, "opt-out", SuppressionSource::OptOut, None)
            .await
            .unwrap();
        assert_eq!(first.suppression_count, 1);
        assert!(first.is_active);

        assert!(deactivate_suppression(&db, phone).await.unwrap());
        assert!(!deactivate_suppression(&db, phone).await.unwrap());
        let lifted = get_suppression(&db, phone).await.unwrap().unwrap();
        assert!(!lifted.is_active);

        let expires = Utc::now() + Duration::days(30);
        let second = upsert_suppression(&db, phone, "auto", SuppressionSource::Auto, Some(expires))
            .await
            .unwrap();
        assert_eq!(second.suppression_count, 2);
        assert_eq!(second.source, SuppressionSource::Auto);
        assert!(second.is_effective(Utc::now()));
    }

    #[tokio::test]
    async fn list_active_skips_expired() {
        let (db, _dir) = setup_db().await;
        let past = Utc::now() - Duration::days(1);
        upsert_suppression(&db, "111111111", "old", SuppressionSource::Auto, Some(past))
            .await
            .unwrap();
        upsert_suppression(&db, "222222222", "manual", SuppressionSource::Manual, None)
            .await
            .unwrap();
        let active = list_suppressions(&db, true, 10).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].phone, "222222222");
        assert_eq!(list_suppressions(&db, false, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failure_window_counts_only_matching_codes() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let phone = "5511999990001";
        record_failure(&db, phone, 131_026, Some("c1"), now - Duration::days(40))
            .await
            .unwrap();
        record_failure(&db, phone, 131_026, Some("c1"), now - Duration::days(2))
            .await
            .unwrap();
        record_failure(&db, phone, 131_049, None, now).await.unwrap();
        record_failure(&db, phone, 131_026, None, now).await.unwrap();

        let since = now - Duration::days(30);
        assert_eq!(
            count_failures_since(&db, phone, &[131_026], since).await.unwrap(),
            2
        );
        assert_eq!(
            count_failures_since(&db, phone, &[131_026, 131_049], since)
                .await
                .unwrap(),
            3
        );
        assert_eq!(count_failures_since(&db, phone, &[], since).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn opt_outs_are_idempotent() {
        let (db, _dir) = setup_db().await;
        assert!(!is_opted_out(&db, "5511").await.unwrap());
        assert!(record_opt_out(&db, "5511", "keyword STOP").await.unwrap());
        assert!(!record_opt_out(&db, "5511", "keyword STOP").await.unwrap());
        assert!(is_opted_out(&db, "5511").await.unwrap());
        assert!(clear_opt_out(&db, "5511").await.unwrap());
        assert!(!is_opted_out(&db, "5511").await.unwrap());
    }
}
