// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recipient snapshot, claim transitions, and receipt application.
//!
//! Every state change is a conditional `UPDATE ... WHERE status = ...`
//! whose changed-row count decides the outcome. Campaign counters are
//! adjusted in the same transaction and only when the recipient row
//! actually changed, so replays never double count.

use std::collections::BTreeMap;

use rusqlite::{OptionalExtension, Transaction, params, params_from_iter};
use wacast_core::{
    CampaignRecipient, CampaignStats, ClaimToken, DeliveryStatus, FailureDetail, ReceiptChange,
    RecipientStatus, SkipCode, SkipDetail, WacastError, now_timestamp,
};

use super::{in_list, parse_enum, parse_json, sql_count, to_json};
use crate::database::{Database, map_tr_err};

const RECIPIENT_COLUMNS: &str = "id, campaign_id, contact_id, phone, name, email, custom_fields,
     opted_out, status, message_id, trace_id, failure_code, failure_title, failure_details,
     failure_trace_id, skip_code, skip_reason, sending_at, sent_at, failed_at, skipped_at,
     delivered_at, read_at";

fn row_to_recipient(row: &rusqlite::Row<'_>) -> rusqlite::Result<CampaignRecipient> {
    let custom_fields: String = row.get(6)?;
    let status: String = row.get(8)?;
    let failure_title: Option<String> = row.get(12)?;
    let skip_code: Option<String> = row.get(15)?;
    let failure = match failure_title {
        Some(title) => Some(FailureDetail {
            code: row.get(11)?,
            title,
            details: row.get(13)?,
            trace_id: row.get(14)?,
        }),
        None => None,
    };
    let skip = match skip_code {
        Some(code) => Some(SkipDetail {
            code: parse_enum::<SkipCode>(15, &code)?,
            reason: row.get::<_, Option<String>>(16)?.unwrap_or_default(),
        }),
        None => None,
    };
    Ok(CampaignRecipient {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        contact_id: row.get(2)?,
        phone: row.get(3)?,
        name: row.get(4)?,
        email: row.get(5)?,
        custom_fields: parse_json::<BTreeMap<String, String>>(6, &custom_fields)?,
        opted_out: row.get(7)?,
        status: parse_enum(8, &status)?,
        message_id: row.get(9)?,
        trace_id: row.get(10)?,
        failure,
        skip,
        sending_at: row.get(17)?,
        sent_at: row.get(18)?,
        failed_at: row.get(19)?,
        skipped_at: row.get(20)?,
        delivered_at: row.get(21)?,
        read_at: row.get(22)?,
    })
}

/// Apply counter deltas to a campaign inside an open transaction.
fn bump_counters(
    tx: &Transaction<'_>,
    campaign_id: &str,
    column_deltas: &[(&str, i64)],
    now: &str,
) -> rusqlite::Result<()> {
    let sets: Vec<String> = column_deltas
        .iter()
        .map(|(column, delta)| format!("{column} = {column} + ({delta})"))
        .collect();
    tx.execute(
        &format!(
            "UPDATE campaigns SET {}, updated_at = ?2 WHERE id = ?1",
            sets.join(", ")
        ),
        params![campaign_id, now],
    )?;
    Ok(())
}

/// Insert a recipient snapshot; rows already present for (campaign, phone) are kept.
///
/// Refreshes the campaign's recipient count. Returns the number inserted.
pub async fn insert_recipients(
    db: &Database,
    campaign_id: &str,
    recipients: &[CampaignRecipient],
) -> Result<usize, WacastError> {
    let campaign_id = campaign_id.to_string();
    let recipients = recipients.to_vec();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO campaign_recipients
                         (id, campaign_id, contact_id, phone, name, email, custom_fields,
                          opted_out, status, trace_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9)",
                )?;
                for r in &recipients {
                    inserted += stmt.execute(params![
                        r.id,
                        campaign_id,
                        r.contact_id,
                        r.phone,
                        r.name,
                        r.email,
                        to_json(&r.custom_fields)?,
                        r.opted_out,
                        r.trace_id,
                    ])?;
                }
            }
            tx.execute(
                "UPDATE campaigns SET
                     recipients = (SELECT COUNT(*) FROM campaign_recipients WHERE campaign_id = ?1),
                     updated_at = ?2
                 WHERE id = ?1",
                params![campaign_id, now_timestamp()],
            )?;
            tx.commit()?;
            Ok(inserted)
        })
        .await
        .map_err(map_tr_err)
}

/// List a campaign's recipients in snapshot order, optionally by status.
pub async fn list_recipients(
    db: &Database,
    campaign_id: &str,
    status: Option<RecipientStatus>,
) -> Result<Vec<CampaignRecipient>, WacastError> {
    let campaign_id = campaign_id.to_string();
    let status = status.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECIPIENT_COLUMNS} FROM campaign_recipients
                 WHERE campaign_id = ?1 AND (?2 IS NULL OR status = ?2)
                 ORDER BY rowid ASC"
            ))?;
            let rows = stmt.query_map(params![campaign_id, status], row_to_recipient)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Load specific recipients of a campaign, in snapshot order.
pub async fn get_recipients(
    db: &Database,
    campaign_id: &str,
    ids: &[String],
) -> Result<Vec<CampaignRecipient>, WacastError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut values = vec![campaign_id.to_string()];
    values.extend(ids.iter().cloned());
    let sql = format!(
        "SELECT {RECIPIENT_COLUMNS} FROM campaign_recipients
         WHERE campaign_id = ?1 AND id IN ({})
         ORDER BY rowid ASC",
        in_list(2, ids.len())
    );
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), row_to_recipient)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Find the recipient a vendor message id belongs to.
pub async fn find_by_message_id(
    db: &Database,
    message_id: &str,
) -> Result<Option<CampaignRecipient>, WacastError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {RECIPIENT_COLUMNS} FROM campaign_recipients WHERE message_id = ?1"),
                params![message_id],
                row_to_recipient,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// `pending -> sending`. Exactly one concurrent caller wins.
pub async fn claim(
    db: &Database,
    campaign_id: &str,
    recipient_id: &str,
) -> Result<Option<ClaimToken>, WacastError> {
    let token = ClaimToken {
        campaign_id: campaign_id.to_string(),
        recipient_id: recipient_id.to_string(),
        claimed_at: now_timestamp(),
    };
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE campaign_recipients SET status = 'sending', sending_at = ?3
                 WHERE campaign_id = ?1 AND id = ?2 AND status = 'pending'",
                params![token.campaign_id, token.recipient_id, token.claimed_at],
            )?;
            Ok((changed == 1).then_some(token))
        })
        .await
        .map_err(map_tr_err)
}

/// `sending -> pending` for the holder of `token`.
pub async fn release_claim(db: &Database, token: &ClaimToken) -> Result<bool, WacastError> {
    let token = token.clone();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE campaign_recipients SET status = 'pending', sending_at = NULL
                 WHERE campaign_id = ?1 AND id = ?2 AND status = 'sending' AND sending_at = ?3",
                params![token.campaign_id, token.recipient_id, token.claimed_at],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// `sending -> sent`, recording the vendor message id and campaign timestamps.
pub async fn mark_sent(
    db: &Database,
    token: &ClaimToken,
    message_id: &str,
) -> Result<bool, WacastError> {
    let token = token.clone();
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let now = now_timestamp();
            let changed = tx.execute(
                "UPDATE campaign_recipients SET status = 'sent', message_id = ?4, sent_at = ?5
                 WHERE campaign_id = ?1 AND id = ?2 AND status = 'sending' AND sending_at = ?3",
                params![
                    token.campaign_id,
                    token.recipient_id,
                    token.claimed_at,
                    message_id,
                    now
                ],
            )?;
            if changed == 1 {
                tx.execute(
                    "UPDATE campaigns SET sent = sent + 1, last_sent_at = ?2,
                         first_dispatch_at = COALESCE(first_dispatch_at, ?2), updated_at = ?2
                     WHERE id = ?1",
                    params![token.campaign_id, now],
                )?;
            }
            tx.commit()?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// `pending|sending -> failed`.
pub async fn mark_failed(
    db: &Database,
    campaign_id: &str,
    recipient_id: &str,
    failure: &FailureDetail,
) -> Result<bool, WacastError> {
    let campaign_id = campaign_id.to_string();
    let recipient_id = recipient_id.to_string();
    let failure = failure.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let now = now_timestamp();
            let changed = tx.execute(
                "UPDATE campaign_recipients SET status = 'failed', failed_at = ?3,
                     failure_code = ?4, failure_title = ?5, failure_details = ?6,
                     failure_trace_id = ?7
                 WHERE campaign_id = ?1 AND id = ?2 AND status IN ('pending', 'sending')",
                params![
                    campaign_id,
                    recipient_id,
                    now,
                    failure.code,
                    failure.title,
                    failure.details,
                    failure.trace_id
                ],
            )?;
            if changed == 1 {
                bump_counters(&tx, &campaign_id, &[("failed", 1)], &now)?;
            }
            tx.commit()?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// `pending -> skipped`.
pub async fn mark_skipped(
    db: &Database,
    campaign_id: &str,
    recipient_id: &str,
    skip: &SkipDetail,
) -> Result<bool, WacastError> {
    let campaign_id = campaign_id.to_string();
    let recipient_id = recipient_id.to_string();
    let skip = skip.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let now = now_timestamp();
            let changed = tx.execute(
                "UPDATE campaign_recipients SET status = 'skipped', skipped_at = ?3,
                     skip_code = ?4, skip_reason = ?5
                 WHERE campaign_id = ?1 AND id = ?2 AND status = 'pending'",
                params![
                    campaign_id,
                    recipient_id,
                    now,
                    skip.code.to_string(),
                    skip.reason
                ],
            )?;
            if changed == 1 {
                bump_counters(&tx, &campaign_id, &[("skipped", 1)], &now)?;
            }
            tx.commit()?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// `skipped -> pending` for every skipped recipient, or only `ids`.
pub async fn reopen_skipped(
    db: &Database,
    campaign_id: &str,
    ids: Option<&[String]>,
) -> Result<usize, WacastError> {
    let campaign_id = campaign_id.to_string();
    let ids = ids.map(<[String]>::to_vec);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let reopen = "UPDATE campaign_recipients
                 SET status = 'pending', skip_code = NULL, skip_reason = NULL, skipped_at = NULL
                 WHERE campaign_id = ?1 AND status = 'skipped'";
            let reopened = match &ids {
                None => tx.execute(reopen, params![campaign_id])?,
                Some(ids) => {
                    let mut total = 0;
                    for id in ids {
                        total += tx.execute(&format!("{reopen} AND id = ?2"), params![campaign_id, id])?;
                    }
                    total
                }
            };
            if reopened > 0 {
                bump_counters(
                    &tx,
                    &campaign_id,
                    &[("skipped", -sql_count(reopened))],
                    &now_timestamp(),
                )?;
            }
            tx.commit()?;
            Ok(reopened)
        })
        .await
        .map_err(map_tr_err)
}

/// Aggregate recipient counts. A read receipt counts as delivered.
pub async fn campaign_stats(db: &Database, campaign_id: &str) -> Result<CampaignStats, WacastError> {
    let campaign_id = campaign_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*),
                     COALESCE(SUM(status = 'pending'), 0),
                     COALESCE(SUM(status = 'sending'), 0),
                     COALESCE(SUM(status = 'sent'), 0),
                     COALESCE(SUM(status = 'failed'), 0),
                     COALESCE(SUM(status = 'skipped'), 0),
                     COALESCE(SUM(delivered_at IS NOT NULL OR read_at IS NOT NULL), 0),
                     COALESCE(SUM(read_at IS NOT NULL), 0)
                 FROM campaign_recipients WHERE campaign_id = ?1",
                params![campaign_id],
                |row| {
                    Ok(CampaignStats {
                        recipients: row.get(0)?,
                        pending: row.get(1)?,
                        sending: row.get(2)?,
                        sent: row.get(3)?,
                        failed: row.get(4)?,
                        skipped: row.get(5)?,
                        delivered: row.get(6)?,
                        read: row.get(7)?,
                    })
                },
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Record a `delivered` or `read` receipt monotonically.
///
/// Marks are only ever set once; a read also fills a missing delivery mark.
/// Receipts for recipients that are no longer `sent` change nothing.
pub async fn apply_receipt(
    db: &Database,
    message_id: &str,
    status: DeliveryStatus,
    at: &str,
) -> Result<Option<ReceiptChange>, WacastError> {
    let message_id = message_id.to_string();
    let at = at.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let row: Option<(String, String, Option<String>, Option<String>)> = tx
                .query_row(
                    "SELECT campaign_id, status, delivered_at, read_at
                     FROM campaign_recipients WHERE message_id = ?1",
                    params![message_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?;
            let Some((campaign_id, current, delivered_at, read_at)) = row else {
                return Ok(None);
            };
            if current != RecipientStatus::Sent.to_string() {
                return Ok(Some(ReceiptChange::default()));
            }

            let change = match status {
                DeliveryStatus::Delivered => ReceiptChange {
                    delivered: delivered_at.is_none(),
                    read: false,
                },
                DeliveryStatus::Read => ReceiptChange {
                    delivered: delivered_at.is_none(),
                    read: read_at.is_none(),
                },
                DeliveryStatus::Sent | DeliveryStatus::Failed => ReceiptChange::default(),
            };
            if change.delivered || change.read {
                tx.execute(
                    "UPDATE campaign_recipients SET
                         delivered_at = COALESCE(delivered_at, ?2),
                         read_at = CASE WHEN ?3 THEN COALESCE(read_at, ?2) ELSE read_at END
                     WHERE message_id = ?1",
                    params![message_id, at, change.read],
                )?;
                bump_counters(
                    &tx,
                    &campaign_id,
                    &[
                        ("delivered", i64::from(change.delivered)),
                        ("read", i64::from(change.read)),
                    ],
                    &now_timestamp(),
                )?;
            }
            tx.commit()?;
            Ok(Some(change))
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a sent recipient failed from an asynchronous report.
///
/// Moves one unit from the campaign's `sent` counter to `failed`.
pub async fn apply_delivery_failure(
    db: &Database,
    message_id: &str,
    failure: &FailureDetail,
    at: &str,
) -> Result<Option<bool>, WacastError> {
    let message_id = message_id.to_string();
    let failure = failure.clone();
    let at = at.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let campaign_id: Option<String> = tx
                .query_row(
                    "SELECT campaign_id FROM campaign_recipients WHERE message_id = ?1",
                    params![message_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(campaign_id) = campaign_id else {
                return Ok(None);
            };
            let changed = tx.execute(
                "UPDATE campaign_recipients SET status = 'failed', failed_at = ?2,
                     failure_code = ?3, failure_title = ?4, failure_details = ?5,
                     failure_trace_id = ?6
                 WHERE message_id = ?1 AND status = 'sent'",
                params![
                    message_id,
                    at,
                    failure.code,
                    failure.title,
                    failure.details,
                    failure.trace_id
                ],
            )?;
            if changed == 1 {
                bump_counters(
                    &tx,
                    &campaign_id,
                    &[("sent", -1), ("failed", 1)],
                    &now_timestamp(),
                )?;
            }
            tx.commit()?;
            Ok(Some(changed == 1))
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::campaigns;
    use crate::queries::test_support::{seed_campaign, setup_db};
    use std::sync::Arc;

    #[tokio::test]
    async fn snapshot_insert_is_idempotent() {
        let (db, _dir) = setup_db().await;
        let recipients = seed_campaign(&db, "c1", 3).await;
        let again = insert_recipients(&db, "c1", &recipients).await.unwrap();
        assert_eq!(again, 0);
        let campaign = campaigns::get_campaign(&db, "c1").await.unwrap().unwrap();
        assert_eq!(campaign.recipients, 3);

        let listed = list_recipients(&db, "c1", None).await.unwrap();
        assert_eq!(
            listed.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["r0", "r1", "r2"]
        );
        assert_eq!(listed[0].name.as_deref(), Some("Contact 0"));
    }

    #[tokio::test]
    async fn concurrent_claims_have_one_winner() {
        let (db, _dir) = setup_db().await;
        seed_campaign(&db, "c1", 1).await;
        let db = Arc::new(db);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                claim(&db, "c1", "r0").await.unwrap()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        let r = get_recipients(&db, "c1", &["r0".to_string()]).await.unwrap();
        assert_eq!(r[0].status, RecipientStatus::Sending);
    }

    #[tokio::test]
    async fn release_returns_recipient_to_pending() {
        let (db, _dir) = setup_db().await;
        seed_campaign(&db, "c1", 1).await;
        let token = claim(&db, "c1", "r0").await.unwrap().unwrap();
        assert!(release_claim(&db, &token).await.unwrap());
        assert!(!release_claim(&db, &token).await.unwrap());
        assert!(claim(&db, "c1", "r0").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn terminal_updates_are_single_shot() {
        let (db, _dir) = setup_db().await;
        seed_campaign(&db, "c1", 2).await;
        let token = claim(&db, "c1", "r0").await.unwrap().unwrap();
        assert!(mark_sent(&db, &token, "wamid.A").await.unwrap());
        assert!(!mark_sent(&db, &token, "wamid.A").await.unwrap());
        // A sent recipient can no longer be skipped or failed synchronously.
        let failure = FailureDetail {
            code: Some(131_026),
            title: "undeliverable".into(),
            ..Default::default()
        };
        assert!(!mark_failed(&db, "c1", "r0", &failure).await.unwrap());
        assert!(mark_failed(&db, "c1", "r1", &failure).await.unwrap());
        assert!(!mark_failed(&db, "c1", "r1", &failure).await.unwrap());

        let campaign = campaigns::get_campaign(&db, "c1").await.unwrap().unwrap();
        assert_eq!((campaign.sent, campaign.failed), (1, 1));
        assert!(campaign.first_dispatch_at.is_some());

        let sent = find_by_message_id(&db, "wamid.A").await.unwrap().unwrap();
        assert_eq!(sent.id, "r0");
        let failed = &get_recipients(&db, "c1", &["r1".to_string()]).await.unwrap()[0];
        assert_eq!(failed.failure.as_ref().unwrap().code, Some(131_026));
    }

    #[tokio::test]
    async fn reopen_skipped_adjusts_counter() {
        let (db, _dir) = setup_db().await;
        seed_campaign(&db, "c1", 3).await;
        let skip = SkipDetail {
            code: SkipCode::MissingVariable,
            reason: "missing body param 1".into(),
        };
        for id in ["r0", "r1"] {
            assert!(mark_skipped(&db, "c1", id, &skip).await.unwrap());
        }
        let skipped = list_recipients(&db, "c1", Some(RecipientStatus::Skipped))
            .await
            .unwrap();
        assert_eq!(skipped[0].skip.as_ref().unwrap().code, SkipCode::MissingVariable);

        let only = vec!["r1".to_string()];
        assert_eq!(reopen_skipped(&db, "c1", Some(&only)).await.unwrap(), 1);
        assert_eq!(reopen_skipped(&db, "c1", None).await.unwrap(), 1);
        let campaign = campaigns::get_campaign(&db, "c1").await.unwrap().unwrap();
        assert_eq!(campaign.skipped, 0);
        let stats = campaign_stats(&db, "c1").await.unwrap();
        assert_eq!(stats.pending, 3);
    }

    #[tokio::test]
    async fn read_without_delivered_counts_as_delivered() {
        let (db, _dir) = setup_db().await;
        seed_campaign(&db, "c1", 1).await;
        let token = claim(&db, "c1", "r0").await.unwrap().unwrap();
        mark_sent(&db, &token, "wamid.R").await.unwrap();

        let change = apply_receipt(&db, "wamid.R", DeliveryStatus::Read, "2026-01-01T00:00:05.000Z")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change, ReceiptChange { delivered: true, read: true });

        // A late delivered receipt changes nothing.
        let late = apply_receipt(
            &db,
            "wamid.R",
            DeliveryStatus::Delivered,
            "2026-01-01T00:00:03.000Z",
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(late, ReceiptChange::default());

        let stats = campaign_stats(&db, "c1").await.unwrap();
        assert_eq!((stats.delivered, stats.read), (1, 1));
        let campaign = campaigns::get_campaign(&db, "c1").await.unwrap().unwrap();
        assert_eq!((campaign.delivered, campaign.read), (1, 1));
    }

    #[tokio::test]
    async fn unmatched_receipt_returns_none() {
        let (db, _dir) = setup_db().await;
        let change = apply_receipt(&db, "wamid.X", DeliveryStatus::Delivered, "t")
            .await
            .unwrap();
        assert!(change.is_none());
        let failure = apply_delivery_failure(&db, "wamid.X", &FailureDetail::default(), "t")
            .await
            .unwrap();
        assert!(failure.is_none());
    }

    #[tokio::test]
    async fn async_failure_moves_sent_to_failed_once() {
        let (db, _dir) = setup_db().await;
        seed_campaign(&db, "c1", 1).await;
        let token = claim(&db, "c1", "r0").await.unwrap().unwrap();
        mark_sent(&db, &token, "wamid.F").await.unwrap();
        let failure = FailureDetail {
            code: Some(131_026),
            title: "Message undeliverable".into(),
            ..Default::default()
        };
        let at = now_timestamp();
        assert_eq!(
            apply_delivery_failure(&db, "wamid.F", &failure, &at).await.unwrap(),
            Some(true)
        );
        assert_eq!(
            apply_delivery_failure(&db, "wamid.F", &failure, &at).await.unwrap(),
            Some(false)
        );
        let campaign = campaigns::get_campaign(&db, "c1").await.unwrap().unwrap();
        assert_eq!((campaign.sent, campaign.failed), (0, 1));
    }
}
