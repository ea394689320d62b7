// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign rows and their lifecycle transitions.

use rusqlite::{OptionalExtension, params, params_from_iter};
use wacast_core::{
    Campaign, CampaignStatus, RunSpec, THROUGHPUT_EXCEEDED, WacastError, now_timestamp,
};

use super::{in_list, parse_enum, parse_json, to_json};
use crate::database::{Database, map_tr_err};

const CAMPAIGN_COLUMNS: &str = "id, name, status, template_name, template_variables, sender_id,
     recipients, sent, failed, skipped, delivered, read, dispatch_run,
     started_at, first_dispatch_at, last_sent_at, completed_at, created_at, updated_at";

fn row_to_campaign(row: &rusqlite::Row<'_>) -> rusqlite::Result<Campaign> {
    let status: String = row.get(2)?;
    let variables: Option<String> = row.get(4)?;
    Ok(Campaign {
        id: row.get(0)?,
        name: row.get(1)?,
        status: parse_enum(2, &status)?,
        template_name: row.get(3)?,
        template_variables: variables.map(|v| parse_json(4, &v)).transpose()?,
        sender_id: row.get(5)?,
        recipients: row.get(6)?,
        sent: row.get(7)?,
        failed: row.get(8)?,
        skipped: row.get(9)?,
        delivered: row.get(10)?,
        read: row.get(11)?,
        dispatch_run: row.get(12)?,
        started_at: row.get(13)?,
        first_dispatch_at: row.get(14)?,
        last_sent_at: row.get(15)?,
        completed_at: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}

/// Insert a new campaign.
pub async fn create_campaign(db: &Database, campaign: &Campaign) -> Result<(), WacastError> {
    let campaign = campaign.clone();
    db.connection()
        .call(move |conn| {
            let variables = campaign
                .template_variables
                .as_ref()
                .map(to_json)
                .transpose()?;
            conn.execute(
                "INSERT INTO campaigns (id, name, status, template_name, template_variables,
                     sender_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    campaign.id,
                    campaign.name,
                    campaign.status.to_string(),
                    campaign.template_name,
                    variables,
                    campaign.sender_id,
                    campaign.created_at,
                    campaign.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a campaign by ID.
pub async fn get_campaign(db: &Database, id: &str) -> Result<Option<Campaign>, WacastError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"),
                params![id],
                row_to_campaign,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

enum RunStart {
    Started,
    Missing,
    Rejected(CampaignStatus),
}

/// Move a campaign into `sending` for a new dispatch run.
///
/// `started_at` is only recorded the first time; `completed_at` is cleared
/// because a finished campaign re-entering `sending` is running again.
pub async fn begin_run(
    db: &Database,
    id: &str,
    allowed_from: &[CampaignStatus],
    spec: &RunSpec,
) -> Result<Campaign, WacastError> {
    let campaign_id = id.to_string();
    let allowed = allowed_from.to_vec();
    let spec = spec.clone();
    let start = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let status: Option<String> = tx
                .query_row(
                    "SELECT status FROM campaigns WHERE id = ?1",
                    params![campaign_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(status) = status else {
                return Ok(RunStart::Missing);
            };
            let status: CampaignStatus = parse_enum(0, &status)?;
            if !allowed.contains(&status) {
                return Ok(RunStart::Rejected(status));
            }
            let variables = spec.template_variables.as_ref().map(to_json).transpose()?;
            let now = now_timestamp();
            tx.execute(
                "UPDATE campaigns SET status = 'sending',
                     started_at = COALESCE(started_at, ?2),
                     completed_at = NULL,
                     dispatch_run = dispatch_run + 1,
                     template_name = COALESCE(?3, template_name),
                     template_variables = COALESCE(?4, template_variables),
                     sender_id = COALESCE(?5, sender_id),
                     updated_at = ?2
                 WHERE id = ?1",
                params![campaign_id, now, spec.template_name, variables, spec.sender_id],
            )?;
            tx.commit()?;
            Ok(RunStart::Started)
        })
        .await
        .map_err(map_tr_err)?;

    match start {
        RunStart::Started => get_campaign(db, id)
            .await?
            .ok_or_else(|| WacastError::not_found("campaign", id)),
        RunStart::Missing => Err(WacastError::not_found("campaign", id)),
        RunStart::Rejected(status) => Err(WacastError::invalid_state(format!(
            "campaign {id} is {status} and cannot start sending"
        ))),
    }
}

/// Conditionally change a campaign's status.
///
/// Returns `false` if the campaign's current status is not in `from`.
pub async fn transition_campaign(
    db: &Database,
    id: &str,
    from: &[CampaignStatus],
    to: CampaignStatus,
) -> Result<bool, WacastError> {
    if from.is_empty() {
        return Ok(false);
    }
    let mut values = vec![
        to.to_string(),
        now_timestamp(),
        id.to_string(),
        to.is_terminal().to_string(),
    ];
    values.extend(from.iter().map(|s| s.to_string()));
    let sql = format!(
        "UPDATE campaigns SET status = ?1, updated_at = ?2,
             completed_at = CASE WHEN ?4 = 'true' THEN ?2 ELSE completed_at END
         WHERE id = ?3 AND status IN ({})",
        in_list(5, from.len())
    );
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Finish a `sending` campaign with its final status.
pub async fn finish_campaign(
    db: &Database,
    id: &str,
) -> Result<Option<CampaignStatus>, WacastError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let row: Option<(String, i64, i64, i64, i64)> = tx
                .query_row(
                    "SELECT status, recipients, sent, failed, skipped FROM campaigns WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
                )
                .optional()?;
            let Some((status, recipients, sent, failed, skipped)) = row else {
                return Ok(None);
            };
            if status != CampaignStatus::Sending.to_string() {
                return Ok(None);
            }
            // Throttled recipients are a pacing outcome, not a campaign failure.
            let throttled: i64 = tx.query_row(
                "SELECT COUNT(*) FROM campaign_recipients
                 WHERE campaign_id = ?1 AND status = 'failed' AND failure_code = ?2",
                params![id, THROUGHPUT_EXCEEDED],
                |row| row.get(0),
            )?;
            let next = if recipients > 0
                && sent == 0
                && throttled == 0
                && failed + skipped == recipients
            {
                CampaignStatus::Failed
            } else {
                CampaignStatus::Completed
            };
            tx.execute(
                "UPDATE campaigns SET status = ?2, completed_at = ?3, updated_at = ?3
                 WHERE id = ?1 AND status = 'sending'",
                params![id, next.to_string(), now_timestamp()],
            )?;
            tx.commit()?;
            Ok(Some(next))
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::recipients;
    use crate::queries::test_support::{seed_campaign, setup_db};
    use wacast_core::{FailureDetail, SkipCode, SkipDetail, TemplateVariables};

    #[tokio::test]
    async fn create_and_get_round_trip() {
        let (db, _dir) = setup_db().await;
        let mut campaign = Campaign::draft("c1", "Spring sale");
        campaign.template_variables = Some(TemplateVariables {
            body: vec!["{{name}}".into()],
            ..Default::default()
        });
        create_campaign(&db, &campaign).await.unwrap();
        let loaded = get_campaign(&db, "c1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "Spring sale");
        assert_eq!(loaded.status, CampaignStatus::Draft);
        assert_eq!(loaded.template_variables, campaign.template_variables);
        assert!(get_campaign(&db, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn begin_run_records_started_at_once() {
        let (db, _dir) = setup_db().await;
        seed_campaign(&db, "c1", 2).await;
        let spec = RunSpec {
            template_name: Some("promo".into()),
            ..Default::default()
        };
        let first = begin_run(&db, "c1", &[CampaignStatus::Draft], &spec)
            .await
            .unwrap();
        assert_eq!(first.status, CampaignStatus::Sending);
        assert_eq!(first.dispatch_run, 1);
        assert_eq!(first.template_name.as_deref(), Some("promo"));
        let started = first.started_at.clone().unwrap();

        let second = begin_run(&db, "c1", &[CampaignStatus::Sending], &RunSpec::default())
            .await
            .unwrap();
        assert_eq!(second.dispatch_run, 2);
        assert_eq!(second.started_at.as_deref(), Some(started.as_str()));
        assert_eq!(second.template_name.as_deref(), Some("promo"));
    }

    #[tokio::test]
    async fn begin_run_rejects_disallowed_status() {
        let (db, _dir) = setup_db().await;
        seed_campaign(&db, "c1", 1).await;
        transition_campaign(&db, "c1", &[CampaignStatus::Draft], CampaignStatus::Cancelled)
            .await
            .unwrap();
        let err = begin_run(&db, "c1", &[CampaignStatus::Draft], &RunSpec::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WacastError::InvalidState { .. }));
        let err = begin_run(&db, "nope", &[CampaignStatus::Draft], &RunSpec::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WacastError::NotFound { .. }));
    }

    #[tokio::test]
    async fn transition_is_conditional() {
        let (db, _dir) = setup_db().await;
        seed_campaign(&db, "c1", 1).await;
        assert!(
            !transition_campaign(&db, "c1", &[CampaignStatus::Sending], CampaignStatus::Paused)
                .await
                .unwrap()
        );
        begin_run(&db, "c1", &[CampaignStatus::Draft], &RunSpec::default())
            .await
            .unwrap();
        assert!(
            transition_campaign(&db, "c1", &[CampaignStatus::Sending], CampaignStatus::Paused)
                .await
                .unwrap()
        );
        let paused = get_campaign(&db, "c1").await.unwrap().unwrap();
        assert_eq!(paused.status, CampaignStatus::Paused);
        assert!(paused.completed_at.is_none());
    }

    #[tokio::test]
    async fn finish_marks_failed_when_nothing_was_sent() {
        let (db, _dir) = setup_db().await;
        seed_campaign(&db, "c1", 2).await;
        begin_run(&db, "c1", &[CampaignStatus::Draft], &RunSpec::default())
            .await
            .unwrap();
        recipients::mark_skipped(
            &db,
            "c1",
            "r0",
            &SkipDetail {
                code: SkipCode::InvalidPhone,
                reason: "bad".into(),
            },
        )
        .await
        .unwrap();
        recipients::mark_failed(&db, "c1", "r1", &FailureDetail::default())
            .await
            .unwrap();
        assert_eq!(
            finish_campaign(&db, "c1").await.unwrap(),
            Some(CampaignStatus::Failed)
        );
        let done = get_campaign(&db, "c1").await.unwrap().unwrap();
        assert!(done.completed_at.is_some());
        // Already finished: no second transition.
        assert_eq!(finish_campaign(&db, "c1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn finish_ignores_throttle_failures() {
        let (db, _dir) = setup_db().await;
        seed_campaign(&db, "c1", 2).await;
        begin_run(&db, "c1", &[CampaignStatus::Draft], &RunSpec::default())
            .await
            .unwrap();
        let throttled = FailureDetail {
            code: Some(THROUGHPUT_EXCEEDED),
            title: "throughput exceeded".into(),
            ..FailureDetail::default()
        };
        for id in ["r0", "r1"] {
            recipients::mark_failed(&db, "c1", id, &throttled)
                .await
                .unwrap();
        }
        assert_eq!(
            finish_campaign(&db, "c1").await.unwrap(),
            Some(CampaignStatus::Completed)
        );
        let done = get_campaign(&db, "c1").await.unwrap().unwrap();
        assert_eq!(done.failed, 2);
    }

    #[tokio::test]
    async fn finish_marks_completed_with_any_send() {
        let (db, _dir) = setup_db().await;
        seed_campaign(&db, "c1", 2).await;
        begin_run(&db, "c1", &[CampaignStatus::Draft], &RunSpec::default())
            .await
            .unwrap();
        let token = recipients::claim(&db, "c1", "r0").await.unwrap().unwrap();
        recipients::mark_sent(&db, &token, "wamid.1").await.unwrap();
        recipients::mark_failed(&db, "c1", "r1", &FailureDetail::default())
            .await
            .unwrap();
        assert_eq!(
            finish_campaign(&db, "c1").await.unwrap(),
            Some(CampaignStatus::Completed)
        );
    }
}
