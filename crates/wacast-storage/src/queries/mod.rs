// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for operations on storage entities.
//!
//! Every function takes `&Database` and runs one closure on the writer
//! thread; multi-statement updates use a transaction inside that closure.

pub mod alerts;
pub mod campaigns;
pub mod queue;
pub mod recipients;
pub mod status_events;
pub mod suppressions;
pub mod templates;
pub mod throttle;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use serde::Serialize;
use serde::de::DeserializeOwned;
use wacast_core::parse_timestamp;

/// Parse a TEXT column into a strum enum.
pub(crate) fn parse_enum<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parse a JSON TEXT column.
pub(crate) fn parse_json<T: DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Serialize a value for a JSON TEXT column.
pub(crate) fn to_json<T: Serialize>(value: &T) -> rusqlite::Result<String> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

/// Parse an optional timestamp column; unparseable values read as absent.
pub(crate) fn parse_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.as_deref().and_then(parse_timestamp)
}

/// A `usize` count as an SQLite integer, saturating at `i64::MAX`.
pub(crate) fn sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// `?start, ?start+1, ...` for an `IN (...)` list of `n` values.
pub(crate) fn in_list(start: usize, n: usize) -> String {
    (start..start + n)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
pub(crate) mod test_support {
    use tempfile::TempDir;
    use wacast_core::{Campaign, CampaignRecipient, RecipientInput};

    use crate::database::Database;

    pub async fn setup_db() -> (Database, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    /// Create a campaign with `n` pending recipients `r0..rn`.
    pub async fn seed_campaign(db: &Database, id: &str, n: usize) -> Vec<CampaignRecipient> {
        super::campaigns::create_campaign(db, &Campaign::draft(id, format!("campaign {id}")))
            .await
            .unwrap();
        let recipients: Vec<CampaignRecipient> = (0..n)
            .map(|i| {
                CampaignRecipient::pending(
                    format!("r{i}"),
                    id,
                    format!("trace-{i}"),
                    RecipientInput {
                        contact_id: Some(format!("c{i}")),
                        phone: format!("55119999{i:05}"),
                        name: Some(format!("Contact {i}")),
                        ..Default::default()
                    },
                )
            })
            .collect();
        super::recipients::insert_recipients(db, id, &recipients)
            .await
            .unwrap();
        recipients
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_count_saturates() {
        assert_eq!(sql_count(25), 25);
        assert_eq!(sql_count(usize::MAX), i64::MAX);
    }

    #[test]
    fn in_list_numbers_placeholders() {
        assert_eq!(in_list(3, 3), "?3, ?4, ?5");
        assert_eq!(in_list(1, 0), "");
    }
}
