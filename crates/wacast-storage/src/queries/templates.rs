// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registered message templates.

use rusqlite::{OptionalExtension, params};
use wacast_core::{MessageTemplate, TemplateComponent, WacastError, now_timestamp};

use super::{parse_json, to_json};
use crate::database::{Database, map_tr_err};

pub async fn upsert_template(db: &Database, template: &MessageTemplate) -> Result<(), WacastError> {
    let template = template.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO templates (name, language, components, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(name) DO UPDATE SET
                     language = excluded.language,
                     components = excluded.components,
                     updated_at = excluded.updated_at",
                params![
                    template.name,
                    template.language,
                    to_json(&template.components)?,
                    now_timestamp()
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_template(db: &Database, name: &str) -> Result<Option<MessageTemplate>, WacastError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT name, language, components FROM templates WHERE name = ?1",
                params![name],
                |row| {
                    let components: String = row.get(2)?;
                    Ok(MessageTemplate {
                        name: row.get(0)?,
                        language: row.get(1)?,
                        components: parse_json::<Vec<TemplateComponent>>(2, &components)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}
