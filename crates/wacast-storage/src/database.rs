// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;

use tracing::debug;
use wacast_core::WacastError;

/// Handle to the engine's SQLite database.
///
/// Wraps one `tokio_rusqlite::Connection`; every query module goes through
/// [`Database::connection`], so all statements run on the same background
/// thread and a closure passed to `call` executes atomically with respect
/// to every other closure.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path` in WAL mode and run migrations.
    pub async fn open(path: &str) -> Result<Self, WacastError> {
        Self::open_with(path, true).await
    }

    /// Open the database, choosing whether to enable WAL journaling.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, WacastError> {
        if path != ":memory:"
            && let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| WacastError::Storage {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| WacastError::Storage {
                source: Box::new(e),
            })?;

        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            if wal_mode {
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            }
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;
                 PRAGMA synchronous = NORMAL;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| crate::migrations::run_migrations(conn))
            .await
            .map_err(|e| match e {
                tokio_rusqlite::Error::Error(inner) => inner,
                other => WacastError::Storage {
                    source: other.to_string().into(),
                },
            })?;

        debug!(path, wal_mode, "database opened and migrated");
        Ok(Self { conn })
    }

    /// The single writer connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), WacastError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.close().await.map_err(|e| WacastError::Storage {
            source: Box::new(e),
        })
    }
}

/// Map a tokio-rusqlite error to [`WacastError`].
///
/// A missing table surfaces as [`WacastError::SchemaMissing`] so callers
/// with a compatibility path can tell it apart from a failed write.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> WacastError {
    if let Some(table) = missing_table(&e.to_string()) {
        return WacastError::SchemaMissing { table };
    }
    WacastError::Storage {
        source: Box::new(e),
    }
}

fn missing_table(message: &str) -> Option<String> {
    let (_, rest) = message.split_once("no such table: ")?;
    let table = rest
        .split(|c: char| c.is_whitespace() || c == ',' || c == ')')
        .next()?;
    (!table.is_empty()).then(|| table.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_file_and_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/dir/wacast.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        assert!(path.exists());

        let tables: Vec<String> = db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect()
            })
            .await
            .unwrap();
        for table in [
            "campaign_recipients",
            "campaigns",
            "phone_suppressions",
            "queue",
            "status_events",
            "throttle_state",
        ] {
            assert!(tables.iter().any(|t| t == table), "missing {table}");
        }
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_does_not_rerun_migrations() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reopen.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        db.close().await.unwrap();
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn missing_table_maps_to_schema_missing() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("x.db").to_str().unwrap())
            .await
            .unwrap();
        let err = db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute("INSERT INTO no_such_thing (a) VALUES (1)", [])?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
            .unwrap_err();
        assert!(
            matches!(&err, WacastError::SchemaMissing { table } if table == "no_such_thing"),
            "got {err:?}"
        );
    }

    #[test]
    fn parses_missing_table_messages() {
        assert_eq!(
            missing_table("no such table: status_events in INSERT ..."),
            Some("status_events".to_string())
        );
        assert_eq!(missing_table("database is locked"), None);
    }
}
