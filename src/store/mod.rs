// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tokio::sync::{Mutex, watch};

use crate::error::StoreError;

/// One row of the `downloads` table, keyed by enclosure URL.
///
/// A record exists if and only if a download completed for that URL; this
/// table is the single source of truth for "is this episode downloaded".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadRecord {
    pub enclosure_url: String,
    /// Opaque local storage reference (a filesystem path here)
    pub local_ref: String,
    pub bytes_expected: Option<i64>,
    pub bytes_completed: Option<i64>,
    pub is_downloaded: bool,
    /// Epoch milliseconds of the first completion write
    pub created_at: i64,
    /// Playback offset in milliseconds, updated while audio plays
    pub last_played_at: Option<i64>,
}

impl DownloadRecord {
    /// Last playback position as a duration, if one was ever saved
    pub fn last_played_position(&self) -> Option<Duration> {
        self.last_played_at
            .filter(|ms| *ms >= 0)
            .map(|ms| Duration::from_millis(ms as u64))
    }
}

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS downloads (
    enclosure_url  TEXT PRIMARY KEY,
    local_ref      TEXT NOT NULL,
    bytes_expected INTEGER,
    bytes_completed INTEGER,
    is_downloaded  INTEGER NOT NULL,
    created_at     INTEGER NOT NULL,
    last_played_at INTEGER
)";

/// Persisted record of completed downloads and playback positions.
///
/// All mutations go through one connection guarded by a mutex, so concurrent
/// upserts to the same key serialize (last writer wins). Every mutation
/// republishes a full snapshot to `observe_all` subscribers.
pub struct DownloadStore {
    conn: Mutex<Connection>,
    records_tx: watch::Sender<Vec<DownloadRecord>>,
}

impl DownloadStore {
    /// Open (or create) the downloads database at the given path
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::with_connection(conn)
    }

    /// Open a transient in-memory store, mainly for tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(SCHEMA, [])?;
        let snapshot = load_all(&conn)?;
        let (records_tx, _) = watch::channel(snapshot);

        Ok(Self {
            conn: Mutex::new(conn),
            records_tx,
        })
    }

    /// Subscribe to snapshots of all records; republished on every mutation
    pub fn observe_all(&self) -> watch::Receiver<Vec<DownloadRecord>> {
        self.records_tx.subscribe()
    }

    /// Record a completed download.
    ///
    /// Idempotent per key: re-completing overwrites the local reference and
    /// byte counts but keeps the original `created_at` and any saved
    /// playback position. Called once the transfer collaborator has flushed
    /// all bytes to durable storage.
    pub async fn upsert_completed(
        &self,
        enclosure_url: &str,
        local_ref: &str,
        bytes_expected: Option<i64>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO downloads
                 (enclosure_url, local_ref, bytes_expected, bytes_completed,
                  is_downloaded, created_at)
             VALUES (?1, ?2, ?3, ?3, 1, ?4)
             ON CONFLICT(enclosure_url) DO UPDATE SET
                 local_ref = excluded.local_ref,
                 bytes_expected = excluded.bytes_expected,
                 bytes_completed = excluded.bytes_completed,
                 is_downloaded = 1",
            params![
                enclosure_url,
                local_ref,
                bytes_expected,
                Utc::now().timestamp_millis()
            ],
        )?;
        self.publish(&conn)
    }

    /// Save the current playback position for an existing record.
    ///
    /// A no-op when no record exists for the key; playing an episode that
    /// was never downloaded must not create orphan rows.
    pub async fn update_last_played_at(
        &self,
        enclosure_url: &str,
        position: Duration,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE downloads SET last_played_at = ?2 WHERE enclosure_url = ?1",
            params![enclosure_url, position.as_millis() as i64],
        )?;
        if changed == 0 {
            return Ok(());
        }
        self.publish(&conn)
    }

    /// Point lookup by enclosure URL
    pub async fn get(&self, enclosure_url: &str) -> Result<Option<DownloadRecord>, StoreError> {
        let conn = self.conn.lock().await;
        let record = conn
            .query_row(
                "SELECT enclosure_url, local_ref, bytes_expected, bytes_completed,
                        is_downloaded, created_at, last_played_at
                 FROM downloads WHERE enclosure_url = ?1",
                params![enclosure_url],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Remove a record. Normal flow never deletes; this backs the explicit
    /// user-facing remove operation only.
    pub async fn delete(&self, enclosure_url: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM downloads WHERE enclosure_url = ?1",
            params![enclosure_url],
        )?;
        self.publish(&conn)
    }

    fn publish(&self, conn: &Connection) -> Result<(), StoreError> {
        self.records_tx.send_replace(load_all(conn)?);
        Ok(())
    }
}

fn load_all(conn: &Connection) -> Result<Vec<DownloadRecord>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT enclosure_url, local_ref, bytes_expected, bytes_completed,
                is_downloaded, created_at, last_played_at
         FROM downloads ORDER BY created_at, enclosure_url",
    )?;
    let rows = stmt.query_map([], record_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DownloadRecord> {
    Ok(DownloadRecord {
        enclosure_url: row.get(0)?,
        local_ref: row.get(1)?,
        bytes_expected: row.get(2)?,
        bytes_completed: row.get(3)?,
        is_downloaded: row.get(4)?,
        created_at: row.get(5)?,
        last_played_at: row.get(6)?,
    })
}
