// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite storage backend for the action queue.
//!
//! The durable half of [`super::durable::DurableStore`]. One table holds the
//! queued actions, a single-row table holds the loss-detection checkpoint:
//!
//! ```sql
//! CREATE TABLE queued_actions (
//!   id TEXT PRIMARY KEY,
//!   action_type TEXT NOT NULL,
//!   payload TEXT NOT NULL,      -- JSON as text
//!   payload_hash TEXT NOT NULL, -- SHA-256 hex, verified on load
//!   created_at INTEGER NOT NULL,
//!   seq INTEGER NOT NULL,
//!   attempts INTEGER NOT NULL,
//!   status TEXT NOT NULL,
//!   last_error TEXT
//! )
//! ```
//!
//! WAL journal mode is enabled at open: the queue writes on every status
//! transition during a drain, and readers (pending count, UI listings) must
//! not block behind those writes.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::time::Duration;
use tracing::{debug, warn};

use super::traits::{ActionStore, Checkpoint, StoreError};
use crate::action::{ActionStatus, ActionType, QueuedAction};
use crate::resilience::retry::{retry, RetryPolicy};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the store at the given file path, with startup-mode
    /// retry so a misconfigured path fails fast.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = format!("sqlite://{}?mode=rwc", path);

        let pool = retry("sqlite_connect", &RetryPolicy::startup(), || async {
            SqlitePoolOptions::new()
                .max_connections(4)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&url)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))
        })
        .await?;

        let store = Self { pool };
        store.enable_wal_mode().await?;
        store.init_schema().await?;
        Ok(store)
    }

    /// Enable WAL (Write-Ahead Logging) mode.
    ///
    /// Readers don't block writers, and `synchronous = NORMAL` is safe
    /// under WAL while avoiding a second fsync per commit.
    async fn enable_wal_mode(&self) -> Result<(), StoreError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to enable WAL mode: {}", e)))?;

        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to set synchronous mode: {}", e)))?;

        Ok(())
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        let actions_sql = r#"
            CREATE TABLE IF NOT EXISTS queued_actions (
                id TEXT PRIMARY KEY,
                action_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                payload_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                seq INTEGER NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                last_error TEXT
            )
            "#;

        // Single-row table: slot is always 0.
        let checkpoint_sql = r#"
            CREATE TABLE IF NOT EXISTS queue_checkpoint (
                slot INTEGER PRIMARY KEY CHECK (slot = 0),
                expected TEXT NOT NULL,
                recorded_at INTEGER NOT NULL
            )
            "#;

        retry("sqlite_init_schema", &RetryPolicy::startup(), || async {
            sqlx::query(actions_sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            sqlx::query(checkpoint_sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))
        })
        .await?;

        Ok(())
    }

    fn map_row(row: &sqlx::sqlite::SqliteRow) -> Result<QueuedAction, StoreError> {
        let payload_text: String = row
            .try_get("payload")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let payload = serde_json::from_str(&payload_text)
            .map_err(|e| StoreError::Backend(format!("Unparseable payload JSON: {}", e)))?;

        let action_type: String = row
            .try_get("action_type")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let status_text: String = row
            .try_get("status")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let status = ActionStatus::from_wire(&status_text)
            .ok_or_else(|| StoreError::Backend(format!("Unknown status '{}'", status_text)))?;

        Ok(QueuedAction {
            id: row
                .try_get("id")
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            action_type: ActionType::from_wire(&action_type),
            payload,
            payload_hash: row
                .try_get("payload_hash")
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            created_at: row
                .try_get("created_at")
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            seq: row
                .try_get::<i64, _>("seq")
                .map_err(|e| StoreError::Backend(e.to_string()))? as u64,
            attempts: row
                .try_get::<i64, _>("attempts")
                .map_err(|e| StoreError::Backend(e.to_string()))? as u32,
            status,
            last_error: row
                .try_get("last_error")
                .map_err(|e| StoreError::Backend(e.to_string()))?,
        })
    }

    fn verify(action: QueuedAction) -> Result<QueuedAction, StoreError> {
        if action.verify_payload() {
            Ok(action)
        } else {
            Err(StoreError::Corruption {
                expected: action.payload_hash.clone(),
                actual: QueuedAction::hash_payload(&action.payload),
                id: action.id,
            })
        }
    }
}

#[async_trait]
impl ActionStore for SqliteStore {
    async fn get(&self, id: &str) -> Result<Option<QueuedAction>, StoreError> {
        let row = sqlx::query("SELECT * FROM queued_actions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        match row {
            Some(row) => Ok(Some(Self::verify(Self::map_row(&row)?)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, action: &QueuedAction) -> Result<(), StoreError> {
        let payload_text = serde_json::to_string(&action.payload)
            .map_err(|e| StoreError::Backend(format!("Unserializable payload: {}", e)))?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO queued_actions
                (id, action_type, payload, payload_hash, created_at, seq, attempts, status, last_error)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&action.id)
        .bind(action.action_type.as_str())
        .bind(&payload_text)
        .bind(&action.payload_hash)
        .bind(action.created_at)
        .bind(action.seq as i64)
        .bind(action.attempts as i64)
        .bind(action.status.as_str())
        .bind(&action.last_error)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        debug!(id = %action.id, status = %action.status, "Action persisted");
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM queued_actions WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<QueuedAction>, StoreError> {
        let rows = sqlx::query("SELECT * FROM queued_actions ORDER BY created_at ASC, seq ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        // A corrupted row is excluded rather than failing the whole drain;
        // its id then shows up in the loss report, which is the surface the
        // user actually sees.
        let mut actions = Vec::with_capacity(rows.len());
        for row in &rows {
            match Self::map_row(row).and_then(Self::verify) {
                Ok(action) => actions.push(action),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable queue entry");
                    crate::metrics::record_corruption();
                }
            }
        }
        Ok(actions)
    }

    async fn count_active(&self) -> Result<usize, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM queued_actions WHERE status IN ('pending', 'syncing', 'failed')",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let count: i64 = row
            .try_get("cnt")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(count as usize)
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let expected = serde_json::to_string(&checkpoint.expected)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO queue_checkpoint (slot, expected, recorded_at)
            VALUES (0, ?1, ?2)
            ON CONFLICT(slot) DO UPDATE SET
                expected = excluded.expected,
                recorded_at = excluded.recorded_at
            "#,
        )
        .bind(&expected)
        .bind(checkpoint.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn load_checkpoint(&self) -> Result<Option<Checkpoint>, StoreError> {
        let row = sqlx::query("SELECT expected, recorded_at FROM queue_checkpoint WHERE slot = 0")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expected_text: String = row
            .try_get("expected")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let expected = serde_json::from_str(&expected_text)
            .map_err(|e| StoreError::Backend(format!("Unparseable checkpoint: {}", e)))?;

        Ok(Some(Checkpoint {
            expected,
            recorded_at: row
                .try_get("recorded_at")
                .map_err(|e| StoreError::Backend(e.to_string()))?,
        }))
    }
}
