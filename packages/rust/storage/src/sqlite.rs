//! libSQL-backed bulk sink (local file, offline mode).

use std::path::Path;

use chrono::Utc;
use jobdex_shared::{Document, JobdexError, Result};
use libsql::{Connection, Database, params};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::collection::{BulkCollection, ReplaceOne, filter_id};
use crate::migrations;

fn storage_err(e: impl std::fmt::Display) -> JobdexError {
    JobdexError::Storage(e.to_string())
}

/// Document index stored in a libSQL database.
pub struct SqliteCollection {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl SqliteCollection {
    /// Open or create the index at `path` and bring its schema up to date.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| JobdexError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let collection = Self { db, conn };
        collection.run_migrations().await?;
        Ok(collection)
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    JobdexError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    pub async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            // Table doesn't exist yet
            Err(_) => 0,
        }
    }

    /// Up to `limit` documents in insertion order; 0 returns all of them.
    pub async fn find(&self, limit: usize) -> Result<Vec<Document>> {
        let limit = if limit == 0 { -1 } else { limit as i64 };
        let mut rows = self
            .conn
            .query(
                "SELECT body FROM documents ORDER BY rowid LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(storage_err)?;

        let mut docs = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            docs.push(row_to_document(&row)?);
        }
        Ok(docs)
    }

    pub async fn find_one(&self) -> Result<Option<Document>> {
        Ok(self.find(1).await?.into_iter().next())
    }

    /// The document stored under `id`.
    pub async fn get(&self, id: &str) -> Result<Option<Document>> {
        let mut rows = self
            .conn
            .query("SELECT body FROM documents WHERE id = ?1", params![id])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_document(&row)?)),
            None => Ok(None),
        }
    }

    /// Store `doc`, assigning a fresh id when it has none. Returns the id.
    pub async fn insert_one(&mut self, doc: Document) -> Result<String> {
        let mut ids = self.insert_many([doc]).await?;
        ids.pop()
            .ok_or_else(|| JobdexError::Storage("insert wrote no document".into()))
    }

    /// Store every document in one transaction. Returns their ids in order.
    pub async fn insert_many<I>(&mut self, docs: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = Document>,
    {
        let ops: Vec<ReplaceOne> = docs
            .into_iter()
            .map(|mut doc| {
                let id = doc
                    .id
                    .get_or_insert_with(|| Uuid::now_v7().to_string())
                    .clone();
                ReplaceOne::new(id, doc)
            })
            .collect();
        let ids = ops.iter().map(|op| op.id.clone()).collect();
        self.upsert(&ops).await?;
        Ok(ids)
    }

    /// Insert or replace the document matched by an `{"_id": ..}` filter.
    pub async fn replace_one(&mut self, filter: &Value, doc: Document) -> Result<()> {
        let id = filter_id(filter)?.to_string();
        self.upsert(&[ReplaceOne::new(id, doc)]).await?;
        Ok(())
    }

    /// Upsert `ops` inside one transaction.
    async fn upsert(&mut self, ops: &[ReplaceOne]) -> Result<usize> {
        let tx = self.conn.transaction().await.map_err(storage_err)?;
        let now = Utc::now().to_rfc3339();

        for op in ops {
            let body = serde_json::to_string(&op.doc.to_value())
                .map_err(|e| JobdexError::Storage(format!("cannot encode {}: {e}", op.id)))?;
            tx.execute(
                "INSERT INTO documents (id, format, body, indexed_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                   format = excluded.format,
                   body = excluded.body,
                   indexed_at = excluded.indexed_at",
                params![
                    op.id.as_str(),
                    op.doc.format.as_deref(),
                    body,
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;
        debug!(count = ops.len(), "upsert committed");
        Ok(ops.len())
    }

    pub async fn count(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM documents", params![])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)?.max(0) as u64),
            None => Ok(0),
        }
    }
}

impl BulkCollection for SqliteCollection {
    /// Upsert the batch inside one transaction.
    async fn bulk_write(&mut self, ops: Vec<ReplaceOne>) -> Result<usize> {
        self.upsert(&ops).await
    }
}

fn row_to_document(row: &libsql::Row) -> Result<Document> {
    let body: String = row.get(0).map_err(storage_err)?;
    serde_json::from_str(&body).map_err(|e| JobdexError::Storage(format!("corrupt row: {e}")))
}
