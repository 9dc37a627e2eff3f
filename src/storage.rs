use std::sync::Mutex;

use rusqlite::params;
use serde::Serialize;

use crate::error::PipelineError;
use crate::open_db_connection;

/// One processed still image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DetectionRecord {
    pub id: i64,
    pub image_name: String,
    pub image_path: String,
    pub count: u32,
}

/// Append-only log of still-image detection counts.
pub trait DetectionStore: Send + Sync {
    /// Append one record and return its assigned id.
    fn append(&self, image_name: &str, image_path: &str, count: u32) -> Result<i64, PipelineError>;

    /// All records in insertion order.
    fn list(&self) -> Result<Vec<DetectionRecord>, PipelineError>;
}

/// SQLite-backed store.
///
/// Every call opens its own connection and closes it on return; concurrent
/// writers rely on SQLite's locking.
pub struct SqliteDetectionStore {
    db_path: String,
}

impl SqliteDetectionStore {
    /// Open the store, creating the schema if absent.
    pub fn open(db_path: &str) -> Result<Self, PipelineError> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    fn ensure_schema(&self) -> Result<(), PipelineError> {
        let conn = open_db_connection(&self.db_path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS detections (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              image_name TEXT NOT NULL,
              image_path TEXT NOT NULL,
              count INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

impl DetectionStore for SqliteDetectionStore {
    fn append(&self, image_name: &str, image_path: &str, count: u32) -> Result<i64, PipelineError> {
        let conn = open_db_connection(&self.db_path)?;
        conn.execute(
            "INSERT INTO detections (image_name, image_path, count) VALUES (?1, ?2, ?3)",
            params![image_name, image_path, count],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn list(&self) -> Result<Vec<DetectionRecord>, PipelineError> {
        let conn = open_db_connection(&self.db_path)?;
        let mut stmt = conn
            .prepare("SELECT id, image_name, image_path, count FROM detections ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(DetectionRecord {
                id: row.get(0)?,
                image_name: row.get(1)?,
                image_path: row.get(2)?,
                count: row.get(3)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

/// In-memory store for tests.
#[derive(Debug, Default)]
pub struct InMemoryDetectionStore {
    records: Mutex<Vec<DetectionRecord>>,
}

impl InMemoryDetectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DetectionStore for InMemoryDetectionStore {
    fn append(&self, image_name: &str, image_path: &str, count: u32) -> Result<i64, PipelineError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| PipelineError::Persistence("record lock poisoned".to_string()))?;
        let id = records.last().map(|r| r.id + 1).unwrap_or(1);
        records.push(DetectionRecord {
            id,
            image_name: image_name.to_string(),
            image_path: image_path.to_string(),
            count,
        });
        Ok(id)
    }

    fn list(&self) -> Result<Vec<DetectionRecord>, PipelineError> {
        let records = self
            .records
            .lock()
            .map_err(|_| PipelineError::Persistence("record lock poisoned".to_string()))?;
        Ok(records.clone())
    }
}
