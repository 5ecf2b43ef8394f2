//! Local batch store over SQLite.
//!
//! Owns the durable schema, atomic batch upserts and the generic read
//! path every other component uses. One long-lived connection is shared
//! behind a mutex; callers never touch SQLite directly except through
//! the guarded [`BatchStore::execute_read_only`] escape hatch.

use crate::types::{Batch, ProcessSample};
use chrono::Utc;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

/// Store operation failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Required batch fields missing or out of range
    #[error("validation failed: {0}")]
    Validation(String),

    /// Non-read statement submitted to the read-only executor
    #[error("unsafe query rejected: {0}")]
    UnsafeQuery(String),

    /// Batch id not present in the store
    #[error("batch not found: {0}")]
    BatchNotFound(String),

    /// SQLite I/O or constraint violation
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A previous caller panicked while holding the connection
    #[error("store connection lock poisoned")]
    LockPoisoned,
}

/// Tabular result of the read-only query executor.
#[derive(Debug, Clone)]
pub struct QueryTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Column list shared by every batch SELECT, in schema order.
const BATCH_COLUMNS: &str = "batch_id, extraction_date, sulfate_number, sample_weight, \
     ni_percent, cu_percent, pt_percent, pd_percent, sio2_percent, c_percent, se_percent, \
     extraction_percent, process_duration, quality_rating, operator_id, notes, created_at, is_good";

/// Column list shared by every telemetry SELECT, in schema order.
const SAMPLE_COLUMNS: &str = "timestamp, temperature_1, temperature_2, temperature_3, \
     acid_flow, current_value, electrodes_pos, level_mixer, optimal_temp";

/// Persistent store for batches and their telemetry.
///
/// The connection is created once and reused for the process lifetime.
/// Access is serialized through an internal mutex, so the store is safe
/// to share across threads (`Arc<BatchStore>`), one operation at a time.
pub struct BatchStore {
    conn: Mutex<Connection>,
}

impl BatchStore {
    /// Open (or create) the store at `path` and initialize the schema.
    ///
    /// Parent directories are created as needed. Safe to call on every
    /// startup: schema creation is idempotent.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Validation(format!("cannot create db dir: {e}")))?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Create tables and indices if absent. Idempotent.
    pub fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS batches (
                batch_id TEXT PRIMARY KEY,
                extraction_date DATE NOT NULL,
                sulfate_number INTEGER NOT NULL,
                sample_weight REAL NOT NULL,
                ni_percent REAL DEFAULT 0,
                cu_percent REAL DEFAULT 0,
                pt_percent REAL DEFAULT 0,
                pd_percent REAL DEFAULT 0,
                sio2_percent REAL DEFAULT 0,
                c_percent REAL DEFAULT 0,
                se_percent REAL DEFAULT 0,
                extraction_percent REAL NOT NULL,
                process_duration INTEGER,
                quality_rating INTEGER CHECK(quality_rating BETWEEN 1 AND 5),
                operator_id TEXT,
                notes TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                is_good BOOLEAN DEFAULT 1
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS process_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                batch_id TEXT NOT NULL,
                timestamp DATETIME NOT NULL,
                temperature_1 REAL,
                temperature_2 REAL,
                temperature_3 REAL,
                acid_flow REAL,
                current_value REAL,
                electrodes_pos REAL DEFAULT 0,
                level_mixer REAL DEFAULT 0,
                optimal_temp REAL,
                FOREIGN KEY (batch_id) REFERENCES batches(batch_id)
            )",
            [],
        )?;

        // Supports similarity scans over the full composition vector
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_batch_composition
             ON batches(ni_percent, cu_percent, pt_percent, pd_percent,
                        sio2_percent, c_percent, se_percent)",
            [],
        )?;

        // Supports ordered telemetry retrieval per batch
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_process_batch_time
             ON process_data(batch_id, timestamp)",
            [],
        )?;

        info!("Batch store schema initialized");
        Ok(())
    }

    /// Insert-or-replace a batch keyed by `batch_id`.
    ///
    /// `created_at` is set on first write only; a replacement keeps the
    /// original creation timestamp. Validation runs before any SQL, so a
    /// rejected batch leaves no partial write behind.
    pub fn upsert_batch(&self, batch: &Batch) -> Result<(), StoreError> {
        validate_batch(batch)?;

        let created_at = batch.created_at.unwrap_or_else(Utc::now);
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO batches (
                batch_id, extraction_date, sulfate_number, sample_weight,
                ni_percent, cu_percent, pt_percent, pd_percent,
                sio2_percent, c_percent, se_percent, extraction_percent,
                process_duration, quality_rating, operator_id, notes,
                created_at, is_good
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            ON CONFLICT(batch_id) DO UPDATE SET
                extraction_date = excluded.extraction_date,
                sulfate_number = excluded.sulfate_number,
                sample_weight = excluded.sample_weight,
                ni_percent = excluded.ni_percent,
                cu_percent = excluded.cu_percent,
                pt_percent = excluded.pt_percent,
                pd_percent = excluded.pd_percent,
                sio2_percent = excluded.sio2_percent,
                c_percent = excluded.c_percent,
                se_percent = excluded.se_percent,
                extraction_percent = excluded.extraction_percent,
                process_duration = excluded.process_duration,
                quality_rating = excluded.quality_rating,
                operator_id = excluded.operator_id,
                notes = excluded.notes,
                is_good = excluded.is_good",
            params![
                batch.batch_id,
                batch.extraction_date,
                batch.sulfate_number,
                batch.sample_weight,
                batch.ni_percent,
                batch.cu_percent,
                batch.pt_percent,
                batch.pd_percent,
                batch.sio2_percent,
                batch.c_percent,
                batch.se_percent,
                batch.extraction_percent,
                batch.process_duration,
                batch.quality_rating,
                batch.operator_id,
                batch.notes,
                created_at,
                batch.is_good,
            ],
        )?;

        debug!(batch_id = %batch.batch_id, "Batch upserted");
        Ok(())
    }

    /// Bulk-insert telemetry rows for `batch_id`, in one transaction.
    ///
    /// Append-only: no duplicate detection, no deletion. The caller is
    /// responsible for not double-importing. Zero samples is a no-op.
    pub fn append_process_samples(
        &self,
        batch_id: &str,
        samples: &[ProcessSample],
    ) -> Result<(), StoreError> {
        if samples.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO process_data
                 (batch_id, timestamp, temperature_1, temperature_2, temperature_3,
                  acid_flow, current_value, electrodes_pos, level_mixer, optimal_temp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for sample in samples {
                stmt.execute(params![
                    batch_id,
                    sample.timestamp,
                    sample.temperature_1,
                    sample.temperature_2,
                    sample.temperature_3,
                    sample.acid_flow,
                    sample.current_value,
                    sample.electrodes_pos,
                    sample.level_mixer,
                    sample.optimal_temp,
                ])?;
            }
        }
        tx.commit()?;

        debug!(batch_id = %batch_id, count = samples.len(), "Telemetry appended");
        Ok(())
    }

    /// Full scan of all batches, in stable insertion order.
    ///
    /// Reads the committed state at call time; nothing is cached.
    pub fn list_all_batches(&self) -> Result<Vec<Batch>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {BATCH_COLUMNS} FROM batches ORDER BY rowid"))?;
        let batches = stmt
            .query_map([], batch_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(batches)
    }

    /// Telemetry for one batch, ordered by timestamp ascending.
    pub fn get_process_samples(&self, batch_id: &str) -> Result<Vec<ProcessSample>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM process_data WHERE batch_id = ?1 ORDER BY timestamp"
        ))?;
        let samples = stmt
            .query_map(params![batch_id], sample_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    /// Good batches whose charge weight lies within `tolerance_pct` of
    /// `weight`, best extraction first.
    pub fn find_batches_by_weight_range(
        &self,
        weight: f64,
        tolerance_pct: f64,
        limit: usize,
    ) -> Result<Vec<Batch>, StoreError> {
        let min_weight = weight * (1.0 - tolerance_pct);
        let max_weight = weight * (1.0 + tolerance_pct);

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches
             WHERE is_good = 1 AND sample_weight BETWEEN ?1 AND ?2
             ORDER BY extraction_percent DESC
             LIMIT ?3"
        ))?;
        let batches = stmt
            .query_map(params![min_weight, max_weight, limit as i64], batch_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(batches)
    }

    /// Pooled telemetry of qualified batches for forecaster training:
    /// every sample of `is_good` batches at or above `min_extraction`,
    /// globally ordered by timestamp, capped at `limit` rows.
    pub fn pooled_good_samples(
        &self,
        min_extraction: f64,
        limit: usize,
    ) -> Result<Vec<ProcessSample>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM process_data p
             JOIN batches b ON p.batch_id = b.batch_id
             WHERE b.is_good = 1 AND b.extraction_percent >= ?1
             ORDER BY p.timestamp
             LIMIT ?2",
            SAMPLE_COLUMNS
                .split(", ")
                .map(|c| format!("p.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        ))?;
        let samples = stmt
            .query_map(params![min_extraction, limit as i64], sample_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    /// Execute an arbitrary read-only statement.
    ///
    /// Only statements whose first keyword is `SELECT` are accepted;
    /// everything else is rejected before reaching SQLite. This is the
    /// single general-purpose escape hatch for the GUI layer and must
    /// keep this guard in front of any untrusted input.
    pub fn execute_read_only(&self, query: &str) -> Result<QueryTable, StoreError> {
        let first_word = query
            .trim_start()
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        if first_word != "select" {
            return Err(StoreError::UnsafeQuery(format!(
                "only SELECT statements are allowed, got '{first_word}'"
            )));
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(query)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let ncols = columns.len();

        let mut rows = Vec::new();
        let mut raw_rows = stmt.query([])?;
        while let Some(row) = raw_rows.next()? {
            let mut record = Vec::with_capacity(ncols);
            for i in 0..ncols {
                record.push(value_ref_to_json(row.get_ref(i)?));
            }
            rows.push(record);
        }

        Ok(QueryTable { columns, rows })
    }

    /// Remove a batch and all its telemetry in one transaction.
    ///
    /// An unknown `batch_id` fails loudly with [`StoreError::BatchNotFound`];
    /// nothing is deleted in that case.
    pub fn delete_batch(&self, batch_id: &str) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM process_data WHERE batch_id = ?1",
            params![batch_id],
        )?;
        let affected = tx.execute("DELETE FROM batches WHERE batch_id = ?1", params![batch_id])?;
        if affected == 0 {
            // Dropping the transaction rolls back the telemetry delete
            return Err(StoreError::BatchNotFound(batch_id.to_string()));
        }
        tx.commit()?;

        info!(batch_id = %batch_id, "Batch and telemetry deleted");
        Ok(())
    }
}

fn validate_batch(batch: &Batch) -> Result<(), StoreError> {
    if batch.batch_id.trim().is_empty() {
        return Err(StoreError::Validation("batch_id must not be empty".into()));
    }
    if !batch.sample_weight.is_finite() || batch.sample_weight <= 0.0 {
        return Err(StoreError::Validation(format!(
            "sample_weight must be positive, got {}",
            batch.sample_weight
        )));
    }
    if !batch.extraction_percent.is_finite()
        || !(0.0..=100.0).contains(&batch.extraction_percent)
    {
        return Err(StoreError::Validation(format!(
            "extraction_percent must be in [0, 100], got {}",
            batch.extraction_percent
        )));
    }
    for (name, value) in batch.composition() {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(StoreError::Validation(format!(
                "{name} must be in [0, 100], got {value}"
            )));
        }
    }
    if let Some(rating) = batch.quality_rating {
        if !(1..=5).contains(&rating) {
            return Err(StoreError::Validation(format!(
                "quality_rating must be in 1..=5, got {rating}"
            )));
        }
    }
    Ok(())
}

fn batch_from_row(row: &rusqlite::Row<'_>) -> Result<Batch, rusqlite::Error> {
    Ok(Batch {
        batch_id: row.get(0)?,
        extraction_date: row.get(1)?,
        sulfate_number: row.get(2)?,
        sample_weight: row.get(3)?,
        ni_percent: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
        cu_percent: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
        pt_percent: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
        pd_percent: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
        sio2_percent: row.get::<_, Option<f64>>(8)?.unwrap_or(0.0),
        c_percent: row.get::<_, Option<f64>>(9)?.unwrap_or(0.0),
        se_percent: row.get::<_, Option<f64>>(10)?.unwrap_or(0.0),
        extraction_percent: row.get(11)?,
        process_duration: row.get(12)?,
        quality_rating: row.get(13)?,
        operator_id: row.get(14)?,
        notes: row.get(15)?,
        created_at: row.get(16)?,
        is_good: row.get::<_, Option<bool>>(17)?.unwrap_or(true),
    })
}

fn sample_from_row(row: &rusqlite::Row<'_>) -> Result<ProcessSample, rusqlite::Error> {
    Ok(ProcessSample {
        timestamp: row.get(0)?,
        temperature_1: row.get(1)?,
        temperature_2: row.get(2)?,
        temperature_3: row.get(3)?,
        acid_flow: row.get(4)?,
        current_value: row.get(5)?,
        electrodes_pos: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
        level_mixer: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
        optimal_temp: row.get(8)?,
    })
}

fn value_ref_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(format!("<blob {} bytes>", b.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_batch(batch_id: &str, weight: f64, extraction: f64) -> Batch {
        Batch {
            batch_id: batch_id.to_string(),
            extraction_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            sulfate_number: 2,
            sample_weight: weight,
            ni_percent: 1.5,
            cu_percent: 1.5,
            pt_percent: 8.0,
            pd_percent: 33.0,
            sio2_percent: 10.0,
            c_percent: 10.0,
            se_percent: 1.5,
            extraction_percent: extraction,
            process_duration: Some(480),
            quality_rating: Some(5),
            operator_id: Some("OP-7".to_string()),
            notes: None,
            created_at: None,
            is_good: true,
        }
    }

    fn make_sample(ts: &str, temp1: f64) -> ProcessSample {
        let mut sample = ProcessSample::empty(
            chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S").unwrap(),
        );
        sample.temperature_1 = Some(temp1);
        sample
    }

    #[test]
    fn test_schema_init_is_idempotent() {
        let store = BatchStore::open_in_memory().unwrap();
        store.initialize_schema().unwrap();
        store.initialize_schema().unwrap();
    }

    #[test]
    fn test_upsert_is_idempotent_on_batch_id() {
        let store = BatchStore::open_in_memory().unwrap();
        let batch = make_batch("P-001", 1000.0, 93.0);

        store.upsert_batch(&batch).unwrap();
        store.upsert_batch(&batch).unwrap();

        let all = store.list_all_batches().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].batch_id, "P-001");
    }

    #[test]
    fn test_upsert_replaces_attributes() {
        let store = BatchStore::open_in_memory().unwrap();
        store.upsert_batch(&make_batch("P-001", 1000.0, 88.0)).unwrap();

        let mut updated = make_batch("P-001", 1010.0, 93.0);
        updated.notes = Some("re-assayed".to_string());
        store.upsert_batch(&updated).unwrap();

        let all = store.list_all_batches().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].extraction_percent, 93.0);
        assert_eq!(all[0].sample_weight, 1010.0);
        assert_eq!(all[0].notes.as_deref(), Some("re-assayed"));
    }

    #[test]
    fn test_created_at_survives_replacement() {
        let store = BatchStore::open_in_memory().unwrap();
        let mut batch = make_batch("P-001", 1000.0, 88.0);
        batch.created_at =
            Some(chrono::DateTime::parse_from_rfc3339("2024-01-01T08:00:00Z").unwrap().into());
        store.upsert_batch(&batch).unwrap();

        // Replacement carries no creation timestamp of its own
        store.upsert_batch(&make_batch("P-001", 1000.0, 93.0)).unwrap();

        let stored = &store.list_all_batches().unwrap()[0];
        let created = stored.created_at.unwrap();
        assert_eq!(created.to_rfc3339(), "2024-01-01T08:00:00+00:00");
    }

    #[test]
    fn test_upsert_rejects_missing_required_fields() {
        let store = BatchStore::open_in_memory().unwrap();

        let mut no_id = make_batch("", 1000.0, 93.0);
        no_id.batch_id = "   ".to_string();
        assert!(matches!(
            store.upsert_batch(&no_id),
            Err(StoreError::Validation(_))
        ));

        let zero_weight = make_batch("P-002", 0.0, 93.0);
        assert!(matches!(
            store.upsert_batch(&zero_weight),
            Err(StoreError::Validation(_))
        ));

        let mut bad_extraction = make_batch("P-003", 1000.0, 93.0);
        bad_extraction.extraction_percent = 130.0;
        assert!(matches!(
            store.upsert_batch(&bad_extraction),
            Err(StoreError::Validation(_))
        ));

        // Nothing was written
        assert!(store.list_all_batches().unwrap().is_empty());
    }

    #[test]
    fn test_telemetry_returned_in_timestamp_order() {
        let store = BatchStore::open_in_memory().unwrap();
        store.upsert_batch(&make_batch("P-001", 1000.0, 93.0)).unwrap();

        // Inserted out of order on purpose
        let samples = vec![
            make_sample("2024-03-15 08:02:00", 87.0),
            make_sample("2024-03-15 08:00:00", 85.0),
            make_sample("2024-03-15 08:01:00", 86.0),
        ];
        store.append_process_samples("P-001", &samples).unwrap();

        let stored = store.get_process_samples("P-001").unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].temperature_1, Some(85.0));
        assert_eq!(stored[1].temperature_1, Some(86.0));
        assert_eq!(stored[2].temperature_1, Some(87.0));
    }

    #[test]
    fn test_append_empty_telemetry_is_noop() {
        let store = BatchStore::open_in_memory().unwrap();
        store.upsert_batch(&make_batch("P-001", 1000.0, 93.0)).unwrap();
        store.append_process_samples("P-001", &[]).unwrap();
        assert!(store.get_process_samples("P-001").unwrap().is_empty());
    }

    #[test]
    fn test_append_is_append_only() {
        let store = BatchStore::open_in_memory().unwrap();
        store.upsert_batch(&make_batch("P-001", 1000.0, 93.0)).unwrap();

        let sample = vec![make_sample("2024-03-15 08:00:00", 85.0)];
        store.append_process_samples("P-001", &sample).unwrap();
        store.append_process_samples("P-001", &sample).unwrap();

        // Duplicate detection is the caller's job
        assert_eq!(store.get_process_samples("P-001").unwrap().len(), 2);
    }

    #[test]
    fn test_weight_range_query_filters_and_orders() {
        let store = BatchStore::open_in_memory().unwrap();
        store.upsert_batch(&make_batch("LIGHT", 500.0, 95.0)).unwrap();
        store.upsert_batch(&make_batch("A", 1000.0, 88.0)).unwrap();
        store.upsert_batch(&make_batch("B", 1050.0, 94.0)).unwrap();
        let mut bad = make_batch("BAD", 1000.0, 99.0);
        bad.is_good = false;
        store.upsert_batch(&bad).unwrap();

        let found = store.find_batches_by_weight_range(1000.0, 0.15, 10).unwrap();
        let ids: Vec<_> = found.iter().map(|b| b.batch_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A"]);
    }

    #[test]
    fn test_read_only_executor_accepts_select() {
        let store = BatchStore::open_in_memory().unwrap();
        store.upsert_batch(&make_batch("P-001", 1000.0, 93.0)).unwrap();

        let table = store
            .execute_read_only("  SELECT batch_id, sample_weight FROM batches")
            .unwrap();
        assert_eq!(table.columns, vec!["batch_id", "sample_weight"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][0], serde_json::json!("P-001"));
        assert_eq!(table.rows[0][1], serde_json::json!(1000.0));
    }

    #[test]
    fn test_read_only_executor_rejects_writes() {
        let store = BatchStore::open_in_memory().unwrap();
        store.upsert_batch(&make_batch("P-001", 1000.0, 93.0)).unwrap();

        for stmt in [
            "DELETE FROM batches",
            "UPDATE batches SET is_good = 0",
            "DROP TABLE batches",
            "INSERT INTO batches (batch_id) VALUES ('X')",
            "PRAGMA foreign_keys = OFF",
            "WITH x AS (SELECT 1) DELETE FROM batches",
        ] {
            assert!(
                matches!(store.execute_read_only(stmt), Err(StoreError::UnsafeQuery(_))),
                "statement should have been rejected: {stmt}"
            );
        }

        // Store untouched
        assert_eq!(store.list_all_batches().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_batch_removes_telemetry_too() {
        let store = BatchStore::open_in_memory().unwrap();
        store.upsert_batch(&make_batch("P-001", 1000.0, 93.0)).unwrap();
        store
            .append_process_samples("P-001", &[make_sample("2024-03-15 08:00:00", 85.0)])
            .unwrap();

        store.delete_batch("P-001").unwrap();

        assert!(store.list_all_batches().unwrap().is_empty());
        assert!(store.get_process_samples("P-001").unwrap().is_empty());
    }

    #[test]
    fn test_delete_unknown_batch_fails_loudly() {
        let store = BatchStore::open_in_memory().unwrap();
        assert!(matches!(
            store.delete_batch("NOPE"),
            Err(StoreError::BatchNotFound(_))
        ));
    }

    #[test]
    fn test_pooled_samples_exclude_poor_batches() {
        let store = BatchStore::open_in_memory().unwrap();
        store.upsert_batch(&make_batch("GOOD", 1000.0, 93.0)).unwrap();
        store.upsert_batch(&make_batch("LOW", 1000.0, 70.0)).unwrap();
        let mut bad = make_batch("BAD", 1000.0, 95.0);
        bad.is_good = false;
        store.upsert_batch(&bad).unwrap();

        store
            .append_process_samples("GOOD", &[make_sample("2024-03-15 08:00:00", 85.0)])
            .unwrap();
        store
            .append_process_samples("LOW", &[make_sample("2024-03-15 08:00:00", 70.0)])
            .unwrap();
        store
            .append_process_samples("BAD", &[make_sample("2024-03-15 08:00:00", 99.0)])
            .unwrap();

        let pooled = store.pooled_good_samples(85.0, 1000).unwrap();
        assert_eq!(pooled.len(), 1);
        assert_eq!(pooled[0].temperature_1, Some(85.0));
    }
}
