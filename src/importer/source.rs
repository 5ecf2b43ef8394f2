//! External production database access.
//!
//! The importer is written against the [`BatchSource`] trait so the sync
//! logic stays dialect-neutral; this module provides the PostgreSQL
//! implementation plus the loosely-typed row records and the
//! parse-or-null numeric coercion applied to remote columns.

use crate::config::defaults::IMPORT_MIN_QUALITY_RATING;
use crate::types::{Batch, ProcessSample};
use chrono::{NaiveDate, NaiveDateTime};
use postgres::{Client, NoTls};
use tracing::warn;

use super::ImportError;

/// A qualifying batch row as it arrives from the remote database.
///
/// Composition columns already carry the parse-or-null coercion result;
/// a missing composition value becomes the schema default 0.
#[derive(Debug, Clone)]
pub struct RemoteBatchRow {
    pub batch_id: String,
    pub extraction_date: NaiveDate,
    pub sulfate_number: i64,
    pub sample_weight: f64,
    pub composition: [f64; 7],
    pub extraction_percent: f64,
    pub process_duration: Option<i64>,
    pub quality_rating: Option<i64>,
    pub operator_id: Option<String>,
    pub notes: Option<String>,
}

impl RemoteBatchRow {
    /// Convert into a store batch. Imported batches are qualified runs,
    /// so `is_good` is set; `created_at` is left for the store.
    pub fn into_batch(self) -> Batch {
        let [ni, cu, pt, pd, sio2, c, se] = self.composition;
        Batch {
            batch_id: self.batch_id,
            extraction_date: self.extraction_date,
            sulfate_number: self.sulfate_number,
            sample_weight: self.sample_weight,
            ni_percent: ni,
            cu_percent: cu,
            pt_percent: pt,
            pd_percent: pd,
            sio2_percent: sio2,
            c_percent: c,
            se_percent: se,
            extraction_percent: self.extraction_percent,
            process_duration: self.process_duration,
            quality_rating: self.quality_rating,
            operator_id: self.operator_id,
            notes: self.notes,
            created_at: None,
            is_good: true,
        }
    }
}

/// A telemetry row as it arrives from the remote `process_history` table.
///
/// Only the five measured channels travel over the wire; electrode
/// position and mixer level fall back to their schema defaults locally.
#[derive(Debug, Clone)]
pub struct RemoteSampleRow {
    pub timestamp: NaiveDateTime,
    pub temperature_1: Option<f64>,
    pub temperature_2: Option<f64>,
    pub temperature_3: Option<f64>,
    pub acid_flow: Option<f64>,
    pub current_value: Option<f64>,
}

impl RemoteSampleRow {
    pub fn into_sample(self) -> ProcessSample {
        let mut sample = ProcessSample::empty(self.timestamp);
        sample.temperature_1 = self.temperature_1;
        sample.temperature_2 = self.temperature_2;
        sample.temperature_3 = self.temperature_3;
        sample.acid_flow = self.acid_flow;
        sample.current_value = self.current_value;
        sample
    }
}

/// Read access to a remote production database.
pub trait BatchSource {
    /// Trivial liveness probe (`SELECT 1`).
    fn probe(&mut self) -> Result<(), ImportError>;

    /// Qualifying batches: completed on or after `cutoff`, extraction at
    /// or above `min_extraction`, remote quality rating at least 4.
    fn fetch_qualifying_batches(
        &mut self,
        cutoff: NaiveDate,
        min_extraction: f64,
    ) -> Result<Vec<RemoteBatchRow>, ImportError>;

    /// Full telemetry for one batch, ordered by timestamp.
    fn fetch_process_history(
        &mut self,
        batch_id: &str,
    ) -> Result<Vec<RemoteSampleRow>, ImportError>;
}

/// Parse-or-null numeric coercion for loosely-typed remote columns.
///
/// Non-numeric or empty input becomes `None`, never zero; the caller
/// decides whether the target column carries a default.
pub fn parse_or_null(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

// ============================================================================
// PostgreSQL source
// ============================================================================

/// PostgreSQL-backed [`BatchSource`] over a blocking client.
///
/// Remote queries block the caller for their full duration; there is no
/// timeout or cancellation (retry policy is external).
pub struct PostgresSource {
    client: Client,
}

impl PostgresSource {
    /// Connect with a `postgres://` connection string.
    pub fn connect(connection_string: &str) -> Result<Self, ImportError> {
        let client = Client::connect(connection_string, NoTls)
            .map_err(|e| ImportError::Connection(e.to_string()))?;
        Ok(Self { client })
    }
}

impl BatchSource for PostgresSource {
    fn probe(&mut self) -> Result<(), ImportError> {
        self.client
            .simple_query("SELECT 1")
            .map_err(|e| ImportError::Connection(e.to_string()))?;
        Ok(())
    }

    fn fetch_qualifying_batches(
        &mut self,
        cutoff: NaiveDate,
        min_extraction: f64,
    ) -> Result<Vec<RemoteBatchRow>, ImportError> {
        // Cutoff is computed locally so the predicate stays dialect-neutral;
        // the quality floor is a fixed process constant, not caller input.
        let query = format!(
            "SELECT batch_id, extraction_date, sulfate_number, sample_weight, \
                    ni_percent, cu_percent, pt_percent, pd_percent, \
                    sio2_percent, c_percent, se_percent, extraction_percent, \
                    process_duration, quality_rating, operator_id, notes \
             FROM production_batches \
             WHERE extraction_date >= $1 \
               AND extraction_percent >= $2 \
               AND quality_rating >= {IMPORT_MIN_QUALITY_RATING} \
             ORDER BY extraction_date DESC"
        );
        let rows = self
            .client
            .query(query.as_str(), &[&cutoff, &min_extraction])
            .map_err(|e| ImportError::Query(e.to_string()))?;

        let mut batches = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(batch_id) = get_string(&row, 0) else {
                warn!("Skipping remote batch row without batch_id");
                continue;
            };
            let Some(extraction_date) = row.try_get::<_, NaiveDate>(1).ok() else {
                warn!(batch_id = %batch_id, "Skipping remote batch row without extraction_date");
                continue;
            };
            batches.push(RemoteBatchRow {
                batch_id,
                extraction_date,
                sulfate_number: get_i64(&row, 2).unwrap_or(0),
                sample_weight: get_f64(&row, 3).unwrap_or(0.0),
                composition: [
                    get_f64(&row, 4).unwrap_or(0.0),
                    get_f64(&row, 5).unwrap_or(0.0),
                    get_f64(&row, 6).unwrap_or(0.0),
                    get_f64(&row, 7).unwrap_or(0.0),
                    get_f64(&row, 8).unwrap_or(0.0),
                    get_f64(&row, 9).unwrap_or(0.0),
                    get_f64(&row, 10).unwrap_or(0.0),
                ],
                extraction_percent: get_f64(&row, 11).unwrap_or(0.0),
                process_duration: get_i64(&row, 12),
                quality_rating: get_i64(&row, 13),
                operator_id: get_string(&row, 14),
                notes: get_string(&row, 15),
            });
        }
        Ok(batches)
    }

    fn fetch_process_history(
        &mut self,
        batch_id: &str,
    ) -> Result<Vec<RemoteSampleRow>, ImportError> {
        let rows = self
            .client
            .query(
                "SELECT timestamp, temperature_1, temperature_2, temperature_3, \
                        acid_flow, current_value \
                 FROM process_history \
                 WHERE batch_id = $1 \
                 ORDER BY timestamp",
                &[&batch_id],
            )
            .map_err(|e| ImportError::Query(e.to_string()))?;

        let mut samples = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(timestamp) = row.try_get::<_, NaiveDateTime>(0).ok() else {
                warn!(batch_id = %batch_id, "Skipping telemetry row without timestamp");
                continue;
            };
            samples.push(RemoteSampleRow {
                timestamp,
                temperature_1: get_f64(&row, 1),
                temperature_2: get_f64(&row, 2),
                temperature_3: get_f64(&row, 3),
                acid_flow: get_f64(&row, 4),
                current_value: get_f64(&row, 5),
            });
        }
        Ok(samples)
    }
}

/// Lenient f64 read: accepts float, integer or text columns; anything
/// non-numeric becomes `None` (parse-or-null, never zero).
fn get_f64(row: &postgres::Row, idx: usize) -> Option<f64> {
    if let Ok(v) = row.try_get::<_, Option<f64>>(idx) {
        return v;
    }
    if let Ok(v) = row.try_get::<_, Option<f32>>(idx) {
        return v.map(f64::from);
    }
    if let Ok(v) = row.try_get::<_, Option<i64>>(idx) {
        return v.map(|i| i as f64);
    }
    if let Ok(v) = row.try_get::<_, Option<i32>>(idx) {
        return v.map(f64::from);
    }
    if let Ok(Some(v)) = row.try_get::<_, Option<String>>(idx) {
        return parse_or_null(&v);
    }
    None
}

/// Lenient i64 read across the common integer widths.
fn get_i64(row: &postgres::Row, idx: usize) -> Option<i64> {
    if let Ok(v) = row.try_get::<_, Option<i64>>(idx) {
        return v;
    }
    if let Ok(v) = row.try_get::<_, Option<i32>>(idx) {
        return v.map(i64::from);
    }
    if let Ok(v) = row.try_get::<_, Option<i16>>(idx) {
        return v.map(i64::from);
    }
    if let Ok(Some(v)) = row.try_get::<_, Option<String>>(idx) {
        return v.trim().parse().ok();
    }
    None
}

fn get_string(row: &postgres::Row, idx: usize) -> Option<String> {
    row.try_get::<_, Option<String>>(idx)
        .ok()
        .flatten()
        .filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_null_semantics() {
        assert_eq!(parse_or_null("92.5"), Some(92.5));
        assert_eq!(parse_or_null("  7 "), Some(7.0));
        assert_eq!(parse_or_null("-0.5"), Some(-0.5));
        // Missing or malformed is null, never zero
        assert_eq!(parse_or_null(""), None);
        assert_eq!(parse_or_null("   "), None);
        assert_eq!(parse_or_null("n/a"), None);
        assert_eq!(parse_or_null("12,5"), None);
        assert_eq!(parse_or_null("NaN"), None);
        assert_eq!(parse_or_null("inf"), None);
    }

    #[test]
    fn test_remote_batch_row_marks_import_as_good() {
        let row = RemoteBatchRow {
            batch_id: "P-010".to_string(),
            extraction_date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            sulfate_number: 3,
            sample_weight: 980.0,
            composition: [1.5, 1.4, 8.2, 32.0, 10.5, 9.8, 1.6],
            extraction_percent: 91.0,
            process_duration: None,
            quality_rating: Some(5),
            operator_id: None,
            notes: None,
        };
        let batch = row.into_batch();
        assert!(batch.is_good);
        assert!(batch.created_at.is_none());
        assert_eq!(batch.pd_percent, 32.0);
    }

    #[test]
    fn test_remote_sample_defaults_unmeasured_channels() {
        let row = RemoteSampleRow {
            timestamp: NaiveDateTime::parse_from_str("2024-05-02 08:00:00", "%Y-%m-%d %H:%M:%S")
                .unwrap(),
            temperature_1: Some(86.0),
            temperature_2: None,
            temperature_3: None,
            acid_flow: Some(1.2),
            current_value: None,
        };
        let sample = row.into_sample();
        assert_eq!(sample.temperature_1, Some(86.0));
        assert_eq!(sample.temperature_2, None);
        // Columns with a schema default are zeroed, not nulled
        assert_eq!(sample.electrodes_pos, 0.0);
        assert_eq!(sample.level_mixer, 0.0);
        assert_eq!(sample.optimal_temp, None);
    }
}
