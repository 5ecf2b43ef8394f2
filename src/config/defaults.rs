//! System-wide default constants.
//!
//! Centralises the fixed process and model constants that are not
//! operator-tunable. Grouped by subsystem.

// ============================================================================
// Recommender
// ============================================================================

/// Relative tolerance on charge weight when matching historical batches.
pub const MASS_TOLERANCE: f64 = 0.05;

/// Relative tolerance per composition feature.
pub const COMPOSITION_TOLERANCE: f64 = 0.05;

/// Maximum number of composition features allowed outside tolerance.
///
/// Seven features total, so a candidate must match on at least four.
pub const MAX_COMPOSITION_MISMATCHES: usize = 3;

// ============================================================================
// Forecaster
// ============================================================================

/// Telemetry window length per supervised example (samples).
pub const FORECAST_WINDOW: usize = 6;

/// Telemetry channels fed into the feature vector, in order.
pub const FORECAST_CHANNELS: usize = 5;

/// Minimum supervised examples required before training proceeds.
pub const MIN_TRAINING_EXAMPLES: usize = 100;

/// Held-out fraction for the train/test split.
pub const TEST_FRACTION: f64 = 0.2;

/// z-score for the 95% ensemble-disagreement band.
pub const CONFIDENCE_Z: f64 = 1.96;

/// Optimal primary-temperature band for the sulfatization reaction (°C).
pub const OPTIMAL_TEMP_BAND: (f64, f64) = (85.0, 95.0);

/// Minimum extraction percent for a batch to join the pooled training set.
pub const POOLED_MIN_EXTRACTION: f64 = 85.0;

/// Cap on pooled training telemetry rows.
pub const POOLED_SAMPLE_LIMIT: usize = 10_000;

// ============================================================================
// Importer
// ============================================================================

/// Minimum remote quality rating for a batch to qualify for import.
pub const IMPORT_MIN_QUALITY_RATING: i64 = 4;

/// Default extraction threshold for qualifying imports (%).
pub const IMPORT_MIN_EXTRACTION: f64 = 85.0;
