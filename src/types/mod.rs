//! Core domain types: Batch, ProcessSample, ProposedCharge, Forecast

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Names of the seven composition columns, in schema order.
///
/// Shared by the store (index DDL), the recommender (tolerance checks)
/// and the importer (remote column mapping).
pub const COMPOSITION_FEATURES: [&str; 7] = [
    "ni_percent",
    "cu_percent",
    "pt_percent",
    "pd_percent",
    "sio2_percent",
    "c_percent",
    "se_percent",
];

/// One completed production run.
///
/// `batch_id` is the sole identity: re-upserting the same id replaces the
/// stored attributes rather than creating a second row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// Externally assigned, stable string key
    pub batch_id: String,
    /// Date the extraction run completed
    pub extraction_date: NaiveDate,
    /// Reactor unit number
    pub sulfate_number: i64,
    /// Charge weight (kg)
    pub sample_weight: f64,
    pub ni_percent: f64,
    pub cu_percent: f64,
    pub pt_percent: f64,
    pub pd_percent: f64,
    pub sio2_percent: f64,
    pub c_percent: f64,
    pub se_percent: f64,
    /// Yield (%)
    pub extraction_percent: f64,
    /// Run duration (minutes)
    pub process_duration: Option<i64>,
    /// Operator rating, 1-5
    pub quality_rating: Option<i64>,
    pub operator_id: Option<String>,
    pub notes: Option<String>,
    /// Set by the store on first write, preserved across replacements
    pub created_at: Option<DateTime<Utc>>,
    /// Outcome flag (qualified run)
    pub is_good: bool,
}

impl Batch {
    /// Composition values paired with their column names, in schema order.
    pub fn composition(&self) -> [(&'static str, f64); 7] {
        [
            ("ni_percent", self.ni_percent),
            ("cu_percent", self.cu_percent),
            ("pt_percent", self.pt_percent),
            ("pd_percent", self.pd_percent),
            ("sio2_percent", self.sio2_percent),
            ("c_percent", self.c_percent),
            ("se_percent", self.se_percent),
        ]
    }
}

/// One timestamped telemetry reading belonging to exactly one batch.
///
/// Telemetry is append-only: rows are bulk-inserted alongside their batch
/// and never individually patched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSample {
    /// Non-decreasing within a batch, not required unique
    pub timestamp: NaiveDateTime,
    /// Primary reactor solution temperature (°C)
    pub temperature_1: Option<f64>,
    pub temperature_2: Option<f64>,
    pub temperature_3: Option<f64>,
    /// Acid feed rate
    pub acid_flow: Option<f64>,
    /// Electrode current
    pub current_value: Option<f64>,
    /// Electrode position (schema default 0)
    pub electrodes_pos: f64,
    /// Mixer level (schema default 0)
    pub level_mixer: f64,
    /// Process-spec target temperature curve, when available
    pub optimal_temp: Option<f64>,
}

impl ProcessSample {
    /// A sample at `timestamp` with every channel empty and defaults applied.
    pub fn empty(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            temperature_1: None,
            temperature_2: None,
            temperature_3: None,
            acid_flow: None,
            current_value: None,
            electrodes_pos: 0.0,
            level_mixer: 0.0,
            optimal_temp: None,
        }
    }
}

/// A newly proposed charge, as entered at process start.
///
/// Carries exactly the attributes the reference-batch search compares:
/// charge weight plus the seven composition percentages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedCharge {
    pub sample_weight: f64,
    pub ni_percent: f64,
    pub cu_percent: f64,
    pub pt_percent: f64,
    pub pd_percent: f64,
    pub sio2_percent: f64,
    pub c_percent: f64,
    pub se_percent: f64,
}

impl ProposedCharge {
    /// Composition values paired with their column names, in schema order.
    pub fn composition(&self) -> [(&'static str, f64); 7] {
        [
            ("ni_percent", self.ni_percent),
            ("cu_percent", self.cu_percent),
            ("pt_percent", self.pt_percent),
            ("pd_percent", self.pd_percent),
            ("sio2_percent", self.sio2_percent),
            ("c_percent", self.c_percent),
            ("se_percent", self.se_percent),
        ]
    }
}

/// Three-way heating advice against the optimal temperature band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeatingAdvice {
    IncreaseHeating,
    DecreaseHeating,
    Maintain,
}

impl HeatingAdvice {
    /// Classify a predicted temperature against the optimal band.
    pub fn for_temperature(predicted: f64, band: (f64, f64)) -> Self {
        if predicted < band.0 {
            Self::IncreaseHeating
        } else if predicted > band.1 {
            Self::DecreaseHeating
        } else {
            Self::Maintain
        }
    }

    /// Operator-facing recommendation text.
    pub fn text(self, predicted: f64) -> String {
        match self {
            Self::IncreaseHeating => {
                format!("Temperature low ({predicted:.1}°C). Increase heating.")
            }
            Self::DecreaseHeating => {
                format!("Temperature high ({predicted:.1}°C). Decrease heating.")
            }
            Self::Maintain => {
                format!("Temperature in optimal range ({predicted:.1}°C). Maintain current regime.")
            }
        }
    }
}

/// Next-step temperature forecast with an ensemble-disagreement band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    /// Ensemble mean prediction for the next primary temperature (°C)
    pub predicted_temperature: f64,
    /// `prediction ± 1.96 × stddev(per-member predictions)`, a normal
    /// approximation of member disagreement, not a calibrated interval.
    /// Collapses to a single point when every member agrees
    pub confidence_interval: (f64, f64),
    /// Three-way classification against the optimal band
    pub advice: HeatingAdvice,
    /// Operator-facing recommendation text
    pub recommendation: String,
    /// When the forecast was produced
    pub generated_at: DateTime<Utc>,
}
