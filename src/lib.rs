//! Sulfex: Sulfatization Batch Intelligence
//!
//! Analytics core beneath the operator GUI for the metal sulfatization
//! line. Stores historical batch outcomes and their minute-by-minute
//! telemetry, imports qualified batches from the plant's production
//! database, selects the closest historical reference batch for a newly
//! proposed charge, and forecasts near-term reactor temperature with
//! operating advice.
//!
//! ## Architecture
//!
//! - **Store**: durable SQLite schema, atomic upserts, guarded read path
//! - **Importer**: dialect-aware ETL from the external production database
//! - **Recommender**: tolerance-based reference batch selection
//! - **Forecaster**: windowed ensemble regression with confidence bands
//!
//! All operations are synchronous and run on the calling thread. The
//! store serializes access to its single long-lived connection behind a
//! mutex; share it across components as `Arc<BatchStore>`.

pub mod config;
pub mod forecaster;
pub mod importer;
pub mod recommender;
pub mod store;
pub mod types;

// Re-export configuration
pub use config::{AppConfig, ConfigError, DatabaseConfig, ModelConfig, ProcessConfig};

// Re-export commonly used types
pub use types::{Batch, Forecast, HeatingAdvice, ProcessSample, ProposedCharge};

// Re-export the store
pub use store::{BatchStore, QueryTable, StoreError};

// Re-export the importer
pub use importer::{BatchSource, ExternalImporter, ImportError, SourceDialect};

// Re-export the recommender
pub use recommender::ProcessRecommender;

// Re-export the forecaster
pub use forecaster::{ForecastError, TemperatureForecaster, TrainingReport};
