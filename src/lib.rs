// src/lib.rs
// Public library surface for the training binary and integration tests.

// Report analysis (tokenize, classify, normalize, weigh, score)
pub mod analyze;
pub mod rarity;
pub mod store;

// Archive ingestion & training runs
pub mod config;
pub mod ingest;

// ---- Re-exports for stable public API ----
pub use crate::analyze::{score, ReportFamily};
pub use crate::ingest::{TrainOutcome, TrainingPipeline};
pub use crate::rarity::{RarityAggregator, RarityModel};
pub use crate::store::{load_model, ModelStore, SnapshotMeta};
