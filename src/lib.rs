//! IF.data risk - label normalization and explainable bank risk scoring
//!
//! Quarterly IF.data extracts describe the same indicator under drifting
//! labels. This crate maps those labels onto a fixed canonical metric set,
//! derives ratio metrics, and scores every institution/period with a bounded,
//! explainable composite.
//!
//! ## Pipeline
//! Raw rows -> Normalizer (Semantic Dictionary) -> Derivation -> Risk Scoring
//! Engine -> scored record. The Audit Reporter runs separately over the full
//! label history.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ifdata_risk::config::ConfigLoader;
//! use ifdata_risk::pipeline::RiskPipeline;
//! use ifdata_risk::source::read_source_file;
//! use std::path::Path;
//!
//! let config = ConfigLoader::from_env().load()?;
//! let batch = read_source_file(Path::new("ifdata.jsonl"))?;
//! let outcome = RiskPipeline::from_config(&config).run(&batch.rows)?;
//! for scored in &outcome.scored {
//!     println!("{} {} {}", scored.institution_id, scored.composite_score, scored.risk_class);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

// Error taxonomy
pub mod error;

// Label text forms
pub mod text;

// Versioned configuration tables and their loader
pub mod config;

// Semantic dictionary (label -> canonical metric)
pub mod dictionary;

// Stages, in pipeline order
pub mod normalizer;
pub mod derivation;
pub mod scoring;

// Coverage audit over observed labels
pub mod audit;

// Batch runner
pub mod pipeline;

// Input adapter and output sinks
pub mod source;
pub mod store;

// Re-export foundation types
pub use risk_types::{
    CanonicalMetricId, CanonicalMetricRecord, DriverEntry, FactorOmission, OmissionReason,
    RawIndicatorRow, RecordKey, RiskClass, ScoredRecord,
};

pub use audit::{audit, AuditReport};
pub use config::{ConfigLoader, RiskConfig};
pub use derivation::DerivationTable;
pub use dictionary::SemanticDictionary;
pub use error::{ConfigError, DictionaryError, NormalizeError, PipelineError};
pub use normalizer::Normalizer;
pub use pipeline::{BatchOutcome, RiskPipeline};
pub use scoring::{RiskScorer, ScoringConfig};
pub use store::{JsonFileStore, MemoryStore, RecordSink};
