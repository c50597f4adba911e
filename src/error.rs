//! Error taxonomy for the risk pipeline.
//!
//! Scope matters more than variant names here:
//! - `ConfigError` aborts a run before any record is processed
//! - `DictionaryError::AmbiguousMapping` blocks a run (configuration defect)
//! - `NormalizeError` fails a single institution/period
//! - unmapped labels and skipped derivations are not errors at all; they are
//!   recorded as exclusions/notes in the output

use risk_types::{CanonicalMetricId, RecordKey};
use rust_decimal::Decimal;
use thiserror::Error;

/// Invalid configuration detected while building dictionary, derivation or
/// scoring tables. Always fatal at startup; nothing is defaulted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid configuration: failed to parse {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    #[error("invalid configuration: {table} version must not be empty")]
    MissingVersion { table: &'static str },

    #[error("invalid configuration: metric '{0}' declared more than once")]
    DuplicateMetric(CanonicalMetricId),

    #[error("invalid configuration: pattern '{pattern}' for '{metric}' does not compile: {message}")]
    InvalidPattern {
        metric: CanonicalMetricId,
        pattern: String,
        message: String,
    },

    #[error("invalid configuration: alias '{alias}' maps to both '{first}' and '{second}'")]
    ConflictingAlias {
        alias: String,
        first: CanonicalMetricId,
        second: CanonicalMetricId,
    },

    #[error("invalid configuration: unit rule '{unit}' for '{metric}': {reason}")]
    InvalidUnitRule {
        metric: CanonicalMetricId,
        unit: String,
        reason: String,
    },

    #[error("invalid configuration: plausible range for '{metric}' is empty")]
    InvalidRange { metric: CanonicalMetricId },

    #[error("invalid configuration: derived metric '{0}' declared more than once")]
    DuplicateDerivation(CanonicalMetricId),

    #[error("invalid configuration: derived metric '{output}' depends on derived metric '{operand}'")]
    ChainedDerivation {
        output: CanonicalMetricId,
        operand: CanonicalMetricId,
    },

    #[error("invalid configuration: factor '{0}' declared more than once")]
    DuplicateFactor(String),

    #[error("invalid configuration: metric '{metric}' scored by both '{first}' and '{second}'")]
    DuplicateFactorMetric {
        metric: CanonicalMetricId,
        first: String,
        second: String,
    },

    #[error("invalid configuration: factor '{factor}' is missing {field}")]
    MissingFactorField {
        factor: String,
        field: &'static str,
    },

    #[error("invalid configuration: factor '{factor}' has negative weight {weight}")]
    NegativeWeight { factor: String, weight: Decimal },

    #[error("invalid configuration: factor weights overflow at '{0}'")]
    WeightOverflow(String),

    #[error("invalid configuration: factor '{factor}' breakpoints: {reason}")]
    InvalidBreakpoints { factor: String, reason: String },

    #[error("invalid configuration: risk bands: {0}")]
    InvalidBands(String),

    #[error("invalid configuration: no risk factors declared")]
    NoFactors,
}

/// Resolution failures raised by the semantic dictionary
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DictionaryError {
    #[error("label '{label}' matches rules for several metrics: {}", format_metrics(.metrics))]
    AmbiguousMapping {
        label: String,
        metrics: Vec<CanonicalMetricId>,
    },

    #[error("label '{label}' resolved to '{metric}' but unit '{unit}' has no rule to '{canonical_unit}'")]
    UnitMismatch {
        label: String,
        metric: CanonicalMetricId,
        unit: String,
        canonical_unit: String,
    },

    #[error("converting {value} to canonical units of '{metric}' overflows")]
    ConversionOverflow {
        metric: CanonicalMetricId,
        value: Decimal,
    },
}

/// Failure of one institution/period during normalization
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("no rows supplied for normalization")]
    EmptyGroup,

    #[error("row for {found} supplied in group {expected}")]
    MixedGroup { expected: RecordKey, found: RecordKey },

    #[error("conflicting observations for '{metric}' at {key}: {}", format_values(.values))]
    ConflictingObservation {
        key: RecordKey,
        metric: CanonicalMetricId,
        values: Vec<Decimal>,
    },

    /// Reachable only when normalizing without the batch preflight
    #[error("label '{label}' matches rules for several metrics: {}", format_metrics(.metrics))]
    AmbiguousLabel {
        label: String,
        metrics: Vec<CanonicalMetricId>,
    },
}

impl NormalizeError {
    /// Stable machine-readable kind, used in batch failure reports
    pub fn kind(&self) -> &'static str {
        match self {
            NormalizeError::EmptyGroup => "empty_group",
            NormalizeError::MixedGroup { .. } => "mixed_group",
            NormalizeError::ConflictingObservation { .. } => "conflicting_observation",
            NormalizeError::AmbiguousLabel { .. } => "ambiguous_mapping",
        }
    }
}

/// Run-level failures; these abort the whole batch
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("dictionary '{version}' is ambiguous for {} observed label(s): {}", .labels.len(), .labels.join(", "))]
    AmbiguousMapping { version: String, labels: Vec<String> },
}

fn format_metrics(metrics: &[CanonicalMetricId]) -> String {
    metrics
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_values(values: &[Decimal]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" vs ")
}
