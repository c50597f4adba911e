//! On-disk configuration schemas.
//!
//! These mirror the YAML files one-to-one. Fields whose absence must be
//! detected (weights, breakpoints) are `Option`s here and are rejected during
//! validation instead of being defaulted.

use std::collections::BTreeMap;

use risk_types::{CanonicalMetricId, RiskClass};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::dictionary::units::{ImpliedFraction, UnitConversion};
use crate::normalizer::ReconciliationPolicy;
use crate::scoring::breakpoints::{Breakpoint, Interpolation};

// ── dictionary.yaml ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DictionaryFile {
    pub version: String,
    #[serde(default)]
    pub reconciliation: ReconciliationPolicy,
    pub metrics: Vec<MetricMappingFile>,
}

/// All rules for one canonical metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricMappingFile {
    pub metric: CanonicalMetricId,
    pub canonical_unit: String,
    #[serde(default)]
    pub exact: Vec<String>,
    #[serde(default)]
    pub normalized: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Raw unit -> conversion into `canonical_unit`
    #[serde(default)]
    pub units: BTreeMap<String, UnitConversion>,
    /// Scale unitless values in `(0, below)`; they are fractions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implied_fraction: Option<ImpliedFraction>,
    #[serde(default)]
    pub plausible: Option<PlausibleRangeFile>,
    /// Report codes in order of preference (report_preference policy only)
    #[serde(default)]
    pub report_preference: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlausibleRangeFile {
    #[serde(default)]
    pub min: Option<Decimal>,
    #[serde(default)]
    pub max: Option<Decimal>,
    #[serde(default)]
    pub min_exclusive: bool,
    #[serde(default)]
    pub max_exclusive: bool,
}

// ── scoring.yaml ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringFile {
    pub version: String,
    /// Declaration order is the driver tie-break priority
    pub factors: Vec<FactorFile>,
    pub bands: Vec<BandFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorFile {
    pub id: String,
    pub metric: CanonicalMetricId,
    #[serde(default)]
    pub weight: Option<Decimal>,
    #[serde(default)]
    pub interpolation: Interpolation,
    #[serde(default)]
    pub breakpoints: Option<Vec<Breakpoint>>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Scores strictly below `below` fall in `class`; the last band is open-ended
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandFile {
    pub class: RiskClass,
    #[serde(default)]
    pub below: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dictionary_file_defaults() {
        let yaml = r#"
version: test
metrics:
  - metric: liquidity
    canonical_unit: ratio
"#;
        let file: DictionaryFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.reconciliation, ReconciliationPolicy::RevisionOrConflict);
        let metric = &file.metrics[0];
        assert!(metric.exact.is_empty() && metric.patterns.is_empty());
        assert!(metric.plausible.is_none());
    }

    #[test]
    fn factor_without_weight_parses_as_none() {
        let yaml = r#"
version: test
factors:
  - id: liquidity
    metric: liquidity
    breakpoints:
      - { value: 1.0, score: 100 }
bands:
  - { class: LOW }
"#;
        let file: ScoringFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.factors[0].weight, None);
        assert_eq!(file.factors[0].interpolation, Interpolation::Linear);
        assert_eq!(file.bands[0].below, None);
    }

    #[test]
    fn unit_conversion_offset_defaults_to_zero() {
        let yaml = r#"
version: test
metrics:
  - metric: basel_index
    canonical_unit: "%"
    units:
      fraction: { scale: 100 }
"#;
        let file: DictionaryFile = serde_yaml::from_str(yaml).unwrap();
        let conversion = file.metrics[0].units["fraction"];
        assert_eq!(conversion.scale, Decimal::ONE_HUNDRED);
        assert_eq!(conversion.offset, Decimal::ZERO);
    }
}
