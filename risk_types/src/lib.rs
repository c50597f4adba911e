//! Risk Types - Foundation Types for the IF.data risk pipeline
//!
//! This crate contains the pure data structures that flow between pipeline
//! stages: raw indicator rows coming in from ingestion, canonical metric
//! records coming out of normalization/derivation, and scored records coming
//! out of the scoring engine.
//!
//! ## Critical Rules
//!
//! 1. **NO BUSINESS LOGIC** - Only data structures, constructors and accessors
//! 2. **NO WORKSPACE DEPENDENCIES** - Cannot depend on other workspace crates
//! 3. **SERIALIZABLE** - All types must support serde
//! 4. **DETERMINISTIC** - Maps are ordered so serialized output is stable

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// RECORD KEY
// ============================================================================

/// Upsert key shared by canonical and scored records.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub institution_id: String,
    pub period: NaiveDate,
}

impl RecordKey {
    pub fn new(institution_id: impl Into<String>, period: NaiveDate) -> Self {
        Self {
            institution_id: institution_id.into(),
            period,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.institution_id, self.period)
    }
}

// ============================================================================
// RAW INPUT
// ============================================================================

/// One indicator value exactly as delivered by the upstream source.
///
/// Rows are produced once by ingestion and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawIndicatorRow {
    pub institution_id: String,
    /// Reporting date (last day of the quarter)
    pub period: NaiveDate,
    /// Free-text label, usually `"<report>::<indicator name>"`
    pub raw_label: String,
    pub value: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Revision marker - higher means more recently revised
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u32>,
}

impl RawIndicatorRow {
    pub fn new(
        institution_id: impl Into<String>,
        period: NaiveDate,
        raw_label: impl Into<String>,
        value: Decimal,
    ) -> Self {
        Self {
            institution_id: institution_id.into(),
            period,
            raw_label: raw_label.into(),
            value,
            unit: None,
            revision: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_revision(mut self, revision: u32) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.institution_id.clone(), self.period)
    }
}

// ============================================================================
// CANONICAL METRICS
// ============================================================================

/// The fixed set of canonical metrics the pipeline operates on.
///
/// Declaration order is the serialization order of canonical records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalMetricId {
    TotalAssets,
    Equity,
    NetIncome,
    /// Basel capital index, percent
    BaselIndex,
    /// Liquidity index, ratio
    Liquidity,
    /// Non-performing loans, percent
    DefaultRate,
    /// Return on assets, percent
    Roa,
    /// Total assets over equity, ratio
    Leverage,
}

impl CanonicalMetricId {
    pub const ALL: [CanonicalMetricId; 8] = [
        CanonicalMetricId::TotalAssets,
        CanonicalMetricId::Equity,
        CanonicalMetricId::NetIncome,
        CanonicalMetricId::BaselIndex,
        CanonicalMetricId::Liquidity,
        CanonicalMetricId::DefaultRate,
        CanonicalMetricId::Roa,
        CanonicalMetricId::Leverage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalMetricId::TotalAssets => "total_assets",
            CanonicalMetricId::Equity => "equity",
            CanonicalMetricId::NetIncome => "net_income",
            CanonicalMetricId::BaselIndex => "basel_index",
            CanonicalMetricId::Liquidity => "liquidity",
            CanonicalMetricId::DefaultRate => "default_rate",
            CanonicalMetricId::Roa => "roa",
            CanonicalMetricId::Leverage => "leverage",
        }
    }
}

impl fmt::Display for CanonicalMetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown canonical metric '{0}'")]
pub struct ParseMetricIdError(pub String);

impl FromStr for CanonicalMetricId {
    type Err = ParseMetricIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CanonicalMetricId::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ParseMetricIdError(s.to_string()))
    }
}

/// Canonical metrics for one institution/period.
///
/// A missing key means "not reported this period", which is distinct from zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalMetricRecord {
    pub institution_id: String,
    pub period: NaiveDate,
    pub metrics: BTreeMap<CanonicalMetricId, Decimal>,
}

impl CanonicalMetricRecord {
    pub fn new(key: &RecordKey) -> Self {
        Self {
            institution_id: key.institution_id.clone(),
            period: key.period,
            metrics: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.institution_id.clone(), self.period)
    }

    pub fn get(&self, metric: CanonicalMetricId) -> Option<Decimal> {
        self.metrics.get(&metric).copied()
    }

    pub fn contains(&self, metric: CanonicalMetricId) -> bool {
        self.metrics.contains_key(&metric)
    }

    /// Builder-style insert, mostly useful in tests and fixtures
    pub fn with(mut self, metric: CanonicalMetricId, value: Decimal) -> Self {
        self.metrics.insert(metric, value);
        self
    }
}

// ============================================================================
// SCORED OUTPUT
// ============================================================================

/// Risk class assigned from the configured score bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskClass {
    Low,
    Medium,
    High,
}

impl RiskClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskClass::Low => "LOW",
            RiskClass::Medium => "MEDIUM",
            RiskClass::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One factor's share of a composite score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverEntry {
    pub factor_id: String,
    pub metric: CanonicalMetricId,
    pub observed_value: Decimal,
    /// Badness on a 0-100 scale
    pub sub_score: Decimal,
    /// Weight after renormalization over the present factors
    pub weight: Decimal,
    /// `weight * sub_score`, the points this factor adds to the composite
    pub contribution: Decimal,
    /// Nearest breakpoint crossed in the worsening direction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Decimal>,
    pub rationale: String,
}

/// Why a configured factor did not produce a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OmissionReason {
    /// Metric not present in the record - unknown, not penalized
    MetricAbsent,
    /// Factor configured with weight zero
    ZeroWeight,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorOmission {
    pub factor_id: String,
    pub metric: CanonicalMetricId,
    pub reason: OmissionReason,
}

/// Composite risk score for one institution/period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub institution_id: String,
    pub period: NaiveDate,
    /// 0-100, two decimal places
    pub composite_score: Decimal,
    pub risk_class: RiskClass,
    /// Sorted by contribution descending, ties by factor priority
    pub drivers: Vec<DriverEntry>,
    #[serde(default)]
    pub omitted_factors: Vec<FactorOmission>,
    /// Version label of the factor/band table that produced this score
    pub scoring_version: String,
}

impl ScoredRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.institution_id.clone(), self.period)
    }
}
