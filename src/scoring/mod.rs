//! Risk Scoring Engine
//!
//! Turns a fully derived [`CanonicalMetricRecord`] into a [`ScoredRecord`]:
//!
//! ```text
//! metric value ──► BreakpointCurve ──► sub-score (0–100)
//!                                          │ × renormalized weight
//!                                          ▼
//!                     Σ contributions ──► composite ──► RiskBands ──► class
//! ```
//!
//! Absent metrics are unknown, not bad: their factor is dropped and the
//! remaining weights are renormalized so they still sum to the full budget.

pub mod bands;
pub mod breakpoints;

use std::cmp::Ordering;

use risk_types::{
    CanonicalMetricId, CanonicalMetricRecord, DriverEntry, FactorOmission, OmissionReason,
    ScoredRecord,
};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::config::fingerprint;
use crate::config::types::ScoringFile;
use crate::error::ConfigError;

pub use bands::{RiskBand, RiskBands};
pub use breakpoints::{Breakpoint, BreakpointCurve, CurveDirection, Interpolation};

pub const SUB_SCORE_DP: u32 = 2;
pub const CONTRIBUTION_DP: u32 = 4;
pub const WEIGHT_DP: u32 = 6;
pub const COMPOSITE_DP: u32 = 2;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskFactor {
    pub factor_id: String,
    pub metric: CanonicalMetricId,
    /// Raw configured weight; renormalized per record
    pub weight: Decimal,
    pub curve: BreakpointCurve,
    /// Declaration order, used to break contribution ties
    pub priority: usize,
    pub description: Option<String>,
}

/// Validated factor and band tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringConfig {
    version: String,
    fingerprint: String,
    factors: Vec<RiskFactor>,
    bands: RiskBands,
}

impl ScoringConfig {
    pub fn from_file(file: &ScoringFile) -> Result<Self, ConfigError> {
        if file.version.trim().is_empty() {
            return Err(ConfigError::MissingVersion { table: "scoring" });
        }
        if file.factors.is_empty() {
            return Err(ConfigError::NoFactors);
        }

        let mut factors: Vec<RiskFactor> = Vec::with_capacity(file.factors.len());
        let mut total_weight = Decimal::ZERO;
        for (priority, entry) in file.factors.iter().enumerate() {
            if factors.iter().any(|f| f.factor_id == entry.id) {
                return Err(ConfigError::DuplicateFactor(entry.id.clone()));
            }
            if let Some(other) = factors.iter().find(|f| f.metric == entry.metric) {
                return Err(ConfigError::DuplicateFactorMetric {
                    metric: entry.metric,
                    first: other.factor_id.clone(),
                    second: entry.id.clone(),
                });
            }

            let weight = entry.weight.ok_or_else(|| ConfigError::MissingFactorField {
                factor: entry.id.clone(),
                field: "weight",
            })?;
            if weight < Decimal::ZERO {
                return Err(ConfigError::NegativeWeight {
                    factor: entry.id.clone(),
                    weight,
                });
            }
            total_weight = total_weight
                .checked_add(weight)
                .ok_or_else(|| ConfigError::WeightOverflow(entry.id.clone()))?;

            let points = entry
                .breakpoints
                .clone()
                .ok_or_else(|| ConfigError::MissingFactorField {
                    factor: entry.id.clone(),
                    field: "breakpoints",
                })?;
            let curve = BreakpointCurve::new(points, entry.interpolation).map_err(|reason| {
                ConfigError::InvalidBreakpoints {
                    factor: entry.id.clone(),
                    reason,
                }
            })?;

            factors.push(RiskFactor {
                factor_id: entry.id.clone(),
                metric: entry.metric,
                weight,
                curve,
                priority,
                description: entry.description.clone(),
            });
        }

        let bands = RiskBands::from_file(&file.bands)?;
        let fingerprint = fingerprint(file)?;

        info!(
            "Scoring table '{}' validated: {} factors, {} bands",
            file.version,
            factors.len(),
            bands.bands().len()
        );

        Ok(Self {
            version: file.version.clone(),
            fingerprint,
            factors,
            bands,
        })
    }

    pub fn from_yaml_str(yaml: &str, source_name: &str) -> Result<Self, ConfigError> {
        let file: ScoringFile = serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;
        Self::from_file(&file)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn factors(&self) -> &[RiskFactor] {
        &self.factors
    }

    pub fn bands(&self) -> &RiskBands {
        &self.bands
    }
}

// ============================================================================
// Scorer
// ============================================================================

pub struct RiskScorer<'c> {
    config: &'c ScoringConfig,
}

struct ScoredFactor<'c> {
    factor: &'c RiskFactor,
    value: Decimal,
    sub_score: Decimal,
    weight: Decimal,
    contribution: Decimal,
    threshold: Option<Decimal>,
}

impl<'c> RiskScorer<'c> {
    pub fn new(config: &'c ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &'c ScoringConfig {
        self.config
    }

    /// Unrounded weights of the factors scorable on `record`, in priority
    /// order. They sum to one whenever any factor is scorable.
    pub fn renormalized_weights(&self, record: &CanonicalMetricRecord) -> Vec<(&'c str, Decimal)> {
        let present: Vec<&RiskFactor> = self.present_factors(record).collect();
        let total: Decimal = present.iter().map(|f| f.weight).sum();
        if total.is_zero() {
            return Vec::new();
        }
        present
            .into_iter()
            .map(|f| (f.factor_id.as_str(), f.weight / total))
            .collect()
    }

    fn present_factors<'r>(
        &self,
        record: &'r CanonicalMetricRecord,
    ) -> impl Iterator<Item = &'c RiskFactor> + 'r
    where
        'c: 'r,
    {
        self.config
            .factors
            .iter()
            .filter(move |f| !f.weight.is_zero() && record.contains(f.metric))
    }

    pub fn score(&self, record: &CanonicalMetricRecord) -> ScoredRecord {
        let omitted_factors: Vec<FactorOmission> = self
            .config
            .factors
            .iter()
            .filter_map(|f| {
                let reason = if f.weight.is_zero() {
                    OmissionReason::ZeroWeight
                } else if !record.contains(f.metric) {
                    OmissionReason::MetricAbsent
                } else {
                    return None;
                };
                Some(FactorOmission {
                    factor_id: f.factor_id.clone(),
                    metric: f.metric,
                    reason,
                })
            })
            .collect();

        let present: Vec<(&RiskFactor, Decimal)> = self
            .present_factors(record)
            .filter_map(|f| record.get(f.metric).map(|v| (f, v)))
            .collect();
        let total_weight: Decimal = present.iter().map(|(f, _)| f.weight).sum();

        let mut scored: Vec<ScoredFactor> = if total_weight.is_zero() {
            Vec::new()
        } else {
            present
                .into_iter()
                .map(|(factor, value)| {
                    let evaluation = factor.curve.evaluate(value);
                    let weight = factor.weight / total_weight;
                    ScoredFactor {
                        factor,
                        value,
                        sub_score: evaluation.score,
                        weight,
                        contribution: evaluation.score * weight,
                        threshold: evaluation.threshold,
                    }
                })
                .collect()
        };

        scored.sort_by(|a, b| match b.contribution.cmp(&a.contribution) {
            Ordering::Equal => a.factor.priority.cmp(&b.factor.priority),
            other => other,
        });

        let composite: Decimal = scored.iter().map(|s| s.contribution).sum();
        let composite_score = composite
            .round_dp(COMPOSITE_DP)
            .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
        let risk_class = self.config.bands.classify(composite_score);

        debug!(
            "Scored {}: composite {} ({}), {} drivers, {} omitted",
            record.key(),
            composite_score,
            risk_class,
            scored.len(),
            omitted_factors.len()
        );

        ScoredRecord {
            institution_id: record.institution_id.clone(),
            period: record.period,
            composite_score,
            risk_class,
            drivers: scored.iter().map(to_driver).collect(),
            omitted_factors,
            scoring_version: self.config.version.clone(),
        }
    }
}

fn to_driver(s: &ScoredFactor) -> DriverEntry {
    let sub_score = s.sub_score.round_dp(SUB_SCORE_DP);
    DriverEntry {
        factor_id: s.factor.factor_id.clone(),
        metric: s.factor.metric,
        observed_value: s.value,
        sub_score,
        weight: s.weight.round_dp(WEIGHT_DP),
        contribution: s.contribution.round_dp(CONTRIBUTION_DP),
        threshold: s.threshold,
        rationale: rationale(s.factor, s.value, sub_score, s.threshold),
    }
}

fn rationale(
    factor: &RiskFactor,
    value: Decimal,
    sub_score: Decimal,
    threshold: Option<Decimal>,
) -> String {
    match (threshold, factor.curve.direction()) {
        (Some(t), CurveDirection::LowerIsWorse) => format!(
            "{} {} is at or below threshold {}; sub-score {}",
            factor.metric, value, t, sub_score
        ),
        (Some(t), CurveDirection::HigherIsWorse) => format!(
            "{} {} is at or above threshold {}; sub-score {}",
            factor.metric, value, t, sub_score
        ),
        _ => format!(
            "{} {} is within the safe range; sub-score {}",
            factor.metric, value, sub_score
        ),
    }
}
