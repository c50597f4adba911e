//! Semantic Dictionary
//!
//! Maps drifting IF.data indicator labels onto the fixed canonical metric set.
//!
//! # Resolution
//!
//! ```text
//! raw label "1::Índice de Basileia"
//!       │  split report prefix, clean, normalize
//!       ▼
//! ┌─────────────────────────────────────────┐
//! │  Tier 1: exact aliases                  │──► unique metric ──► Mapped
//! │  Tier 2: normalized aliases             │──► several metrics ─► AmbiguousMapping
//! │  Tier 3: case-insensitive patterns      │
//! └─────────────────────────────────────────┘
//!       │ no tier matched
//!       ▼
//!    Unmapped
//! ```
//!
//! The dictionary is an immutable value built once from configuration and
//! shared read-only by every worker for the duration of a run.

pub mod rules;
pub mod units;

use std::collections::{BTreeMap, BTreeSet};

use risk_types::CanonicalMetricId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::fingerprint;
use crate::config::types::{DictionaryFile, PlausibleRangeFile};
use crate::error::{ConfigError, DictionaryError};
use crate::normalizer::ReconciliationPolicy;
use crate::text::LabelForms;

pub use rules::{LabelMatcher, MatchTier, RuleRef, SemanticMapping};
pub use units::{ImpliedFraction, UnitConversion, UnitRules};

// ── Metric specs ──────────────────────────────────────────────

/// Inclusive/exclusive bounds an observation must fall in to be usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlausibleRange {
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
    pub min_exclusive: bool,
    pub max_exclusive: bool,
}

impl PlausibleRange {
    fn from_file(metric: CanonicalMetricId, file: &PlausibleRangeFile) -> Result<Self, ConfigError> {
        if let (Some(min), Some(max)) = (file.min, file.max) {
            let empty = min > max || (min == max && (file.min_exclusive || file.max_exclusive));
            if empty {
                return Err(ConfigError::InvalidRange { metric });
            }
        }
        Ok(Self {
            min: file.min,
            max: file.max,
            min_exclusive: file.min_exclusive,
            max_exclusive: file.max_exclusive,
        })
    }

    pub fn contains(&self, value: Decimal) -> bool {
        let above_min = match self.min {
            Some(min) if self.min_exclusive => value > min,
            Some(min) => value >= min,
            None => true,
        };
        let below_max = match self.max {
            Some(max) if self.max_exclusive => value < max,
            Some(max) => value <= max,
            None => true,
        };
        above_min && below_max
    }
}

/// Per-metric settings shared by all of that metric's rules
#[derive(Debug, Clone)]
pub struct MetricSpec {
    pub metric: CanonicalMetricId,
    pub units: UnitRules,
    pub plausible: Option<PlausibleRange>,
    pub report_preference: Vec<String>,
}

// ── Match results ─────────────────────────────────────────────

/// Full tier analysis of one label
#[derive(Debug, Clone)]
pub enum LabelMatch<'d> {
    Unmapped,
    /// Every rule in the winning tier names `metric`
    Resolved {
        tier: MatchTier,
        metric: CanonicalMetricId,
        rules: Vec<&'d SemanticMapping>,
    },
    /// The winning tier holds rules for more than one metric
    Ambiguous {
        tier: MatchTier,
        rules: Vec<&'d SemanticMapping>,
    },
}

impl LabelMatch<'_> {
    /// Distinct metrics named by the matching rules
    pub fn metrics(&self) -> Vec<CanonicalMetricId> {
        match self {
            LabelMatch::Unmapped => Vec::new(),
            LabelMatch::Resolved { metric, .. } => vec![*metric],
            LabelMatch::Ambiguous { rules, .. } => rules
                .iter()
                .map(|r| r.canonical_metric_id)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedLabel {
    pub metric: CanonicalMetricId,
    pub tier: MatchTier,
    /// First rule (declaration order) of the winning tier
    pub rule_id: usize,
    /// IF.data report code split off the label, if any
    pub report: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
    Mapped(ResolvedLabel),
    Unmapped,
}

// ── Dictionary ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SemanticDictionary {
    version: String,
    fingerprint: String,
    reconciliation: ReconciliationPolicy,
    mappings: Vec<SemanticMapping>,
    metrics: BTreeMap<CanonicalMetricId, MetricSpec>,
}

impl SemanticDictionary {
    /// Compile and validate a dictionary file.
    ///
    /// Statically detectable ambiguity (one alias declared for two metrics in
    /// the same tier) is rejected here; pattern overlaps can only be detected
    /// against observed labels, see [`crate::audit`].
    pub fn from_file(file: &DictionaryFile) -> Result<Self, ConfigError> {
        if file.version.trim().is_empty() {
            return Err(ConfigError::MissingVersion {
                table: "dictionary",
            });
        }

        let mut mappings: Vec<SemanticMapping> = Vec::new();
        let mut metrics = BTreeMap::new();
        let mut exact_aliases: BTreeMap<String, CanonicalMetricId> = BTreeMap::new();
        let mut normalized_aliases: BTreeMap<String, CanonicalMetricId> = BTreeMap::new();

        for entry in &file.metrics {
            let metric = entry.metric;
            if metrics.contains_key(&metric) {
                return Err(ConfigError::DuplicateMetric(metric));
            }

            let mut matchers = Vec::new();
            for alias in &entry.exact {
                claim_alias(&mut exact_aliases, alias, metric)?;
                matchers.push(LabelMatcher::exact(alias.clone()));
            }
            for alias in &entry.normalized {
                let matcher = LabelMatcher::normalized(alias);
                claim_alias(&mut normalized_aliases, matcher.expression(), metric)?;
                matchers.push(matcher);
            }
            for pattern in &entry.patterns {
                let matcher =
                    LabelMatcher::pattern(pattern).map_err(|e| ConfigError::InvalidPattern {
                        metric,
                        pattern: pattern.clone(),
                        message: e.to_string(),
                    })?;
                matchers.push(matcher);
            }

            for matcher in matchers {
                mappings.push(SemanticMapping {
                    rule_id: mappings.len(),
                    canonical_metric_id: metric,
                    matcher,
                });
            }

            let plausible = entry
                .plausible
                .as_ref()
                .map(|p| PlausibleRange::from_file(metric, p))
                .transpose()?;

            metrics.insert(
                metric,
                MetricSpec {
                    metric,
                    units: UnitRules::new(
                        metric,
                        &entry.canonical_unit,
                        &entry.units,
                        entry.implied_fraction,
                    )?,
                    plausible,
                    report_preference: entry.report_preference.clone(),
                },
            );
        }

        let dictionary = Self {
            version: file.version.clone(),
            fingerprint: fingerprint(file)?,
            reconciliation: file.reconciliation,
            mappings,
            metrics,
        };

        info!(
            "Loaded semantic dictionary '{}' with {} rules over {} metrics",
            dictionary.version,
            dictionary.mappings.len(),
            dictionary.metrics.len()
        );

        Ok(dictionary)
    }

    pub fn from_yaml_str(yaml: &str, source_name: &str) -> Result<Self, ConfigError> {
        let file: DictionaryFile =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
                source_name: source_name.to_string(),
                message: e.to_string(),
            })?;
        Self::from_file(&file)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// SHA-256 over the canonical form of the source file
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn reconciliation(&self) -> ReconciliationPolicy {
        self.reconciliation
    }

    /// Rules in declaration order
    pub fn mappings(&self) -> &[SemanticMapping] {
        &self.mappings
    }

    pub fn metric_spec(&self, metric: CanonicalMetricId) -> Option<&MetricSpec> {
        self.metrics.get(&metric)
    }

    /// Evaluate every rule against a label, tier by tier.
    pub fn match_label(&self, raw_label: &str) -> LabelMatch<'_> {
        self.match_forms(&LabelForms::new(raw_label))
    }

    fn match_forms(&self, forms: &LabelForms) -> LabelMatch<'_> {
        for tier in MatchTier::ORDER {
            let rules: Vec<&SemanticMapping> = self
                .mappings
                .iter()
                .filter(|m| m.tier() == tier && m.matcher.matches(forms))
                .collect();

            let Some(first) = rules.first() else {
                continue;
            };
            let metric = first.canonical_metric_id;
            if rules.iter().all(|r| r.canonical_metric_id == metric) {
                return LabelMatch::Resolved {
                    tier,
                    metric,
                    rules,
                };
            }
            return LabelMatch::Ambiguous { tier, rules };
        }
        LabelMatch::Unmapped
    }

    /// Resolve a raw label (and its unit) to a canonical metric.
    ///
    /// Pure: the same `(raw_label, unit)` always yields the same result. A
    /// resolved label whose unit has no conversion rule is an error.
    pub fn resolve(
        &self,
        raw_label: &str,
        unit: Option<&str>,
    ) -> Result<Resolution, DictionaryError> {
        let forms = LabelForms::new(raw_label);
        match self.match_forms(&forms) {
            LabelMatch::Unmapped => Ok(Resolution::Unmapped),
            ambiguous @ LabelMatch::Ambiguous { .. } => Err(DictionaryError::AmbiguousMapping {
                label: raw_label.to_string(),
                metrics: ambiguous.metrics(),
            }),
            LabelMatch::Resolved {
                tier,
                metric,
                rules,
            } => {
                self.unit_conversion(raw_label, metric, unit)?;
                Ok(Resolution::Mapped(ResolvedLabel {
                    metric,
                    tier,
                    rule_id: rules.first().map(|r| r.rule_id).unwrap_or_default(),
                    report: forms.report,
                }))
            }
        }
    }

    /// Convert a raw value into the metric's canonical unit, honouring the
    /// metric's implied fraction rule for unitless values.
    pub fn to_canonical(
        &self,
        raw_label: &str,
        metric: CanonicalMetricId,
        unit: Option<&str>,
        value: Decimal,
    ) -> Result<Decimal, DictionaryError> {
        let conversion = match self
            .metrics
            .get(&metric)
            .and_then(|spec| spec.units.conversion_for_value(unit, value))
        {
            Some(conversion) => conversion,
            None => self.unit_conversion(raw_label, metric, unit)?,
        };
        conversion
            .apply(value)
            .ok_or(DictionaryError::ConversionOverflow { metric, value })
    }

    fn unit_conversion(
        &self,
        raw_label: &str,
        metric: CanonicalMetricId,
        unit: Option<&str>,
    ) -> Result<UnitConversion, DictionaryError> {
        let spec = self.metrics.get(&metric);
        spec.and_then(|s| s.units.conversion_for(unit))
            .ok_or_else(|| DictionaryError::UnitMismatch {
                label: raw_label.to_string(),
                metric,
                unit: unit.unwrap_or_default().to_string(),
                canonical_unit: spec
                    .map(|s| s.units.canonical_unit().to_string())
                    .unwrap_or_default(),
            })
    }
}

fn claim_alias(
    claimed: &mut BTreeMap<String, CanonicalMetricId>,
    alias: &str,
    metric: CanonicalMetricId,
) -> Result<(), ConfigError> {
    match claimed.get(alias) {
        Some(first) if *first != metric => Err(ConfigError::ConflictingAlias {
            alias: alias.to_string(),
            first: *first,
            second: metric,
        }),
        _ => {
            claimed.insert(alias.to_string(), metric);
            Ok(())
        }
    }
}
