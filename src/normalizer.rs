//! Normalizer
//!
//! Turns the raw rows of one institution/period into a single
//! [`CanonicalMetricRecord`]. Every row is either used, reconciled away, or
//! listed as an exclusion; nothing is dropped silently and no default values
//! are synthesized for metrics that were not observed.

use std::collections::{BTreeMap, BTreeSet};

use risk_types::{CanonicalMetricId, CanonicalMetricRecord, RawIndicatorRow, RecordKey};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dictionary::{Resolution, SemanticDictionary};
use crate::error::{DictionaryError, NormalizeError};

/// Tie-break applied when several rows resolve to the same canonical metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationPolicy {
    /// Highest revision wins; disagreeing candidates without one are a conflict
    #[default]
    RevisionOrConflict,
    /// Revision first, then the metric's declared report order
    ReportPreference,
}

/// Why a raw row did not make it into the canonical record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExclusionReason {
    UnmappedLabel,
    UnitMismatch {
        metric: CanonicalMetricId,
        canonical_unit: String,
    },
    Implausible {
        metric: CanonicalMetricId,
        canonical_value: Decimal,
    },
    ConversionOverflow {
        metric: CanonicalMetricId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedObservation {
    pub institution_id: String,
    pub period: chrono::NaiveDate,
    pub raw_label: String,
    pub value: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(flatten)]
    pub reason: ExclusionReason,
}

impl ExcludedObservation {
    fn new(row: &RawIndicatorRow, reason: ExclusionReason) -> Self {
        Self {
            institution_id: row.institution_id.clone(),
            period: row.period,
            raw_label: row.raw_label.clone(),
            value: row.value,
            unit: row.unit.clone(),
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "basis", rename_all = "snake_case")]
pub enum ReconciliationBasis {
    Revision { revision: u32 },
    ReportPreference { report: String },
    IdenticalDuplicates,
}

/// Record of a metric that had more than one candidate observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationNote {
    pub metric: CanonicalMetricId,
    pub chosen: Decimal,
    pub candidates: usize,
    #[serde(flatten)]
    pub basis: ReconciliationBasis,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedGroup {
    pub record: CanonicalMetricRecord,
    pub exclusions: Vec<ExcludedObservation>,
    pub reconciliations: Vec<ReconciliationNote>,
}

enum Observation {
    Usable(CanonicalMetricId, Candidate),
    Excluded(ExclusionReason),
}

#[derive(Debug, Clone)]
struct Candidate {
    value: Decimal,
    revision: Option<u32>,
    report: Option<String>,
}

pub struct Normalizer<'d> {
    dictionary: &'d SemanticDictionary,
}

impl<'d> Normalizer<'d> {
    pub fn new(dictionary: &'d SemanticDictionary) -> Self {
        Self { dictionary }
    }

    /// Normalize all rows of one institution/period.
    ///
    /// The result does not depend on the order of `rows`.
    pub fn normalize<'r, I>(&self, rows: I) -> Result<NormalizedGroup, NormalizeError>
    where
        I: IntoIterator<Item = &'r RawIndicatorRow>,
    {
        let mut rows = rows.into_iter().peekable();
        let key = rows.peek().ok_or(NormalizeError::EmptyGroup)?.key();

        let mut candidates: BTreeMap<CanonicalMetricId, Vec<Candidate>> = BTreeMap::new();
        let mut exclusions = Vec::new();

        for row in rows {
            if row.institution_id != key.institution_id || row.period != key.period {
                return Err(NormalizeError::MixedGroup {
                    expected: key,
                    found: row.key(),
                });
            }

            match self.observe(row)? {
                Observation::Usable(metric, candidate) => {
                    candidates.entry(metric).or_default().push(candidate)
                }
                Observation::Excluded(reason) => {
                    exclusions.push(ExcludedObservation::new(row, reason))
                }
            }
        }

        let mut record = CanonicalMetricRecord::new(&key);
        let mut reconciliations = Vec::new();
        for (metric, metric_candidates) in candidates {
            let (value, note) = self.reconcile(&key, metric, metric_candidates)?;
            record.metrics.insert(metric, value);
            reconciliations.extend(note);
        }

        exclusions.sort_by(|a, b| {
            a.raw_label
                .cmp(&b.raw_label)
                .then_with(|| a.value.cmp(&b.value))
                .then_with(|| a.unit.cmp(&b.unit))
        });

        debug!(
            "Normalized {}: {} metrics, {} exclusions, {} reconciliations",
            key,
            record.metrics.len(),
            exclusions.len(),
            reconciliations.len()
        );

        Ok(NormalizedGroup {
            record,
            exclusions,
            reconciliations,
        })
    }

    /// Resolve and convert one row. An error fails the whole group; an
    /// exclusion drops just this row.
    fn observe(&self, row: &RawIndicatorRow) -> Result<Observation, NormalizeError> {
        let unit = row.unit.as_deref();
        let resolved = match self.dictionary.resolve(&row.raw_label, unit) {
            Ok(Resolution::Mapped(resolved)) => resolved,
            Ok(Resolution::Unmapped) => {
                return Ok(Observation::Excluded(ExclusionReason::UnmappedLabel))
            }
            Err(e) => return exclusion_for(e).map(Observation::Excluded),
        };

        let metric = resolved.metric;
        let value = match self
            .dictionary
            .to_canonical(&row.raw_label, metric, unit, row.value)
        {
            Ok(value) => value.normalize(),
            Err(e) => return exclusion_for(e).map(Observation::Excluded),
        };

        let plausible = self
            .dictionary
            .metric_spec(metric)
            .and_then(|spec| spec.plausible);
        if let Some(range) = plausible {
            if !range.contains(value) {
                return Ok(Observation::Excluded(ExclusionReason::Implausible {
                    metric,
                    canonical_value: value,
                }));
            }
        }

        Ok(Observation::Usable(
            metric,
            Candidate {
                value,
                revision: row.revision,
                report: resolved.report,
            },
        ))
    }

    fn reconcile(
        &self,
        key: &RecordKey,
        metric: CanonicalMetricId,
        mut pool: Vec<Candidate>,
    ) -> Result<(Decimal, Option<ReconciliationNote>), NormalizeError> {
        let total = pool.len();
        let mut basis = None;

        if let Some(latest) = pool.iter().filter_map(|c| c.revision).max() {
            pool.retain(|c| c.revision == Some(latest));
            basis = Some(ReconciliationBasis::Revision { revision: latest });
        }

        if self.dictionary.reconciliation() == ReconciliationPolicy::ReportPreference
            && distinct_values(&pool).len() > 1
        {
            let preference = self
                .dictionary
                .metric_spec(metric)
                .map(|spec| spec.report_preference.as_slice())
                .unwrap_or_default();
            let preferred = preference
                .iter()
                .find(|report| pool.iter().any(|c| c.report.as_ref() == Some(*report)));
            if let Some(report) = preferred {
                pool.retain(|c| c.report.as_ref() == Some(report));
                basis = Some(ReconciliationBasis::ReportPreference {
                    report: report.clone(),
                });
            }
        }

        let values = distinct_values(&pool);
        let chosen = match values.iter().next() {
            Some(value) if values.len() == 1 => *value,
            _ => {
                return Err(NormalizeError::ConflictingObservation {
                    key: key.clone(),
                    metric,
                    values: values.into_iter().collect(),
                })
            }
        };

        let note = (total > 1).then(|| ReconciliationNote {
            metric,
            chosen,
            candidates: total,
            basis: basis.unwrap_or(ReconciliationBasis::IdenticalDuplicates),
        });
        Ok((chosen, note))
    }
}

/// Unit problems drop the row; an ambiguous label fails the group.
fn exclusion_for(err: DictionaryError) -> Result<ExclusionReason, NormalizeError> {
    match err {
        DictionaryError::AmbiguousMapping { label, metrics } => {
            Err(NormalizeError::AmbiguousLabel { label, metrics })
        }
        DictionaryError::UnitMismatch {
            metric,
            canonical_unit,
            ..
        } => Ok(ExclusionReason::UnitMismatch {
            metric,
            canonical_unit,
        }),
        DictionaryError::ConversionOverflow { metric, .. } => {
            Ok(ExclusionReason::ConversionOverflow { metric })
        }
    }
}

fn distinct_values(pool: &[Candidate]) -> BTreeSet<Decimal> {
    pool.iter().map(|c| c.value).collect()
}
