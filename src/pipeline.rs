//! Batch runner
//!
//! ```text
//! rows ──► preflight (ambiguity over every distinct label) ──► group by key
//!                                                                  │ rayon
//!             ┌────────────────────────────────────────────────────┘
//!             ▼
//!   normalize ──► derive ──► score        (one institution/period each)
//!             │
//!             └─► failure isolated to its key; the batch continues
//! ```
//!
//! Groups share nothing but the read-only dictionary, derivation table and
//! scoring table, so they run in parallel without locks. Outputs are ordered
//! by key, which makes a batch outcome byte-identical across runs.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use risk_types::{CanonicalMetricRecord, RawIndicatorRow, RecordKey, ScoredRecord};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RiskConfig;
use crate::derivation::{DerivationNote, DerivationTable};
use crate::dictionary::{LabelMatch, SemanticDictionary};
use crate::error::{NormalizeError, PipelineError};
use crate::normalizer::{ExcludedObservation, Normalizer, ReconciliationNote};
use crate::scoring::{RiskScorer, ScoringConfig};
use crate::store::RecordSink;

/// Everything produced for one institution/period
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupOutcome {
    /// Normalized and fully derived
    pub canonical: CanonicalMetricRecord,
    pub scored: ScoredRecord,
    pub exclusions: Vec<ExcludedObservation>,
    pub reconciliations: Vec<ReconciliationNote>,
    pub derivations: Vec<DerivationNote>,
}

/// A group that failed; the rest of the batch is unaffected
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    #[serde(flatten)]
    pub key: RecordKey,
    pub kind: &'static str,
    pub message: String,
}

/// Per-key notes that explain how a canonical record was built
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupNotes {
    #[serde(flatten)]
    pub key: RecordKey,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reconciliations: Vec<ReconciliationNote>,
    pub derivations: Vec<DerivationNote>,
}

/// Configuration identity and counts. Deliberately free of timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunManifest {
    pub dictionary_version: String,
    pub dictionary_fingerprint: String,
    pub scoring_version: String,
    pub scoring_fingerprint: String,
    pub rows_received: usize,
    pub groups: usize,
    pub groups_scored: usize,
    pub groups_failed: usize,
    pub rows_excluded: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub manifest: RunManifest,
    pub canonical: Vec<CanonicalMetricRecord>,
    pub scored: Vec<ScoredRecord>,
    pub failures: Vec<RecordFailure>,
    pub exclusions: Vec<ExcludedObservation>,
    pub notes: Vec<GroupNotes>,
}

impl BatchOutcome {
    /// Upsert every canonical and scored record, then flush the sink.
    pub fn persist(&self, sink: &mut dyn RecordSink) -> anyhow::Result<usize> {
        for record in &self.canonical {
            sink.upsert_canonical(record)?;
        }
        for record in &self.scored {
            sink.upsert_scored(record)?;
        }
        sink.flush()?;
        Ok(self.scored.len())
    }
}

pub struct RiskPipeline<'a> {
    dictionary: &'a SemanticDictionary,
    derivations: &'a DerivationTable,
    scoring: &'a ScoringConfig,
}

impl<'a> RiskPipeline<'a> {
    pub fn new(
        dictionary: &'a SemanticDictionary,
        derivations: &'a DerivationTable,
        scoring: &'a ScoringConfig,
    ) -> Self {
        Self {
            dictionary,
            derivations,
            scoring,
        }
    }

    pub fn from_config(config: &'a RiskConfig) -> Self {
        Self::new(&config.dictionary, &config.derivations, &config.scoring)
    }

    /// Fail the whole batch if any distinct label resolves ambiguously.
    pub fn preflight<'r, I>(&self, rows: I) -> Result<(), PipelineError>
    where
        I: IntoIterator<Item = &'r RawIndicatorRow>,
    {
        let labels: BTreeSet<&str> = rows.into_iter().map(|r| r.raw_label.as_str()).collect();
        let ambiguous: Vec<String> = labels
            .into_iter()
            .filter(|label| {
                matches!(
                    self.dictionary.match_label(label),
                    LabelMatch::Ambiguous { .. }
                )
            })
            .map(str::to_string)
            .collect();

        if ambiguous.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::AmbiguousMapping {
                version: self.dictionary.version().to_string(),
                labels: ambiguous,
            })
        }
    }

    /// normalize -> derive -> score for one institution/period
    pub fn process_group<'r, I>(&self, rows: I) -> Result<GroupOutcome, NormalizeError>
    where
        I: IntoIterator<Item = &'r RawIndicatorRow>,
    {
        let normalized = Normalizer::new(self.dictionary).normalize(rows)?;
        let derivation = self.derivations.derive(&normalized.record);
        let scored = RiskScorer::new(self.scoring).score(&derivation.record);

        Ok(GroupOutcome {
            canonical: derivation.record,
            scored,
            exclusions: normalized.exclusions,
            reconciliations: normalized.reconciliations,
            derivations: derivation.notes,
        })
    }

    pub fn run(&self, rows: &[RawIndicatorRow]) -> Result<BatchOutcome, PipelineError> {
        info!(
            "Starting batch: {} rows, dictionary '{}', scoring '{}'",
            rows.len(),
            self.dictionary.version(),
            self.scoring.version()
        );
        self.preflight(rows)?;

        let mut groups: BTreeMap<RecordKey, Vec<&RawIndicatorRow>> = BTreeMap::new();
        for row in rows {
            groups.entry(row.key()).or_default().push(row);
        }
        let groups: Vec<(RecordKey, Vec<&RawIndicatorRow>)> = groups.into_iter().collect();

        let results: Vec<(RecordKey, Result<GroupOutcome, NormalizeError>)> = groups
            .par_iter()
            .map(|(key, group)| (key.clone(), self.process_group(group.iter().copied())))
            .collect();

        let mut outcome = BatchOutcome {
            manifest: RunManifest {
                dictionary_version: self.dictionary.version().to_string(),
                dictionary_fingerprint: self.dictionary.fingerprint().to_string(),
                scoring_version: self.scoring.version().to_string(),
                scoring_fingerprint: self.scoring.fingerprint().to_string(),
                rows_received: rows.len(),
                groups: results.len(),
                groups_scored: 0,
                groups_failed: 0,
                rows_excluded: 0,
            },
            canonical: Vec::new(),
            scored: Vec::new(),
            failures: Vec::new(),
            exclusions: Vec::new(),
            notes: Vec::new(),
        };

        for (key, result) in results {
            match result {
                Ok(group) => {
                    debug!("Scored {} as {}", key, group.scored.risk_class);
                    outcome.notes.push(GroupNotes {
                        key,
                        reconciliations: group.reconciliations,
                        derivations: group.derivations,
                    });
                    outcome.exclusions.extend(group.exclusions);
                    outcome.canonical.push(group.canonical);
                    outcome.scored.push(group.scored);
                }
                Err(e) => {
                    warn!("Record {} failed: {}", key, e);
                    outcome.failures.push(RecordFailure {
                        key,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }

        outcome.manifest.groups_scored = outcome.scored.len();
        outcome.manifest.groups_failed = outcome.failures.len();
        outcome.manifest.rows_excluded = outcome.exclusions.len();

        info!(
            "Batch finished: {} scored, {} failed, {} rows excluded",
            outcome.manifest.groups_scored,
            outcome.manifest.groups_failed,
            outcome.manifest.rows_excluded
        );
        Ok(outcome)
    }
}
