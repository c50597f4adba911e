//! Audit Reporter
//!
//! Reconciles dictionary coverage against every raw label ever observed.
//! Read-only: the report has no effect on normalization or scoring.
//!
//! Findings:
//! - unmapped: observed labels no rule matches (with a fuzzy suggestion when
//!   an alias is close)
//! - ambiguous: labels whose winning tier names several metrics; these block
//!   a run
//! - dead mappings: rules that never produced a winning match; informational

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use risk_types::{CanonicalMetricId, RawIndicatorRow};
use serde::Serialize;
use tracing::{info, warn};

use crate::dictionary::rules::{LabelMatcher, MatchTier, RuleRef};
use crate::dictionary::{LabelMatch, SemanticDictionary};
use crate::text::{normalize_label, split_report_prefix};

/// Minimum Jaro-Winkler similarity for an alias suggestion
pub const SUGGESTION_THRESHOLD: f64 = 0.85;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AliasSuggestion {
    pub alias: String,
    pub metric: CanonicalMetricId,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnmappedLabel {
    pub label: String,
    pub occurrences: usize,
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<AliasSuggestion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguousLabel {
    pub label: String,
    pub occurrences: usize,
    pub tier: MatchTier,
    pub candidates: Vec<RuleRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageEntry {
    pub label: String,
    pub occurrences: usize,
    pub metric: CanonicalMetricId,
    pub tier: MatchTier,
    pub rule_id: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditReport {
    pub dictionary_version: String,
    pub dictionary_fingerprint: String,
    pub rows_examined: usize,
    pub distinct_labels: usize,
    pub unmapped: Vec<UnmappedLabel>,
    pub ambiguous: Vec<AmbiguousLabel>,
    pub dead_mappings: Vec<RuleRef>,
    pub coverage: Vec<CoverageEntry>,
}

impl AuditReport {
    /// No unmapped and no ambiguous labels
    pub fn is_clean(&self) -> bool {
        self.unmapped.is_empty() && self.ambiguous.is_empty()
    }

    /// Ambiguous labels are a configuration defect and block a run
    pub fn has_blocking_defects(&self) -> bool {
        !self.ambiguous.is_empty()
    }
}

struct LabelStats {
    occurrences: usize,
    first_seen: NaiveDate,
    last_seen: NaiveDate,
}

/// Audit `dictionary` against all observed rows.
pub fn audit<'r, I>(rows: I, dictionary: &SemanticDictionary) -> AuditReport
where
    I: IntoIterator<Item = &'r RawIndicatorRow>,
{
    let mut rows_examined = 0;
    let mut labels: BTreeMap<&str, LabelStats> = BTreeMap::new();
    for row in rows {
        rows_examined += 1;
        labels
            .entry(row.raw_label.as_str())
            .and_modify(|s| {
                s.occurrences += 1;
                s.first_seen = s.first_seen.min(row.period);
                s.last_seen = s.last_seen.max(row.period);
            })
            .or_insert(LabelStats {
                occurrences: 1,
                first_seen: row.period,
                last_seen: row.period,
            });
    }

    let mut live: BTreeSet<usize> = BTreeSet::new();
    let mut unmapped = Vec::new();
    let mut ambiguous = Vec::new();
    let mut coverage = Vec::new();

    for (label, stats) in &labels {
        match dictionary.match_label(label) {
            LabelMatch::Unmapped => {
                let suggestion = suggest_alias(label, dictionary);
                warn!(
                    "Unmapped label '{}' ({} rows){}",
                    label,
                    stats.occurrences,
                    suggestion
                        .as_ref()
                        .map(|s| format!(", did you mean '{}'?", s.alias))
                        .unwrap_or_default()
                );
                unmapped.push(UnmappedLabel {
                    label: label.to_string(),
                    occurrences: stats.occurrences,
                    first_seen: stats.first_seen,
                    last_seen: stats.last_seen,
                    suggestion,
                });
            }
            LabelMatch::Ambiguous { tier, rules } => {
                warn!(
                    "Ambiguous label '{}' matches {} {} rules",
                    label,
                    rules.len(),
                    tier.as_str()
                );
                live.extend(rules.iter().map(|r| r.rule_id));
                ambiguous.push(AmbiguousLabel {
                    label: label.to_string(),
                    occurrences: stats.occurrences,
                    tier,
                    candidates: rules.iter().map(|r| r.to_ref()).collect(),
                });
            }
            LabelMatch::Resolved {
                tier,
                metric,
                rules,
            } => {
                live.extend(rules.iter().map(|r| r.rule_id));
                coverage.push(CoverageEntry {
                    label: label.to_string(),
                    occurrences: stats.occurrences,
                    metric,
                    tier,
                    rule_id: rules.first().map(|r| r.rule_id).unwrap_or_default(),
                });
            }
        }
    }

    let dead_mappings: Vec<RuleRef> = dictionary
        .mappings()
        .iter()
        .filter(|m| !live.contains(&m.rule_id))
        .map(|m| m.to_ref())
        .collect();
    for rule in &dead_mappings {
        warn!(
            "Dead mapping #{} ({} '{}' -> {})",
            rule.rule_id,
            rule.tier.as_str(),
            rule.expression,
            rule.metric
        );
    }

    info!(
        "Audit of dictionary '{}': {} rows, {} labels, {} unmapped, {} ambiguous, {} dead rules",
        dictionary.version(),
        rows_examined,
        labels.len(),
        unmapped.len(),
        ambiguous.len(),
        dead_mappings.len()
    );

    AuditReport {
        dictionary_version: dictionary.version().to_string(),
        dictionary_fingerprint: dictionary.fingerprint().to_string(),
        rows_examined,
        distinct_labels: labels.len(),
        unmapped,
        ambiguous,
        dead_mappings,
        coverage,
    }
}

/// Closest exact/normalized alias to an unmapped label, if close enough.
fn suggest_alias(label: &str, dictionary: &SemanticDictionary) -> Option<AliasSuggestion> {
    let (_, name) = split_report_prefix(label);
    let target = normalize_label(name);
    if target.is_empty() {
        return None;
    }

    let mut best: Option<AliasSuggestion> = None;
    for mapping in dictionary.mappings() {
        let alias = match &mapping.matcher {
            LabelMatcher::Exact(alias) => alias,
            LabelMatcher::Normalized(alias) => alias,
            LabelMatcher::Pattern(_) => continue,
        };
        let similarity = strsim::jaro_winkler(&target, &normalize_label(alias));
        if similarity < SUGGESTION_THRESHOLD {
            continue;
        }
        // first declared alias wins ties
        if best.as_ref().map_or(true, |b| similarity > b.similarity) {
            best = Some(AliasSuggestion {
                alias: alias.clone(),
                metric: mapping.canonical_metric_id,
                similarity,
            });
        }
    }

    best.map(|mut s| {
        s.similarity = (s.similarity * 10_000.0).round() / 10_000.0;
        s
    })
}
