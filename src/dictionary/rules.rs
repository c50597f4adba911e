//! Typed label match predicates.
//!
//! Rules are evaluated tier by tier (exact, then normalized, then pattern).
//! The first tier with any match decides; inside that tier every matching rule
//! must name the same metric.

use regex::{Regex, RegexBuilder};
use risk_types::CanonicalMetricId;
use serde::{Deserialize, Serialize};

use crate::text::{normalize_label, LabelForms};

/// Match precedence, lowest value wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    Normalized,
    Pattern,
}

impl MatchTier {
    pub const ORDER: [MatchTier; 3] = [MatchTier::Exact, MatchTier::Normalized, MatchTier::Pattern];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchTier::Exact => "exact",
            MatchTier::Normalized => "normalized",
            MatchTier::Pattern => "pattern",
        }
    }
}

#[derive(Debug, Clone)]
pub enum LabelMatcher {
    /// Name part equals the alias byte for byte
    Exact(String),
    /// Normalized name equals the normalized alias
    Normalized(String),
    /// Case-insensitive regex over the cleaned name
    Pattern(Regex),
}

impl LabelMatcher {
    pub fn exact(alias: impl Into<String>) -> Self {
        LabelMatcher::Exact(alias.into())
    }

    pub fn normalized(alias: &str) -> Self {
        LabelMatcher::Normalized(normalize_label(alias))
    }

    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map(LabelMatcher::Pattern)
    }

    pub fn tier(&self) -> MatchTier {
        match self {
            LabelMatcher::Exact(_) => MatchTier::Exact,
            LabelMatcher::Normalized(_) => MatchTier::Normalized,
            LabelMatcher::Pattern(_) => MatchTier::Pattern,
        }
    }

    pub fn matches(&self, forms: &LabelForms) -> bool {
        match self {
            LabelMatcher::Exact(alias) => forms.verbatim == *alias,
            LabelMatcher::Normalized(alias) => forms.normalized == *alias,
            LabelMatcher::Pattern(re) => re.is_match(&forms.cleaned),
        }
    }

    /// Alias or pattern source, as it appears in reports
    pub fn expression(&self) -> &str {
        match self {
            LabelMatcher::Exact(alias) | LabelMatcher::Normalized(alias) => alias,
            LabelMatcher::Pattern(re) => re.as_str(),
        }
    }
}

/// One compiled dictionary rule
#[derive(Debug, Clone)]
pub struct SemanticMapping {
    /// Declaration order in the dictionary file
    pub rule_id: usize,
    pub canonical_metric_id: CanonicalMetricId,
    pub matcher: LabelMatcher,
}

impl SemanticMapping {
    pub fn tier(&self) -> MatchTier {
        self.matcher.tier()
    }

    pub fn to_ref(&self) -> RuleRef {
        RuleRef {
            rule_id: self.rule_id,
            metric: self.canonical_metric_id,
            tier: self.tier(),
            expression: self.matcher.expression().to_string(),
        }
    }
}

/// Serializable reference to a rule, used in audit and failure reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRef {
    pub rule_id: usize,
    pub metric: CanonicalMetricId,
    pub tier: MatchTier,
    pub expression: String,
}
