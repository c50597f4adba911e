//! Metric derivation: pure logic over canonical records.
//!
//! Every derived metric reads primary metrics only. The table rejects a
//! formula whose operand is another formula's output, so evaluation order
//! across derived metrics never matters.

use risk_types::{CanonicalMetricId, CanonicalMetricRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// Decimal places kept on derived values
pub const DERIVED_SCALE: u32 = 8;

// ── Expressions ───────────────────────────────────────────────

/// The expression used to compute a derived metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DerivationExpression {
    /// `numerator / denominator * scale`
    Ratio {
        numerator: CanonicalMetricId,
        denominator: CanonicalMetricId,
        scale: Decimal,
    },
}

impl DerivationExpression {
    pub fn operands(&self) -> Vec<CanonicalMetricId> {
        match self {
            DerivationExpression::Ratio {
                numerator,
                denominator,
                ..
            } => vec![*numerator, *denominator],
        }
    }

    fn evaluate(&self, record: &CanonicalMetricRecord) -> Result<Decimal, SkipReason> {
        match *self {
            DerivationExpression::Ratio {
                numerator,
                denominator,
                scale,
            } => {
                let n = record.get(numerator).ok_or(SkipReason::MissingOperand {
                    operand: numerator,
                })?;
                let d = record.get(denominator).ok_or(SkipReason::MissingOperand {
                    operand: denominator,
                })?;
                if d.is_zero() {
                    return Err(SkipReason::ZeroDenominator {
                        operand: denominator,
                    });
                }
                n.checked_div(d)
                    .and_then(|ratio| ratio.checked_mul(scale))
                    .ok_or(SkipReason::Overflow)
            }
        }
    }
}

/// One derived metric and its formula
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationSpec {
    pub output: CanonicalMetricId,
    pub expression: DerivationExpression,
    pub description: String,
}

// ── Outcomes ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    MissingOperand { operand: CanonicalMetricId },
    ZeroDenominator { operand: CanonicalMetricId },
    Overflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DerivationOutcome {
    Derived { value: Decimal },
    /// The source already reported this metric; its value is kept as is
    ReportedRetained { value: Decimal },
    /// Explicit omission, not an error
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationNote {
    pub metric: CanonicalMetricId,
    #[serde(flatten)]
    pub outcome: DerivationOutcome,
}

/// Input record plus derived keys, with one note per derived metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Derivation {
    pub record: CanonicalMetricRecord,
    pub notes: Vec<DerivationNote>,
}

impl Derivation {
    pub fn skipped(&self) -> impl Iterator<Item = &DerivationNote> {
        self.notes
            .iter()
            .filter(|n| matches!(n.outcome, DerivationOutcome::Skipped { .. }))
    }
}

// ── Table ─────────────────────────────────────────────────────

/// Validated set of derivation formulas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationTable {
    specs: Vec<DerivationSpec>,
}

impl DerivationTable {
    pub fn new(specs: Vec<DerivationSpec>) -> Result<Self, ConfigError> {
        for (i, spec) in specs.iter().enumerate() {
            if specs[..i].iter().any(|s| s.output == spec.output) {
                return Err(ConfigError::DuplicateDerivation(spec.output));
            }
            for operand in spec.expression.operands() {
                if specs.iter().any(|s| s.output == operand) {
                    return Err(ConfigError::ChainedDerivation {
                        output: spec.output,
                        operand,
                    });
                }
            }
        }
        Ok(Self { specs })
    }

    /// ROA and leverage, as the IF.data mart computes them.
    pub fn standard() -> Self {
        Self {
            specs: vec![
                DerivationSpec {
                    output: CanonicalMetricId::Roa,
                    expression: DerivationExpression::Ratio {
                        numerator: CanonicalMetricId::NetIncome,
                        denominator: CanonicalMetricId::TotalAssets,
                        scale: Decimal::ONE_HUNDRED,
                    },
                    description: "net income / total assets, percent".into(),
                },
                DerivationSpec {
                    output: CanonicalMetricId::Leverage,
                    expression: DerivationExpression::Ratio {
                        numerator: CanonicalMetricId::TotalAssets,
                        denominator: CanonicalMetricId::Equity,
                        scale: Decimal::ONE,
                    },
                    description: "total assets / equity".into(),
                },
            ],
        }
    }

    pub fn specs(&self) -> &[DerivationSpec] {
        &self.specs
    }

    /// Derive every configured metric from the primary metrics of `record`.
    ///
    /// Formulas read the input record only, never each other's output.
    pub fn derive(&self, record: &CanonicalMetricRecord) -> Derivation {
        let mut derived = record.clone();
        let mut notes = Vec::with_capacity(self.specs.len());

        for spec in &self.specs {
            let outcome = if let Some(reported) = record.get(spec.output) {
                DerivationOutcome::ReportedRetained { value: reported }
            } else {
                match spec.expression.evaluate(record) {
                    Ok(value) => {
                        let value = value.round_dp(DERIVED_SCALE).normalize();
                        derived.metrics.insert(spec.output, value);
                        DerivationOutcome::Derived { value }
                    }
                    Err(reason) => {
                        debug!(
                            "Skipped {} for {}: {:?}",
                            spec.output,
                            record.key(),
                            reason
                        );
                        DerivationOutcome::Skipped { reason }
                    }
                }
            };
            notes.push(DerivationNote {
                metric: spec.output,
                outcome,
            });
        }

        Derivation {
            record: derived,
            notes,
        }
    }
}

impl Default for DerivationTable {
    fn default() -> Self {
        Self::standard()
    }
}
