//! Unit normalization rules.
//!
//! Each canonical metric has one canonical unit. Raw units are converted with a
//! fixed `value * scale + offset` rule; a raw unit without a rule is a
//! mismatch, never a pass-through.
//!
//! Some extracts omit the unit and deliver a percentage as a fraction
//! (Basel 0.152 instead of 15.2). A metric may declare an implied fraction
//! rule for that case: an absent unit with `0 < value < below` is scaled.

use std::collections::BTreeMap;

use risk_types::CanonicalMetricId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::text::normalize_unit;

/// Fixed multiplicative/offset conversion into a canonical unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitConversion {
    pub scale: Decimal,
    #[serde(default)]
    pub offset: Decimal,
}

impl UnitConversion {
    pub const IDENTITY: UnitConversion = UnitConversion {
        scale: Decimal::ONE,
        offset: Decimal::ZERO,
    };

    /// Returns `None` on decimal overflow.
    pub fn apply(&self, value: Decimal) -> Option<Decimal> {
        value.checked_mul(self.scale)?.checked_add(self.offset)
    }
}

/// Magnitude rule for unitless values that arrive as fractions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpliedFraction {
    /// Exclusive upper bound of the fraction range; the lower bound is zero
    pub below: Decimal,
    pub scale: Decimal,
}

impl ImpliedFraction {
    fn applies_to(&self, value: Decimal) -> bool {
        value > Decimal::ZERO && value < self.below
    }
}

/// Canonical unit of one metric plus the raw units it accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRules {
    canonical_unit: String,
    conversions: BTreeMap<String, UnitConversion>,
    implied_fraction: Option<ImpliedFraction>,
}

impl UnitRules {
    pub fn new(
        metric: CanonicalMetricId,
        canonical_unit: &str,
        conversions: &BTreeMap<String, UnitConversion>,
        implied_fraction: Option<ImpliedFraction>,
    ) -> Result<Self, ConfigError> {
        let canonical =
            normalize_unit(Some(canonical_unit)).ok_or_else(|| ConfigError::InvalidUnitRule {
                metric,
                unit: canonical_unit.to_string(),
                reason: "canonical unit must not be empty".into(),
            })?;

        let mut normalized = BTreeMap::new();
        for (raw_unit, conversion) in conversions {
            let invalid = |reason: &str| ConfigError::InvalidUnitRule {
                metric,
                unit: raw_unit.clone(),
                reason: reason.to_string(),
            };

            let unit = normalize_unit(Some(raw_unit)).ok_or_else(|| invalid("empty unit"))?;
            if unit == canonical {
                return Err(invalid("redefines the canonical unit"));
            }
            if conversion.scale.is_zero() {
                return Err(invalid("scale must not be zero"));
            }
            if normalized.insert(unit, *conversion).is_some() {
                return Err(invalid("declared more than once"));
            }
        }

        if let Some(rule) = implied_fraction {
            let invalid = |reason: &str| ConfigError::InvalidUnitRule {
                metric,
                unit: "implied_fraction".into(),
                reason: reason.to_string(),
            };
            if rule.below <= Decimal::ZERO {
                return Err(invalid("below must be positive"));
            }
            if rule.scale.is_zero() {
                return Err(invalid("scale must not be zero"));
            }
        }

        Ok(Self {
            canonical_unit: canonical,
            conversions: normalized,
            implied_fraction,
        })
    }

    pub fn canonical_unit(&self) -> &str {
        &self.canonical_unit
    }

    /// Conversion for a raw unit. An absent unit is taken to be canonical.
    pub fn conversion_for(&self, unit: Option<&str>) -> Option<UnitConversion> {
        match normalize_unit(unit) {
            None => Some(UnitConversion::IDENTITY),
            Some(u) if u == self.canonical_unit => Some(UnitConversion::IDENTITY),
            Some(u) => self.conversions.get(&u).copied(),
        }
    }

    /// Conversion for one observed value. Differs from [`conversion_for`]
    /// only for unitless values inside the implied fraction range.
    ///
    /// [`conversion_for`]: UnitRules::conversion_for
    pub fn conversion_for_value(
        &self,
        unit: Option<&str>,
        value: Decimal,
    ) -> Option<UnitConversion> {
        match self.implied_fraction {
            Some(rule) if normalize_unit(unit).is_none() && rule.applies_to(value) => {
                Some(UnitConversion {
                    scale: rule.scale,
                    offset: Decimal::ZERO,
                })
            }
            _ => self.conversion_for(unit),
        }
    }
}
