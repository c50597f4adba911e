//! Breakpoint curves
//!
//! One evaluator for every factor. A factor is a table of `(value, score)`
//! pairs; the curve maps an observed metric value onto a 0–100 sub-score.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub value: Decimal,
    pub score: Decimal,
}

impl Breakpoint {
    pub fn new(value: Decimal, score: Decimal) -> Self {
        Self { value, score }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Piecewise-linear between breakpoints, flat outside the table
    #[default]
    Linear,
    /// Score of the last breakpoint at or below the value
    Step,
}

/// Which way a metric has to move for its sub-score to rise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveDirection {
    LowerIsWorse,
    HigherIsWorse,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurveEvaluation {
    /// Unrounded sub-score, already within [0, 100]
    pub score: Decimal,
    /// Nearest breakpoint crossed in the worsening direction
    pub threshold: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointCurve {
    points: Vec<Breakpoint>,
    interpolation: Interpolation,
    direction: CurveDirection,
}

impl BreakpointCurve {
    /// Validate a breakpoint table. The error is a reason string; callers
    /// attach the factor id.
    pub fn new(points: Vec<Breakpoint>, interpolation: Interpolation) -> Result<Self, String> {
        let (first, last) = match (points.first(), points.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Err("at least one breakpoint is required".into()),
        };

        for point in &points {
            if point.score < Decimal::ZERO || point.score > Decimal::ONE_HUNDRED {
                return Err(format!(
                    "score {} at {} is outside [0, 100]",
                    point.score, point.value
                ));
            }
        }

        for pair in points.windows(2) {
            if pair[1].value <= pair[0].value {
                return Err(format!(
                    "values must be strictly increasing ({} then {})",
                    pair[0].value, pair[1].value
                ));
            }
            if pair[1].value.checked_sub(pair[0].value).is_none() {
                return Err(format!(
                    "span between {} and {} is not representable",
                    pair[0].value, pair[1].value
                ));
            }
        }

        let non_decreasing = points.windows(2).all(|p| p[1].score >= p[0].score);
        let non_increasing = points.windows(2).all(|p| p[1].score <= p[0].score);
        if !non_decreasing && !non_increasing {
            return Err("scores must be monotonic".into());
        }

        let direction = if first.score > last.score {
            CurveDirection::LowerIsWorse
        } else if first.score < last.score {
            CurveDirection::HigherIsWorse
        } else {
            CurveDirection::Flat
        };

        Ok(Self {
            points,
            interpolation,
            direction,
        })
    }

    pub fn points(&self) -> &[Breakpoint] {
        &self.points
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn direction(&self) -> CurveDirection {
        self.direction
    }

    /// Lowest score the curve can produce
    pub fn safest_score(&self) -> Decimal {
        self.points
            .iter()
            .map(|p| p.score)
            .min()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn evaluate(&self, value: Decimal) -> CurveEvaluation {
        let score = self
            .raw_score(value)
            .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
        let threshold = if score > self.safest_score() {
            self.crossed_threshold(value)
        } else {
            None
        };
        CurveEvaluation { score, threshold }
    }

    fn raw_score(&self, value: Decimal) -> Decimal {
        // index of the first breakpoint strictly above the value
        let above = self.points.partition_point(|p| p.value <= value);

        if above == 0 {
            return self.points[0].score;
        }
        let lower = self.points[above - 1];
        let Some(upper) = self.points.get(above) else {
            return lower.score;
        };

        match self.interpolation {
            Interpolation::Step => lower.score,
            Interpolation::Linear => {
                // (value - lower) / span is in [0, 1), so the products below stay small
                let fraction = (value - lower.value) / (upper.value - lower.value);
                lower.score + (upper.score - lower.score) * fraction
            }
        }
    }

    fn crossed_threshold(&self, value: Decimal) -> Option<Decimal> {
        match self.direction {
            CurveDirection::LowerIsWorse => self
                .points
                .iter()
                .map(|p| p.value)
                .find(|threshold| value <= *threshold),
            CurveDirection::HigherIsWorse => self
                .points
                .iter()
                .rev()
                .map(|p| p.value)
                .find(|threshold| value >= *threshold),
            CurveDirection::Flat => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn basel_curve(interpolation: Interpolation) -> BreakpointCurve {
        BreakpointCurve::new(
            vec![
                Breakpoint::new(d("8"), d("100")),
                Breakpoint::new(d("10.5"), d("60")),
                Breakpoint::new(d("12"), d("30")),
                Breakpoint::new(d("14"), d("0")),
            ],
            interpolation,
        )
        .unwrap()
    }

    fn default_rate_curve() -> BreakpointCurve {
        BreakpointCurve::new(
            vec![
                Breakpoint::new(d("3"), d("0")),
                Breakpoint::new(d("4"), d("25")),
                Breakpoint::new(d("6"), d("60")),
                Breakpoint::new(d("10"), d("100")),
            ],
            Interpolation::Linear,
        )
        .unwrap()
    }

    #[test]
    fn direction_follows_scores() {
        assert_eq!(
            basel_curve(Interpolation::Linear).direction(),
            CurveDirection::LowerIsWorse
        );
        assert_eq!(default_rate_curve().direction(), CurveDirection::HigherIsWorse);
    }

    #[test]
    fn linear_interpolates_between_breakpoints() {
        let curve = basel_curve(Interpolation::Linear);
        // 9.2 sits 1.2/2.5 of the way from 8 (100) to 10.5 (60)
        assert_eq!(curve.evaluate(d("9.2")).score, d("80.8"));
        assert_eq!(curve.evaluate(d("13")).score, d("15"));
    }

    #[test]
    fn linear_is_flat_outside_the_table() {
        let curve = basel_curve(Interpolation::Linear);
        assert_eq!(curve.evaluate(d("2")).score, d("100"));
        assert_eq!(curve.evaluate(d("18")).score, d("0"));
        assert_eq!(curve.evaluate(d("14")).score, d("0"));
    }

    #[test]
    fn step_takes_last_breakpoint_at_or_below() {
        let curve = basel_curve(Interpolation::Step);
        assert_eq!(curve.evaluate(d("9.2")).score, d("100"));
        assert_eq!(curve.evaluate(d("10.5")).score, d("60"));
        assert_eq!(curve.evaluate(d("11.9")).score, d("60"));
        assert_eq!(curve.evaluate(d("7")).score, d("100"));
    }

    #[test]
    fn threshold_lower_is_worse() {
        let curve = basel_curve(Interpolation::Linear);
        assert_eq!(curve.evaluate(d("9.2")).threshold, Some(d("10.5")));
        assert_eq!(curve.evaluate(d("13")).threshold, Some(d("14")));
        assert_eq!(curve.evaluate(d("5")).threshold, Some(d("8")));
        assert_eq!(curve.evaluate(d("18")).threshold, None);
    }

    #[test]
    fn threshold_higher_is_worse() {
        let curve = default_rate_curve();
        assert_eq!(curve.evaluate(d("5")).threshold, Some(d("4")));
        assert_eq!(curve.evaluate(d("12")).threshold, Some(d("10")));
        assert_eq!(curve.evaluate(d("3")).threshold, None);
        assert_eq!(curve.evaluate(d("1")).threshold, None);
    }

    #[test]
    fn single_breakpoint_is_flat() {
        let curve =
            BreakpointCurve::new(vec![Breakpoint::new(d("1"), d("40"))], Interpolation::Linear)
                .unwrap();
        assert_eq!(curve.direction(), CurveDirection::Flat);
        assert_eq!(curve.evaluate(d("-5")).score, d("40"));
        assert_eq!(curve.evaluate(d("5")).threshold, None);
    }

    #[test]
    fn rejects_empty_table() {
        let err = BreakpointCurve::new(vec![], Interpolation::Linear).unwrap_err();
        assert!(err.contains("at least one"));
    }

    #[test]
    fn rejects_unsorted_values() {
        let err = BreakpointCurve::new(
            vec![
                Breakpoint::new(d("2"), d("0")),
                Breakpoint::new(d("2"), d("50")),
            ],
            Interpolation::Linear,
        )
        .unwrap_err();
        assert!(err.contains("strictly increasing"));
    }

    #[test]
    fn rejects_out_of_range_score() {
        let err = BreakpointCurve::new(
            vec![Breakpoint::new(d("2"), d("120"))],
            Interpolation::Step,
        )
        .unwrap_err();
        assert!(err.contains("outside [0, 100]"));
    }

    #[test]
    fn rejects_non_monotonic_scores() {
        let err = BreakpointCurve::new(
            vec![
                Breakpoint::new(d("1"), d("0")),
                Breakpoint::new(d("2"), d("80")),
                Breakpoint::new(d("3"), d("40")),
            ],
            Interpolation::Linear,
        )
        .unwrap_err();
        assert!(err.contains("monotonic"));
    }
}
