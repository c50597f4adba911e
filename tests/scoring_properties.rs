//! Property tests for the shipped scoring and dictionary tables.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;

use ifdata_risk::config::{ConfigLoader, RiskConfig};
use ifdata_risk::scoring::breakpoints::CurveDirection;
use ifdata_risk::scoring::RiskScorer;
use ifdata_risk::{CanonicalMetricId, CanonicalMetricRecord, RecordKey};

fn config() -> RiskConfig {
    ConfigLoader::new(concat!(env!("CARGO_MANIFEST_DIR"), "/config"))
        .load()
        .unwrap()
}

fn key() -> RecordKey {
    RecordKey::new("BANK1", NaiveDate::from_ymd_opt(2024, 12, 31).unwrap())
}

fn record(metrics: BTreeMap<CanonicalMetricId, Decimal>) -> CanonicalMetricRecord {
    let mut record = CanonicalMetricRecord::new(&key());
    record.metrics = metrics;
    record
}

fn arb_value() -> impl Strategy<Value = Decimal> {
    (-1_000_000i64..1_000_000, 0u32..5).prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
}

fn arb_metric() -> impl Strategy<Value = CanonicalMetricId> {
    prop::sample::select(CanonicalMetricId::ALL.to_vec())
}

fn arb_metrics() -> impl Strategy<Value = BTreeMap<CanonicalMetricId, Decimal>> {
    prop::collection::btree_map(arb_metric(), arb_value(), 0..=8)
}

fn arb_label() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("1::Ativo Total".to_string()),
        Just("5::Índice de Basileia".to_string()),
        Just("Inadimplência".to_string()),
        Just("  indice   de LIQUIDEZ ".to_string()),
        "[0-9]{1,2}::[A-Za-zÀ-ú ]{0,24}",
        "\\PC{0,32}",
    ]
}

fn arb_unit() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some("r$ mil".to_string())),
        Just(Some("fraction".to_string())),
        "[a-z$% ]{1,8}".prop_map(Some),
    ]
}

proptest! {
    #[test]
    fn composite_is_bounded(metrics in arb_metrics()) {
        let config = config();
        let scored = RiskScorer::new(&config.scoring).score(&record(metrics));

        prop_assert!(scored.composite_score >= Decimal::ZERO);
        prop_assert!(scored.composite_score <= Decimal::ONE_HUNDRED);
        for driver in &scored.drivers {
            prop_assert!(driver.sub_score >= Decimal::ZERO);
            prop_assert!(driver.sub_score <= Decimal::ONE_HUNDRED);
        }
    }

    #[test]
    fn worsening_a_metric_never_lowers_its_sub_score(a in arb_value(), b in arb_value()) {
        let config = config();
        let (low, high) = if a <= b { (a, b) } else { (b, a) };

        for factor in config.scoring.factors() {
            let at_low = factor.curve.evaluate(low).score;
            let at_high = factor.curve.evaluate(high).score;
            match factor.curve.direction() {
                CurveDirection::LowerIsWorse => prop_assert!(at_low >= at_high, "{}", factor.factor_id),
                CurveDirection::HigherIsWorse => prop_assert!(at_low <= at_high, "{}", factor.factor_id),
                CurveDirection::Flat => prop_assert_eq!(at_low, at_high),
            }
        }
    }

    #[test]
    fn renormalized_weights_sum_to_one(metrics in arb_metrics()) {
        let config = config();
        let record = record(metrics);
        let weights = RiskScorer::new(&config.scoring).renormalized_weights(&record);

        if !weights.is_empty() {
            let total: Decimal = weights.iter().map(|(_, w)| *w).sum();
            let tolerance = Decimal::new(1, 12);
            prop_assert!((total - Decimal::ONE).abs() < tolerance, "total {}", total);
        }
    }

    #[test]
    fn every_factor_is_a_driver_or_an_omission(metrics in arb_metrics()) {
        let config = config();
        let scored = RiskScorer::new(&config.scoring).score(&record(metrics));

        prop_assert_eq!(
            scored.drivers.len() + scored.omitted_factors.len(),
            config.scoring.factors().len()
        );
        for pair in scored.drivers.windows(2) {
            prop_assert!(pair[0].contribution >= pair[1].contribution);
        }
    }

    #[test]
    fn scoring_is_independent_of_insertion_order(metrics in arb_metrics()) {
        let config = config();
        let scorer = RiskScorer::new(&config.scoring);

        let mut reversed = CanonicalMetricRecord::new(&key());
        for (metric, value) in metrics.iter().rev() {
            reversed = reversed.with(*metric, *value);
        }

        prop_assert_eq!(scorer.score(&record(metrics)), scorer.score(&reversed));
    }

    #[test]
    fn resolution_is_pure(label in arb_label(), unit in arb_unit()) {
        let config = config();
        let first = config.dictionary.resolve(&label, unit.as_deref());
        let second = config.dictionary.resolve(&label, unit.as_deref());
        prop_assert_eq!(first, second);
    }
}

#[test]
fn equal_contributions_keep_declaration_order() {
    let config = config();
    let d = |s: &str| Decimal::from_str(s).unwrap();
    let safe = record(BTreeMap::from([
        (CanonicalMetricId::Leverage, d("5")),
        (CanonicalMetricId::DefaultRate, d("1")),
        (CanonicalMetricId::Roa, d("2")),
        (CanonicalMetricId::Liquidity, d("3")),
        (CanonicalMetricId::BaselIndex, d("20")),
    ]));

    let scored = RiskScorer::new(&config.scoring).score(&safe);
    let order: Vec<&str> = scored.drivers.iter().map(|d| d.factor_id.as_str()).collect();

    assert_eq!(
        order,
        vec!["basel_index", "liquidity", "roa", "default_rate", "leverage"]
    );
}
