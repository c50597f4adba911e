//! End-to-end batch behaviour against the shipped configuration.

use std::str::FromStr;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;

use ifdata_risk::audit::audit;
use ifdata_risk::config::{ConfigLoader, RiskConfig};
use ifdata_risk::derivation::DerivationTable;
use ifdata_risk::dictionary::SemanticDictionary;
use ifdata_risk::normalizer::ExclusionReason;
use ifdata_risk::pipeline::RiskPipeline;
use ifdata_risk::source::parse_source;
use ifdata_risk::store::{JsonFileStore, RecordSink};
use ifdata_risk::{CanonicalMetricId, PipelineError, RawIndicatorRow, RecordKey, RiskClass};

fn config() -> RiskConfig {
    ConfigLoader::new(concat!(env!("CARGO_MANIFEST_DIR"), "/config"))
        .load()
        .unwrap()
}

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn period() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
}

fn row(bank: &str, label: &str, value: &str) -> RawIndicatorRow {
    RawIndicatorRow::new(bank, period(), label, d(value))
}

#[test]
fn conflicting_total_assets_fail_one_institution_only() {
    let config = config();
    let rows = vec![
        row("BANK1", "1::Ativo Total", "1000"),
        row("BANK1", "1::Ativo Total", "1200"),
        row("BANK1", "5::Índice de Basileia", "15.2"),
        row("BANK2", "1::Ativo Total", "900"),
        row("BANK2", "5::Índice de Basileia", "11"),
    ];

    let outcome = RiskPipeline::from_config(&config).run(&rows).unwrap();

    assert_eq!(outcome.manifest.groups, 2);
    assert_eq!(outcome.manifest.groups_failed, 1);
    let failure = &outcome.failures[0];
    assert_eq!(failure.key, RecordKey::new("BANK1", period()));
    assert_eq!(failure.kind, "conflicting_observation");
    assert!(failure.message.contains("1000 vs 1200"));

    assert_eq!(outcome.scored.len(), 1);
    assert_eq!(outcome.scored[0].institution_id, "BANK2");
    assert!(outcome
        .canonical
        .iter()
        .all(|r| r.institution_id != "BANK1"));
}

#[test]
fn revised_row_replaces_the_original() {
    let config = config();
    let rows = vec![
        row("BANK1", "1::Ativo Total", "1000"),
        row("BANK1", "1::Ativo Total", "1200").with_revision(2),
    ];

    let outcome = RiskPipeline::from_config(&config).run(&rows).unwrap();

    assert!(outcome.failures.is_empty());
    assert_eq!(
        outcome.canonical[0].get(CanonicalMetricId::TotalAssets),
        Some(d("1200"))
    );
    assert_eq!(outcome.notes[0].reconciliations.len(), 1);
}

#[test]
fn unmapped_label_is_audited_and_kept_out_of_the_record() {
    let config = config();
    let rows = vec![
        row("BANK1", "1::Ativo Total", "1000"),
        row("BANK1", "3::Carteira de Câmbio", "77"),
    ];

    let report = audit(&rows, &config.dictionary);
    let unmapped: Vec<_> = report.unmapped.iter().map(|u| u.label.as_str()).collect();
    assert_eq!(unmapped, vec!["3::Carteira de Câmbio"]);

    let outcome = RiskPipeline::from_config(&config).run(&rows).unwrap();
    let record = &outcome.canonical[0];
    assert_eq!(record.metrics.len(), 1);
    assert!(record.contains(CanonicalMetricId::TotalAssets));

    assert_eq!(outcome.exclusions.len(), 1);
    assert_eq!(outcome.exclusions[0].raw_label, "3::Carteira de Câmbio");
    assert_eq!(outcome.exclusions[0].reason, ExclusionReason::UnmappedLabel);
}

#[test]
fn runs_are_byte_identical_whatever_the_row_order() {
    let config = config();
    let rows = vec![
        row("BANK1", "1::Ativo Total", "1000"),
        row("BANK1", "1::Lucro Líquido", "-4"),
        row("BANK1", "1::Patrimônio Líquido", "80"),
        row("BANK1", "5::Índice de Basileia", "9.2"),
        row("BANK1", "5::Índice de Liquidez", "0.95"),
        row("BANK2", "Inadimplencia", "6.5"),
        row("BANK2", "Basileia", "12.5"),
    ];
    let mut reversed = rows.clone();
    reversed.reverse();

    let pipeline = RiskPipeline::from_config(&config);
    let first = serde_json::to_string(&pipeline.run(&rows).unwrap()).unwrap();
    let second = serde_json::to_string(&pipeline.run(&rows).unwrap()).unwrap();
    let shuffled = serde_json::to_string(&pipeline.run(&reversed).unwrap()).unwrap();

    assert_eq!(first, second);
    assert_eq!(first, shuffled);
}

#[test]
fn weak_capital_and_negative_roa_both_raise_risk() {
    let config = config();
    let rows = vec![
        row("BANK1", "5::Índice de Basileia", "9.2"),
        row("BANK1", "ROA", "-0.4"),
    ];

    let outcome = RiskPipeline::from_config(&config).run(&rows).unwrap();
    let scored = &outcome.scored[0];

    assert_eq!(scored.drivers.len(), 2);
    for driver in &scored.drivers {
        assert!(driver.sub_score > Decimal::ZERO, "{:?}", driver);
    }
    let basel = scored
        .drivers
        .iter()
        .find(|d| d.metric == CanonicalMetricId::BaselIndex)
        .unwrap();
    assert_eq!(basel.threshold, Some(d("10.5")));
    assert!(basel.rationale.contains("below threshold 10.5"));
    assert_eq!(scored.risk_class, RiskClass::High);
}

#[test]
fn strong_capital_and_roa_score_low() {
    let config = config();
    let rows = vec![
        row("BANK1", "5::Índice de Basileia", "18"),
        row("BANK1", "ROA", "2.5"),
    ];

    let outcome = RiskPipeline::from_config(&config).run(&rows).unwrap();
    let scored = &outcome.scored[0];

    assert_eq!(scored.composite_score, Decimal::ZERO);
    assert_eq!(scored.risk_class, RiskClass::Low);
    assert!(scored.drivers.iter().all(|d| d.contribution.is_zero()));
    assert!(scored.drivers.iter().all(|d| d.threshold.is_none()));
    assert_eq!(scored.omitted_factors.len(), 3);
}

#[test]
fn ifdata_extract_flows_through_the_adapter() {
    let config = config();
    let content = r#"
{"CodInst": "00000208", "AnoMes": 202412, "NumeroRelatorio": "1", "NomeColuna": "Ativo Total", "Saldo": "1.000.000,00"}
{"CodInst": "00000208", "AnoMes": 202412, "NumeroRelatorio": "1", "NomeColuna": "Patrimônio Líquido", "Saldo": "50.000,00"}
{"CodInst": "00000208", "AnoMes": 202412, "NumeroRelatorio": "1", "NomeColuna": "Lucro Líquido", "Saldo": "-5.000,00"}
{"CodInst": "00000208", "AnoMes": 202412, "NumeroRelatorio": "5", "NomeColuna": "Índice de Basileia", "Saldo": "0,095", "unit": "fraction"}
"#;
    let batch = parse_source(content).unwrap();
    assert!(batch.rejected.is_empty());

    let outcome = RiskPipeline::from_config(&config).run(&batch.rows).unwrap();
    let record = &outcome.canonical[0];

    assert_eq!(record.period, period());
    assert_eq!(record.get(CanonicalMetricId::BaselIndex), Some(d("9.5")));
    assert_eq!(record.get(CanonicalMetricId::Roa), Some(d("-0.5")));
    assert_eq!(record.get(CanonicalMetricId::Leverage), Some(d("20")));
    assert_eq!(outcome.scored[0].drivers.len(), 3);
}

#[test]
fn unitless_basel_fraction_scores_as_percent() {
    let config = config();
    let content = r#"
{"CodInst": "00000208", "AnoMes": 202412, "NumeroRelatorio": "5", "NomeColuna": "Índice de Basileia", "Saldo": "0,152"}
{"CodInst": "00000360", "AnoMes": 202412, "NumeroRelatorio": "5", "NomeColuna": "Índice de Basileia", "Saldo": "15,2"}
"#;
    let batch = parse_source(content).unwrap();
    let outcome = RiskPipeline::from_config(&config).run(&batch.rows).unwrap();

    assert_eq!(outcome.canonical.len(), 2);
    for record in &outcome.canonical {
        assert_eq!(record.get(CanonicalMetricId::BaselIndex), Some(d("15.2")));
    }
    for scored in &outcome.scored {
        assert_eq!(scored.composite_score, Decimal::ZERO);
        assert_eq!(scored.risk_class, RiskClass::Low);
    }
}

#[test]
fn implausible_liquidity_is_excluded() {
    let config = config();
    let rows = vec![row("BANK1", "5::Índice de Liquidez", "135")];

    let outcome = RiskPipeline::from_config(&config).run(&rows).unwrap();

    assert!(!outcome.canonical[0].contains(CanonicalMetricId::Liquidity));
    assert!(matches!(
        outcome.exclusions[0].reason,
        ExclusionReason::Implausible {
            metric: CanonicalMetricId::Liquidity,
            ..
        }
    ));
}

#[test]
fn ambiguous_dictionary_blocks_the_whole_batch() {
    let config = config();
    let dictionary = SemanticDictionary::from_yaml_str(
        r#"
version: overlapping
metrics:
  - metric: basel_index
    canonical_unit: "%"
    patterns: ['basileia']
  - metric: liquidity
    canonical_unit: ratio
    patterns: ['liquidez']
"#,
        "inline",
    )
    .unwrap();
    let derivations = DerivationTable::standard();
    let pipeline = RiskPipeline::new(&dictionary, &derivations, &config.scoring);

    let rows = vec![
        row("BANK1", "Basileia", "12"),
        row("BANK2", "Basileia e Liquidez", "1"),
    ];

    let err = pipeline.run(&rows).unwrap_err();
    assert_eq!(
        err,
        PipelineError::AmbiguousMapping {
            version: "overlapping".into(),
            labels: vec!["Basileia e Liquidez".into()],
        }
    );
}

#[test]
fn rerun_upserts_instead_of_appending() {
    let config = config();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let pipeline = RiskPipeline::from_config(&config);

    let first = pipeline
        .run(&[row("BANK1", "5::Índice de Basileia", "9.2")])
        .unwrap();
    first.persist(&mut JsonFileStore::open(&path).unwrap()).unwrap();

    let second = pipeline
        .run(&[row("BANK1", "5::Índice de Basileia", "15")])
        .unwrap();
    let mut store = JsonFileStore::open(&path).unwrap();
    second.persist(&mut store).unwrap();
    store.flush().unwrap();

    let stored = JsonFileStore::open(&path).unwrap();
    let key = RecordKey::new("BANK1", period());
    assert_eq!(stored.records().len(), 1);
    assert_eq!(
        stored
            .records()
            .canonical(&key)
            .unwrap()
            .get(CanonicalMetricId::BaselIndex),
        Some(d("15"))
    );
    assert_eq!(
        stored.records().scored(&key).unwrap().composite_score,
        Decimal::ZERO
    );
}
