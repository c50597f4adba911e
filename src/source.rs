//! Source-row adapter
//!
//! Converts rows shaped like the IF.data extract into [`RawIndicatorRow`]s.
//! No network access: rows come from a JSON array or a JSON Lines file.
//!
//! Accepted shapes, mixed freely in one file:
//!
//! ```json
//! {"institution_id": "00000000", "ref_date": "2024-12-31", "raw_label": "1::Ativo Total", "value": 1250000.5}
//! {"CodInst": "00000000", "AnoMes": 202412, "NumeroRelatorio": "1", "NomeColuna": "Ativo Total", "Saldo": "1.250.000,50"}
//! ```

use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{Months, NaiveDate};
use regex::Regex;
use risk_types::RawIndicatorRow;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::text::{clean_label, REPORT_SEPARATOR};

static SOURCE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(\.\d+)?$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("row has neither ref_date nor anomes")]
    MissingPeriod,

    #[error("invalid AnoMes {0} (expected YYYYMM)")]
    InvalidAnoMes(u32),

    #[error("ref_date {ref_date} disagrees with AnoMes {anomes}")]
    PeriodMismatch { ref_date: NaiveDate, anomes: u32 },

    #[error("'{0}' is not a number")]
    InvalidNumber(String),

    #[error("malformed source document: {0}")]
    Malformed(String),
}

/// Numeric cell as delivered by the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceValue {
    Text(String),
    Number(Decimal),
}

impl SourceValue {
    pub fn to_decimal(&self) -> Result<Decimal, SourceError> {
        match self {
            SourceValue::Number(d) => Ok(*d),
            SourceValue::Text(s) => parse_source_number(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRow {
    #[serde(alias = "CodInst")]
    pub institution_id: String,
    #[serde(default)]
    pub ref_date: Option<NaiveDate>,
    #[serde(default, alias = "AnoMes")]
    pub anomes: Option<u32>,
    #[serde(alias = "indicator", alias = "NomeColuna")]
    pub raw_label: String,
    /// Report code, prefixed onto labels that don't already carry one
    #[serde(default, alias = "NumeroRelatorio")]
    pub report: Option<String>,
    #[serde(alias = "Saldo")]
    pub value: SourceValue,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub revision: Option<u32>,
}

impl SourceRow {
    pub fn period(&self) -> Result<NaiveDate, SourceError> {
        match (self.ref_date, self.anomes) {
            (Some(ref_date), Some(anomes)) => {
                if period_from_anomes(anomes)? != ref_date {
                    return Err(SourceError::PeriodMismatch { ref_date, anomes });
                }
                Ok(ref_date)
            }
            (Some(ref_date), None) => Ok(ref_date),
            (None, Some(anomes)) => period_from_anomes(anomes),
            (None, None) => Err(SourceError::MissingPeriod),
        }
    }

    /// Label in the `"<report>::<name>"` form the dictionary expects
    pub fn label(&self) -> String {
        let name = clean_label(&self.raw_label);
        match self.report.as_deref().map(str::trim) {
            Some(report) if !report.is_empty() && !name.contains(REPORT_SEPARATOR) => {
                format!("{}{}{}", report, REPORT_SEPARATOR, name)
            }
            _ => name,
        }
    }
}

impl TryFrom<SourceRow> for RawIndicatorRow {
    type Error = SourceError;

    fn try_from(row: SourceRow) -> Result<Self, Self::Error> {
        let institution_id = row.institution_id.trim();
        if institution_id.is_empty() {
            return Err(SourceError::MissingField("institution_id"));
        }
        let label = row.label();
        if label.is_empty() {
            return Err(SourceError::MissingField("raw_label"));
        }

        Ok(RawIndicatorRow {
            institution_id: institution_id.to_string(),
            period: row.period()?,
            raw_label: label,
            value: row.value.to_decimal()?,
            unit: row
                .unit
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
            revision: row.revision,
        })
    }
}

/// `YYYYMM` -> last calendar day of that month.
pub fn period_from_anomes(anomes: u32) -> Result<NaiveDate, SourceError> {
    let year = i32::try_from(anomes / 100).map_err(|_| SourceError::InvalidAnoMes(anomes))?;
    let month = anomes % 100;
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next| next.pred_opt())
        .ok_or(SourceError::InvalidAnoMes(anomes))
}

/// Parse a Brazilian-formatted number: dots are thousands separators and the
/// comma is the decimal mark (`"1.234,56"` -> `1234.56`).
///
/// A dot is always read as a thousands separator, so `"1.5"` parses as `15`.
pub fn parse_source_number(s: &str) -> Result<Decimal, SourceError> {
    let canonical = s.trim().replace('.', "").replace(',', ".");
    if !SOURCE_NUMBER.is_match(&canonical) {
        return Err(SourceError::InvalidNumber(s.to_string()));
    }
    Decimal::from_str(&canonical).map_err(|_| SourceError::InvalidNumber(s.to_string()))
}

// ── Documents ─────────────────────────────────────────────────

/// A source row that could not be converted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    /// 1-based line (JSON Lines) or element index (JSON array)
    pub position: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceBatch {
    pub rows: Vec<RawIndicatorRow>,
    pub rejected: Vec<RejectedRow>,
}

impl SourceBatch {
    fn accept(&mut self, position: usize, value: serde_json::Value) {
        let converted = serde_json::from_value::<SourceRow>(value)
            .map_err(|e| e.to_string())
            .and_then(|row| RawIndicatorRow::try_from(row).map_err(|e| e.to_string()));
        match converted {
            Ok(row) => self.rows.push(row),
            Err(reason) => {
                warn!("Rejected source row {}: {}", position, reason);
                self.rejected.push(RejectedRow { position, reason });
            }
        }
    }
}

/// Parse a JSON array or JSON Lines document. Bad rows are rejected
/// individually; only a malformed document fails as a whole.
pub fn parse_source(content: &str) -> Result<SourceBatch, SourceError> {
    let mut batch = SourceBatch::default();

    if content.trim_start().starts_with('[') {
        let values: Vec<serde_json::Value> =
            serde_json::from_str(content).map_err(|e| SourceError::Malformed(e.to_string()))?;
        for (i, value) in values.into_iter().enumerate() {
            batch.accept(i + 1, value);
        }
        return Ok(batch);
    }

    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(value) => batch.accept(i + 1, value),
            Err(e) => {
                warn!("Rejected source line {}: {}", i + 1, e);
                batch.rejected.push(RejectedRow {
                    position: i + 1,
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(batch)
}

pub fn read_source_file(path: &Path) -> Result<SourceBatch> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read source {}", path.display()))?;
    let batch = parse_source(&content)
        .with_context(|| format!("Failed to parse source {}", path.display()))?;
    info!(
        "Read {} rows from {} ({} rejected)",
        batch.rows.len(),
        path.display(),
        batch.rejected.len()
    );
    Ok(batch)
}
