//! Text normalization for indicator label matching
//!
//! IF.data labels drift between periods in casing, accents, spacing and the
//! report prefix (`"1::Ativo Total"` vs `"Ativo  total"`). The helpers here
//! produce the label forms the dictionary matches against:
//! - cleaned: CR/LF removed, whitespace collapsed (pattern rules)
//! - normalized: accents folded, lowercase, punctuation stripped (normalized rules)

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Separator between the report code and the indicator name
pub const REPORT_SEPARATOR: &str = "::";

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Collapse CR/LF and runs of whitespace into single spaces, then trim.
///
/// ```
/// use ifdata_risk::text::clean_label;
///
/// assert_eq!(clean_label("  Ativo\r\n  Total "), "Ativo Total");
/// ```
pub fn clean_label(s: &str) -> String {
    let flattened = s.replace(['\r', '\n'], " ");
    WHITESPACE.replace_all(&flattened, " ").trim().to_string()
}

/// Split `"<report>::<name>"` into its report code and name.
///
/// Labels without a separator have no report code. Only the first separator
/// splits; the name keeps anything after it verbatim.
pub fn split_report_prefix(label: &str) -> (Option<&str>, &str) {
    match label.split_once(REPORT_SEPARATOR) {
        Some((report, name)) => {
            let report = report.trim();
            if report.is_empty() {
                (None, name)
            } else {
                (Some(report), name)
            }
        }
        None => (None, label),
    }
}

/// Normalize a label for casing/whitespace-insensitive matching.
///
/// Performs:
/// - Unicode NFKD decomposition with combining marks removed ("Líquido" -> "Liquido")
/// - Lowercase conversion
/// - Punctuation replaced by spaces
/// - Whitespace collapsing
pub fn normalize_label(s: &str) -> String {
    let folded: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();

    let mut stripped = String::with_capacity(folded.len());
    for c in folded.chars() {
        if c.is_alphanumeric() {
            stripped.extend(c.to_lowercase());
        } else {
            stripped.push(' ');
        }
    }

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a unit string; empty or whitespace-only units count as absent.
pub fn normalize_unit(unit: Option<&str>) -> Option<String> {
    unit.map(|u| u.trim().to_lowercase()).filter(|u| !u.is_empty())
}

/// All forms of one raw label the dictionary needs, computed once per lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelForms {
    pub report: Option<String>,
    /// Name part exactly as delivered
    pub verbatim: String,
    pub cleaned: String,
    pub normalized: String,
}

impl LabelForms {
    pub fn new(raw_label: &str) -> Self {
        let (report, name) = split_report_prefix(raw_label);
        Self {
            report: report.map(str::to_string),
            verbatim: name.to_string(),
            cleaned: clean_label(name),
            normalized: normalize_label(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_label_collapses_whitespace() {
        assert_eq!(clean_label("Patrimônio\n Líquido"), "Patrimônio Líquido");
        assert_eq!(clean_label("\tLCR  "), "LCR");
    }

    #[test]
    fn test_split_report_prefix() {
        assert_eq!(
            split_report_prefix("1::Ativo Total"),
            (Some("1"), "Ativo Total")
        );
        assert_eq!(split_report_prefix("Ativo Total"), (None, "Ativo Total"));
        assert_eq!(split_report_prefix("::Ativo"), (None, "Ativo"));
        assert_eq!(split_report_prefix("5::a::b"), (Some("5"), "a::b"));
    }

    #[test]
    fn test_normalize_label_folds_accents_and_case() {
        assert_eq!(normalize_label("Patrimônio  Líquido"), "patrimonio liquido");
        assert_eq!(
            normalize_label("Índice de Basileia (%)"),
            "indice de basileia"
        );
        assert_eq!(normalize_label("ＬＣＲ"), "lcr");
    }

    #[test]
    fn test_normalize_unit() {
        assert_eq!(normalize_unit(Some(" % ")), Some("%".to_string()));
        assert_eq!(normalize_unit(Some("R$ Mil")), Some("r$ mil".to_string()));
        assert_eq!(normalize_unit(Some("   ")), None);
        assert_eq!(normalize_unit(None), None);
    }

    #[test]
    fn test_label_forms() {
        let forms = LabelForms::new("5::Índice de  Liquidez\r\n");
        assert_eq!(forms.report.as_deref(), Some("5"));
        assert_eq!(forms.verbatim, "Índice de  Liquidez\r\n");
        assert_eq!(forms.cleaned, "Índice de Liquidez");
        assert_eq!(forms.normalized, "indice de liquidez");
    }
}
