//! Record persistence
//!
//! Outputs are keyed by `(institution_id, period)` and always upserted: a
//! re-run replaces the stored record for a key, it never appends a second one.

use anyhow::{Context, Result};
use risk_types::{CanonicalMetricRecord, RecordKey, ScoredRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Sink for pipeline outputs.
///
/// Implementations must be idempotent per key.
pub trait RecordSink: Send {
    fn upsert_canonical(&mut self, record: &CanonicalMetricRecord) -> Result<()>;
    fn upsert_scored(&mut self, record: &ScoredRecord) -> Result<()>;

    /// Make upserts durable. No-op for in-memory sinks.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

// ── MemoryStore ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    canonical: BTreeMap<RecordKey, CanonicalMetricRecord>,
    scored: BTreeMap<RecordKey, ScoredRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn canonical(&self, key: &RecordKey) -> Option<&CanonicalMetricRecord> {
        self.canonical.get(key)
    }

    pub fn scored(&self, key: &RecordKey) -> Option<&ScoredRecord> {
        self.scored.get(key)
    }

    pub fn canonical_records(&self) -> impl Iterator<Item = &CanonicalMetricRecord> {
        self.canonical.values()
    }

    pub fn scored_records(&self) -> impl Iterator<Item = &ScoredRecord> {
        self.scored.values()
    }

    pub fn len(&self) -> usize {
        self.canonical.len().max(self.scored.len())
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty() && self.scored.is_empty()
    }
}

impl RecordSink for MemoryStore {
    fn upsert_canonical(&mut self, record: &CanonicalMetricRecord) -> Result<()> {
        self.canonical.insert(record.key(), record.clone());
        Ok(())
    }

    fn upsert_scored(&mut self, record: &ScoredRecord) -> Result<()> {
        self.scored.insert(record.key(), record.clone());
        Ok(())
    }
}

// ── JsonFileStore ─────────────────────────────────────────────

/// On-disk layout: two arrays sorted by key
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    canonical: Vec<CanonicalMetricRecord>,
    #[serde(default)]
    scored: Vec<ScoredRecord>,
}

/// A [`MemoryStore`] backed by a single JSON document.
///
/// `open` loads the existing document (if any); `flush` rewrites it whole.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut inner = MemoryStore::new();

        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read store {}", path.display()))?;
            let doc: StoreDocument = serde_json::from_str(&content)
                .with_context(|| format!("Invalid store document {}", path.display()))?;
            for record in &doc.canonical {
                inner.upsert_canonical(record)?;
            }
            for record in &doc.scored {
                inner.upsert_scored(record)?;
            }
            info!("Opened store {} ({} keys)", path.display(), inner.len());
        } else {
            debug!("Store {} does not exist yet", path.display());
        }

        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &MemoryStore {
        &self.inner
    }
}

impl RecordSink for JsonFileStore {
    fn upsert_canonical(&mut self, record: &CanonicalMetricRecord) -> Result<()> {
        self.inner.upsert_canonical(record)
    }

    fn upsert_scored(&mut self, record: &ScoredRecord) -> Result<()> {
        self.inner.upsert_scored(record)
    }

    fn flush(&mut self) -> Result<()> {
        let doc = StoreDocument {
            canonical: self.inner.canonical_records().cloned().collect(),
            scored: self.inner.scored_records().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&doc).context("Failed to serialize store")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write store {}", self.path.display()))?;

        info!("Wrote {} keys to {}", self.inner.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use risk_types::{CanonicalMetricId, RiskClass};
    use rust_decimal::Decimal;

    fn key() -> RecordKey {
        RecordKey::new("BANK1", NaiveDate::from_ymd_opt(2024, 6, 30).unwrap())
    }

    fn canonical(assets: i64) -> CanonicalMetricRecord {
        CanonicalMetricRecord::new(&key())
            .with(CanonicalMetricId::TotalAssets, Decimal::new(assets, 0))
    }

    fn scored(score: i64) -> ScoredRecord {
        ScoredRecord {
            institution_id: "BANK1".into(),
            period: key().period,
            composite_score: Decimal::new(score, 0),
            risk_class: RiskClass::Low,
            drivers: vec![],
            omitted_factors: vec![],
            scoring_version: "v1".into(),
        }
    }

    #[test]
    fn memory_store_upsert_replaces() {
        let mut store = MemoryStore::new();
        store.upsert_canonical(&canonical(100)).unwrap();
        store.upsert_canonical(&canonical(120)).unwrap();
        store.upsert_scored(&scored(10)).unwrap();
        store.upsert_scored(&scored(12)).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.canonical(&key()).unwrap().get(CanonicalMetricId::TotalAssets),
            Some(Decimal::new(120, 0))
        );
        assert_eq!(store.scored(&key()).unwrap().composite_score, Decimal::new(12, 0));
    }

    #[test]
    fn json_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("store.json");

        let mut store = JsonFileStore::open(&path).unwrap();
        assert!(store.records().is_empty());
        store.upsert_canonical(&canonical(100)).unwrap();
        store.upsert_scored(&scored(10)).unwrap();
        store.flush().unwrap();

        let mut reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.records().canonical(&key()), Some(&canonical(100)));

        reopened.upsert_canonical(&canonical(150)).unwrap();
        reopened.flush().unwrap();

        let last = JsonFileStore::open(&path).unwrap();
        assert_eq!(last.records().len(), 1);
        assert_eq!(last.records().canonical(&key()), Some(&canonical(150)));
        assert_eq!(last.records().scored(&key()), Some(&scored(10)));
    }

    #[test]
    fn corrupt_document_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonFileStore::open(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid store document"));
    }
}
