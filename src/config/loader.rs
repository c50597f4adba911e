//! Configuration loader
//!
//! Loads and validates the YAML configuration tables. Everything is validated
//! up front: a run never starts with a partially valid dictionary or scoring
//! table.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::derivation::DerivationTable;
use crate::dictionary::SemanticDictionary;
use crate::scoring::ScoringConfig;

pub const DICTIONARY_FILE: &str = "dictionary.yaml";
pub const SCORING_FILE: &str = "scoring.yaml";

/// Environment variable that overrides the configuration directory
pub const CONFIG_DIR_ENV: &str = "IFDATA_RISK_CONFIG_DIR";

/// Every table a run needs, validated and immutable
#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub dictionary: SemanticDictionary,
    pub derivations: DerivationTable,
    pub scoring: ScoringConfig,
}

pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Create loader from IFDATA_RISK_CONFIG_DIR or fall back to a default
    ///
    /// Path resolution order:
    /// 1. IFDATA_RISK_CONFIG_DIR environment variable (explicit override)
    /// 2. Relative "config" path (works when running from the workspace root)
    /// 3. CARGO_MANIFEST_DIR/config at runtime (set by cargo during test/run)
    /// 4. Compile-time CARGO_MANIFEST_DIR/config (installed binaries)
    pub fn from_env() -> Self {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            return Self::new(dir);
        }

        if Path::new("config").join(DICTIONARY_FILE).exists() {
            return Self::new("config");
        }

        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let config_path = Path::new(&manifest_dir).join("config");
            if config_path.join(DICTIONARY_FILE).exists() {
                return Self::new(config_path);
            }
        }

        // Last resort - let loading fail with a clear error if this is missing too
        Self::new(concat!(env!("CARGO_MANIFEST_DIR"), "/config"))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn load_dictionary(&self) -> Result<SemanticDictionary> {
        let path = self.config_dir.join(DICTIONARY_FILE);
        info!("Loading semantic dictionary from {}", path.display());

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        SemanticDictionary::from_yaml_str(&content, &path.display().to_string())
            .with_context(|| format!("Invalid dictionary {}", path.display()))
    }

    pub fn load_scoring(&self) -> Result<ScoringConfig> {
        let path = self.config_dir.join(SCORING_FILE);
        info!("Loading scoring table from {}", path.display());

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        ScoringConfig::from_yaml_str(&content, &path.display().to_string())
            .with_context(|| format!("Invalid scoring table {}", path.display()))
    }

    /// Load and validate every table; any failure aborts before a run starts
    pub fn load(&self) -> Result<RiskConfig> {
        let dictionary = self.load_dictionary()?;
        let scoring = self.load_scoring()?;
        let derivations = DerivationTable::standard();

        info!(
            "Configuration ready: dictionary '{}' ({}), scoring '{}' ({})",
            dictionary.version(),
            short_fingerprint(dictionary.fingerprint()),
            scoring.version(),
            short_fingerprint(scoring.fingerprint())
        );

        Ok(RiskConfig {
            dictionary,
            derivations,
            scoring,
        })
    }
}

fn short_fingerprint(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}
