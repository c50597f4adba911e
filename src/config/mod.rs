//! Configuration tables consumed by the pipeline
//!
//! Three versioned tables, all data rather than code:
//! - the semantic dictionary (`dictionary.yaml`)
//! - the factor threshold/weight table and the risk band table (`scoring.yaml`)

pub mod loader;
pub mod types;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::ConfigError;

pub use loader::{ConfigLoader, RiskConfig};

/// SHA-256 (hex) over the canonical JSON form of a parsed configuration file.
///
/// Hashing the parsed form rather than the raw text means comments and
/// formatting changes do not alter the fingerprint; any semantic change does.
pub fn fingerprint<T: Serialize>(value: &T) -> Result<String, ConfigError> {
    let bytes = serde_json::to_vec(value).map_err(|e| ConfigError::Parse {
        source_name: "fingerprint".into(),
        message: e.to_string(),
    })?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
