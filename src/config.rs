//! Planning configuration.
//!
//! Values come from, in increasing precedence: built-in defaults, an optional
//! JSON file (`--config`), then environment variables / command-line flags
//! (`REGMIGRATE_*`, resolved by clap in the binary).

use crate::accountant::SpaceBudget;
use crate::constants::{GIB, KIB, MIB, TIB};
use crate::error::{MigrateError, Result};
use crate::planner::{Coverage, SeedPolicy};
use crate::skip::TagSkipPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct MigrationConfig {
    pub origin: Option<String>,
    pub destination: Option<String>,
    /// `USER:PASSWORD` for the origin registry
    pub login: Option<String>,
    /// Bearer token for the origin registry, used when no login is set
    pub token: Option<String>,
    /// Restrict the migration to these repositories instead of the full catalog
    pub images: Vec<String>,
    pub skip_file: Option<PathBuf>,
    pub max_space_use: SpaceBudget,
    pub seed: SeedPolicy,
    pub coverage: Coverage,
    pub tag_skip: TagSkipPolicy,
}

impl MigrationConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Both registries must be known before anything is planned.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [("origin", &self.origin), ("destination", &self.destination)] {
            match value {
                Some(v) if !v.trim().is_empty() => {}
                _ => {
                    return Err(MigrateError::InvalidConfig {
                        reason: format!("{} registry is required", field),
                    })
                }
            }
        }
        Ok(())
    }
}

/// Parses `1073741824`, `512M`, `10G`, `1.5GiB`, `2TB` (binary multiples).
pub fn parse_byte_size(input: &str) -> Result<u64> {
    let trimmed = input.trim();
    let invalid = || MigrateError::InvalidConfig {
        reason: format!("invalid byte size '{}'", input),
    };

    let split = trimmed
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => KIB,
        "M" | "MB" | "MIB" => MIB,
        "G" | "GB" | "GIB" => GIB,
        "T" | "TB" | "TIB" => TIB,
        _ => return Err(invalid()),
    };

    let number = number.trim();
    if let Ok(whole) = number.parse::<u64>() {
        return whole.checked_mul(multiplier).ok_or_else(invalid);
    }
    match number.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => {
            let bytes = value * multiplier as f64;
            // u64::MAX as f64 rounds up to 2^64, so equality is out of range too
            if bytes.is_finite() && bytes < u64::MAX as f64 {
                Ok(bytes as u64)
            } else {
                Err(invalid())
            }
        }
        _ => Err(invalid()),
    }
}
