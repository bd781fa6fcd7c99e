use crate::error::{MigrateError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A raw `{digest, size}` entry as returned by a registry source.
///
/// Both fields are optional so that malformed manifests reach
/// [`Image::add_layer_record`] and get rejected there instead of failing
/// somewhere inside JSON decoding.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LayerRecord {
    pub digest: Option<String>,
    pub size: Option<serde_json::Value>,
}

impl LayerRecord {
    pub fn new(digest: &str, size: u64) -> Self {
        Self {
            digest: Some(digest.to_string()),
            size: Some(serde_json::Value::from(size)),
        }
    }
}

/// A repository tag and the content-addressed layers it references.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Image {
    name: String,
    tag: String,
    layers: HashMap<String, u64>,
}

impl Image {
    pub fn new(name: &str, tag: &str) -> Self {
        Self {
            name: name.to_string(),
            tag: tag.to_string(),
            layers: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// `name:tag`, the identity used by the graph, planner and skip list.
    pub fn full_name(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }

    /// Records `size` for `digest`. A repeated digest overwrites the earlier size.
    pub fn add_layer(&mut self, digest: &str, size: u64) -> Result<()> {
        let digest = digest.trim();
        if digest.is_empty() {
            return Err(self.invalid("empty layer digest"));
        }
        self.layers.insert(digest.to_string(), size);
        Ok(())
    }

    /// Validates a collaborator record and adds it.
    pub fn add_layer_record(&mut self, record: &LayerRecord) -> Result<()> {
        let digest = record
            .digest
            .as_deref()
            .ok_or_else(|| self.invalid("missing layer digest"))?;

        let size = match &record.size {
            None => return Err(self.invalid(&format!("missing size for {}", digest))),
            Some(value) => self.parse_size(digest, value)?,
        };

        self.add_layer(digest, size)
    }

    fn parse_size(&self, digest: &str, value: &serde_json::Value) -> Result<u64> {
        let number = match value {
            serde_json::Value::Number(n) => n,
            other => {
                return Err(self.invalid(&format!(
                    "non-numeric size {} for {}",
                    other, digest
                )))
            }
        };

        if let Some(size) = number.as_u64() {
            return Ok(size);
        }
        match number.as_f64() {
            Some(f) if f.is_finite() && f >= 0.0 => Ok(f as u64),
            _ => Err(self.invalid(&format!("negative size {} for {}", number, digest))),
        }
    }

    fn invalid(&self, reason: &str) -> MigrateError {
        MigrateError::InvalidLayer {
            image: self.full_name(),
            reason: reason.to_string(),
        }
    }

    pub fn layers(&self) -> &HashMap<String, u64> {
        &self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Sum of all layer sizes, saturating at `u64::MAX`.
    pub fn total_size(&self) -> u64 {
        self.layers
            .values()
            .fold(0u64, |acc, size| acc.saturating_add(*size))
    }

    /// Bytes of `self` whose digests also appear in `other`, sized by `self`'s map.
    ///
    /// Equal digests are assumed to carry equal sizes. If a registry reports
    /// the same digest with different sizes, the result reflects this image's
    /// view and is not symmetric.
    pub fn shared_bytes_with(&self, other: &Image) -> u64 {
        self.layers
            .iter()
            .filter(|(digest, _)| other.layers.contains_key(*digest))
            .fold(0u64, |acc, (_, size)| acc.saturating_add(*size))
    }
}
