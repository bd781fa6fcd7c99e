use crate::image::LayerRecord;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Malformed registry response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Schema version {0} manifests carry no layer sizes")]
    UnsupportedSchema(u32),

    #[error("Manifest list has no entries")]
    EmptyIndex,

    #[error("Manifest has neither layers nor manifests")]
    MissingLayers,
}

/// `GET /v2/_catalog`
#[derive(Debug, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub repositories: Vec<String>,
}

/// `GET /v2/<name>/tags/list`; registries return `null` tags for empty repositories.
#[derive(Debug, Deserialize)]
pub struct TagList {
    pub name: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(rename = "schemaVersion")]
    schema_version: u32,
    #[serde(default)]
    layers: Option<Vec<LayerRecord>>,
    #[serde(default)]
    manifests: Option<Vec<IndexEntry>>,
}

#[derive(Debug, Deserialize)]
struct IndexEntry {
    digest: String,
}

/// What a tag resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestBody {
    /// Image manifest: layer records as listed, not yet validated
    Image(Vec<LayerRecord>),
    /// Manifest list / OCI index: digest of the first platform manifest
    Index(String),
}

pub fn parse_manifest(content: &str) -> Result<ManifestBody, ManifestError> {
    let raw: RawManifest = serde_json::from_str(content)?;
    if raw.schema_version < 2 {
        return Err(ManifestError::UnsupportedSchema(raw.schema_version));
    }

    if let Some(layers) = raw.layers {
        return Ok(ManifestBody::Image(layers));
    }
    match raw.manifests {
        Some(entries) => entries
            .into_iter()
            .next()
            .map(|entry| ManifestBody::Index(entry.digest))
            .ok_or(ManifestError::EmptyIndex),
        None => Err(ManifestError::MissingLayers),
    }
}

/// Target of a `Link: <...>; rel="next"` pagination header.
pub fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|p| p.trim().trim_start_matches("rel=").trim_matches('"') == "next");
        if !is_next {
            return None;
        }
        let target = target.trim();
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}
