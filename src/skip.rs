use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// How a `name:tag` entry affects the other tags of the same image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TagSkipPolicy {
    /// Only the listed tag is excluded.
    #[default]
    SkipTag,
    /// The first listed tag also abandons every tag listed after it for that
    /// image.
    AbandonRemainingTags,
}

/// Images (`name`) and tags (`name:tag`) excluded from a migration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipList {
    entries: HashSet<String>,
}

impl SkipList {
    pub fn empty() -> Self {
        Self::default()
    }

    /// One entry per line; blank lines and `#` comments are ignored.
    pub fn parse(content: &str) -> Self {
        let entries = content
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect();
        Self { entries }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read skip list {}", path.display()))?;
        Ok(Self::parse(&content))
    }

    /// Like [`from_file`](Self::from_file) but a missing file yields an empty list.
    pub fn from_optional_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            tracing::warn!(path = %path.display(), "Skip list not found, skipping nothing");
            return Ok(Self::empty());
        }
        Self::from_file(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn skips_image(&self, name: &str) -> bool {
        self.entries.contains(name)
    }

    pub fn skips_tag(&self, name: &str, tag: &str) -> bool {
        self.entries.contains(&format!("{}:{}", name, tag))
    }

    /// Entries as a set usable as the planner's pre-visited names.
    pub fn as_visited_set(&self) -> HashSet<String> {
        self.entries.clone()
    }

    /// Tags of `name` that survive the skip list under `policy`.
    pub fn filter_tags(&self, name: &str, tags: &[String], policy: TagSkipPolicy) -> Vec<String> {
        let mut kept = Vec::with_capacity(tags.len());
        for tag in tags {
            if !self.skips_tag(name, tag) {
                kept.push(tag.clone());
                continue;
            }
            tracing::info!(
                "{}",
                crate::logging::MigrationEvent::TagSkipped {
                    name: name.to_string(),
                    tag: tag.clone(),
                }
            );
            if policy == TagSkipPolicy::AbandonRemainingTags {
                break;
            }
        }
        kept
    }
}
