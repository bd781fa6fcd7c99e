use crate::image::Image;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Deduplicated byte usage across a sequence of images.
///
/// Each digest is charged once per window; [`checkpoint`](Self::checkpoint)
/// starts a new window.
#[derive(Debug, Clone, Default)]
pub struct SpaceAccountant {
    seen_digests: HashSet<String>,
    used_bytes: u64,
}

impl SpaceAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charges the digests of `image` not seen in this window and returns
    /// how many bytes that added.
    pub fn add(&mut self, image: &Image) -> u64 {
        let mut novel = 0u64;
        for (digest, size) in image.layers() {
            if self.seen_digests.insert(digest.clone()) {
                novel = novel.saturating_add(*size);
            }
        }
        self.used_bytes = self.used_bytes.saturating_add(novel);
        novel
    }

    pub fn usage(&self) -> u64 {
        self.used_bytes
    }

    pub fn contains_layer(&self, digest: &str) -> bool {
        self.seen_digests.contains(digest)
    }

    pub fn layer_count(&self) -> usize {
        self.seen_digests.len()
    }

    /// Forgets every charged digest, modelling destination storage being freed.
    pub fn checkpoint(&mut self) {
        self.seen_digests.clear();
        self.used_bytes = 0;
    }
}

/// Deduplicated usage threshold in bytes; 0 means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpaceBudget(u64);

impl SpaceBudget {
    pub fn new(limit_bytes: u64) -> Self {
        Self(limit_bytes)
    }

    pub fn unlimited() -> Self {
        Self(0)
    }

    pub fn limit(&self) -> u64 {
        self.0
    }

    pub fn is_unlimited(&self) -> bool {
        self.0 == 0
    }

    pub fn exceeded(&self, usage: u64) -> bool {
        self.0 > 0 && usage > self.0
    }
}
