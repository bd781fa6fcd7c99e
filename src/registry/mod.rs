pub mod client;
pub mod manifest;

pub use client::RegistryClient;

use crate::graph::LayerSharingGraph;
use crate::image::{Image, LayerRecord};
use crate::logging::MigrationEvent;
use crate::skip::{SkipList, TagSkipPolicy};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

/// Where images, tags and layer records come from.
pub trait RegistrySource: Sync {
    fn list_images(&self) -> Result<Vec<String>>;
    fn list_tags(&self, name: &str) -> Result<Vec<String>>;
    fn list_tag_layers(&self, name: &str, tag: &str) -> Result<Vec<LayerRecord>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoveryOptions {
    pub tag_skip: TagSkipPolicy,
    pub progress: bool,
}

/// Resolves every surviving `name:tag` to an [`Image`] and loads them into a graph.
///
/// Manifests are fetched in parallel; images are inserted in listing order
/// so the resulting graph does not depend on request timing.
pub fn discover<S: RegistrySource + ?Sized>(
    source: &S,
    names: &[String],
    skip: &SkipList,
    options: DiscoveryOptions,
) -> Result<LayerSharingGraph> {
    tracing::info!("{}", MigrationEvent::DiscoveryStarted { images: names.len() });

    let mut jobs: Vec<(&str, String)> = Vec::new();
    for name in names {
        let tags = source
            .list_tags(name)
            .with_context(|| format!("Failed to list tags for {}", name))?;
        if tags.is_empty() {
            tracing::debug!(image = %name, "No tags, ignoring");
            continue;
        }
        if skip.skips_image(name) {
            tracing::info!("{}", MigrationEvent::ImageSkipped { name: name.clone() });
            continue;
        }
        for tag in skip.filter_tags(name, &tags, options.tag_skip) {
            jobs.push((name.as_str(), tag));
        }
    }

    let progress = if options.progress {
        let pb = ProgressBar::new(jobs.len() as u64);
        pb.set_style(
            ProgressStyle::with_template("{spinner} manifests {pos}/{len} [{bar:40}] {msg}")?
                .progress_chars("=> "),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let images = jobs
        .par_iter()
        .map(|(name, tag)| {
            let records = source
                .list_tag_layers(name, tag)
                .with_context(|| format!("Failed to fetch layers for {}:{}", name, tag))?;
            let mut image = Image::new(name, tag);
            for record in &records {
                image.add_layer_record(record)?;
            }
            progress.inc(1);
            Ok(image)
        })
        .collect::<Result<Vec<Image>>>()?;
    progress.finish_and_clear();

    let graph = LayerSharingGraph::try_from_images(images)?;
    tracing::info!(
        images = graph.len(),
        shared_pairs = graph.edge_count(),
        "Layer sharing graph built"
    );
    Ok(graph)
}
