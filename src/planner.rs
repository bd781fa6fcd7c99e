use crate::error::{MigrateError, Result};
use crate::graph::LayerSharingGraph;
use crate::image::Image;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How the first image of the walk is chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeedPolicy {
    /// Image with the most layers; earliest inserted on ties.
    #[default]
    MostLayers,
    /// Runner-up by layer count.
    /// Falls back to the only image when there is just one.
    SecondMostLayers,
    /// Explicit `name:tag`.
    Named(String),
}

/// What happens when the walk runs out of neighbours with shared bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Coverage {
    /// Stop; images not connected to the walk are reported as unreached.
    #[default]
    Reachable,
    /// Restart from the remaining image with the most layers until every
    /// image is planned.
    Complete,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Migration order, `name:tag`
    pub order: Vec<String>,
    /// Images that started a new walk segment after the first (Complete coverage only)
    pub reseeds: Vec<String>,
    /// Images never visited, in insertion order
    pub unreached: Vec<String>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Greedy nearest-neighbour walk over a [`LayerSharingGraph`].
pub struct MigrationPlanner<'g> {
    graph: &'g LayerSharingGraph,
    seed: SeedPolicy,
    coverage: Coverage,
    skip: HashSet<String>,
}

impl<'g> MigrationPlanner<'g> {
    pub fn new(graph: &'g LayerSharingGraph) -> Self {
        Self {
            graph,
            seed: SeedPolicy::default(),
            coverage: Coverage::default(),
            skip: HashSet::new(),
        }
    }

    pub fn with_seed(mut self, seed: SeedPolicy) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_coverage(mut self, coverage: Coverage) -> Self {
        self.coverage = coverage;
        self
    }

    /// Names treated as already visited: never seeds, never in the order.
    pub fn with_skip(mut self, skip: HashSet<String>) -> Self {
        self.skip = skip;
        self
    }

    pub fn plan(&self) -> Result<MigrationPlan> {
        let mut plan = MigrationPlan::default();
        let mut visited = self.skip.clone();

        let mut current = match self.select_seed(&visited)? {
            Some(seed) => seed,
            None => return Ok(plan),
        };
        tracing::debug!(seed = %current, policy = ?self.seed, "Walk seeded");
        visited.insert(current.clone());
        plan.order.push(current.clone());

        loop {
            if let Some(next) = self.graph.closest_unvisited(&current, &visited)? {
                let name = next.image.full_name();
                crate::log_walk_step!(current, name, next.shared_bytes);
                visited.insert(name.clone());
                plan.order.push(name.clone());
                current = name;
                continue;
            }

            if self.coverage == Coverage::Reachable {
                break;
            }
            match ranked_by_layers(self.graph, &visited).first() {
                Some(image) => {
                    let name = image.full_name();
                    tracing::debug!(from = %current, reseed = %name, "Walk reseeded");
                    visited.insert(name.clone());
                    plan.order.push(name.clone());
                    plan.reseeds.push(name.clone());
                    current = name;
                }
                None => break,
            }
        }

        plan.unreached = self
            .graph
            .images()
            .map(Image::full_name)
            .filter(|name| !visited.contains(name))
            .collect();

        tracing::info!(
            planned = plan.order.len(),
            unreached = plan.unreached.len(),
            reseeds = plan.reseeds.len(),
            "Migration order computed"
        );
        Ok(plan)
    }

    fn select_seed(&self, excluded: &HashSet<String>) -> Result<Option<String>> {
        if let SeedPolicy::Named(name) = &self.seed {
            if !self.graph.contains(name) {
                return Err(MigrateError::UnknownImage { name: name.clone() });
            }
            if excluded.contains(name) {
                return Err(MigrateError::InvalidConfig {
                    reason: format!("seed image {} is in the skip list", name),
                });
            }
            return Ok(Some(name.clone()));
        }

        let ranked = ranked_by_layers(self.graph, excluded);
        let seed = match self.seed {
            SeedPolicy::SecondMostLayers => ranked.get(1).or_else(|| ranked.first()),
            _ => ranked.first(),
        };
        Ok(seed.map(|image| image.full_name()))
    }
}

/// Images not in `excluded`, by descending layer count, stable over insertion order.
fn ranked_by_layers<'g>(graph: &'g LayerSharingGraph, excluded: &HashSet<String>) -> Vec<&'g Image> {
    let mut images: Vec<&Image> = graph
        .images()
        .filter(|image| !excluded.contains(&image.full_name()))
        .collect();
    images.sort_by(|a, b| b.layer_count().cmp(&a.layer_count()));
    images
}
