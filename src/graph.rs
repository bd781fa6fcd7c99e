use crate::constants::PARALLEL_INSERT_THRESHOLD;
use crate::error::{MigrateError, Result};
use crate::image::Image;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

/// Closest unvisited image returned by [`LayerSharingGraph::closest_unvisited`]
#[derive(Debug, Clone, Copy)]
pub struct Neighbor<'g> {
    pub image: &'g Image,
    pub shared_bytes: u64,
}

/// Images keyed by `name:tag`, with an undirected edge for every pair that
/// shares layer bytes. Edge weights are computed once, when the later image
/// of the pair is inserted, from that image's layer sizes.
#[derive(Debug, Default)]
pub struct LayerSharingGraph {
    graph: UnGraph<Image, u64>,
    index: HashMap<String, NodeIndex>,
}

impl LayerSharingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `images` in order, failing on the first duplicate `name:tag`.
    pub fn try_from_images<I>(images: I) -> Result<Self>
    where
        I: IntoIterator<Item = Image>,
    {
        let mut graph = Self::new();
        for image in images {
            graph.insert(image)?;
        }
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Number of pairs with a positive shared weight.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.index.contains_key(full_name)
    }

    pub fn get(&self, full_name: &str) -> Option<&Image> {
        self.index.get(full_name).map(|&idx| &self.graph[idx])
    }

    /// Images in insertion order.
    pub fn images(&self) -> impl Iterator<Item = &Image> + '_ {
        self.graph.node_indices().map(move |idx| &self.graph[idx])
    }

    /// Adds `image` and weighs it against every image already present.
    ///
    /// Insertion order matters: it fixes whose layer sizes are recorded for a
    /// pair and how ties are resolved by [`closest_unvisited`](Self::closest_unvisited).
    pub fn insert(&mut self, image: Image) -> Result<()> {
        let name = image.full_name();
        if self.index.contains_key(&name) {
            return Err(MigrateError::DuplicateImage { name });
        }

        let priors: Vec<NodeIndex> = self.graph.node_indices().collect();
        let weights: Vec<(NodeIndex, u64)> = if priors.len() >= PARALLEL_INSERT_THRESHOLD {
            priors
                .par_iter()
                .map(|&prior| (prior, image.shared_bytes_with(&self.graph[prior])))
                .collect()
        } else {
            priors
                .iter()
                .map(|&prior| (prior, image.shared_bytes_with(&self.graph[prior])))
                .collect()
        };

        let layers = image.layer_count();
        let idx = self.graph.add_node(image);
        let mut pairs = 0usize;
        for (prior, weight) in weights {
            // Zero-weight pairs can never win a neighbour query.
            if weight > 0 {
                self.graph.add_edge(prior, idx, weight);
                pairs += 1;
            }
        }
        self.index.insert(name.clone(), idx);

        crate::log_image_inserted!(name, layers, pairs);
        Ok(())
    }

    /// Shared bytes recorded for the pair, 0 when they share nothing.
    pub fn shared_bytes(&self, a: &str, b: &str) -> Result<u64> {
        let a = self.node(a)?;
        let b = self.node(b)?;
        Ok(self
            .graph
            .find_edge(a, b)
            .map(|edge| self.graph[edge])
            .unwrap_or(0))
    }

    /// The neighbour of `full_name` that shares the most bytes with it and is
    /// not in `visited`.
    ///
    /// Only positive weights qualify. Equal weights go to the image inserted
    /// first. Errors if `full_name` was never inserted, so that an unknown
    /// image is not mistaken for one without unvisited neighbours.
    pub fn closest_unvisited(
        &self,
        full_name: &str,
        visited: &HashSet<String>,
    ) -> Result<Option<Neighbor<'_>>> {
        let node = self.node(full_name)?;

        let mut best: Option<(NodeIndex, u64)> = None;
        for edge in self.graph.edges(node) {
            let other = if edge.source() == node {
                edge.target()
            } else {
                edge.source()
            };
            if other == node {
                continue;
            }

            let candidate = &self.graph[other];
            if visited.contains(&candidate.full_name()) {
                continue;
            }

            let weight = *edge.weight();
            let better = match best {
                None => weight > 0,
                Some((best_idx, best_weight)) => {
                    weight > best_weight || (weight == best_weight && other < best_idx)
                }
            };
            if better {
                best = Some((other, weight));
            }
        }

        Ok(best.map(|(idx, shared_bytes)| Neighbor {
            image: &self.graph[idx],
            shared_bytes,
        }))
    }

    fn node(&self, full_name: &str) -> Result<NodeIndex> {
        self.index
            .get(full_name)
            .copied()
            .ok_or_else(|| MigrateError::UnknownImage {
                name: full_name.to_string(),
            })
    }
}
