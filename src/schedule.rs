use crate::accountant::{SpaceAccountant, SpaceBudget};
use crate::error::{MigrateError, Result};
use crate::graph::LayerSharingGraph;
use crate::logging::PlanMetrics;
use crate::planner::MigrationPlan;
use serde::{Deserialize, Serialize};

/// Budget crossed right after a step; the accountant was reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Deduplicated usage that triggered the checkpoint
    pub usage: u64,
    /// Images migrated so far, including this step
    pub done: usize,
    pub total: usize,
}

/// One image in migration order, with the numbers the executor needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStep {
    pub full_name: String,
    pub total_size: u64,
    /// Bytes this image added to the current window
    pub novel_bytes: u64,
    /// Deduplicated usage of the current window after this image
    pub usage: u64,
    pub checkpoint: Option<Checkpoint>,
}

#[derive(Debug, Clone, Default)]
pub struct Schedule {
    pub steps: Vec<MigrationStep>,
    pub budget: SpaceBudget,
    pub metrics: PlanMetrics,
}

impl Schedule {
    pub fn checkpoints(&self) -> impl Iterator<Item = &Checkpoint> + '_ {
        self.steps.iter().filter_map(|step| step.checkpoint.as_ref())
    }
}

/// Walks `plan.order` through a [`SpaceAccountant`], resetting it whenever
/// `budget` is exceeded. The order itself is never changed.
pub fn build_schedule(
    graph: &LayerSharingGraph,
    plan: &MigrationPlan,
    budget: SpaceBudget,
) -> Result<Schedule> {
    let total = plan.order.len();
    let mut accountant = SpaceAccountant::new();
    let mut metrics = PlanMetrics {
        images: graph.len(),
        shared_pairs: graph.edge_count(),
        planned: total,
        unreached: plan.unreached.len(),
        reseeds: plan.reseeds.len(),
        ..PlanMetrics::new()
    };

    let mut steps = Vec::with_capacity(total);
    for (i, name) in plan.order.iter().enumerate() {
        let image = graph
            .get(name)
            .ok_or_else(|| MigrateError::UnknownImage { name: name.clone() })?;

        let novel_bytes = accountant.add(image);
        let usage = accountant.usage();
        metrics.total_bytes = metrics.total_bytes.saturating_add(image.total_size());
        metrics.transferred_bytes = metrics.transferred_bytes.saturating_add(novel_bytes);

        let checkpoint = if budget.exceeded(usage) {
            let done = i + 1;
            crate::log_checkpoint!(usage, budget.limit(), done, total);
            accountant.checkpoint();
            metrics.checkpoints += 1;
            Some(Checkpoint { usage, done, total })
        } else {
            None
        };

        steps.push(MigrationStep {
            full_name: name.clone(),
            total_size: image.total_size(),
            novel_bytes,
            usage,
            checkpoint,
        });
    }

    Ok(Schedule {
        steps,
        budget,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;
    use crate::planner::MigrationPlanner;

    fn graph() -> LayerSharingGraph {
        let mut graph = LayerSharingGraph::new();
        for (name, layers) in [
            ("a", vec![("base", 60u64), ("a1", 10)]),
            ("b", vec![("base", 60), ("b1", 20)]),
            ("c", vec![("base", 60), ("c1", 30)]),
        ] {
            let mut img = Image::new(name, "v1");
            for (digest, size) in layers {
                img.add_layer(digest, size).unwrap();
            }
            graph.insert(img).unwrap();
        }
        graph
    }

    #[test]
    fn test_unlimited_budget_never_checkpoints() {
        let graph = graph();
        let plan = MigrationPlanner::new(&graph).plan().unwrap();
        let schedule = build_schedule(&graph, &plan, SpaceBudget::unlimited()).unwrap();

        assert_eq!(schedule.steps.len(), 3);
        assert_eq!(schedule.checkpoints().count(), 0);
        assert_eq!(schedule.steps.last().unwrap().usage, 60 + 10 + 20 + 30);
        assert_eq!(schedule.metrics.total_bytes, 70 + 80 + 90);
        assert_eq!(schedule.metrics.transferred_bytes, 120);
    }

    #[test]
    fn test_checkpoint_resets_usage_window() {
        let graph = graph();
        let plan = MigrationPlan {
            order: vec!["a:v1".into(), "b:v1".into(), "c:v1".into()],
            ..MigrationPlan::default()
        };
        let schedule = build_schedule(&graph, &plan, SpaceBudget::new(75)).unwrap();

        // a: 70 (under), b: 90 (over -> reset), c: 90 again in a fresh window
        assert_eq!(schedule.steps[0].usage, 70);
        assert!(schedule.steps[0].checkpoint.is_none());
        assert_eq!(
            schedule.steps[1].checkpoint,
            Some(Checkpoint {
                usage: 90,
                done: 2,
                total: 3
            })
        );
        assert_eq!(schedule.steps[2].novel_bytes, 90);
        assert_eq!(schedule.metrics.checkpoints, 2);
    }

    #[test]
    fn test_oversized_layers_still_checkpoint() {
        let half = u64::MAX / 2 + 1;
        let mut graph = LayerSharingGraph::new();
        for name in ["x", "y"] {
            let mut img = Image::new(name, "v1");
            img.add_layer(&format!("{}-big", name), half).unwrap();
            img.add_layer(&format!("{}-rest", name), half).unwrap();
            graph.insert(img).unwrap();
        }
        let plan = MigrationPlan {
            order: vec!["x:v1".into(), "y:v1".into()],
            ..MigrationPlan::default()
        };

        let schedule = build_schedule(&graph, &plan, SpaceBudget::new(1024)).unwrap();
        assert_eq!(schedule.checkpoints().count(), 2);
        assert!(schedule.steps.iter().all(|step| step.usage == u64::MAX));
        assert_eq!(schedule.metrics.total_bytes, u64::MAX);
        assert_eq!(schedule.metrics.transferred_bytes, u64::MAX);
    }

    #[test]
    fn test_unknown_name_in_plan() {
        let graph = graph();
        let plan = MigrationPlan {
            order: vec!["nope:v1".into()],
            ..MigrationPlan::default()
        };
        assert!(build_schedule(&graph, &plan, SpaceBudget::unlimited()).is_err());
    }
}
