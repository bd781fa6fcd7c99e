pub mod accountant;
pub mod config;
pub mod constants;
pub mod error;
pub mod graph;
pub mod image;
pub mod logging;
pub mod planner;
pub mod registry;
pub mod schedule;
pub mod script;
pub mod skip;

pub use accountant::{SpaceAccountant, SpaceBudget};
pub use error::{MigrateError, Result};
pub use graph::{LayerSharingGraph, Neighbor};
pub use image::{Image, LayerRecord};
pub use planner::{Coverage, MigrationPlan, MigrationPlanner, SeedPolicy};
pub use schedule::{build_schedule, Checkpoint, MigrationStep, Schedule};
