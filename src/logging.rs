use std::io;
/// Structured logging and observability utilities for regmigrate
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

/// Initialize structured logging with optional JSON output.
///
/// Both formats write to stderr; stdout is reserved for the generated script.
pub fn init_logging(json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(crate::constants::DEFAULT_LOG_FILTER));

    let registry = Registry::default().with(env_filter);

    if json_output {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(io::stderr)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
    }

    Ok(())
}

/// Counters describing one planned migration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanMetrics {
    pub images: usize,
    pub shared_pairs: usize,
    pub planned: usize,
    pub unreached: usize,
    pub reseeds: usize,
    pub checkpoints: usize,
    /// Sum of every planned image's own size
    pub total_bytes: u64,
    /// Bytes actually charged by the accountant across all windows
    pub transferred_bytes: u64,
}

impl PlanMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of `total_bytes` that never had to be charged because it was
    /// already present in the current window.
    pub fn dedup_ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            1.0 - (self.transferred_bytes as f64) / (self.total_bytes as f64)
        }
    }

    pub fn coverage(&self) -> f64 {
        if self.images == 0 {
            0.0
        } else {
            (self.planned as f64) / (self.images as f64)
        }
    }
}

#[macro_export]
macro_rules! log_image_inserted {
    ($name:expr, $layers:expr, $pairs:expr) => {
        tracing::debug!(
            image = %$name,
            layers = $layers,
            shared_pairs = $pairs,
            "Image inserted"
        );
    };
}

#[macro_export]
macro_rules! log_walk_step {
    ($from:expr, $to:expr, $shared:expr) => {
        tracing::debug!(from = %$from, to = %$to, shared_bytes = $shared, "Walk step");
    };
}

#[macro_export]
macro_rules! log_checkpoint {
    ($usage:expr, $limit:expr, $done:expr, $total:expr) => {
        tracing::warn!(
            usage_bytes = $usage,
            limit_bytes = $limit,
            done = $done,
            total = $total,
            "Space budget exceeded, checkpoint"
        );
    };
}

/// Human readable events surfaced while planning
#[derive(Debug, Clone)]
pub enum MigrationEvent {
    DiscoveryStarted { images: usize },
    ImageSkipped { name: String },
    TagSkipped { name: String, tag: String },
    PlanReady { planned: usize, unreached: usize },
}

impl std::fmt::Display for MigrationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DiscoveryStarted { images } => {
                write!(f, "Discovering tags for {} images", images)
            }
            Self::ImageSkipped { name } => write!(f, "skipping all tags for image {}", name),
            Self::TagSkipped { name, tag } => {
                write!(f, "skipping tag {} for image {}", tag, name)
            }
            Self::PlanReady { planned, unreached } => {
                write!(f, "Planned {} images ({} unreached)", planned, unreached)
            }
        }
    }
}
