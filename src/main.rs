use anyhow::Result;
use clap::{Parser, ValueEnum};
use regmigrate::config::{parse_byte_size, MigrationConfig};
use regmigrate::logging::{self, MigrationEvent};
use regmigrate::registry::{self, DiscoveryOptions, RegistryClient, RegistrySource};
use regmigrate::script::ScriptEmitter;
use regmigrate::skip::{SkipList, TagSkipPolicy};
use regmigrate::{build_schedule, Coverage, MigrateError, MigrationPlanner, SeedPolicy, SpaceBudget};
use std::io::{self, Write};
use std::path::PathBuf;

const AFTER_HELP: &str = "\
IMPORTANT: the generated script only pulls, tags and pushes images. After
removing anything from the origin registry, run its garbage collector:

   docker run registry:2 bin/registry garbage-collect /etc/docker/registry/config.yml";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SeedArg {
    MostLayers,
    SecondMostLayers,
}

/// Plan a registry-to-registry image migration ordered by shared layer data.
///
/// Prints a shell script on stdout; logs go to stderr.
#[derive(Debug, Parser)]
#[command(author, version, about, after_help = AFTER_HELP)]
struct Cli {
    /// JSON configuration file; flags and environment override it
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Source registry, e.g. https://example.com:5000
    #[arg(short, long, env = "REGMIGRATE_ORIGIN", value_name = "URL")]
    origin: Option<String>,

    /// Destination registry, e.g. https://example.com:5000
    #[arg(short, long, env = "REGMIGRATE_DESTINATION", value_name = "URL")]
    destination: Option<String>,

    /// Credentials for the source registry
    #[arg(short, long, env = "REGMIGRATE_LOGIN", value_name = "USER:PASSWORD", hide_env_values = true)]
    login: Option<String>,

    /// Bearer token for the source registry (used when no login is given)
    #[arg(long, env = "REGMIGRATE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Only migrate these repositories instead of the whole catalog
    #[arg(short, long = "image", value_name = "IMAGE", num_args = 1..)]
    images: Vec<String>,

    /// File listing images (`name`) and tags (`name:tag`) to leave out
    #[arg(short, long, value_name = "FILE")]
    skip: Option<PathBuf>,

    /// Deduplicated disk budget before a cleanup checkpoint (e.g. 50G); 0 is unlimited
    #[arg(short, long, env = "REGMIGRATE_MAX_SPACE_USE", value_parser = parse_budget)]
    max_space_use: Option<SpaceBudget>,

    /// How the first image is chosen
    #[arg(long, value_enum)]
    seed: Option<SeedArg>,

    /// Start from this `name:tag` instead
    #[arg(long, value_name = "IMAGE:TAG", conflicts_with = "seed")]
    seed_image: Option<String>,

    /// Keep planning after the walk runs out of shared layers, so every image is included
    #[arg(long)]
    all: bool,

    /// A skipped `name:tag` also drops the tags listed after it
    #[arg(long)]
    abandon_remaining_tags: bool,

    /// Print the planned order and sizes instead of a script
    #[arg(long)]
    dry_run: bool,

    /// Also list layer digests for all images and tags
    #[arg(long)]
    layers: bool,

    /// Emit logs as JSON
    #[arg(long, env = "REGMIGRATE_LOG_JSON")]
    json_logs: bool,

    /// Hide the manifest progress bar
    #[arg(long)]
    no_progress: bool,
}

fn parse_budget(value: &str) -> std::result::Result<SpaceBudget, MigrateError> {
    parse_byte_size(value).map(SpaceBudget::new)
}

impl Cli {
    fn resolve_config(&self) -> Result<MigrationConfig> {
        let mut config = match &self.config {
            Some(path) => MigrationConfig::from_file(path)?,
            None => MigrationConfig::default(),
        };

        if let Some(origin) = &self.origin {
            config.origin = Some(origin.clone());
        }
        if let Some(destination) = &self.destination {
            config.destination = Some(destination.clone());
        }
        if let Some(login) = &self.login {
            config.login = Some(login.clone());
        }
        if let Some(token) = &self.token {
            config.token = Some(token.clone());
        }
        if !self.images.is_empty() {
            config.images = self.images.clone();
        }
        if let Some(skip) = &self.skip {
            config.skip_file = Some(skip.clone());
        }
        if let Some(budget) = self.max_space_use {
            config.max_space_use = budget;
        }
        if let Some(seed) = self.seed {
            config.seed = match seed {
                SeedArg::MostLayers => SeedPolicy::MostLayers,
                SeedArg::SecondMostLayers => SeedPolicy::SecondMostLayers,
            };
        }
        if let Some(name) = &self.seed_image {
            config.seed = SeedPolicy::Named(name.clone());
        }
        if self.all {
            config.coverage = Coverage::Complete;
        }
        if self.abandon_remaining_tags {
            config.tag_skip = TagSkipPolicy::AbandonRemainingTags;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.json_logs).map_err(|e| anyhow::anyhow!("{}", e))?;

    let config = cli.resolve_config()?;
    let origin = config.origin.clone().unwrap_or_default();
    let destination = config.destination.clone().unwrap_or_default();

    let mut client = RegistryClient::new(&origin)?;
    if let Some(login) = &config.login {
        client = client.with_login(login)?;
    } else if let Some(token) = &config.token {
        client = client.with_token(token);
    }

    let names = if config.images.is_empty() {
        client.list_images()?
    } else {
        config.images.clone()
    };

    let skip = match &config.skip_file {
        Some(path) => SkipList::from_optional_file(path)?,
        None => SkipList::empty(),
    };

    let graph = registry::discover(
        &client,
        &names,
        &skip,
        DiscoveryOptions {
            tag_skip: config.tag_skip,
            progress: !cli.no_progress,
        },
    )?;

    let plan = MigrationPlanner::new(&graph)
        .with_seed(config.seed.clone())
        .with_coverage(config.coverage)
        .with_skip(skip.as_visited_set())
        .plan()?;
    for name in &plan.unreached {
        tracing::warn!(image = %name, "Shares no layers with the planned walk; rerun with --all to include it");
    }

    let schedule = build_schedule(&graph, &plan, config.max_space_use)?;
    let emitter = ScriptEmitter::new(&origin, &destination);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if cli.layers {
        emitter.write_layers(&graph, &mut out)?;
    }
    if cli.dry_run {
        emitter.write_summary(&schedule, &mut out)?;
    } else {
        emitter.write_schedule(&schedule, &mut out)?;
    }
    out.flush()?;

    tracing::info!(
        "{}",
        MigrationEvent::PlanReady {
            planned: plan.order.len(),
            unreached: plan.unreached.len(),
        }
    );
    Ok(())
}
