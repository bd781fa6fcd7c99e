use crate::constants::{DONE_LOG_FILE, GIB, MIB};
use crate::graph::LayerSharingGraph;
use crate::schedule::{Checkpoint, MigrationStep, Schedule};
use std::io::{self, Write};

/// Renders a [`Schedule`] as a shell script of docker pull/tag/push commands.
pub struct ScriptEmitter {
    origin_host: String,
    destination_host: String,
}

/// Registry URL without its `http://` / `https://` scheme, as used in image references.
pub fn strip_scheme(url: &str) -> &str {
    let url = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    url.trim_end_matches('/')
}

impl ScriptEmitter {
    pub fn new(origin: &str, destination: &str) -> Self {
        Self {
            origin_host: strip_scheme(origin).to_string(),
            destination_host: strip_scheme(destination).to_string(),
        }
    }

    pub fn write_schedule<W: Write>(&self, schedule: &Schedule, out: &mut W) -> io::Result<()> {
        writeln!(out, "#!/bin/sh")?;
        writeln!(
            out,
            "# Generated by regmigrate at {}",
            chrono::Utc::now().to_rfc3339()
        )?;
        writeln!(
            out,
            "# {} -> {}: {} images",
            self.origin_host,
            self.destination_host,
            schedule.steps.len()
        )?;
        if !schedule.budget.is_unlimited() {
            writeln!(
                out,
                "# Space budget: {:.2} GBs",
                schedule.budget.limit() as f64 / GIB as f64
            )?;
        }
        writeln!(out)?;

        for step in &schedule.steps {
            self.write_step(step, out)?;
            if let Some(checkpoint) = &step.checkpoint {
                self.write_checkpoint(checkpoint, schedule, out)?;
            }
        }
        Ok(())
    }

    fn write_step<W: Write>(&self, step: &MigrationStep, out: &mut W) -> io::Result<()> {
        let name = &step.full_name;
        writeln!(out, "# Image: {}", name)?;
        writeln!(out, "# Size: {}", step.total_size)?;
        writeln!(out, "docker pull {}/{}", self.origin_host, name)?;
        writeln!(
            out,
            "docker tag {}/{} {}/{}",
            self.origin_host, name, self.destination_host, name
        )?;
        writeln!(out, "docker push {}/{}", self.destination_host, name)?;
        writeln!(out, "echo '{}' >> {}", name, DONE_LOG_FILE)?;
        writeln!(
            out,
            "# current usage: {:.1} MBs",
            step.usage as f64 / MIB as f64
        )?;
        writeln!(out)
    }

    fn write_checkpoint<W: Write>(
        &self,
        checkpoint: &Checkpoint,
        schedule: &Schedule,
        out: &mut W,
    ) -> io::Result<()> {
        writeln!(
            out,
            "# Used so far {:.2} GBs, above limit of {:.2} GBs",
            checkpoint.usage as f64 / GIB as f64,
            schedule.budget.limit() as f64 / GIB as f64
        )?;
        writeln!(out, "# Going to delete existing docker images")?;
        writeln!(
            out,
            "# Done so far {} out of {}",
            checkpoint.done, checkpoint.total
        )?;
        writeln!(out, "docker rm $(docker ps -a -q)")?;
        writeln!(out, "docker rmi $(docker images -q)")?;
        writeln!(
            out,
            "docker rmi -f $(docker images | grep '{}' | awk '{{ print $3 }}' | sort -u)",
            self.origin_host
        )?;
        writeln!(out, "#")?;
        writeln!(out)
    }

    /// Every image's layer digests and sizes, as comments.
    pub fn write_layers<W: Write>(&self, graph: &LayerSharingGraph, out: &mut W) -> io::Result<()> {
        for image in graph.images() {
            writeln!(out, "# {} ({} bytes)", image.full_name(), image.total_size())?;
            let mut layers: Vec<(&String, &u64)> = image.layers().iter().collect();
            layers.sort();
            for (digest, size) in layers {
                writeln!(out, "#   {} {}", digest, size)?;
            }
        }
        Ok(())
    }

    /// Plain listing of the order and numbers, for dry runs.
    pub fn write_summary<W: Write>(&self, schedule: &Schedule, out: &mut W) -> io::Result<()> {
        for (i, step) in schedule.steps.iter().enumerate() {
            let marker = if step.checkpoint.is_some() {
                "  [checkpoint]"
            } else {
                ""
            };
            writeln!(
                out,
                "{:>4}  {:<50} size={:<12} new={:<12} usage={}{}",
                i + 1,
                step.full_name,
                step.total_size,
                step.novel_bytes,
                step.usage,
                marker
            )?;
        }
        let metrics = &schedule.metrics;
        writeln!(
            out,
            "planned {}/{} images ({:.0}%), {} unreached, {} checkpoints, {:.1}% deduplicated",
            metrics.planned,
            metrics.images,
            metrics.coverage() * 100.0,
            metrics.unreached,
            metrics.checkpoints,
            metrics.dedup_ratio() * 100.0
        )
    }
}
