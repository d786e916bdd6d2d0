use anyhow::{Context as _, Result};
use clap::Args;
use promote_core::config::Settings;
use promote_core::pipeline::{SyncOptions, fetch_registry};
use promote_core::snapshot::write_snapshot;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

use crate::output::{OutputMode, pretty_kv, render_mode};

/// Default snapshot file name.
pub const DEFAULT_SNAPSHOT: &str = "work-items.json";

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    /// Where to write the node registry.
    #[arg(short, long, value_name = "PATH", default_value = DEFAULT_SNAPSHOT)]
    pub output: PathBuf,
}

#[derive(Debug, Serialize)]
struct SnapshotReport {
    path: PathBuf,
    relations: usize,
    nodes: usize,
    requests: usize,
    fetch_failures: usize,
}

/// Execute `promote snapshot`: fetch the hierarchy and dump the registry.
///
/// # Errors
///
/// Returns an error if settings are incomplete, the hierarchy query fails,
/// or the file cannot be written.
pub fn run_snapshot(args: &SnapshotArgs, settings: &Settings, output: OutputMode) -> Result<()> {
    let client = super::connect(settings)?;
    let options = SyncOptions::from_settings(settings);
    let fetched = fetch_registry(&client, &options, |_, _| {})?;

    write_snapshot(&args.output, &fetched.build.registry)
        .with_context(|| format!("Failed to write snapshot {}", args.output.display()))?;

    let report = SnapshotReport {
        path: args.output.clone(),
        relations: fetched.relations,
        nodes: fetched.build.registry.len(),
        requests: client.request_count(),
        fetch_failures: fetched.build.fetch_failures.len(),
    };
    tracing::info!(path = %report.path.display(), nodes = report.nodes, "snapshot written");

    render_mode(
        output,
        &report,
        |r, w| {
            writeln!(w, "path={}", r.path.display())?;
            writeln!(w, "nodes={}", r.nodes)?;
            writeln!(w, "fetch_failures={}", r.fetch_failures)
        },
        |r, w| {
            pretty_kv(w, "snapshot", r.path.display().to_string())?;
            pretty_kv(w, "relations", r.relations.to_string())?;
            pretty_kv(w, "work items", r.nodes.to_string())?;
            pretty_kv(w, "requests", r.requests.to_string())?;
            if r.fetch_failures > 0 {
                pretty_kv(w, "failed batches", r.fetch_failures.to_string())?;
            }
            Ok(())
        },
    )
}
