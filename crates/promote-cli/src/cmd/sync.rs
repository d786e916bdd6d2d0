use anyhow::{Context as _, Result};
use clap::Args;
use promote_core::config::Settings;
use promote_core::dispatch::PatchOp;
use promote_core::pipeline::{ParentOutcome, ParentStatus, RunReport, SyncOptions, fetch_registry, sync_registry};
use promote_core::snapshot::write_snapshot;
use promote_core::source::WorkItemSink;
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;

use super::tree::tree_line;
use crate::output::{OutputMode, pretty_kv, pretty_rule, pretty_section, render_mode};

/// Longest patch value shown in human output.
const PREVIEW_CHARS: usize = 96;

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Compute and log updates without writing them.
    #[arg(long)]
    pub report_only: bool,

    /// Run over a snapshot file instead of Azure DevOps. Implies --report-only.
    #[arg(long, value_name = "PATH")]
    pub from_snapshot: Option<PathBuf>,

    /// Also write the fetched hierarchy to PATH before promoting.
    #[arg(long, value_name = "PATH", conflicts_with = "from_snapshot")]
    pub save_snapshot: Option<PathBuf>,

    /// Print the hierarchy to stderr as it is discovered.
    #[arg(long)]
    pub tree: bool,

    /// Also promote TAG (repeatable), on top of tags_to_promote.
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,
}

/// Returned when at least one parent update was rejected or failed.
#[derive(Debug)]
pub struct WriteFailures(pub usize);

impl fmt::Display for WriteFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = if self.0 == 1 { "" } else { "s" };
        write!(f, "{} work-item update{plural} failed", self.0)
    }
}

impl std::error::Error for WriteFailures {}

fn options_for(args: &SyncArgs, settings: &Settings) -> SyncOptions {
    let mut options = SyncOptions::from_settings(settings);
    options.report_only |= args.report_only;
    options.rollup.promotable_tags = super::promotable_tags(&settings.tags_to_promote, &args.tags);
    options
}

fn print_discovered(node: &promote_core::model::WorkItemNode, depth: usize) {
    eprintln!("{}", tree_line(node, depth));
}

/// Execute `promote sync`.
///
/// # Errors
///
/// Returns an error if settings are incomplete, the hierarchy query fails,
/// a snapshot cannot be read or written, or any parent update failed.
pub fn run_sync(args: &SyncArgs, settings: &Settings, output: OutputMode) -> Result<()> {
    let mut options = options_for(args, settings);

    let report = if let Some(path) = &args.from_snapshot {
        if !options.report_only {
            tracing::warn!("snapshot runs never write; continuing in report-only mode");
            options.report_only = true;
        }
        let mut registry = super::load_registry(path)?;
        if args.tree {
            for node in registry.iter() {
                print_discovered(node, registry.depth(node.id));
            }
        }
        sync_registry(&mut registry, None, &options)
    } else {
        let client = super::connect(settings)?;
        let fetched = fetch_registry(&client, &options, |node, depth| {
            if args.tree {
                print_discovered(node, depth);
            }
        })?;
        let relations = fetched.relations;
        let mut build = fetched.build;

        if let Some(path) = &args.save_snapshot {
            write_snapshot(path, &build.registry)
                .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
        }

        let sink: &dyn WorkItemSink = &client;
        let mut report = sync_registry(&mut build.registry, Some(sink), &options);
        report.relations = relations;
        report.record_build(&build);
        report.requests = client.request_count();
        report
    };

    render_mode(output, &report, write_text, write_pretty)?;

    if report.write_failures > 0 {
        return Err(WriteFailures(report.write_failures).into());
    }
    Ok(())
}

fn status_label(status: &ParentStatus) -> &'static str {
    match status {
        ParentStatus::Written => "written",
        ParentStatus::ReportOnly => "would_write",
        ParentStatus::Failed { .. } => "failed",
        ParentStatus::Skipped { .. } => "skipped",
    }
}

fn preview(value: &str) -> String {
    let flat = value.replace('\n', " ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    format!("{cut}…")
}

fn field_name(op: &PatchOp) -> &str {
    op.path.rsplit('/').next().unwrap_or(&op.path)
}

fn write_text(report: &RunReport, w: &mut dyn Write) -> io::Result<()> {
    for outcome in report
        .outcomes
        .iter()
        .filter(|o| !matches!(o.status, ParentStatus::Skipped { .. }))
    {
        let fields: Vec<&str> = outcome.ops.iter().map(field_name).collect();
        writeln!(
            w,
            "{} level={} id={} fields={}",
            status_label(&outcome.status),
            outcome.level,
            outcome.parent_id,
            fields.join(",")
        )?;
    }
    writeln!(w, "report_only={}", report.report_only)?;
    writeln!(w, "nodes={}", report.nodes)?;
    writeln!(w, "updated={}", report.updated)?;
    writeln!(w, "would_update={}", report.would_update)?;
    writeln!(w, "skipped={}", report.skipped.total())?;
    writeln!(w, "write_failures={}", report.write_failures)
}

fn write_change(w: &mut dyn Write, outcome: &ParentOutcome) -> io::Result<()> {
    writeln!(
        w,
        "[{}] {} {}. {} ({})",
        outcome.level,
        outcome.work_item_type,
        outcome.parent_id,
        outcome.title,
        status_label(&outcome.status)
    )?;
    for op in &outcome.ops {
        writeln!(w, "    {:<12} {}", field_name(op), preview(&op.value))?;
    }
    if let ParentStatus::Failed { message } = &outcome.status {
        writeln!(w, "    error        {message}")?;
    }
    Ok(())
}

fn write_pretty(report: &RunReport, w: &mut dyn Write) -> io::Result<()> {
    let heading = if report.report_only {
        "Planned updates (report only)"
    } else {
        "Updates"
    };
    pretty_section(w, heading)?;
    let mut any = false;
    for outcome in report
        .outcomes
        .iter()
        .filter(|o| !matches!(o.status, ParentStatus::Skipped { .. }))
    {
        write_change(w, outcome)?;
        any = true;
    }
    if !any {
        writeln!(w, "Nothing to promote.")?;
    }

    writeln!(w)?;
    pretty_section(w, "Summary")?;
    pretty_kv(w, "work items", report.nodes.to_string())?;
    pretty_kv(w, "parents", report.groups.to_string())?;
    if report.report_only {
        pretty_kv(w, "would update", report.would_update.to_string())?;
    } else {
        pretty_kv(w, "updated", report.updated.to_string())?;
    }
    pretty_kv(
        w,
        "skipped",
        format!(
            "{} (promoted {}, no children {}, unchanged {})",
            report.skipped.total(),
            report.skipped.already_promoted,
            report.skipped.no_children,
            report.skipped.unchanged
        ),
    )?;
    if report.write_failures > 0 {
        pretty_kv(w, "failed", report.write_failures.to_string())?;
    }

    if !report.errors.is_empty() {
        writeln!(w)?;
        pretty_section(w, "Errors")?;
        for error in &report.errors {
            writeln!(w, "{error}")?;
        }
        pretty_rule(w)?;
    }
    Ok(())
}
