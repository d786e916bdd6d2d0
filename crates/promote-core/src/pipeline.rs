//! Sync pipeline: query → build → (aggregate → decide → dispatch) per level.
//!
//! Only the initial hierarchy query is fatal. Batch fetch failures shrink the
//! tree; write failures are recorded per parent. Either way the run goes on
//! and the [`RunReport`] says what happened.

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::Settings;
use crate::decision::{Decision, SkipReason, decide};
use crate::dispatch::{DispatchOutcome, Dispatcher, PatchOp};
use crate::error::ErrorCode;
use crate::graph::{BuildOutcome, DEFAULT_PAGE_SIZE, Registry, build_tree};
use crate::model::{WorkItemId, WorkItemNode};
use crate::rollup::{RollupLevel, RollupOptions, evaluate_level};
use crate::source::{SourceError, WorkItemSink, WorkItemSource};

// ---------------------------------------------------------------------------
// Options and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Query text, already rendered.
    pub query: String,
    pub page_size: usize,
    pub report_only: bool,
    pub rollup: RollupOptions,
    pub levels: Vec<RollupLevel>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            query: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            report_only: false,
            rollup: RollupOptions::default(),
            levels: RollupLevel::default_levels(),
        }
    }
}

impl SyncOptions {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            query: settings.rendered_query().unwrap_or_default(),
            page_size: settings.page_size,
            report_only: settings.report_only,
            rollup: RollupOptions {
                label: settings.label.clone(),
                promotable_tags: settings.tags_to_promote.clone(),
                ..RollupOptions::default()
            },
            levels: RollupLevel::default_levels(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("hierarchy query failed: {0}")]
    EdgeQuery(#[source] SourceError),
}

impl SyncError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::EdgeQuery(_) => ErrorCode::EdgeQueryFailed,
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounts {
    pub already_promoted: usize,
    pub no_children: usize,
    pub unchanged: usize,
}

impl SkipCounts {
    fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::AlreadyPromoted => self.already_promoted += 1,
            SkipReason::NoChildren => self.no_children += 1,
            SkipReason::Unchanged => self.unchanged += 1,
        }
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.already_promoted + self.no_children + self.unchanged
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParentStatus {
    Written,
    ReportOnly,
    Failed { message: String },
    Skipped { reason: SkipReason },
}

/// What happened to one parent at one level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentOutcome {
    pub level: &'static str,
    pub parent_id: WorkItemId,
    pub work_item_type: String,
    pub title: String,
    #[serde(flatten)]
    pub status: ParentStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ops: Vec<PatchOp>,
}

/// Counters and per-parent outcomes for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub report_only: bool,
    pub relations: usize,
    pub nodes: usize,
    pub requests: usize,
    pub groups: usize,
    pub updated: usize,
    pub would_update: usize,
    pub skipped: SkipCounts,
    pub write_failures: usize,
    pub outcomes: Vec<ParentOutcome>,
    pub errors: Vec<String>,
}

impl RunReport {
    /// Outcomes that wrote (or would write) something.
    pub fn changes(&self) -> impl Iterator<Item = &ParentOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, ParentStatus::Written | ParentStatus::ReportOnly))
    }

    /// Fold tree-materialization counters and soft failures into the report.
    pub fn record_build(&mut self, build: &BuildOutcome) {
        self.nodes = build.registry.len();
        self.requests = build.requests;
        for failure in &build.fetch_failures {
            let ids: Vec<String> = failure.ids.iter().map(ToString::to_string).collect();
            self.errors.push(format!(
                "{}: fetch of [{}] failed: {}",
                ErrorCode::BatchFetchFailed,
                ids.join(", "),
                failure.message
            ));
        }
        for edge in &build.rejected_edges {
            let source = edge.source.map_or_else(|| "root".to_string(), |id| id.to_string());
            self.errors.push(format!(
                "{}: link {source} -> {} skipped, target already placed",
                ErrorCode::MalformedHierarchy,
                edge.target
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Edge count plus the materialized tree.
#[derive(Debug)]
pub struct Fetched {
    pub relations: usize,
    pub build: BuildOutcome,
}

/// Run the hierarchy query and materialize the tree.
///
/// # Errors
///
/// Returns [`SyncError::EdgeQuery`] if the query itself fails.
#[instrument(skip_all, fields(page_size = options.page_size))]
pub fn fetch_registry<S, F>(source: &S, options: &SyncOptions, on_node: F) -> Result<Fetched, SyncError>
where
    S: WorkItemSource + ?Sized,
    F: FnMut(&WorkItemNode, usize),
{
    let edges = source.query_edges(&options.query).map_err(SyncError::EdgeQuery)?;
    info!(relations = edges.len(), "hierarchy query returned");
    let build = build_tree(source, &edges, options.page_size, on_node);
    Ok(Fetched {
        relations: edges.len(),
        build,
    })
}

/// Full run against a source. `sink` of `None` forces report-only mode.
///
/// # Errors
///
/// Returns [`SyncError::EdgeQuery`] if the hierarchy query fails. Every later
/// failure is recorded in the report instead.
#[instrument(skip_all, fields(report_only = options.report_only))]
pub fn sync<S, F>(
    source: &S,
    sink: Option<&dyn WorkItemSink>,
    options: &SyncOptions,
    on_node: F,
) -> Result<RunReport, SyncError>
where
    S: WorkItemSource + ?Sized,
    F: FnMut(&WorkItemNode, usize),
{
    let Fetched { relations, mut build } = fetch_registry(source, options, on_node)?;

    let mut report = RunReport {
        relations,
        ..RunReport::default()
    };
    report.record_build(&build);
    promote(&mut build.registry, sink, options, &mut report);
    Ok(report)
}

/// Run the rollup levels over an already built registry, e.g. a snapshot.
#[instrument(skip_all, fields(nodes = registry.len(), report_only = options.report_only))]
pub fn sync_registry(registry: &mut Registry, sink: Option<&dyn WorkItemSink>, options: &SyncOptions) -> RunReport {
    let mut report = RunReport {
        nodes: registry.len(),
        ..RunReport::default()
    };
    promote(registry, sink, options, &mut report);
    report
}

fn promote(registry: &mut Registry, sink: Option<&dyn WorkItemSink>, options: &SyncOptions, report: &mut RunReport) {
    let dispatcher = match sink {
        Some(sink) => Dispatcher::new(sink, options.report_only),
        None => Dispatcher::report_only(),
    };
    report.report_only = dispatcher.is_report_only();

    for level in &options.levels {
        let results = evaluate_level(registry, level, &options.rollup);
        debug!(level = level.name, groups = results.len(), "level evaluated");
        report.groups += results.len();

        for rollup in results {
            let Some(parent) = registry.get(rollup.parent_id) else {
                continue;
            };
            let decision = decide(parent, &rollup, &options.rollup.label);
            let mut outcome = ParentOutcome {
                level: level.name,
                parent_id: parent.id,
                work_item_type: parent.work_item_type.to_string(),
                title: parent.title.clone(),
                status: ParentStatus::Written,
                ops: Vec::new(),
            };

            match decision {
                Decision::Skip(reason) => {
                    debug!(id = %outcome.parent_id, reason = reason.as_str(), "parent skipped");
                    report.skipped.record(reason);
                    outcome.status = ParentStatus::Skipped { reason };
                }
                Decision::Write(intent) => {
                    let (ops, result) = dispatcher.dispatch(&intent);
                    outcome.ops = ops;
                    match result {
                        DispatchOutcome::Written => {
                            report.updated += 1;
                            outcome.status = ParentStatus::Written;
                        }
                        DispatchOutcome::ReportOnly => {
                            report.would_update += 1;
                            outcome.status = ParentStatus::ReportOnly;
                        }
                        DispatchOutcome::Failed(message) => {
                            report.write_failures += 1;
                            report.errors.push(format!(
                                "{}: work item {}: {message}",
                                ErrorCode::PatchFailed,
                                intent.parent_id
                            ));
                            outcome.status = ParentStatus::Failed { message };
                        }
                    }
                    if !matches!(outcome.status, ParentStatus::Failed { .. }) {
                        if let Some(node) = registry.get_mut(intent.parent_id) {
                            node.apply(&intent);
                        }
                    }
                }
            }
            report.outcomes.push(outcome);
        }
    }

    if report.write_failures > 0 {
        warn!(failures = report.write_failures, "some updates failed");
    }
    info!(
        groups = report.groups,
        updated = report.updated,
        would_update = report.would_update,
        skipped = report.skipped.total(),
        "rollup finished"
    );
}
