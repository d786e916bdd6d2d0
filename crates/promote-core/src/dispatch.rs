//! Update dispatch: turn a [`WriteIntent`] into patch operations and send
//! them through a [`WorkItemSink`], one request per parent.

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::decision::WriteIntent;
use crate::model::join_tags;
use crate::source::WorkItemSink;

pub const ADD_OPERATION: &str = "add";
pub const DESCRIPTION_PATH: &str = "/fields/System.Description";
pub const STATE_PATH: &str = "/fields/System.State";
pub const TAGS_PATH: &str = "/fields/System.Tags";

/// One JSON-Patch operation as the tracker expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOp {
    pub op: String,
    pub path: String,
    pub value: String,
}

impl PatchOp {
    #[must_use]
    pub fn add(path: &str, value: impl Into<String>) -> Self {
        Self {
            op: ADD_OPERATION.to_string(),
            path: path.to_string(),
            value: value.into(),
        }
    }
}

/// Operations for `intent`, description first, then state, then tags.
#[must_use]
pub fn patch_ops(intent: &WriteIntent) -> Vec<PatchOp> {
    let mut ops = Vec::with_capacity(3);
    if let Some(description) = &intent.new_description {
        ops.push(PatchOp::add(DESCRIPTION_PATH, description.clone()));
    }
    if let Some(state) = &intent.new_state {
        ops.push(PatchOp::add(STATE_PATH, state.clone()));
    }
    if let Some(tags) = &intent.new_tags {
        ops.push(PatchOp::add(TAGS_PATH, join_tags(tags)));
    }
    ops
}

/// What happened to one intent. The pipeline maps this onto the report's
/// per-parent status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Written,
    ReportOnly,
    Failed(String),
}

/// Sends intents to a sink, or only logs them in report-only mode.
pub struct Dispatcher<'a> {
    sink: Option<&'a dyn WorkItemSink>,
    report_only: bool,
}

impl<'a> Dispatcher<'a> {
    #[must_use]
    pub fn new(sink: &'a dyn WorkItemSink, report_only: bool) -> Self {
        Self {
            sink: Some(sink),
            report_only,
        }
    }

    /// A dispatcher with no sink; every intent is report-only.
    #[must_use]
    pub const fn report_only() -> Self {
        Self {
            sink: None,
            report_only: true,
        }
    }

    #[must_use]
    pub const fn is_report_only(&self) -> bool {
        self.report_only || self.sink.is_none()
    }

    /// Send one intent. Failures are logged and returned, never raised.
    pub fn dispatch(&self, intent: &WriteIntent) -> (Vec<PatchOp>, DispatchOutcome) {
        let ops = patch_ops(intent);
        let id = intent.parent_id;

        let sink = match self.sink {
            Some(sink) if !self.report_only => sink,
            _ => {
                for op in &ops {
                    info!(id = %id, path = %op.path, value = %op.value, "report-only: would patch");
                }
                return (ops, DispatchOutcome::ReportOnly);
            }
        };

        let outcome = match sink.patch(id, &ops) {
            Ok(()) => {
                info!(id = %id, ops = ops.len(), "work item updated");
                DispatchOutcome::Written
            }
            Err(err) => {
                error!(id = %id, code = %err.code(), error = %err, "work item update failed");
                DispatchOutcome::Failed(err.to_string())
            }
        };
        (ops, outcome)
    }
}
