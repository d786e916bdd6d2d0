//! In-memory source and sink.
//!
//! Used by tests and by anything that wants to run the rollup against a
//! fixed data set without a tracker.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use crate::dispatch::PatchOp;
use crate::model::{Edge, WorkItemId, WorkItemRecord, WorkItemUpdate, join_tags};
use crate::source::{SinkError, SourceError, WorkItemSink, WorkItemSource};

/// A fixed edge list and record table.
#[derive(Debug, Default)]
pub struct MemorySource {
    edges: Vec<Edge>,
    records: HashMap<WorkItemId, WorkItemRecord>,
    updates: HashMap<WorkItemId, Vec<WorkItemUpdate>>,
    failing_ids: HashSet<WorkItemId>,
    failing_history: HashSet<WorkItemId>,
    fail_query: bool,
    fetch_calls: RefCell<Vec<Vec<WorkItemId>>>,
    update_calls: RefCell<Vec<WorkItemId>>,
}

impl MemorySource {
    #[must_use]
    pub fn new(edges: Vec<Edge>, records: Vec<WorkItemRecord>) -> Self {
        Self {
            edges,
            records: records.into_iter().map(|r| (r.id, r)).collect(),
            ..Self::default()
        }
    }

    /// Make any batch containing `id` fail.
    #[must_use]
    pub fn failing_on(mut self, id: impl Into<WorkItemId>) -> Self {
        self.failing_ids.insert(id.into());
        self
    }

    /// Revision history for one item. Items without any have none.
    #[must_use]
    pub fn with_updates(mut self, id: impl Into<WorkItemId>, updates: Vec<WorkItemUpdate>) -> Self {
        self.updates.insert(id.into(), updates);
        self
    }

    /// Make the history request for `id` fail.
    #[must_use]
    pub fn failing_history_on(mut self, id: impl Into<WorkItemId>) -> Self {
        self.failing_history.insert(id.into());
        self
    }

    /// Make the edge query itself fail.
    #[must_use]
    pub const fn failing_query(mut self) -> Self {
        self.fail_query = true;
        self
    }

    /// Replace a record, e.g. to simulate a write landing between runs.
    pub fn upsert(&mut self, record: WorkItemRecord) {
        self.records.insert(record.id, record);
    }

    /// Every id list passed to [`WorkItemSource::fetch_items`], in order.
    #[must_use]
    pub fn fetch_calls(&self) -> Vec<Vec<WorkItemId>> {
        self.fetch_calls.borrow().clone()
    }

    /// Every id passed to [`WorkItemSource::fetch_updates`], in order.
    #[must_use]
    pub fn update_calls(&self) -> Vec<WorkItemId> {
        self.update_calls.borrow().clone()
    }

    /// Apply patch operations the way the tracker would.
    pub fn apply_patch(&mut self, id: WorkItemId, ops: &[PatchOp]) {
        let Some(record) = self.records.get_mut(&id) else {
            return;
        };
        for op in ops {
            match op.path.as_str() {
                crate::dispatch::DESCRIPTION_PATH => {
                    record.fields.description = Some(op.value.clone());
                }
                crate::dispatch::STATE_PATH => record.fields.state.clone_from(&op.value),
                crate::dispatch::TAGS_PATH => {
                    let tags = crate::model::parse_tags(Some(&op.value));
                    record.fields.tags = Some(join_tags(&tags));
                }
                _ => {}
            }
        }
    }
}

impl WorkItemSource for MemorySource {
    fn query_edges(&self, _query: &str) -> Result<Vec<Edge>, SourceError> {
        if self.fail_query {
            return Err(SourceError::Status {
                url: "memory://wiql".to_string(),
                status: 401,
                message: "unauthorized".to_string(),
            });
        }
        Ok(self.edges.clone())
    }

    fn fetch_items(&self, ids: &[WorkItemId]) -> Result<Vec<WorkItemRecord>, SourceError> {
        self.fetch_calls.borrow_mut().push(ids.to_vec());
        if ids.iter().any(|id| self.failing_ids.contains(id)) {
            return Err(SourceError::Transport {
                url: "memory://workitems".to_string(),
                message: "connection reset".to_string(),
            });
        }
        Ok(ids
            .iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect())
    }

    fn fetch_updates(&self, id: WorkItemId) -> Result<Vec<WorkItemUpdate>, SourceError> {
        self.update_calls.borrow_mut().push(id);
        if self.failing_history.contains(&id) {
            return Err(SourceError::Status {
                url: format!("memory://workItems/{id}/updates"),
                status: 404,
                message: "work item not found".to_string(),
            });
        }
        let mut updates = self.updates.get(&id).cloned().unwrap_or_default();
        updates.sort_by_key(|update| update.rev);
        Ok(updates)
    }
}

/// Records every patch; optionally rejects some ids.
#[derive(Debug, Default)]
pub struct RecordingSink {
    patches: RefCell<Vec<(WorkItemId, Vec<PatchOp>)>>,
    rejected: HashSet<WorkItemId>,
    calls: Cell<usize>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn rejecting(mut self, id: impl Into<WorkItemId>) -> Self {
        self.rejected.insert(id.into());
        self
    }

    #[must_use]
    pub fn patches(&self) -> Vec<(WorkItemId, Vec<PatchOp>)> {
        self.patches.borrow().clone()
    }

    /// Number of patch calls, including rejected ones.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl WorkItemSink for RecordingSink {
    fn patch(&self, id: WorkItemId, ops: &[PatchOp]) -> Result<(), SinkError> {
        self.calls.set(self.calls.get() + 1);
        if self.rejected.contains(&id) {
            return Err(SinkError::Rejected {
                id,
                status: 400,
                message: "rule validation failed".to_string(),
            });
        }
        self.patches.borrow_mut().push((id, ops.to_vec()));
        Ok(())
    }
}
