//! Tree materialization from a flat parent→child edge list.
//!
//! The hierarchy query returns only links. This module fetches the linked
//! work items level by level and places them in a [`Registry`], an arena
//! keyed by id that keeps parent and child pointers consistent.
//!
//! # Traversal
//!
//! Roots (edges with no source) form the first level. Each following level is
//! the set of targets whose source was placed in the level before. A level is
//! fetched with [`fetch_batched`], so one tracker call carries at most one
//! page of ids. There is no recursion and no depth limit.
//!
//! # Malformed input
//!
//! The source graph is expected to be a forest. A target that is reached a
//! second time (shared child or cycle) is rejected: the first placement wins
//! and the offending edge is reported in [`BuildOutcome::rejected_edges`].
//!
//! # Soft failure
//!
//! A batch that fails, or omits ids, leaves those ids and their subtrees out
//! of the registry. This is logged and recorded, never raised.

#![allow(clippy::module_name_repetitions)]

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument, warn};

use super::batch::{BatchFailure, fetch_batched};
use crate::error::ErrorCode;
use crate::model::{Edge, WorkItemId, WorkItemNode};
use crate::source::WorkItemSource;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Errors raised when a placement would break the tree invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("work item {0} is already in the registry")]
    Duplicate(WorkItemId),

    #[error("work item {child} names parent {parent}, which is not in the registry")]
    MissingParent {
        child: WorkItemId,
        parent: WorkItemId,
    },

    #[error("placing {child} under {parent} would create a cycle")]
    CycleDetected {
        child: WorkItemId,
        parent: WorkItemId,
    },
}

impl TreeError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::MalformedHierarchy
    }
}

/// Arena of work-item nodes for one run, indexed by id.
///
/// Invariant: for every node with `parent_id = Some(p)`, `p` is present and
/// lists the node in its `child_ids`; no node is its own ancestor.
/// Iteration follows placement order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    nodes: HashMap<WorkItemId, WorkItemNode>,
    order: Vec<WorkItemId>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: WorkItemId) -> bool {
        self.nodes.contains_key(&id)
    }

    #[must_use]
    pub fn get(&self, id: WorkItemId) -> Option<&WorkItemNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: WorkItemId) -> Option<&mut WorkItemNode> {
        self.nodes.get_mut(&id)
    }

    /// All nodes in placement order.
    pub fn iter(&self) -> impl Iterator<Item = &WorkItemNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn roots(&self) -> impl Iterator<Item = &WorkItemNode> {
        self.iter().filter(|node| node.is_root())
    }

    /// Direct children of `id`, in discovery order.
    pub fn children(&self, id: WorkItemId) -> impl Iterator<Item = &WorkItemNode> {
        self.nodes
            .get(&id)
            .map(|node| node.child_ids.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.nodes.get(child))
    }

    /// Number of ancestors above `id` (roots are depth 0).
    #[must_use]
    pub fn depth(&self, id: WorkItemId) -> usize {
        let mut depth = 0;
        let mut current = self.nodes.get(&id).and_then(|node| node.parent_id);
        while let Some(parent) = current {
            depth += 1;
            if depth > self.order.len() {
                break; // cycle guard
            }
            current = self.nodes.get(&parent).and_then(|node| node.parent_id);
        }
        depth
    }

    /// Place `node` as a root.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::Duplicate`] if the id is already placed.
    pub fn insert_root(&mut self, mut node: WorkItemNode) -> Result<(), TreeError> {
        if self.contains(node.id) {
            return Err(TreeError::Duplicate(node.id));
        }
        node.parent_id = None;
        node.child_ids.clear();
        self.order.push(node.id);
        self.nodes.insert(node.id, node);
        Ok(())
    }

    /// Place `node` under `parent`, wiring both pointers.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::Duplicate`] if the node is already placed
    /// (reached twice, which includes every cycle through placed nodes), or
    /// [`TreeError::MissingParent`] if `parent` is not placed.
    pub fn attach(&mut self, parent: WorkItemId, mut node: WorkItemNode) -> Result<(), TreeError> {
        if self.contains(node.id) {
            return Err(TreeError::Duplicate(node.id));
        }
        let Some(parent_node) = self.nodes.get_mut(&parent) else {
            return Err(TreeError::MissingParent {
                child: node.id,
                parent,
            });
        };
        parent_node.child_ids.push(node.id);
        node.parent_id = Some(parent);
        node.child_ids.clear();
        self.order.push(node.id);
        self.nodes.insert(node.id, node);
        Ok(())
    }

    /// Rebuild a registry from nodes that carry their own parent pointers,
    /// e.g. a snapshot. `child_ids` are recomputed from `parent_id` in input
    /// order; whatever the input listed is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::Duplicate`] for a repeated id,
    /// [`TreeError::MissingParent`] for a dangling parent pointer, or
    /// [`TreeError::CycleDetected`] if parent pointers loop.
    pub fn from_nodes(nodes: Vec<WorkItemNode>) -> Result<Self, TreeError> {
        let mut registry = Self::new();
        for mut node in nodes {
            if registry.contains(node.id) {
                return Err(TreeError::Duplicate(node.id));
            }
            node.child_ids.clear();
            registry.order.push(node.id);
            registry.nodes.insert(node.id, node);
        }

        for id in registry.order.clone() {
            let Some(parent) = registry.nodes.get(&id).and_then(|node| node.parent_id) else {
                continue;
            };
            if !registry.contains(parent) {
                return Err(TreeError::MissingParent { child: id, parent });
            }
            if registry.is_ancestor_or_self(id, parent) {
                return Err(TreeError::CycleDetected { child: id, parent });
            }
            if let Some(parent_node) = registry.nodes.get_mut(&parent) {
                parent_node.child_ids.push(id);
            }
        }

        Ok(registry)
    }

    /// Consume the registry, yielding nodes in placement order.
    #[must_use]
    pub fn into_nodes(mut self) -> Vec<WorkItemNode> {
        self.order
            .iter()
            .filter_map(|id| self.nodes.remove(id))
            .collect()
    }

    /// Whether `candidate` is `id` or one of its ancestors, following parent
    /// pointers. Bounded by the registry size.
    fn is_ancestor_or_self(&self, candidate: WorkItemId, id: WorkItemId) -> bool {
        let mut visited: HashSet<WorkItemId> = HashSet::new();
        let mut current = Some(id);
        while let Some(cursor) = current {
            if cursor == candidate {
                return true;
            }
            if !visited.insert(cursor) {
                return true; // pre-existing loop above `id`
            }
            current = self.nodes.get(&cursor).and_then(|node| node.parent_id);
        }
        false
    }
}

/// Result of materializing a tree from the source.
#[derive(Debug, Default)]
pub struct BuildOutcome {
    pub registry: Registry,
    /// Batches that failed; their subtrees are absent.
    pub fetch_failures: Vec<BatchFailure>,
    /// Edges skipped because their target was already placed.
    pub rejected_edges: Vec<Edge>,
    /// Ids requested but not returned by a successful batch.
    pub missing_ids: Vec<WorkItemId>,
    /// Number of fetch calls issued.
    pub requests: usize,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Materialize the forest described by `edges`, fetching records from
/// `source` in batches of at most `page_size`.
///
/// `on_node` is called once per placed node with its depth, in placement
/// order (roots first, then level by level).
#[instrument(skip_all, fields(edges = edges.len(), page_size))]
pub fn build_tree<S, F>(source: &S, edges: &[Edge], page_size: usize, mut on_node: F) -> BuildOutcome
where
    S: WorkItemSource + ?Sized,
    F: FnMut(&WorkItemNode, usize),
{
    let mut children_of: HashMap<WorkItemId, Vec<WorkItemId>> = HashMap::new();
    let mut frontier: Vec<Edge> = Vec::new();
    for edge in edges {
        match edge.source {
            Some(source_id) => children_of.entry(source_id).or_default().push(edge.target),
            None => frontier.push(*edge),
        }
    }

    let mut outcome = BuildOutcome::default();
    let mut depth = 0_usize;

    while !frontier.is_empty() {
        let mut wanted: Vec<Edge> = Vec::with_capacity(frontier.len());
        let mut seen_in_level: HashSet<WorkItemId> = HashSet::new();
        for edge in frontier {
            if outcome.registry.contains(edge.target) || !seen_in_level.insert(edge.target) {
                warn!(
                    target_id = %edge.target,
                    source_id = ?edge.source.map(WorkItemId::get),
                    "work item reached twice; keeping first placement"
                );
                outcome.rejected_edges.push(edge);
                continue;
            }
            wanted.push(edge);
        }

        let ids: Vec<WorkItemId> = wanted.iter().map(|edge| edge.target).collect();
        let fetched = fetch_batched(source, &ids, page_size);
        outcome.requests += fetched.requests;
        let failed: HashSet<WorkItemId> = fetched
            .failures
            .iter()
            .flat_map(|failure| failure.ids.iter().copied())
            .collect();
        outcome.fetch_failures.extend(fetched.failures);

        let mut by_id: HashMap<WorkItemId, _> = fetched
            .records
            .into_iter()
            .map(|record| (record.id, record))
            .collect();

        let mut next: Vec<Edge> = Vec::new();
        for edge in wanted {
            let Some(record) = by_id.remove(&edge.target) else {
                if !failed.contains(&edge.target) {
                    debug!(id = %edge.target, "no record returned; subtree skipped");
                    outcome.missing_ids.push(edge.target);
                }
                continue;
            };

            let node = WorkItemNode::from(record);
            let placed = match edge.source {
                None => outcome.registry.insert_root(node),
                Some(parent) => outcome.registry.attach(parent, node),
            };
            if let Err(err) = placed {
                warn!(error = %err, "edge rejected");
                outcome.rejected_edges.push(edge);
                continue;
            }

            if let Some(node) = outcome.registry.get(edge.target) {
                on_node(node, depth);
            }
            if let Some(children) = children_of.get(&edge.target) {
                next.extend(children.iter().map(|child| Edge::child(edge.target, *child)));
            }
        }

        frontier = next;
        depth += 1;
    }

    debug!(
        nodes = outcome.registry.len(),
        requests = outcome.requests,
        failures = outcome.fetch_failures.len(),
        "tree built"
    );
    outcome
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
