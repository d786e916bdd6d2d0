//! Rollup aggregation over a materialized [`Registry`].
//!
//! A [`RollupLevel`] names which child types it reads and which fields it
//! rolls up. For a level, children are grouped by their immediate parent
//! and each group is reduced to a [`RollupResult`]:
//!
//! - a merged description fragment ([`description`]),
//! - a lifecycle state from the parent type's decision table ([`state`]),
//! - a promoted tag set ([`tags`]).
//!
//! Levels are evaluated in order by the pipeline. Aggregation itself is pure:
//! it reads the registry and never mutates it.
//!
//! Tags are the exception to per-level grouping. A parent reached by more
//! than one tag level (an Epic with both Features and User Stories under it)
//! must see the same promotable set from each, so the tag rollup always reads
//! every child whose type is in [`RollupOptions::tag_sources`].
//!
//! ## Default levels
//!
//! | Level   | Children                         | Description | State | Tags |
//! |---------|----------------------------------|-------------|-------|------|
//! | task    | Task                             | yes         | yes   | no   |
//! | story   | User Story, Product Backlog Item | yes         | no    | yes  |
//! | feature | Feature                          | no          | no    | yes  |

pub mod description;
pub mod state;
pub mod tags;

use serde::Serialize;

use crate::graph::Registry;
use crate::model::{WorkItemId, WorkItemNode, WorkItemType};

pub use description::{is_promoted, merge_fragment};
pub use state::{StateTable, roll_up_state, table_for};
pub use tags::{TagRollup, roll_up_tags};

/// Heading text written above promoted content when none is configured.
pub const DEFAULT_LABEL: &str = "Rollup";

/// Which children a level reads and which fields it rolls up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupLevel {
    pub name: &'static str,
    pub child_types: Vec<WorkItemType>,
    pub description: bool,
    pub state: bool,
    pub tags: bool,
}

impl RollupLevel {
    /// Task → parent: description and state.
    #[must_use]
    pub fn task_level() -> Self {
        Self {
            name: "task",
            child_types: vec![WorkItemType::Task],
            description: true,
            state: true,
            tags: false,
        }
    }

    /// Requirement → Feature: description and tags.
    #[must_use]
    pub fn story_level() -> Self {
        Self {
            name: "story",
            child_types: vec![WorkItemType::UserStory, WorkItemType::ProductBacklogItem],
            description: true,
            state: false,
            tags: true,
        }
    }

    /// Feature → Epic: tags only.
    #[must_use]
    pub fn feature_level() -> Self {
        Self {
            name: "feature",
            child_types: vec![WorkItemType::Feature],
            description: false,
            state: false,
            tags: true,
        }
    }

    #[must_use]
    pub fn default_levels() -> Vec<Self> {
        vec![Self::task_level(), Self::story_level(), Self::feature_level()]
    }

    #[must_use]
    pub fn selects(&self, work_item_type: &WorkItemType) -> bool {
        self.child_types.contains(work_item_type)
    }
}

/// Child types whose tags feed a parent's tag rollup.
#[must_use]
pub fn default_tag_sources() -> Vec<WorkItemType> {
    vec![
        WorkItemType::UserStory,
        WorkItemType::ProductBacklogItem,
        WorkItemType::Feature,
    ]
}

/// Inputs to aggregation that come from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupOptions {
    pub label: String,
    pub promotable_tags: Vec<String>,
    /// Child types read by every tag-rolling level, whatever its own types.
    pub tag_sources: Vec<WorkItemType>,
}

impl Default for RollupOptions {
    fn default() -> Self {
        Self {
            label: DEFAULT_LABEL.to_string(),
            promotable_tags: Vec::new(),
            tag_sources: default_tag_sources(),
        }
    }
}

/// Children of one parent selected by a level, in registry order.
#[derive(Debug, Clone)]
pub struct ChildGroup<'a> {
    pub parent_id: WorkItemId,
    pub children: Vec<&'a WorkItemNode>,
}

/// Computed rollup for one parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollupResult {
    pub parent_id: WorkItemId,
    pub child_count: usize,
    /// `None` when the level skips descriptions or no child has one.
    pub fragment: Option<String>,
    /// `None` when the level skips state or the parent type has no table.
    pub state: Option<String>,
    /// `None` when the level skips tags or nothing is promotable.
    pub tags: Option<TagRollup>,
}

/// Group the level's children by immediate parent.
///
/// Groups appear in order of their first child in the registry. Children
/// that are roots, or whose parent is not in the registry, are left out.
#[must_use]
pub fn group_by_parent<'a>(registry: &'a Registry, level: &RollupLevel) -> Vec<ChildGroup<'a>> {
    let mut groups: Vec<ChildGroup<'a>> = Vec::new();
    for child in registry.iter().filter(|node| level.selects(&node.work_item_type)) {
        let Some(parent_id) = child.parent_id else {
            continue;
        };
        if !registry.contains(parent_id) {
            continue;
        }
        match groups.iter_mut().find(|group| group.parent_id == parent_id) {
            Some(group) => group.children.push(child),
            None => groups.push(ChildGroup {
                parent_id,
                children: vec![child],
            }),
        }
    }
    groups
}

/// Reduce one parent's children to a rollup.
///
/// `children` are the level's own children; `tag_children` are the parent's
/// children of any tag source type (see [`tag_children`]).
#[must_use]
pub fn aggregate(
    parent: &WorkItemNode,
    children: &[&WorkItemNode],
    tag_children: &[&WorkItemNode],
    level: &RollupLevel,
    options: &RollupOptions,
) -> RollupResult {
    let fragment = if level.description {
        merge_fragment(&options.label, children.iter().copied())
    } else {
        None
    };

    let state = (level.state && table_for(&parent.work_item_type).is_some()).then(|| {
        let child_states: Vec<&str> = children.iter().map(|child| child.state.as_str()).collect();
        roll_up_state(&parent.work_item_type, &parent.state, &child_states)
    });

    let tags = (level.tags && !options.promotable_tags.is_empty()).then(|| {
        roll_up_tags(
            &parent.tags,
            tag_children.iter().flat_map(|child| child.tags.iter()),
            &options.promotable_tags,
        )
    });

    RollupResult {
        parent_id: parent.id,
        child_count: children.len(),
        fragment,
        state,
        tags,
    }
}

/// Children of `parent_id` whose tags count toward its tag rollup.
#[must_use]
pub fn tag_children<'a>(registry: &'a Registry, parent_id: WorkItemId, options: &RollupOptions) -> Vec<&'a WorkItemNode> {
    registry
        .children(parent_id)
        .filter(|child| options.tag_sources.contains(&child.work_item_type))
        .collect()
}

/// Group and aggregate every parent touched by `level`.
#[must_use]
pub fn evaluate_level(registry: &Registry, level: &RollupLevel, options: &RollupOptions) -> Vec<RollupResult> {
    group_by_parent(registry, level)
        .into_iter()
        .filter_map(|group| {
            let parent = registry.get(group.parent_id)?;
            let tagged = if level.tags {
                tag_children(registry, group.parent_id, options)
            } else {
                Vec::new()
            };
            Some(aggregate(parent, &group.children, &tagged, level, options))
        })
        .collect()
}
