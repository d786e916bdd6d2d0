//! Lifecycle-state rollup as ordered decision tables.
//!
//! Each parent type with a table maps the set of its children's states to a
//! single state. Rules are evaluated top to bottom and the first rule whose
//! state set contains every child state wins; if none match, the table's
//! fallback applies. Parent types without a table keep their current state.
//!
//! ```text
//! User Story             Product Backlog Item
//!   all New      -> New      all New          -> New
//!   all Removed  -> Removed  all Removed      -> Removed
//!   all Closed   -> Closed   all Done         -> Done
//!   ⊆ {Closed, Removed}      ⊆ {Done, Removed}
//!                -> Resolved                  -> Approved
//!   otherwise    -> Active   otherwise        -> Committed
//! ```
//!
//! Because "all Removed" precedes the mixed rule, the mixed rule only fires
//! when at least one child is Closed (or Done).

use crate::model::WorkItemType;

/// One row: if every child state is in `all_in`, the parent becomes `then`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateRule {
    pub all_in: &'static [&'static str],
    pub then: &'static str,
}

impl StateRule {
    #[must_use]
    pub fn matches(&self, child_states: &[&str]) -> bool {
        child_states.iter().all(|state| self.all_in.contains(state))
    }
}

/// Ordered rules plus the state used when none match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTable {
    pub rules: &'static [StateRule],
    pub fallback: &'static str,
}

impl StateTable {
    /// Evaluate the table. `child_states` must be non-empty; an empty slice
    /// matches the first rule vacuously.
    #[must_use]
    pub fn evaluate(&self, child_states: &[&str]) -> &'static str {
        self.rules
            .iter()
            .find(|rule| rule.matches(child_states))
            .map_or(self.fallback, |rule| rule.then)
    }
}

/// Task states: New / Active / Closed / Removed.
pub const USER_STORY_TABLE: StateTable = StateTable {
    rules: &[
        StateRule {
            all_in: &["New"],
            then: "New",
        },
        StateRule {
            all_in: &["Removed"],
            then: "Removed",
        },
        StateRule {
            all_in: &["Closed"],
            then: "Closed",
        },
        StateRule {
            all_in: &["Closed", "Removed"],
            then: "Resolved",
        },
    ],
    fallback: "Active",
};

/// Task states: To Do / In Progress / Done / Removed.
pub const PRODUCT_BACKLOG_ITEM_TABLE: StateTable = StateTable {
    rules: &[
        StateRule {
            all_in: &["New"],
            then: "New",
        },
        StateRule {
            all_in: &["Removed"],
            then: "Removed",
        },
        StateRule {
            all_in: &["Done"],
            then: "Done",
        },
        StateRule {
            all_in: &["Done", "Removed"],
            then: "Approved",
        },
    ],
    fallback: "Committed",
};

/// The decision table for `parent_type`, if it has one.
#[must_use]
pub const fn table_for(parent_type: &WorkItemType) -> Option<&'static StateTable> {
    match parent_type {
        WorkItemType::UserStory => Some(&USER_STORY_TABLE),
        WorkItemType::ProductBacklogItem => Some(&PRODUCT_BACKLOG_ITEM_TABLE),
        _ => None,
    }
}

/// Roll child states up into a parent state.
///
/// Returns `current` unchanged when the parent type has no table or there
/// are no children.
#[must_use]
pub fn roll_up_state(parent_type: &WorkItemType, current: &str, child_states: &[&str]) -> String {
    match table_for(parent_type) {
        Some(table) if !child_states.is_empty() => table.evaluate(child_states).to_string(),
        _ => current.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(states: &[&str]) -> String {
        roll_up_state(&WorkItemType::UserStory, "Active", states)
    }

    fn pbi(states: &[&str]) -> String {
        roll_up_state(&WorkItemType::ProductBacklogItem, "Committed", states)
    }

    #[test]
    fn user_story_table() {
        assert_eq!(story(&["New", "New"]), "New");
        assert_eq!(story(&["Removed"]), "Removed");
        assert_eq!(story(&["Closed", "Closed"]), "Closed");
        assert_eq!(story(&["Closed", "Removed"]), "Resolved");
        assert_eq!(story(&["Removed", "Closed", "Removed"]), "Resolved");
        assert_eq!(story(&["Active", "New"]), "Active");
        assert_eq!(story(&["New", "Closed"]), "Active");
        assert_eq!(story(&["Resolved"]), "Active");
    }

    #[test]
    fn product_backlog_item_table() {
        assert_eq!(pbi(&["New"]), "New");
        assert_eq!(pbi(&["Removed", "Removed"]), "Removed");
        assert_eq!(pbi(&["Done"]), "Done");
        assert_eq!(pbi(&["Done", "Removed"]), "Approved");
        assert_eq!(pbi(&["In Progress", "Done"]), "Committed");
        assert_eq!(pbi(&["To Do"]), "Committed");
    }

    #[test]
    fn other_parent_types_pass_through() {
        for kind in [
            WorkItemType::Epic,
            WorkItemType::Feature,
            WorkItemType::Task,
            WorkItemType::Other("Bug".to_string()),
        ] {
            assert_eq!(roll_up_state(&kind, "In Review", &["Closed"]), "In Review");
        }
    }

    #[test]
    fn no_children_passes_through() {
        assert_eq!(story(&[]), "Active");
        assert_eq!(pbi(&[]), "Committed");
    }

    #[test]
    fn precedence_all_new_before_fallback() {
        // A single rule list, evaluated in order: an all-New set never falls
        // through to the mixed rule or the fallback.
        let table = table_for(&WorkItemType::UserStory).unwrap();
        assert_eq!(table.rules[0].then, "New");
        assert_eq!(table.evaluate(&["New"]), "New");
    }

    #[test]
    fn state_matching_is_exact() {
        assert_eq!(story(&["closed"]), "Active");
    }
}
