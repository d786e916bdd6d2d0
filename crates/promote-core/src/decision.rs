//! Change decision: compare a rollup with the parent's stored values and
//! emit a [`WriteIntent`] only when something would change.
//!
//! A parent whose description already carries the label is treated as
//! promoted: neither description nor state is touched again, even if the
//! children have changed since. Tags are managed independently of the label.

use serde::Serialize;

use crate::model::{WorkItemId, WorkItemNode};
use crate::rollup::{RollupResult, is_promoted};

/// Why no write was emitted for a parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyPromoted,
    /// The rollup saw no children. [`crate::rollup::group_by_parent`] never
    /// builds an empty group, so only direct callers of [`decide`] with a
    /// hand-built [`RollupResult`] reach this.
    NoChildren,
    Unchanged,
}

impl SkipReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyPromoted => "already promoted",
            Self::NoChildren => "no children",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Fields to write on one parent. `None` leaves the field alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteIntent {
    pub parent_id: WorkItemId,
    pub new_description: Option<String>,
    pub new_state: Option<String>,
    pub new_tags: Option<Vec<String>>,
}

impl WriteIntent {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.new_description.is_none() && self.new_state.is_none() && self.new_tags.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Write(WriteIntent),
    Skip(SkipReason),
}

/// Decide whether `parent` needs a write given its `rollup`.
///
/// A rollup with `child_count == 0` is skipped before anything else.
#[must_use]
pub fn decide(parent: &WorkItemNode, rollup: &RollupResult, label: &str) -> Decision {
    if rollup.child_count == 0 {
        return Decision::Skip(SkipReason::NoChildren);
    }

    let promoted = is_promoted(parent.description.as_deref(), label);

    let (new_description, new_state) = if promoted {
        (None, None)
    } else {
        let description = rollup.fragment.as_ref().map(|fragment| {
            format!("{}{fragment}", parent.description.as_deref().unwrap_or_default())
        });
        let state = rollup
            .state
            .as_ref()
            .filter(|state| **state != parent.state)
            .cloned();
        (description, state)
    };

    let new_tags = rollup
        .tags
        .as_ref()
        .filter(|tags| tags.changed())
        .map(|tags| tags.tags.clone());

    let intent = WriteIntent {
        parent_id: parent.id,
        new_description,
        new_state,
        new_tags,
    };

    if intent.is_empty() {
        Decision::Skip(if promoted {
            SkipReason::AlreadyPromoted
        } else {
            SkipReason::Unchanged
        })
    } else {
        Decision::Write(intent)
    }
}

impl WorkItemNode {
    /// Apply an intent's fields to this node.
    pub fn apply(&mut self, intent: &WriteIntent) {
        if let Some(description) = &intent.new_description {
            self.description = Some(description.clone());
        }
        if let Some(state) = &intent.new_state {
            self.state.clone_from(state);
        }
        if let Some(tags) = &intent.new_tags {
            self.tags.clone_from(tags);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorkItemType;
    use crate::rollup::TagRollup;

    const LABEL: &str = "ACAI";

    fn story() -> WorkItemNode {
        WorkItemNode::new(10, WorkItemType::UserStory, "S").with_state("Active")
    }

    fn rollup(fragment: Option<&str>, state: Option<&str>) -> RollupResult {
        RollupResult {
            parent_id: WorkItemId(10),
            child_count: 2,
            fragment: fragment.map(ToString::to_string),
            state: state.map(ToString::to_string),
            tags: None,
        }
    }

    #[test]
    fn appends_fragment_and_changes_state() {
        let parent = story().with_description("<p>intro</p>");
        let decision = decide(&parent, &rollup(Some("<b><u>ACAI:</u></b>"), Some("Resolved")), LABEL);
        let Decision::Write(intent) = decision else {
            panic!("expected a write");
        };
        assert_eq!(
            intent.new_description.as_deref(),
            Some("<p>intro</p><b><u>ACAI:</u></b>")
        );
        assert_eq!(intent.new_state.as_deref(), Some("Resolved"));
        assert!(intent.new_tags.is_none());
    }

    #[test]
    fn missing_description_starts_empty() {
        let decision = decide(&story(), &rollup(Some("frag ACAI"), None), LABEL);
        let Decision::Write(intent) = decision else {
            panic!("expected a write");
        };
        assert_eq!(intent.new_description.as_deref(), Some("frag ACAI"));
    }

    #[test]
    fn labelled_parent_is_skipped_entirely() {
        let parent = story().with_description("old ACAI: list");
        let decision = decide(&parent, &rollup(Some("new ACAI"), Some("Closed")), LABEL);
        assert_eq!(decision, Decision::Skip(SkipReason::AlreadyPromoted));
    }

    #[test]
    fn equal_state_without_fragment_is_unchanged() {
        let decision = decide(&story(), &rollup(None, Some("Active")), LABEL);
        assert_eq!(decision, Decision::Skip(SkipReason::Unchanged));
    }

    #[test]
    fn state_only_write_when_no_child_has_description() {
        let decision = decide(&story(), &rollup(None, Some("Closed")), LABEL);
        let Decision::Write(intent) = decision else {
            panic!("expected a write");
        };
        assert!(intent.new_description.is_none());
        assert_eq!(intent.new_state.as_deref(), Some("Closed"));
    }

    #[test]
    fn no_children_is_skipped() {
        let mut empty = rollup(Some("x"), Some("New"));
        empty.child_count = 0;
        assert_eq!(decide(&story(), &empty, LABEL), Decision::Skip(SkipReason::NoChildren));
    }

    #[test]
    fn tags_are_written_even_when_promoted() {
        let parent = story().with_description("ACAI");
        let mut result = rollup(None, None);
        result.tags = Some(TagRollup {
            tags: vec!["blocked".to_string()],
            added: vec!["blocked".to_string()],
            removed: Vec::new(),
        });
        let Decision::Write(intent) = decide(&parent, &result, LABEL) else {
            panic!("expected a write");
        };
        assert_eq!(intent.new_tags, Some(vec!["blocked".to_string()]));
        assert!(intent.new_description.is_none());
    }

    #[test]
    fn unchanged_tags_produce_no_write() {
        let mut result = rollup(None, None);
        result.tags = Some(TagRollup::default());
        assert_eq!(decide(&story(), &result, LABEL), Decision::Skip(SkipReason::Unchanged));
    }

    #[test]
    fn second_decision_after_apply_is_a_skip() {
        let mut parent = story();
        let result = rollup(Some("<b><u>ACAI:</u></b><ol></ol>"), Some("Resolved"));
        let Decision::Write(intent) = decide(&parent, &result, LABEL) else {
            panic!("expected a write");
        };
        parent.apply(&intent);
        assert_eq!(parent.state, "Resolved");
        assert_eq!(decide(&parent, &result, LABEL), Decision::Skip(SkipReason::AlreadyPromoted));
    }
}
