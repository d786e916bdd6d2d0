use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric identifier assigned to a work item by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItemId(pub u32);

impl WorkItemId {
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for WorkItemId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Work-item type as reported by the tracker.
///
/// Only the five backlog types have named variants; anything else (bugs,
/// issues, custom process types) is carried verbatim in [`Self::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WorkItemType {
    Epic,
    Feature,
    UserStory,
    ProductBacklogItem,
    Task,
    Other(String),
}

impl WorkItemType {
    /// Tracker display name, e.g. `"Product Backlog Item"`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Epic => "Epic",
            Self::Feature => "Feature",
            Self::UserStory => "User Story",
            Self::ProductBacklogItem => "Product Backlog Item",
            Self::Task => "Task",
            Self::Other(raw) => raw,
        }
    }

    /// Parse a tracker display name. Matching is exact; unknown names are
    /// preserved as [`Self::Other`].
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Epic" => Self::Epic,
            "Feature" => Self::Feature,
            "User Story" => Self::UserStory,
            "Product Backlog Item" => Self::ProductBacklogItem,
            "Task" => Self::Task,
            other => Self::Other(other.to_string()),
        }
    }

    /// Requirement-level types: the parents of tasks and children of features.
    #[must_use]
    pub const fn is_requirement(&self) -> bool {
        matches!(self, Self::UserStory | Self::ProductBacklogItem)
    }
}

impl From<String> for WorkItemType {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<WorkItemType> for String {
    fn from(kind: WorkItemType) -> Self {
        match kind {
            WorkItemType::Other(raw) => raw,
            named => named.as_str().to_string(),
        }
    }
}

impl fmt::Display for WorkItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A work item placed in the hierarchy for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemNode {
    pub id: WorkItemId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(rename = "type")]
    pub work_item_type: WorkItemType,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub parent_id: Option<WorkItemId>,
    #[serde(default)]
    pub child_ids: Vec<WorkItemId>,
}

impl WorkItemNode {
    pub fn new(id: impl Into<WorkItemId>, work_item_type: WorkItemType, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            state: String::new(),
            work_item_type,
            tags: Vec::new(),
            parent_id: None,
            child_ids: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Case-insensitive tag membership.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// One parent→child link returned by the hierarchy query.
///
/// An edge with no `source` names a root of the forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: Option<WorkItemId>,
    pub target: WorkItemId,
}

impl Edge {
    #[must_use]
    pub fn root(target: impl Into<WorkItemId>) -> Self {
        Self {
            source: None,
            target: target.into(),
        }
    }

    #[must_use]
    pub fn child(source: impl Into<WorkItemId>, target: impl Into<WorkItemId>) -> Self {
        Self {
            source: Some(source.into()),
            target: target.into(),
        }
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.source.is_none()
    }
}

/// Delimiters accepted between tags in the tracker's single tag string.
pub const TAG_DELIMITERS: [char; 2] = [';', ','];

/// Split the tracker's tag string into trimmed, non-empty tags.
#[must_use]
pub fn parse_tags(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(TAG_DELIMITERS)
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(ToString::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Join tags back into the tracker's tag string.
#[must_use]
pub fn join_tags(tags: &[String]) -> String {
    tags.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_parse_round_trips_named_types() {
        for name in ["Epic", "Feature", "User Story", "Product Backlog Item", "Task"] {
            let parsed = WorkItemType::parse(name);
            assert!(!matches!(parsed, WorkItemType::Other(_)), "{name}");
            assert_eq!(parsed.as_str(), name);
        }
    }

    #[test]
    fn unknown_type_is_preserved() {
        let parsed = WorkItemType::parse("Bug");
        assert_eq!(parsed, WorkItemType::Other("Bug".to_string()));
        assert_eq!(parsed.to_string(), "Bug");
    }

    #[test]
    fn type_matching_is_case_sensitive() {
        assert_eq!(
            WorkItemType::parse("user story"),
            WorkItemType::Other("user story".to_string())
        );
    }

    #[test]
    fn type_serializes_as_display_name() {
        let json = serde_json::to_string(&WorkItemType::ProductBacklogItem).expect("serialize");
        assert_eq!(json, "\"Product Backlog Item\"");
        let back: WorkItemType = serde_json::from_str("\"User Story\"").expect("deserialize");
        assert_eq!(back, WorkItemType::UserStory);
    }

    #[test]
    fn requirement_types() {
        assert!(WorkItemType::UserStory.is_requirement());
        assert!(WorkItemType::ProductBacklogItem.is_requirement());
        assert!(!WorkItemType::Task.is_requirement());
        assert!(!WorkItemType::Feature.is_requirement());
    }

    #[test]
    fn parse_tags_splits_and_trims() {
        assert_eq!(
            parse_tags(Some("backend; needs review,  perf ;")),
            vec!["backend", "needs review", "perf"]
        );
    }

    #[test]
    fn parse_tags_none_is_empty() {
        assert!(parse_tags(None).is_empty());
        assert!(parse_tags(Some("  ;  ")).is_empty());
    }

    #[test]
    fn join_tags_uses_tracker_separator() {
        let tags = vec!["a".to_string(), "b c".to_string()];
        assert_eq!(join_tags(&tags), "a; b c");
        assert_eq!(parse_tags(Some(&join_tags(&tags))), tags);
    }

    #[test]
    fn has_tag_ignores_case() {
        let node = WorkItemNode::new(1, WorkItemType::Task, "t").with_tags(["Release-Blocker"]);
        assert!(node.has_tag("release-blocker"));
        assert!(!node.has_tag("release"));
    }

    #[test]
    fn edge_constructors() {
        assert!(Edge::root(4).is_root());
        let edge = Edge::child(4, 5);
        assert_eq!(edge.source, Some(WorkItemId(4)));
        assert_eq!(edge.target, WorkItemId(5));
    }
}
