//! Raw work-item records as returned by the source's batch fetch.

use serde::{Deserialize, Serialize};

use super::item::{WorkItemId, WorkItemNode, WorkItemType, parse_tags};

/// A work item as fetched from the source, before it is placed in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemRecord {
    pub id: WorkItemId,
    #[serde(default)]
    pub rev: Option<u32>,
    #[serde(default)]
    pub fields: RecordFields,
}

/// The subset of tracker fields the rollup reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFields {
    #[serde(rename = "System.WorkItemType", default)]
    pub work_item_type: String,
    #[serde(rename = "System.State", default)]
    pub state: String,
    #[serde(rename = "System.Title", default)]
    pub title: String,
    #[serde(rename = "System.Description", default)]
    pub description: Option<String>,
    #[serde(rename = "System.Tags", default)]
    pub tags: Option<String>,
}

impl WorkItemRecord {
    /// Convenience constructor used by in-memory sources.
    pub fn new(
        id: impl Into<WorkItemId>,
        work_item_type: &str,
        title: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            rev: None,
            fields: RecordFields {
                work_item_type: work_item_type.to_string(),
                state: state.into(),
                title: title.into(),
                description: None,
                tags: None,
            },
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.fields.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.fields.tags = Some(tags.into());
        self
    }
}

impl From<WorkItemRecord> for WorkItemNode {
    fn from(record: WorkItemRecord) -> Self {
        let fields = record.fields;
        Self {
            id: record.id,
            title: fields.title,
            description: fields.description,
            state: fields.state,
            work_item_type: WorkItemType::parse(&fields.work_item_type),
            tags: parse_tags(fields.tags.as_deref()),
            parent_id: None,
            child_ids: Vec::new(),
        }
    }
}
