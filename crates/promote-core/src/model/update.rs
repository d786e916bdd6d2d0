//! Work-item revision history as returned by the tracker's updates endpoint.
//!
//! Only the fields the tag history reads are modelled; everything else in a
//! revision is ignored on decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::item::{WorkItemId, parse_tags};

/// Old and new value of one field in one revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange<T> {
    #[serde(rename = "oldValue", default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<T>,
    #[serde(rename = "newValue", default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<T>,
}

impl<T> Default for FieldChange<T> {
    fn default() -> Self {
        Self {
            old_value: None,
            new_value: None,
        }
    }
}

/// Who made a revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reviser {
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(rename = "uniqueName", default, skip_serializing_if = "Option::is_none")]
    pub unique_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFields {
    #[serde(rename = "System.Tags", default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<FieldChange<String>>,
    #[serde(rename = "System.ChangedDate", default, skip_serializing_if = "Option::is_none")]
    pub changed_date: Option<FieldChange<DateTime<Utc>>>,
}

/// One revision of a work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemUpdate {
    #[serde(rename = "workItemId")]
    pub work_item_id: WorkItemId,
    #[serde(default)]
    pub rev: u32,
    #[serde(rename = "revisedBy", default, skip_serializing_if = "Option::is_none")]
    pub revised_by: Option<Reviser>,
    #[serde(default)]
    pub fields: UpdateFields,
}

impl WorkItemUpdate {
    #[must_use]
    pub fn new(work_item_id: impl Into<WorkItemId>, rev: u32) -> Self {
        Self {
            work_item_id: work_item_id.into(),
            rev,
            revised_by: None,
            fields: UpdateFields::default(),
        }
    }

    /// Record a tag change. `None` means the field was empty on that side.
    #[must_use]
    pub fn with_tags(mut self, old: Option<&str>, new: Option<&str>) -> Self {
        self.fields.tags = Some(FieldChange {
            old_value: old.map(ToString::to_string),
            new_value: new.map(ToString::to_string),
        });
        self
    }

    #[must_use]
    pub fn with_changed_date(mut self, at: DateTime<Utc>) -> Self {
        self.fields.changed_date = Some(FieldChange {
            old_value: None,
            new_value: Some(at),
        });
        self
    }

    #[must_use]
    pub fn with_reviser(mut self, display_name: impl Into<String>) -> Self {
        self.revised_by = Some(Reviser {
            display_name: display_name.into(),
            unique_name: None,
        });
        self
    }

    /// When this revision was saved.
    #[must_use]
    pub fn changed_at(&self) -> Option<DateTime<Utc>> {
        self.fields.changed_date.as_ref().and_then(|change| change.new_value)
    }

    #[must_use]
    pub fn revised_by_name(&self) -> Option<&str> {
        self.revised_by
            .as_ref()
            .map(|reviser| reviser.display_name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// True if this revision put `tag` on the item.
    #[must_use]
    pub fn adds_tag(&self, tag: &str) -> bool {
        self.tag_change(tag) == Some((false, true))
    }

    /// True if this revision took `tag` off the item.
    #[must_use]
    pub fn removes_tag(&self, tag: &str) -> bool {
        self.tag_change(tag) == Some((true, false))
    }

    /// Whether `tag` was present before and after, for revisions that
    /// touched the tag field at all.
    fn tag_change(&self, tag: &str) -> Option<(bool, bool)> {
        let change = self.fields.tags.as_ref()?;
        let present = |value: Option<&String>| {
            parse_tags(value.map(String::as_str))
                .iter()
                .any(|existing| existing.eq_ignore_ascii_case(tag))
        };
        Some((present(change.old_value.as_ref()), present(change.new_value.as_ref())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_tracker_revision() {
        let update: WorkItemUpdate = serde_json::from_value(serde_json::json!({
            "id": 3,
            "workItemId": 10,
            "rev": 3,
            "revisedBy": {"id": "abc", "displayName": "Ada Lovelace", "uniqueName": "ada@contoso.com"},
            "revisedDate": "9999-01-01T00:00:00Z",
            "fields": {
                "System.Rev": {"oldValue": 2, "newValue": 3},
                "System.Tags": {"oldValue": "perf", "newValue": "perf; Blocked"},
                "System.ChangedDate": {
                    "oldValue": "2024-03-01T09:00:00.12Z",
                    "newValue": "2024-03-04T10:30:00.5Z"
                }
            },
            "url": "https://dev.azure.com/contoso/_apis/wit/workItems/10/updates/3"
        }))
        .unwrap();

        assert_eq!(update.work_item_id, WorkItemId(10));
        assert_eq!(update.revised_by_name(), Some("Ada Lovelace"));
        assert!(update.adds_tag("blocked"));
        assert!(!update.adds_tag("perf"), "perf was already there");
        assert_eq!(
            update.changed_at().map(|at| at.to_rfc3339()),
            Some("2024-03-04T10:30:00.500+00:00".to_string())
        );
    }

    #[test]
    fn revision_without_tag_field_touches_nothing() {
        let update: WorkItemUpdate =
            serde_json::from_value(serde_json::json!({"workItemId": 10, "rev": 1})).unwrap();
        assert!(!update.adds_tag("blocked"));
        assert!(!update.removes_tag("blocked"));
        assert!(update.changed_at().is_none());
    }

    #[test]
    fn cleared_tag_field_is_a_removal() {
        let update = WorkItemUpdate::new(10, 4).with_tags(Some("blocked"), None);
        assert!(update.removes_tag("Blocked"));
        assert!(!update.adds_tag("blocked"));
    }
}
