//! Tag history: who put each promotable tag on a work item, who took it off,
//! and how long it stayed.
//!
//! For each item and each promotable tag the revision history is scanned
//! once:
//!
//! - **added**: the earliest revision whose tag field gained the tag;
//! - **removed**: the latest revision whose tag field lost it, only when the
//!   item no longer carries the tag;
//! - **duration**: `removed - added` when both are known.
//!
//! Items where neither is found produce no entry. A failed history request
//! is recorded and the walk carries on with the next item.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::ErrorCode;
use crate::graph::Registry;
use crate::model::{WorkItemId, WorkItemNode, WorkItemUpdate};
use crate::source::WorkItemSource;

/// Attribution for one promotable tag on one work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagEvent {
    pub work_item: WorkItemId,
    pub work_item_type: String,
    pub title: String,
    /// The tag as configured.
    pub tag: String,
    pub current_tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_by: Option<String>,
    /// Seconds between `added_at` and `removed_at`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<i64>,
}

impl TagEvent {
    /// True while the tag is still on the item.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.removed_at.is_none() && self.removed_by.is_none()
    }
}

/// Format seconds as `1d 4h 05m`.
#[must_use]
pub fn format_duration(secs: i64) -> String {
    let minutes = secs.max(0) / 60;
    let (days, rest) = (minutes / (24 * 60), minutes % (24 * 60));
    format!("{days}d {}h {:02}m", rest / 60, rest % 60)
}

/// Attribute each `promotable` tag on `node` from its revision history.
#[must_use]
pub fn tag_events(node: &WorkItemNode, updates: &[WorkItemUpdate], promotable: &[String]) -> Vec<TagEvent> {
    let mut ordered: Vec<&WorkItemUpdate> = updates.iter().collect();
    ordered.sort_by_key(|update| update.rev);

    promotable
        .iter()
        .filter_map(|tag| {
            let added = ordered.iter().find(|update| update.adds_tag(tag));
            let removed = if node.has_tag(tag) {
                None
            } else {
                ordered.iter().rev().find(|update| update.removes_tag(tag))
            };
            if added.is_none() && removed.is_none() {
                return None;
            }

            let added_at = added.and_then(|update| update.changed_at());
            let removed_at = removed.and_then(|update| update.changed_at());
            let duration_secs = match (added_at, removed_at) {
                (Some(from), Some(to)) if to >= from => Some((to - from).num_seconds()),
                _ => None,
            };

            Some(TagEvent {
                work_item: node.id,
                work_item_type: node.work_item_type.to_string(),
                title: node.title.clone(),
                tag: tag.clone(),
                current_tags: node.tags.clone(),
                added_at,
                added_by: added.and_then(|update| update.revised_by_name()).map(ToString::to_string),
                removed_at,
                removed_by: removed
                    .and_then(|update| update.revised_by_name())
                    .map(ToString::to_string),
                duration_secs,
            })
        })
        .collect()
}

/// Tag attribution across a whole tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagHistory {
    pub tags: Vec<String>,
    /// Items whose history was read.
    pub items: usize,
    pub events: Vec<TagEvent>,
    pub errors: Vec<String>,
}

impl TagHistory {
    /// Events for tags still on their item.
    pub fn open(&self) -> impl Iterator<Item = &TagEvent> {
        self.events.iter().filter(|event| event.is_open())
    }
}

/// Read the history of every item in `registry`, in registry order.
#[instrument(skip_all, fields(nodes = registry.len(), tags = promotable.len()))]
pub fn collect_tag_history<S>(source: &S, registry: &Registry, promotable: &[String]) -> TagHistory
where
    S: WorkItemSource + ?Sized,
{
    let mut history = TagHistory {
        tags: promotable.to_vec(),
        ..TagHistory::default()
    };

    for node in registry.iter() {
        match source.fetch_updates(node.id) {
            Ok(updates) => {
                history.items += 1;
                let events = tag_events(node, &updates, promotable);
                debug!(id = %node.id, revisions = updates.len(), events = events.len(), "history read");
                history.events.extend(events);
            }
            Err(err) => {
                warn!(id = %node.id, code = %ErrorCode::HistoryFetchFailed, error = %err, "history fetch failed");
                history.errors.push(format!(
                    "{}: history of work item {}: {err}",
                    ErrorCode::HistoryFetchFailed,
                    node.id
                ));
            }
        }
    }

    info!(
        items = history.items,
        events = history.events.len(),
        failed = history.errors.len(),
        "tag history collected"
    );
    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorkItemType;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap()
    }

    fn promotable() -> Vec<String> {
        vec!["blocked".to_string(), "perf".to_string()]
    }

    #[test]
    fn added_then_removed_has_duration() {
        let node = WorkItemNode::new(10, WorkItemType::UserStory, "S");
        let updates = vec![
            WorkItemUpdate::new(10, 1).with_changed_date(at(1, 9, 0)),
            WorkItemUpdate::new(10, 2)
                .with_tags(None, Some("Blocked"))
                .with_changed_date(at(2, 9, 0))
                .with_reviser("Ada"),
            WorkItemUpdate::new(10, 3)
                .with_tags(Some("Blocked"), None)
                .with_changed_date(at(3, 13, 5))
                .with_reviser("Grace"),
        ];

        let events = tag_events(&node, &updates, &promotable());
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.tag, "blocked");
        assert_eq!(event.added_at, Some(at(2, 9, 0)));
        assert_eq!(event.added_by.as_deref(), Some("Ada"));
        assert_eq!(event.removed_by.as_deref(), Some("Grace"));
        assert_eq!(event.duration_secs.map(format_duration).as_deref(), Some("1d 4h 05m"));
        assert!(!event.is_open());
    }

    #[test]
    fn tag_still_present_has_no_removal() {
        let node = WorkItemNode::new(10, WorkItemType::UserStory, "S").with_tags(["blocked"]);
        let updates = vec![
            WorkItemUpdate::new(10, 2).with_tags(None, Some("blocked")).with_changed_date(at(2, 9, 0)),
            WorkItemUpdate::new(10, 3).with_tags(Some("blocked"), None).with_changed_date(at(3, 9, 0)),
            WorkItemUpdate::new(10, 4).with_tags(None, Some("blocked")).with_changed_date(at(4, 9, 0)),
        ];

        let events = tag_events(&node, &updates, &promotable());
        assert_eq!(events[0].added_at, Some(at(2, 9, 0)), "first addition wins");
        assert!(events[0].removed_at.is_none());
        assert!(events[0].duration_secs.is_none());
        assert!(events[0].is_open());
    }

    #[test]
    fn revisions_are_read_in_rev_order() {
        let node = WorkItemNode::new(10, WorkItemType::Task, "T");
        let updates = vec![
            WorkItemUpdate::new(10, 5).with_tags(Some("perf"), None).with_changed_date(at(5, 0, 0)),
            WorkItemUpdate::new(10, 2).with_tags(None, Some("perf")).with_changed_date(at(2, 0, 0)),
            WorkItemUpdate::new(10, 3).with_tags(Some("perf"), None).with_changed_date(at(3, 0, 0)),
        ];

        let events = tag_events(&node, &updates, &promotable());
        assert_eq!(events[0].tag, "perf");
        assert_eq!(events[0].removed_at, Some(at(5, 0, 0)), "last removal wins");
        assert_eq!(events[0].duration_secs, Some(3 * 24 * 3600));
    }

    #[test]
    fn untouched_tags_produce_nothing() {
        let node = WorkItemNode::new(10, WorkItemType::Task, "T").with_tags(["web"]);
        let updates = vec![WorkItemUpdate::new(10, 2).with_tags(None, Some("web"))];
        assert!(tag_events(&node, &updates, &promotable()).is_empty());
    }

    #[test]
    fn durations_round_down_to_minutes() {
        assert_eq!(format_duration(59), "0d 0h 00m");
        assert_eq!(format_duration(3 * 3600 + 7 * 60 + 30), "0d 3h 07m");
        assert_eq!(format_duration(-5), "0d 0h 00m");
    }
}
