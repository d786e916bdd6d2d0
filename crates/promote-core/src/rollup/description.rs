//! Merged description fragment.
//!
//! Children with a description contribute one ordered-list entry each,
//! `<li><b>TITLE</b><br />DESCRIPTION</li>`, deduplicated by full entry text
//! and kept in child order. The entries are wrapped under a heading carrying
//! the caller's label. The label doubles as the "already promoted" marker.

use std::collections::HashSet;

use crate::model::WorkItemNode;

/// One list entry for a child.
#[must_use]
pub fn list_entry(title: &str, description: &str) -> String {
    format!("<li><b>{title}</b><br />{description}</li>")
}

/// Heading placed before the list.
#[must_use]
pub fn heading(label: &str) -> String {
    format!("<br /><b><u>{label}:</u></b><br />")
}

/// Build the fragment for `children`, or `None` if no child has a
/// description.
pub fn merge_fragment<'a, I>(label: &str, children: I) -> Option<String>
where
    I: IntoIterator<Item = &'a WorkItemNode>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let entries: Vec<String> = children
        .into_iter()
        .filter_map(|child| {
            child
                .description
                .as_deref()
                .map(|description| list_entry(&child.title, description))
        })
        .filter(|entry| seen.insert(entry.clone()))
        .collect();

    if entries.is_empty() {
        return None;
    }

    Some(format!(
        "{}<ol type='1'>{}</ol>",
        heading(label),
        entries.concat()
    ))
}

/// Whether `description` already carries the label marker.
#[must_use]
pub fn is_promoted(description: Option<&str>, label: &str) -> bool {
    description.is_some_and(|description| description.contains(label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorkItemType;

    fn task(id: u32, title: &str, description: Option<&str>) -> WorkItemNode {
        let node = WorkItemNode::new(id, WorkItemType::Task, title);
        match description {
            Some(d) => node.with_description(d),
            None => node,
        }
    }

    #[test]
    fn fragment_wraps_entries_under_label() {
        let children = [task(1, "Login", Some("Add OAuth")), task(2, "Logout", Some("Clear session"))];
        let fragment = merge_fragment("ACAI", &children).unwrap();
        assert_eq!(
            fragment,
            "<br /><b><u>ACAI:</u></b><br /><ol type='1'>\
             <li><b>Login</b><br />Add OAuth</li>\
             <li><b>Logout</b><br />Clear session</li></ol>"
        );
    }

    #[test]
    fn identical_entries_appear_once() {
        let children = [
            task(1, "Login", Some("Add OAuth")),
            task(2, "Login", Some("Add OAuth")),
            task(3, "Login", Some("Other")),
        ];
        let fragment = merge_fragment("X", &children).unwrap();
        assert_eq!(fragment.matches("<li>").count(), 2);
        assert!(fragment.find("Add OAuth").unwrap() < fragment.find("Other").unwrap());
    }

    #[test]
    fn children_without_description_are_excluded() {
        let children = [task(1, "Empty", None), task(2, "Full", Some("body"))];
        let fragment = merge_fragment("X", &children).unwrap();
        assert!(!fragment.contains("Empty"));
        assert!(fragment.contains("Full"));
    }

    #[test]
    fn no_descriptions_means_no_fragment() {
        let children = [task(1, "a", None), task(2, "b", None)];
        assert!(merge_fragment("X", &children).is_none());
    }

    #[test]
    fn fragment_is_deterministic() {
        let children = [task(1, "a", Some("1")), task(2, "b", Some("2"))];
        assert_eq!(merge_fragment("L", &children), merge_fragment("L", &children));
    }

    #[test]
    fn promoted_marker_is_substring_match() {
        assert!(is_promoted(Some("<p>intro</p><b><u>ACAI:</u></b>"), "ACAI"));
        assert!(!is_promoted(Some("<p>intro</p>"), "ACAI"));
        assert!(!is_promoted(None, "ACAI"));
    }
}
