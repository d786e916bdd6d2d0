//! Tag promotion.
//!
//! Only tags in the configured promotable list are managed. A promotable tag
//! found on any child is added to the parent; a promotable tag found on no
//! child is removed from it. Everything else on the parent is left alone.
//! Comparison is case-insensitive; added tags use the configured spelling.

use serde::Serialize;

/// Result of promoting tags onto one parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagRollup {
    /// The parent's full tag list after promotion.
    pub tags: Vec<String>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl TagRollup {
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

fn contains_ignore_case<'a, I>(haystack: I, needle: &str) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    haystack.into_iter().any(|tag| tag.eq_ignore_ascii_case(needle))
}

/// Promote `promotable` tags from `child_tags` onto `parent_tags`.
pub fn roll_up_tags<'a, I>(parent_tags: &[String], child_tags: I, promotable: &[String]) -> TagRollup
where
    I: IntoIterator<Item = &'a String>,
{
    let child_tags: Vec<&String> = child_tags.into_iter().collect();
    let mut rollup = TagRollup::default();

    for tag in promotable {
        let on_child = contains_ignore_case(child_tags.iter().copied(), tag);
        let on_parent = contains_ignore_case(parent_tags, tag);
        if on_child && !on_parent && !contains_ignore_case(&rollup.added, tag) {
            rollup.added.push(tag.clone());
        } else if !on_child && on_parent {
            let stale: Vec<String> = parent_tags
                .iter()
                .filter(|existing| existing.eq_ignore_ascii_case(tag))
                .filter(|existing| !rollup.removed.contains(existing))
                .cloned()
                .collect();
            rollup.removed.extend(stale);
        }
    }

    rollup.tags = parent_tags
        .iter()
        .filter(|tag| !rollup.removed.contains(tag))
        .cloned()
        .chain(rollup.added.iter().cloned())
        .collect();
    rollup
}
