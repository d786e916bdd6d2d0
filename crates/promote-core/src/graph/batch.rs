//! Page-size bounded fetching.
//!
//! The tracker caps how many ids one `workitems?ids=` call may carry. Batching
//! exists only to respect that cap: ids are never split, never dropped, and
//! a failed batch degrades to "no records" for its ids rather than an error.

use tracing::{debug, warn};

use crate::model::{WorkItemId, WorkItemRecord};
use crate::source::WorkItemSource;

/// Upstream page limit for batch work-item fetches.
pub const DEFAULT_PAGE_SIZE: usize = 200;

/// A batch whose fetch failed. Its ids are absent from the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub ids: Vec<WorkItemId>,
    pub message: String,
}

/// Records gathered across all batches plus the batches that failed.
#[derive(Debug, Default)]
pub struct BatchFetch {
    pub records: Vec<WorkItemRecord>,
    pub failures: Vec<BatchFailure>,
    pub requests: usize,
}

/// Split `ids` into consecutive slices of at most `page_size` ids.
///
/// A `page_size` of zero is treated as one.
pub fn batches(ids: &[WorkItemId], page_size: usize) -> std::slice::Chunks<'_, WorkItemId> {
    ids.chunks(page_size.max(1))
}

/// Fetch `ids` through `source`, one batch at a time, in order.
pub fn fetch_batched<S>(source: &S, ids: &[WorkItemId], page_size: usize) -> BatchFetch
where
    S: WorkItemSource + ?Sized,
{
    let mut fetched = BatchFetch::default();

    for batch in batches(ids, page_size) {
        fetched.requests += 1;
        match source.fetch_items(batch) {
            Ok(records) => {
                debug!(requested = batch.len(), returned = records.len(), "fetched batch");
                fetched.records.extend(records);
            }
            Err(err) => {
                warn!(requested = batch.len(), error = %err, "batch fetch failed; subtree skipped");
                fetched.failures.push(BatchFailure {
                    ids: batch.to_vec(),
                    message: err.to_string(),
                });
            }
        }
    }

    fetched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySource;

    fn ids(range: std::ops::Range<u32>) -> Vec<WorkItemId> {
        range.map(WorkItemId).collect()
    }

    #[test]
    fn batches_respect_page_size() {
        let all = ids(0..450);
        let sizes: Vec<usize> = batches(&all, 200).map(<[WorkItemId]>::len).collect();
        assert_eq!(sizes, vec![200, 200, 50]);
    }

    #[test]
    fn zero_page_size_is_one() {
        let all = ids(0..3);
        assert_eq!(batches(&all, 0).count(), 3);
    }

    #[test]
    fn empty_input_makes_no_requests() {
        let source = MemorySource::default();
        let fetched = fetch_batched(&source, &[], 200);
        assert_eq!(fetched.requests, 0);
        assert!(source.fetch_calls().is_empty());
    }

    #[test]
    fn failed_batch_is_recorded_and_others_continue() {
        let records = (1..=4)
            .map(|id| WorkItemRecord::new(id, "Task", format!("t{id}"), "New"))
            .collect();
        let source = MemorySource::new(Vec::new(), records).failing_on(2);

        let fetched = fetch_batched(&source, &ids(1..5), 2);

        assert_eq!(fetched.requests, 2);
        assert_eq!(fetched.failures.len(), 1);
        assert_eq!(fetched.failures[0].ids, ids(1..3));
        let got: Vec<WorkItemId> = fetched.records.iter().map(|r| r.id).collect();
        assert_eq!(got, ids(3..5));
    }
}
