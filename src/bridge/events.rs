//! Lazy, batched event sequences over a block range.

use futures_util::stream::{self, Stream};
use std::sync::Arc;

use crate::bridge::types::{BridgeEvent, BridgeResult, EventFilter};
use crate::bridge::BridgeFacade;

/// Events from one block range, ordered by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBatch {
    pub from_block: u64,
    pub to_block: u64,
    pub events: Vec<BridgeEvent>,
}

/// Inclusive `(from, to)` ranges of at most `batch_size` blocks.
pub fn batch_ranges(from_block: u64, to_block: u64, batch_size: u64) -> Vec<(u64, u64)> {
    let size = batch_size.max(1);
    let mut ranges = Vec::new();
    let mut start = from_block;
    while start <= to_block {
        let end = start.saturating_add(size - 1).min(to_block);
        ranges.push((start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    ranges
}

/// Query `filters` batch by batch. The stream ends after the first error.
///
/// Nothing is fetched until the stream is polled, so a consumer that stops
/// early never queries later ranges.
pub fn event_batches(
    bridge: Arc<dyn BridgeFacade>,
    filters: Vec<EventFilter>,
    from_block: u64,
    to_block: u64,
    batch_size: u64,
) -> impl Stream<Item = BridgeResult<EventBatch>> {
    let ranges = batch_ranges(from_block, to_block, batch_size).into_iter();
    stream::unfold(Some(ranges), move |state| {
        let bridge = bridge.clone();
        let filters = filters.clone();
        async move {
            let mut ranges = state?;
            let (from, to) = ranges.next()?;

            let mut events = Vec::new();
            for filter in &filters {
                match bridge.query_filter(filter, from, to).await {
                    Ok(found) => events.extend(found),
                    Err(e) => return Some((Err(e), None)),
                }
            }
            events.sort_by_key(BridgeEvent::position);

            let batch = EventBatch {
                from_block: from,
                to_block: to,
                events,
            };
            Some((Ok(batch), Some(ranges)))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_ranges() {
        assert!(batch_ranges(10, 9, 5).is_empty());
        assert_eq!(batch_ranges(1, 1, 5), vec![(1, 1)]);
        assert_eq!(batch_ranges(0, 11, 5), vec![(0, 4), (5, 9), (10, 11)]);
        assert_eq!(batch_ranges(0, 2, 0), vec![(0, 0), (1, 1), (2, 2)]);
    }
}
