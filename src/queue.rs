// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::config::EnqueueOptions;
use crate::dispatch::DownloadStatus;
use crate::model::{FeedItem, ItemId};

/// Computes where a newly queued item goes
///
/// The calculator never touches the queue; callers insert at the returned
/// index themselves. Rules, in order:
/// 1. Appending is the default. With `enqueue_at_front` items go to the front,
///    offset by their index within the batch being queued.
/// 2. Items currently downloading at the front are skipped, so episodes keep
///    the order in which their downloads were started.
/// 3. Items of high priority feeds are placed ahead of other items; normal and
///    low priority items are placed behind the high priority run at the front.
/// 4. With `keep_in_progress_at_front`, a partially played front item stays
///    at index 0.
pub struct EnqueuePositionCalculator<'a> {
    options: EnqueueOptions,
    status: &'a dyn DownloadStatus,
}

impl<'a> EnqueuePositionCalculator<'a> {
    pub fn new(options: EnqueueOptions, status: &'a dyn DownloadStatus) -> Self {
        Self { options, status }
    }

    pub fn options(&self) -> EnqueueOptions {
        self.options
    }

    /// Index at which `item` should be inserted into `queue`.
    ///
    /// `index_among_batch` is the item's position among the items being
    /// queued in the same call.
    pub fn calc_position(&self, index_among_batch: usize, item: &FeedItem, queue: &[FeedItem]) -> usize {
        if queue.is_empty() {
            return 0;
        }

        let high_priority = item.feed.priority.is_high();

        if !self.options.enqueue_at_front {
            if !high_priority {
                return queue.len();
            }
            let start = if self.options.keep_in_progress_at_front && front_in_progress(queue) {
                1
            } else {
                0
            };
            return first_position_from(start, queue, |other| other.feed.priority.is_high());
        }

        let mut start = index_among_batch;
        if self.options.keep_in_progress_at_front && front_in_progress(queue) {
            start += 1;
        }

        if high_priority {
            first_position_from(start, queue, |other| self.is_downloading(other))
        } else {
            first_position_from(start, queue, |other| {
                self.is_downloading(other) || other.feed.priority.is_high()
            })
        }
    }

    fn is_downloading(&self, item: &FeedItem) -> bool {
        item.media
            .as_ref()
            .is_some_and(|media| self.status.is_downloading(media))
    }
}

fn front_in_progress(queue: &[FeedItem]) -> bool {
    queue
        .first()
        .and_then(|item| item.media.as_ref())
        .is_some_and(|media| media.is_in_progress())
}

/// First index at or after `start` whose item is not skipped, clamped to the queue length
fn first_position_from(start: usize, queue: &[FeedItem], skip: impl Fn(&FeedItem) -> bool) -> usize {
    if start >= queue.len() {
        return queue.len();
    }
    queue[start..]
        .iter()
        .position(|item| !skip(item))
        .map_or(queue.len(), |offset| start + offset)
}

/// Stable sort putting high priority feeds first, then normal, then low
pub fn order_by_priority(mut items: Vec<FeedItem>) -> Vec<FeedItem> {
    items.sort_by_key(|item| item.feed.priority.rank());
    items
}

/// Insert a batch of items into `queue` one by one.
///
/// Items already present are skipped, which makes re-queueing idempotent.
/// Returns each inserted item with the index it was inserted at.
pub fn enqueue_batch(
    queue: &mut Vec<FeedItem>,
    items: Vec<FeedItem>,
    calculator: &EnqueuePositionCalculator<'_>,
) -> Vec<(ItemId, usize)> {
    let mut placed = Vec::with_capacity(items.len());

    for mut item in items {
        if queue.iter().any(|queued| queued.id == item.id) {
            tracing::trace!(item = %item.id, "already queued, leaving it in place");
            continue;
        }

        let position = calculator.calc_position(placed.len(), &item, queue);
        item.tags.queue = true;
        placed.push((item.id, position));
        queue.insert(position, item);
    }

    placed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Feed, FeedMedia, FeedPriority};
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    /// Download status answering from a fixed set of media ids
    #[derive(Default)]
    struct MockDownloadStatus {
        downloading: Mutex<HashSet<u64>>,
    }

    impl MockDownloadStatus {
        fn mark_downloading(&self, item: &FeedItem) {
            let media = item.media.as_ref().unwrap();
            self.downloading.lock().unwrap().insert(media.id.0);
        }
    }

    impl DownloadStatus for MockDownloadStatus {
        fn is_downloading(&self, media: &FeedMedia) -> bool {
            self.downloading.lock().unwrap().contains(&media.id.0)
        }
    }

    const NORMAL_FEED: u64 = 1;
    const HIGH_FEED: u64 = 2;

    fn feed(id: u64) -> Arc<Feed> {
        let priority = if id == HIGH_FEED {
            FeedPriority::High
        } else {
            FeedPriority::Normal
        };
        Arc::new(Feed::new(id, format!("Feed {id}")).with_priority(priority))
    }

    fn item(id: u64) -> FeedItem {
        item_of_feed(id, NORMAL_FEED)
    }

    fn item_of_feed(id: u64, feed_id: u64) -> FeedItem {
        FeedItem::new(id, format!("Item {id}"), feed(feed_id)).with_media(FeedMedia::new(id, None))
    }

    fn item_in_progress(id: u64) -> FeedItem {
        let mut item = item(id);
        item.media.as_mut().unwrap().position_ms = 60_000;
        item
    }

    fn item_without_media(id: u64) -> FeedItem {
        FeedItem::new(id, format!("Item {id}"), feed(NORMAL_FEED))
    }

    fn default_queue() -> Vec<FeedItem> {
        vec![item(11), item(12), item(13), item(14)]
    }

    fn ids(queue: &[FeedItem]) -> Vec<u64> {
        queue.iter().map(|item| item.id.0).collect()
    }

    fn add_and_check(
        calculator: &EnqueuePositionCalculator<'_>,
        index_among_batch: usize,
        item: FeedItem,
        queue: &mut Vec<FeedItem>,
        expected: &[u64],
    ) {
        let position = calculator.calc_position(index_among_batch, &item, queue);
        queue.insert(position, item);
        assert_eq!(ids(queue), expected);
    }

    fn check_single(options: EnqueueOptions, index: usize, queue: Vec<FeedItem>, expected: &[u64]) {
        let status = MockDownloadStatus::default();
        let calculator = EnqueuePositionCalculator::new(options, &status);
        let mut queue = queue;
        add_and_check(&calculator, index, item(101), &mut queue, expected);
    }

    #[test]
    fn default_appends() {
        check_single(EnqueueOptions::default(), 0, default_queue(), &[11, 12, 13, 14, 101]);
        check_single(EnqueueOptions::default(), 1, default_queue(), &[11, 12, 13, 14, 101]);
    }

    #[test]
    fn at_front_prepends_offset_by_batch_index() {
        check_single(EnqueueOptions::at_front(), 0, default_queue(), &[101, 11, 12, 13, 14]);
        check_single(EnqueueOptions::at_front(), 1, default_queue(), &[11, 101, 12, 13, 14]);
    }

    #[test]
    fn empty_queue_always_yields_zero() {
        let keep = EnqueueOptions::at_front().with_keep_in_progress_at_front(true);
        for options in [EnqueueOptions::default(), EnqueueOptions::at_front(), keep] {
            check_single(options, 0, vec![], &[101]);
            check_single(options, 3, vec![], &[101]);
        }
    }

    #[test]
    fn keep_in_progress_item_at_front() {
        let options = EnqueueOptions::at_front().with_keep_in_progress_at_front(true);
        let queue = || vec![item_in_progress(11), item(12), item(13)];

        check_single(options, 0, queue(), &[11, 101, 12, 13]);
        check_single(options, 1, queue(), &[11, 12, 101, 13]);
    }

    #[test]
    fn keep_in_progress_ignores_front_not_in_progress() {
        let options = EnqueueOptions::at_front().with_keep_in_progress_at_front(true);
        check_single(options, 0, default_queue(), &[101, 11, 12, 13, 14]);

        let no_media = vec![item_without_media(11), item(12), item(13)];
        check_single(options, 0, no_media, &[101, 11, 12, 13]);
    }

    #[test]
    fn keep_in_progress_without_front_mode_appends() {
        let options = EnqueueOptions::default().with_keep_in_progress_at_front(true);
        let queue = vec![item_in_progress(11), item(12), item(13)];
        check_single(options, 0, queue, &[11, 12, 13, 101]);
    }

    #[test]
    fn same_inputs_same_position() {
        let status = MockDownloadStatus::default();
        let calculator = EnqueuePositionCalculator::new(EnqueueOptions::at_front(), &status);
        let queue = default_queue();
        let new_item = item(101);

        let first = calculator.calc_position(1, &new_item, &queue);
        let second = calculator.calc_position(1, &new_item, &queue);
        assert_eq!(first, second);
        assert_eq!(ids(&queue), vec![11, 12, 13, 14]);
    }

    fn run_download_order(options: EnqueueOptions, expected: [&[u64]; 4]) {
        let status = MockDownloadStatus::default();
        let calculator = EnqueuePositionCalculator::new(options, &status);
        let mut queue = default_queue();

        // two separate downloads, then a bulk of two
        for (index, id, expected) in [
            (0, 101, expected[0]),
            (0, 102, expected[1]),
            (0, 201, expected[2]),
            (1, 202, expected[3]),
        ] {
            let new_item = item(id);
            status.mark_downloading(&new_item);
            add_and_check(&calculator, index, new_item, &mut queue, expected);
        }
    }

    #[test]
    fn download_order_preserved_when_appending() {
        run_download_order(
            EnqueueOptions::default(),
            [
                &[11, 12, 13, 14, 101],
                &[11, 12, 13, 14, 101, 102],
                &[11, 12, 13, 14, 101, 102, 201],
                &[11, 12, 13, 14, 101, 102, 201, 202],
            ],
        );
    }

    #[test]
    fn download_order_preserved_at_front() {
        run_download_order(
            EnqueueOptions::at_front(),
            [
                &[101, 11, 12, 13, 14],
                &[101, 102, 11, 12, 13, 14],
                &[101, 102, 201, 11, 12, 13, 14],
                &[101, 102, 201, 202, 11, 12, 13, 14],
            ],
        );
    }

    fn priority_queue() -> Vec<FeedItem> {
        vec![
            item_of_feed(11, NORMAL_FEED),
            item_of_feed(12, HIGH_FEED),
            item_of_feed(13, NORMAL_FEED),
        ]
    }

    fn run_feed_priority(options: EnqueueOptions, expected: [&[u64]; 5]) {
        let status = MockDownloadStatus::default();
        let calculator = EnqueuePositionCalculator::new(options, &status);

        let mut queue = priority_queue();
        add_and_check(&calculator, 0, item_of_feed(101, HIGH_FEED), &mut queue, expected[0]);
        add_and_check(&calculator, 0, item_of_feed(102, NORMAL_FEED), &mut queue, expected[1]);
        add_and_check(&calculator, 0, item_of_feed(103, HIGH_FEED), &mut queue, expected[2]);

        // bulk insertion starts from a fresh queue
        let mut queue = priority_queue();
        add_and_check(&calculator, 0, item_of_feed(201, NORMAL_FEED), &mut queue, expected[3]);
        add_and_check(&calculator, 1, item_of_feed(202, HIGH_FEED), &mut queue, expected[4]);
    }

    #[test]
    fn high_priority_promoted_when_appending() {
        run_feed_priority(
            EnqueueOptions::default(),
            [
                &[101, 11, 12, 13],
                &[101, 11, 12, 13, 102],
                &[101, 103, 11, 12, 13, 102],
                &[11, 12, 13, 201],
                &[202, 11, 12, 13, 201],
            ],
        );
    }

    #[test]
    fn normal_priority_stays_behind_high_at_front() {
        run_feed_priority(
            EnqueueOptions::at_front(),
            [
                &[101, 11, 12, 13],
                &[101, 102, 11, 12, 13],
                &[103, 101, 102, 11, 12, 13],
                &[201, 11, 12, 13],
                &[201, 202, 11, 12, 13],
            ],
        );
    }

    #[test]
    fn high_priority_never_displaces_in_progress_front() {
        let status = MockDownloadStatus::default();
        let options = EnqueueOptions::default().with_keep_in_progress_at_front(true);
        let calculator = EnqueuePositionCalculator::new(options, &status);
        let mut queue = vec![item_in_progress(11), item(12)];

        add_and_check(&calculator, 0, item_of_feed(101, HIGH_FEED), &mut queue, &[11, 101, 12]);

        let options = EnqueueOptions::at_front().with_keep_in_progress_at_front(true);
        let calculator = EnqueuePositionCalculator::new(options, &status);
        add_and_check(&calculator, 0, item_of_feed(102, HIGH_FEED), &mut queue, &[11, 102, 101, 12]);
    }

    #[test]
    fn order_by_priority_is_stable() {
        let items = vec![
            item_of_feed(50, NORMAL_FEED),
            item_of_feed(51, HIGH_FEED),
            item_of_feed(52, NORMAL_FEED),
            item_of_feed(53, HIGH_FEED),
        ];
        assert_eq!(ids(&order_by_priority(items)), vec![51, 53, 50, 52]);
        assert!(order_by_priority(vec![]).is_empty());
    }

    #[test]
    fn enqueue_batch_skips_already_queued_items() {
        let status = MockDownloadStatus::default();
        let calculator = EnqueuePositionCalculator::new(EnqueueOptions::at_front(), &status);
        let mut queue = default_queue();

        let placed = enqueue_batch(&mut queue, vec![item(101), item(12), item(102)], &calculator);

        assert_eq!(placed, vec![(ItemId(101), 0), (ItemId(102), 1)]);
        assert_eq!(ids(&queue), vec![101, 102, 11, 12, 13, 14]);
        assert!(queue[0].is_queued());

        let again = enqueue_batch(&mut queue, vec![item(101), item(102)], &calculator);
        assert!(again.is_empty());
        assert_eq!(ids(&queue), vec![101, 102, 11, 12, 13, 14]);
    }
}
