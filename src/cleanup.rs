// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, Duration, Utc};

use crate::config::CacheSize;
use crate::error::StorageError;
use crate::model::{AutoDeleteAction, FeedItem, ItemId};
use crate::storage::{StorageReader, StorageWriter};

/// Result of a cleanup run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupOutcome {
    /// Number of episodes the caller asked to delete
    pub requested: usize,
    /// Number of episodes actually deleted
    pub deleted: usize,
    /// Items whose deletion failed, with the error message
    pub failures: Vec<(ItemId, String)>,
}

/// Removes played episodes from the episode cache, oldest playback first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupPolicy {
    days_after_playback: u32,
}

impl CleanupPolicy {
    pub fn new(days_after_playback: u32) -> Self {
        Self { days_after_playback }
    }

    pub fn days_after_playback(&self) -> u32 {
        self.days_after_playback
    }

    /// Downloaded items that may be deleted, in deletion order.
    ///
    /// An item qualifies when its media is downloaded, it has been played, it
    /// is neither queued nor a favorite, and playback completed before
    /// `now - days_after_playback`. Feeds set to [`AutoDeleteAction::Never`]
    /// are skipped; feeds set to [`AutoDeleteAction::Always`] skip the waiting
    /// period.
    pub fn candidates(&self, items: Vec<FeedItem>, now: DateTime<Utc>) -> Vec<FeedItem> {
        let most_recent_for_deletion = now - Duration::days(i64::from(self.days_after_playback));

        let mut candidates: Vec<FeedItem> = items
            .into_iter()
            .filter(|item| item.is_played() && !item.is_queued() && !item.is_favorite())
            .filter(|item| {
                let cutoff = match item.feed.preferences.auto_delete {
                    AutoDeleteAction::Never => return false,
                    AutoDeleteAction::Always => now,
                    AutoDeleteAction::Global => most_recent_for_deletion,
                };
                item.media.as_ref().is_some_and(|media| {
                    media.is_downloaded()
                        && media
                            .playback_completed_at
                            .is_some_and(|completed| completed < cutoff)
                })
            })
            .collect();

        candidates.sort_by_key(|item| {
            item.media
                .as_ref()
                .and_then(|media| media.playback_completed_at)
                .unwrap_or(now)
        });

        tracing::debug!(
            cutoff = %most_recent_for_deletion,
            candidates = ?candidates
                .iter()
                .map(|item| format!("{} ({})", item.title, item.feed.title))
                .collect::<Vec<_>>(),
            "cleanup candidates"
        );

        candidates
    }

    /// Number of episodes that could be deleted right now
    pub async fn reclaimable_count<R>(&self, reader: &R, now: DateTime<Utc>) -> Result<usize, StorageError>
    where
        R: StorageReader + ?Sized,
    {
        let downloaded = reader.downloaded_items().await?;
        Ok(self.candidates(downloaded, now).len())
    }

    /// Delete up to `count` episodes, oldest playback first.
    ///
    /// Deletions run one after the other. A failed deletion is logged and
    /// recorded in the outcome; the remaining deletions still run.
    pub async fn perform_cleanup<R, W>(
        &self,
        reader: &R,
        writer: &W,
        count: usize,
        now: DateTime<Utc>,
    ) -> Result<CleanupOutcome, StorageError>
    where
        R: StorageReader + ?Sized,
        W: StorageWriter + ?Sized,
    {
        let mut outcome = CleanupOutcome {
            requested: count,
            ..Default::default()
        };
        if count == 0 {
            return Ok(outcome);
        }

        let downloaded = reader.downloaded_items().await?;
        let candidates = self.candidates(downloaded, now);

        for item in candidates.into_iter().take(count) {
            match writer.delete_media(item.id).await {
                Ok(()) => outcome.deleted += 1,
                Err(e) => {
                    tracing::warn!(item = %item.id, title = %item.title, error = %e, "failed to delete episode");
                    outcome.failures.push((item.id, e.to_string()));
                }
            }
        }

        tracing::info!(
            deleted = outcome.deleted,
            requested = count,
            "auto-delete finished"
        );

        Ok(outcome)
    }

    /// How many episodes must go so that `room_needed` more fit into the cache
    pub fn episodes_to_cleanup(cache_size: CacheSize, downloaded: usize, room_needed: usize) -> usize {
        match cache_size.limit() {
            None => 0,
            Some(limit) => (downloaded + room_needed).saturating_sub(limit),
        }
    }

    /// Free cache space for `room_needed` upcoming downloads
    pub async fn make_room_for_episodes<R, W>(
        &self,
        reader: &R,
        writer: &W,
        cache_size: CacheSize,
        room_needed: usize,
        now: DateTime<Utc>,
    ) -> Result<CleanupOutcome, StorageError>
    where
        R: StorageReader + ?Sized,
        W: StorageWriter + ?Sized,
    {
        let downloaded = reader.downloaded_count().await?;
        let count = Self::episodes_to_cleanup(cache_size, downloaded, room_needed);
        self.perform_cleanup(reader, writer, count, now).await
    }

    /// Bring an overfull cache back to its size limit
    pub async fn default_cleanup<R, W>(
        &self,
        reader: &R,
        writer: &W,
        cache_size: CacheSize,
        now: DateTime<Utc>,
    ) -> Result<CleanupOutcome, StorageError>
    where
        R: StorageReader + ?Sized,
        W: StorageWriter + ?Sized,
    {
        self.make_room_for_episodes(reader, writer, cache_size, 0, now)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DownloadState, Feed, FeedMedia, PlayState};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    struct MockStorage {
        items: Vec<FeedItem>,
        deleted: Mutex<Vec<ItemId>>,
        failing: HashSet<ItemId>,
    }

    impl MockStorage {
        fn new(items: Vec<FeedItem>) -> Self {
            Self {
                items,
                deleted: Mutex::new(Vec::new()),
                failing: HashSet::new(),
            }
        }

        fn deleted(&self) -> Vec<ItemId> {
            self.deleted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StorageReader for MockStorage {
        async fn queue(&self) -> Result<Vec<FeedItem>, StorageError> {
            Ok(vec![])
        }

        async fn new_items(&self) -> Result<Vec<FeedItem>, StorageError> {
            Ok(vec![])
        }

        async fn downloaded_items(&self) -> Result<Vec<FeedItem>, StorageError> {
            Ok(self.items.clone())
        }

        async fn downloaded_count(&self) -> Result<usize, StorageError> {
            Ok(self.items.len())
        }
    }

    #[async_trait]
    impl StorageWriter for MockStorage {
        async fn delete_media(&self, item: ItemId) -> Result<(), StorageError> {
            if self.failing.contains(&item) {
                return Err(StorageError::NoMedia(item));
            }
            self.deleted.lock().unwrap().push(item);
            Ok(())
        }
    }

    fn played_item(id: u64, completed_days_ago: Option<i64>, now: DateTime<Utc>) -> FeedItem {
        let mut media = FeedMedia::new(id, None);
        media.state = DownloadState::Downloaded;
        media.playback_completed_at = completed_days_ago.map(|days| now - Duration::days(days));

        let mut item = FeedItem::new(id, format!("Item {id}"), Arc::new(Feed::new(1, "Feed")))
            .with_media(media);
        item.state = PlayState::Played;
        item
    }

    fn ids(items: &[FeedItem]) -> Vec<u64> {
        items.iter().map(|item| item.id.0).collect()
    }

    #[test]
    fn candidates_exclude_protected_items() {
        let now = Utc::now();
        let eligible = played_item(1, Some(10), now);

        let mut queued = played_item(2, Some(10), now);
        queued.tags.queue = true;

        let mut favorite = played_item(3, Some(10), now);
        favorite.tags.favorite = true;

        let mut unplayed = played_item(4, Some(10), now);
        unplayed.state = PlayState::Unplayed;

        let mut not_downloaded = played_item(5, Some(10), now);
        not_downloaded.media.as_mut().unwrap().state = DownloadState::NotDownloaded;

        let never_completed = played_item(6, None, now);

        let mut no_media = played_item(7, Some(10), now);
        no_media.media = None;

        let mut kept_feed = played_item(8, Some(10), now);
        let mut feed = Feed::new(2, "Keep");
        feed.preferences.auto_delete = AutoDeleteAction::Never;
        kept_feed.feed = Arc::new(feed);

        let policy = CleanupPolicy::new(7);
        let candidates = policy.candidates(
            vec![
                eligible,
                queued,
                favorite,
                unplayed,
                not_downloaded,
                never_completed,
                no_media,
                kept_feed,
            ],
            now,
        );
        assert_eq!(ids(&candidates), vec![1]);
    }

    #[test]
    fn candidates_respect_days_after_playback() {
        let now = Utc::now();
        let items = vec![played_item(1, Some(1), now), played_item(2, Some(10), now)];

        assert_eq!(ids(&CleanupPolicy::new(7).candidates(items.clone(), now)), vec![2]);
        assert_eq!(ids(&CleanupPolicy::new(0).candidates(items, now)), vec![2, 1]);
    }

    #[test]
    fn always_delete_feeds_skip_the_waiting_period() {
        let now = Utc::now();
        let mut feed = Feed::new(2, "Throwaway");
        feed.preferences.auto_delete = AutoDeleteAction::Always;
        let feed = Arc::new(feed);

        let mut recent = played_item(1, Some(1), now);
        recent.feed = feed.clone();
        let mut unfinished = played_item(2, None, now);
        unfinished.feed = feed;
        let global = played_item(3, Some(1), now);

        let candidates = CleanupPolicy::new(7).candidates(vec![recent, unfinished, global], now);
        assert_eq!(ids(&candidates), vec![1]);
    }

    #[test]
    fn candidates_sorted_oldest_first() {
        let now = Utc::now();
        let items = vec![
            played_item(1, Some(3), now),
            played_item(2, Some(30), now),
            played_item(3, Some(12), now),
        ];
        assert_eq!(ids(&CleanupPolicy::new(0).candidates(items, now)), vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn cleanup_deletes_oldest_first() {
        let now = Utc::now();
        let storage = MockStorage::new(vec![played_item(2, Some(1), now), played_item(1, Some(10), now)]);
        let policy = CleanupPolicy::new(0);

        let outcome = policy.perform_cleanup(&storage, &storage, 1, now).await.unwrap();

        assert_eq!(outcome.deleted, 1);
        assert_eq!(storage.deleted(), vec![ItemId(1)]);
    }

    #[tokio::test]
    async fn cleanup_under_threshold_only_deletes_old_enough() {
        let now = Utc::now();
        let storage = MockStorage::new(vec![played_item(1, Some(10), now), played_item(2, Some(1), now)]);
        let policy = CleanupPolicy::new(7);

        assert_eq!(policy.reclaimable_count(&storage, now).await.unwrap(), 1);

        let outcome = policy.perform_cleanup(&storage, &storage, 5, now).await.unwrap();
        assert_eq!(outcome.requested, 5);
        assert_eq!(outcome.deleted, 1);
        assert_eq!(storage.deleted(), vec![ItemId(1)]);
    }

    #[tokio::test]
    async fn failed_deletion_does_not_stop_cleanup() {
        let now = Utc::now();
        let mut storage = MockStorage::new(vec![
            played_item(1, Some(10), now),
            played_item(2, Some(9), now),
            played_item(3, Some(8), now),
        ]);
        storage.failing.insert(ItemId(2));

        let outcome = CleanupPolicy::new(0)
            .perform_cleanup(&storage, &storage, 3, now)
            .await
            .unwrap();

        assert_eq!(outcome.deleted, 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, ItemId(2));
        assert_eq!(storage.deleted(), vec![ItemId(1), ItemId(3)]);
    }

    #[tokio::test]
    async fn zero_count_deletes_nothing() {
        let now = Utc::now();
        let storage = MockStorage::new(vec![played_item(1, Some(10), now)]);
        let outcome = CleanupPolicy::new(0)
            .perform_cleanup(&storage, &storage, 0, now)
            .await
            .unwrap();
        assert_eq!(outcome.deleted, 0);
        assert!(storage.deleted().is_empty());
    }

    #[test]
    fn episodes_to_cleanup_counts_overflow() {
        assert_eq!(CleanupPolicy::episodes_to_cleanup(CacheSize::Unlimited, 50, 10), 0);
        assert_eq!(CleanupPolicy::episodes_to_cleanup(CacheSize::Limited(10), 5, 3), 0);
        assert_eq!(CleanupPolicy::episodes_to_cleanup(CacheSize::Limited(10), 8, 4), 2);
        assert_eq!(CleanupPolicy::episodes_to_cleanup(CacheSize::Limited(10), 12, 0), 2);
    }

    #[tokio::test]
    async fn make_room_deletes_overflow_only() {
        let now = Utc::now();
        let storage = MockStorage::new(vec![
            played_item(1, Some(10), now),
            played_item(2, Some(9), now),
            played_item(3, Some(8), now),
        ]);
        let policy = CleanupPolicy::new(0);

        // 3 downloaded + 1 needed in a cache of 3
        let outcome = policy
            .make_room_for_episodes(&storage, &storage, CacheSize::Limited(3), 1, now)
            .await
            .unwrap();
        assert_eq!(outcome.requested, 1);
        assert_eq!(storage.deleted(), vec![ItemId(1)]);

        let outcome = policy
            .default_cleanup(&storage, &storage, CacheSize::Unlimited, now)
            .await
            .unwrap();
        assert_eq!(outcome.requested, 0);
    }
}
