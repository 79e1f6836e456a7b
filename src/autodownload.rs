// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::cleanup::{CleanupOutcome, CleanupPolicy};
use crate::config::{PolicyConfig, RandomSampling};
use crate::device::DeviceState;
use crate::dispatch::DownloadRequester;
use crate::error::PolicyError;
use crate::events::{EventReporter, PolicyEvent};
use crate::model::{FeedId, FeedItem, ItemId};
use crate::queue::order_by_priority;
use crate::storage::{StorageReader, StorageWriter};

/// Why an auto-download pass did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The user turned auto-download off
    AutoDownloadDisabled,
    NetworkUnsuitable,
    /// Not charging and downloads on battery are not allowed
    OnBattery,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AutoDownloadDisabled => write!(f, "auto-download is disabled"),
            SkipReason::NetworkUnsuitable => write!(f, "network is not suitable"),
            SkipReason::OnBattery => write!(f, "device is on battery"),
        }
    }
}

/// Items considered in one auto-download pass
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    /// Queue and accepted new items that can be auto-downloaded, in order
    pub auto_download: Vec<FeedItem>,
    /// Downloadable new items of feeds with auto-download turned off
    pub non_auto_download: Vec<FeedItem>,
}

/// Collaborators of an auto-download pass
pub struct PolicyContext<'a> {
    pub reader: &'a dyn StorageReader,
    pub writer: &'a dyn StorageWriter,
    pub requester: &'a dyn DownloadRequester,
    pub device: &'a dyn DeviceState,
    pub reporter: &'a dyn EventReporter,
}

/// Result of an auto-download pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoDownloadOutcome {
    /// Set when the gates stopped the pass before any work
    pub skipped: Option<SkipReason>,
    pub cleanup: Option<CleanupOutcome>,
    /// Items handed to the requester, in request order
    pub requested: Vec<ItemId>,
    pub dispatch_error: Option<String>,
    /// Item requested from a feed without auto-download
    pub courtesy: Option<ItemId>,
    pub courtesy_error: Option<String>,
}

/// Decides which episodes to download automatically
#[derive(Debug, Clone)]
pub struct AutoDownloadPolicy {
    config: PolicyConfig,
    cleanup: CleanupPolicy,
}

impl AutoDownloadPolicy {
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            config: config.clone(),
            cleanup: CleanupPolicy::new(config.days_after_playback),
        }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Both the network and the power condition must allow downloading
    pub fn gate(config: &PolicyConfig, device: &dyn DeviceState) -> Result<(), SkipReason> {
        if !config.enable_auto_download {
            return Err(SkipReason::AutoDownloadDisabled);
        }
        if !device.network_suitable_for_auto_download() {
            return Err(SkipReason::NetworkUnsuitable);
        }
        if !(device.charging() || config.enable_auto_download_on_battery) {
            return Err(SkipReason::OnBattery);
        }
        Ok(())
    }

    /// Collect the queue plus accepted new items, dropping what cannot be auto-downloaded
    pub fn build_candidates(queue: &[FeedItem], new_items: &[FeedItem], now: DateTime<Utc>) -> CandidateSet {
        let mut seen: HashSet<ItemId> = queue.iter().map(|item| item.id).collect();
        let mut auto_download = queue.to_vec();
        let mut non_auto_download = Vec::new();

        for item in new_items {
            let prefs = &item.feed.preferences;
            if prefs.auto_download && !seen.contains(&item.id) && prefs.filter.should_auto_download(item) {
                seen.insert(item.id);
                auto_download.push(item.clone());
            }
            if !prefs.auto_download && item.is_downloadable() {
                non_auto_download.push(item.clone());
            }
        }

        auto_download.retain(|item| item.is_auto_downloadable(now));

        CandidateSet {
            auto_download,
            non_auto_download,
        }
    }

    /// Number of episodes that may be downloaded in this pass
    pub fn space_left(config: &PolicyConfig, downloaded: usize, deleted: usize, candidates: usize) -> usize {
        match config.cache_size.limit() {
            None => candidates,
            Some(limit) if limit >= downloaded + candidates => candidates,
            Some(limit) => limit.saturating_sub(downloaded.saturating_sub(deleted)),
        }
    }

    /// Take candidates in order until `space_left` is reached, allowing each
    /// feed at most `max_per_feed` episodes in the queue.
    ///
    /// Feeds start from their count in the current queue. A `max_per_feed`
    /// of zero or less means no per-feed limit.
    pub fn cut_per_space_and_feed_limit(
        candidates: &[FeedItem],
        queue: &[FeedItem],
        space_left: usize,
        max_per_feed: i32,
    ) -> Vec<FeedItem> {
        if max_per_feed < 1 {
            return candidates.iter().take(space_left).cloned().collect();
        }
        let max_per_feed = max_per_feed as usize;

        let mut per_feed: HashMap<FeedId, usize> = HashMap::new();
        for item in queue {
            *per_feed.entry(item.feed_id()).or_default() += 1;
        }

        let mut result = Vec::with_capacity(space_left.min(candidates.len()));
        for item in candidates {
            if result.len() >= space_left {
                break;
            }
            let count = per_feed.entry(item.feed_id()).or_default();
            if *count < max_per_feed {
                *count += 1;
                result.push(item.clone());
            } else {
                tracing::trace!(
                    item = %item.title,
                    feed = %item.feed.title,
                    "skipped, feed reached its per-feed limit"
                );
            }
        }
        result
    }

    /// Pick one episode of a feed without auto-download, so such feeds
    /// still surface now and then.
    ///
    /// Nothing is picked when sampling is off, the pool is empty, or the queue
    /// already holds `queue_threshold` episodes of such feeds. Otherwise one
    /// of the first `window` pool items is chosen uniformly at random.
    pub fn pick_courtesy_download<R>(
        pool: &[FeedItem],
        queue: &[FeedItem],
        sampling: &RandomSampling,
        rng: &mut R,
    ) -> Vec<FeedItem>
    where
        R: Rng,
    {
        if !sampling.enabled || pool.is_empty() {
            return Vec::new();
        }

        let in_queue = queue
            .iter()
            .filter(|item| !item.feed.preferences.auto_download)
            .count();
        if in_queue >= sampling.queue_threshold {
            return Vec::new();
        }

        let window = sampling.window.min(pool.len());
        if window == 0 {
            return Vec::new();
        }

        let index = rng.random_range(0..window);
        vec![pool[index].clone()]
    }

    /// Run one auto-download pass.
    ///
    /// Cleanup performed to make room stays in effect even if the download
    /// request fails afterwards. Storage read errors abort the pass.
    pub async fn run<R>(
        &self,
        ctx: &PolicyContext<'_>,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<AutoDownloadOutcome, PolicyError>
    where
        R: Rng,
    {
        let mut outcome = AutoDownloadOutcome::default();

        if let Err(reason) = Self::gate(&self.config, ctx.device) {
            tracing::debug!(%reason, "auto-download skipped");
            ctx.reporter.report(PolicyEvent::AutoDownloadSkipped { reason });
            outcome.skipped = Some(reason);
            return Ok(outcome);
        }

        tracing::debug!("performing auto-download of undownloaded episodes");

        let queue = ctx.reader.queue().await?;
        let new_items = ctx.reader.new_items().await?;
        let candidates = Self::build_candidates(&queue, &new_items, now);

        ctx.reporter.report(PolicyEvent::CandidatesSelected {
            queue_len: queue.len(),
            new_items: new_items.len(),
            candidates: candidates.auto_download.len(),
            non_auto_download: candidates.non_auto_download.len(),
        });

        let auto_downloadable = candidates.auto_download.len();
        let downloaded = ctx.reader.downloaded_count().await?;
        let cleanup = self
            .cleanup
            .make_room_for_episodes(
                ctx.reader,
                ctx.writer,
                self.config.cache_size,
                auto_downloadable,
                now,
            )
            .await?;
        ctx.reporter.report(PolicyEvent::CleanupCompleted {
            requested: cleanup.requested,
            deleted: cleanup.deleted,
            failed: cleanup.failures.len(),
        });

        let space_left = Self::space_left(&self.config, downloaded, cleanup.deleted, auto_downloadable);
        outcome.cleanup = Some(cleanup);

        let to_download = order_by_priority(Self::cut_per_space_and_feed_limit(
            &candidates.auto_download,
            &queue,
            space_left,
            self.config.max_per_feed,
        ));

        tracing::debug!(count = to_download.len(), space_left, "enqueueing items for download");

        if !to_download.is_empty() {
            match ctx.requester.request_downloads(&to_download).await {
                Ok(()) => {
                    outcome.requested = to_download.iter().map(|item| item.id).collect();
                    ctx.reporter.report(PolicyEvent::DownloadsRequested {
                        count: to_download.len(),
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "auto-download request failed");
                    ctx.reporter.report(PolicyEvent::DispatchFailed {
                        error: e.to_string(),
                    });
                    outcome.dispatch_error = Some(e.to_string());
                }
            }
        }

        let courtesy = Self::pick_courtesy_download(
            &candidates.non_auto_download,
            &queue,
            &self.config.random_sampling,
            rng,
        );
        if let Some(item) = courtesy.first() {
            tracing::debug!(item = %item.title, feed = %item.feed.title, "random download of a non auto-download episode");
            match ctx.requester.request_downloads(&courtesy).await {
                Ok(()) => {
                    outcome.courtesy = Some(item.id);
                    ctx.reporter.report(PolicyEvent::CourtesyDownloadRequested {
                        item_title: item.title.clone(),
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "random download request failed");
                    ctx.reporter.report(PolicyEvent::DispatchFailed {
                        error: e.to_string(),
                    });
                    outcome.courtesy_error = Some(e.to_string());
                }
            }
        }

        Ok(outcome)
    }
}
