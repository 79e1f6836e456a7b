// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{StorageReader, StorageWriter};
use crate::config::EnqueueOptions;
use crate::dispatch::{
    DownloadRequester, DownloadResult, DownloadStatus, RecordedDownloadStatus, build_requests,
};
use crate::error::{DownloadRequestError, StorageError};
use crate::model::{
    AutoDownloadState, DownloadState, Feed, FeedId, FeedItem, FeedMedia, ItemId, ItemTags,
    PlayState,
};
use crate::queue::{EnqueuePositionCalculator, enqueue_batch, order_by_priority};

/// An episode as stored in the library file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: ItemId,
    pub title: String,
    pub feed_id: FeedId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub state: PlayState,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<FeedMedia>,
    #[serde(default)]
    pub auto_download: AutoDownloadState,
}

/// Serializable content of a library file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryData {
    #[serde(default)]
    pub feeds: Vec<Feed>,
    #[serde(default)]
    pub items: Vec<ItemRecord>,
    /// Item ids in playback order
    #[serde(default)]
    pub queue: Vec<ItemId>,
    /// Item ids handed to the downloader and not yet completed
    #[serde(default)]
    pub pending_downloads: Vec<ItemId>,
}

impl LibraryData {
    fn materialize(&self, record: &ItemRecord) -> Result<FeedItem, StorageError> {
        let feed = self
            .feeds
            .iter()
            .find(|f| f.id == record.feed_id)
            .ok_or(StorageError::UnknownFeed {
                item: record.id,
                feed: record.feed_id,
            })?;

        Ok(self.build_item(record, Arc::new(feed.clone())))
    }

    fn build_item(&self, record: &ItemRecord, feed: Arc<Feed>) -> FeedItem {
        FeedItem {
            id: record.id,
            title: record.title.clone(),
            feed,
            pub_date: record.pub_date,
            state: record.state,
            tags: ItemTags {
                queue: self.queue.contains(&record.id),
                favorite: record.favorite,
            },
            media: record.media.clone(),
            auto_download: record.auto_download,
        }
    }

    fn materialize_where(
        &self,
        keep: impl Fn(&ItemRecord) -> bool,
    ) -> Result<Vec<FeedItem>, StorageError> {
        // One Arc per feed for the whole snapshot
        let feeds: HashMap<FeedId, Arc<Feed>> = self
            .feeds
            .iter()
            .map(|f| (f.id, Arc::new(f.clone())))
            .collect();

        self.items
            .iter()
            .filter(|r| keep(r))
            .map(|record| {
                let feed = feeds.get(&record.feed_id).ok_or(StorageError::UnknownFeed {
                    item: record.id,
                    feed: record.feed_id,
                })?;
                Ok(self.build_item(record, feed.clone()))
            })
            .collect()
    }

    fn record(&self, id: ItemId) -> Result<&ItemRecord, StorageError> {
        self.items
            .iter()
            .find(|r| r.id == id)
            .ok_or(StorageError::UnknownItem(id))
    }

    fn record_mut(&mut self, id: ItemId) -> Result<&mut ItemRecord, StorageError> {
        self.items
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StorageError::UnknownItem(id))
    }

    fn queue_items(&self) -> Result<Vec<FeedItem>, StorageError> {
        self.queue
            .iter()
            .map(|id| self.record(*id).and_then(|r| self.materialize(r)))
            .collect()
    }
}

/// Episode library kept in a single JSON file
///
/// All collaborator traits of the policies are implemented on top of an
/// in-memory copy; call [`JsonLibrary::save`] to persist changes.
#[derive(Debug)]
pub struct JsonLibrary {
    path: PathBuf,
    data: Mutex<LibraryData>,
}

impl JsonLibrary {
    pub fn new(path: impl Into<PathBuf>, data: LibraryData) -> Self {
        Self {
            path: path.into(),
            data: Mutex::new(data),
        }
    }

    /// Read a library file
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let content = std::fs::read_to_string(path).map_err(|e| StorageError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        let data = serde_json::from_str(&content).map_err(|e| StorageError::JsonParseFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(Self::new(path, data))
    }

    /// Write the library back to its file
    pub fn save(&self) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(&*self.lock())?;
        std::fs::write(&self.path, json).map_err(|e| StorageError::WriteFailed {
            path: self.path.clone(),
            source: e,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current library content
    pub fn data(&self) -> LibraryData {
        self.lock().clone()
    }

    pub fn item(&self, id: ItemId) -> Result<FeedItem, StorageError> {
        let data = self.lock();
        data.record(id).and_then(|r| data.materialize(r))
    }

    pub fn queue_ids(&self) -> Vec<ItemId> {
        self.lock().queue.clone()
    }

    pub fn pending_downloads(&self) -> Vec<ItemId> {
        self.lock().pending_downloads.clone()
    }

    /// Add items to the queue, placing each where the calculator says.
    ///
    /// Items are ordered by feed priority first; items already queued are left
    /// where they are. Returns the position each newly queued item landed at.
    pub fn enqueue(
        &self,
        ids: &[ItemId],
        options: EnqueueOptions,
    ) -> Result<Vec<(ItemId, usize)>, StorageError> {
        let mut data = self.lock();

        let items = ids
            .iter()
            .map(|id| data.record(*id).and_then(|r| data.materialize(r)))
            .collect::<Result<Vec<_>, _>>()?;
        let items = order_by_priority(items);

        let mut queue = data.queue_items()?;
        let calculator = EnqueuePositionCalculator::new(options, &RecordedDownloadStatus);
        let placed = enqueue_batch(&mut queue, items, &calculator);

        data.queue = queue.iter().map(|item| item.id).collect();
        Ok(placed)
    }

    /// Record how a pending download ended.
    ///
    /// A completed download stores the file location and clears the failure
    /// count. A failed one counts towards the item's auto-download backoff.
    pub fn finish_download(
        &self,
        item: ItemId,
        result: DownloadResult,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut data = self.lock();
        let record = data.record_mut(item)?;
        let media = record.media.as_mut().ok_or(StorageError::NoMedia(item))?;

        match result {
            DownloadResult::Completed { local_path } => {
                media.state = DownloadState::Downloaded;
                media.local_path = Some(local_path);
                record.auto_download.failed_attempts = 0;
            }
            DownloadResult::Failed { reason } => {
                tracing::warn!(%item, %reason, "download failed");
                media.state = DownloadState::NotDownloaded;
                record.auto_download.failed_attempts =
                    record.auto_download.failed_attempts.saturating_add(1);
            }
        }
        record.auto_download.last_attempt = Some(now);

        data.pending_downloads.retain(|id| *id != item);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, LibraryData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl StorageReader for JsonLibrary {
    async fn queue(&self) -> Result<Vec<FeedItem>, StorageError> {
        self.lock().queue_items()
    }

    async fn new_items(&self) -> Result<Vec<FeedItem>, StorageError> {
        self.lock().materialize_where(|r| r.state == PlayState::New)
    }

    async fn downloaded_items(&self) -> Result<Vec<FeedItem>, StorageError> {
        self.lock()
            .materialize_where(|r| r.media.as_ref().is_some_and(FeedMedia::is_downloaded))
    }

    async fn downloaded_count(&self) -> Result<usize, StorageError> {
        Ok(self
            .lock()
            .items
            .iter()
            .filter(|r| r.media.as_ref().is_some_and(FeedMedia::is_downloaded))
            .count())
    }
}

#[async_trait]
impl StorageWriter for JsonLibrary {
    async fn delete_media(&self, item: ItemId) -> Result<(), StorageError> {
        let mut data = self.lock();
        let record = data.record_mut(item)?;
        let media = record.media.as_mut().ok_or(StorageError::NoMedia(item))?;

        if let Some(path) = media.local_path.as_deref()
            && path.exists()
        {
            std::fs::remove_file(path).map_err(|e| StorageError::MediaFileRemovalFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        media.local_path = None;
        media.state = DownloadState::NotDownloaded;

        data.pending_downloads.retain(|id| *id != item);
        Ok(())
    }
}

#[async_trait]
impl DownloadRequester for JsonLibrary {
    async fn request_downloads(&self, items: &[FeedItem]) -> Result<(), DownloadRequestError> {
        let requests = build_requests(items)?;

        let mut data = self.lock();
        for request in &requests {
            let record = data
                .record_mut(request.item)
                .map_err(|e| DownloadRequestError::Rejected {
                    item: request.item,
                    reason: e.to_string(),
                })?;
            let Some(media) = record.media.as_mut() else {
                continue;
            };
            if media.is_downloaded() {
                tracing::debug!(item = %request.item, "already downloaded, not requesting again");
                continue;
            }
            media.state = DownloadState::Downloading;
            if !data.pending_downloads.contains(&request.item) {
                data.pending_downloads.push(request.item);
            }
        }
        Ok(())
    }
}

impl DownloadStatus for JsonLibrary {
    fn is_downloading(&self, media: &FeedMedia) -> bool {
        self.lock().items.iter().any(|r| {
            r.media
                .as_ref()
                .is_some_and(|m| m.id == media.id && m.state == DownloadState::Downloading)
        })
    }
}
