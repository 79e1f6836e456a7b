// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use async_trait::async_trait;
use url::Url;

use crate::error::DownloadRequestError;
use crate::model::{FeedItem, FeedMedia, ItemId, MediaId};

/// A validated request to download one episode's media
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub item: ItemId,
    pub media: MediaId,
    pub url: Url,
    pub title: String,
}

impl TryFrom<&FeedItem> for DownloadRequest {
    type Error = DownloadRequestError;

    fn try_from(item: &FeedItem) -> Result<Self, Self::Error> {
        let media = item
            .media
            .as_ref()
            .ok_or(DownloadRequestError::NoMedia { item: item.id })?;
        let url = media
            .download_url
            .clone()
            .ok_or(DownloadRequestError::MissingUrl { item: item.id })?;

        Ok(Self {
            item: item.id,
            media: media.id,
            url,
            title: item.title.clone(),
        })
    }
}

/// Build requests for a whole batch, failing on the first malformed item
pub fn build_requests(items: &[FeedItem]) -> Result<Vec<DownloadRequest>, DownloadRequestError> {
    items.iter().map(DownloadRequest::try_from).collect()
}

/// Accepts episodes for downloading.
///
/// Requests are fire-and-forget: implementations enqueue and return, they do
/// not wait for the transfer. Duplicate requests are the requester's concern.
#[async_trait]
pub trait DownloadRequester: Send + Sync {
    async fn request_downloads(&self, items: &[FeedItem]) -> Result<(), DownloadRequestError>;
}

/// How a requested download ended, as reported by the downloader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadResult {
    Completed { local_path: PathBuf },
    Failed { reason: String },
}

/// Answers whether a media file is currently being downloaded
pub trait DownloadStatus: Send + Sync {
    fn is_downloading(&self, media: &FeedMedia) -> bool;
}

/// Status oracle that trusts the download state recorded on the media
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordedDownloadStatus;

impl DownloadStatus for RecordedDownloadStatus {
    fn is_downloading(&self, media: &FeedMedia) -> bool {
        media.state == crate::model::DownloadState::Downloading
    }
}
