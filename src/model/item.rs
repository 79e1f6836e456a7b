// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{Feed, FeedId};

/// After this many failed attempts an item is no longer auto-downloaded
pub const MAX_AUTO_DOWNLOAD_ATTEMPTS: u32 = 10;

/// Identifier of an episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of an episode's media file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(pub u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    #[default]
    NotDownloaded,
    Downloading,
    Downloaded,
}

/// Broad media category derived from the mime type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
    Other,
}

/// The downloadable artifact of an episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedMedia {
    pub id: MediaId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub state: DownloadState,
    /// Local file backing a downloaded media
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<std::path::PathBuf>,
    /// Playback position in milliseconds
    #[serde(default)]
    pub position_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback_completed_at: Option<DateTime<Utc>>,
}

impl FeedMedia {
    pub fn new(id: u64, download_url: Option<Url>) -> Self {
        Self {
            id: MediaId(id),
            download_url,
            size: None,
            mime_type: None,
            state: DownloadState::NotDownloaded,
            local_path: None,
            position_ms: 0,
            playback_completed_at: None,
        }
    }

    pub fn is_downloaded(&self) -> bool {
        self.state == DownloadState::Downloaded
    }

    /// Partially played media
    pub fn is_in_progress(&self) -> bool {
        self.position_ms > 0
    }

    pub fn kind(&self) -> MediaKind {
        match self.mime_type.as_deref() {
            None => MediaKind::Audio,
            Some(mime) if mime.starts_with("audio/") => MediaKind::Audio,
            Some(mime) if mime.starts_with("video/") => MediaKind::Video,
            Some(_) => MediaKind::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayState {
    New,
    #[default]
    Unplayed,
    Played,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemTags {
    #[serde(default)]
    pub queue: bool,
    #[serde(default)]
    pub favorite: bool,
}

/// Per-item auto-download switch with failure backoff bookkeeping
///
/// The attempt fields are updated when a download ends, see
/// `JsonLibrary::finish_download`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoDownloadState {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub failed_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

impl Default for AutoDownloadState {
    fn default() -> Self {
        Self {
            enabled: true,
            failed_attempts: 0,
            last_attempt: None,
        }
    }
}

impl AutoDownloadState {
    /// Whether the retry backoff (2^(n-1) hours after n failures) has elapsed
    pub fn backoff_elapsed(&self, now: DateTime<Utc>) -> bool {
        if self.failed_attempts == 0 {
            return true;
        }
        if self.failed_attempts >= MAX_AUTO_DOWNLOAD_ATTEMPTS {
            return false;
        }
        let Some(last_attempt) = self.last_attempt else {
            return true;
        };
        let wait = Duration::hours(1i64 << (self.failed_attempts - 1));
        last_attempt + wait <= now
    }
}

/// A single episode together with the feed it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub id: ItemId,
    pub title: String,
    pub feed: Arc<Feed>,
    pub pub_date: Option<DateTime<Utc>>,
    pub state: PlayState,
    pub tags: ItemTags,
    pub media: Option<FeedMedia>,
    pub auto_download: AutoDownloadState,
}

impl FeedItem {
    /// Create an unplayed item without media
    pub fn new(id: u64, title: impl Into<String>, feed: Arc<Feed>) -> Self {
        Self {
            id: ItemId(id),
            title: title.into(),
            feed,
            pub_date: None,
            state: PlayState::Unplayed,
            tags: ItemTags::default(),
            media: None,
            auto_download: AutoDownloadState::default(),
        }
    }

    pub fn with_media(mut self, media: FeedMedia) -> Self {
        self.media = Some(media);
        self
    }

    pub fn feed_id(&self) -> FeedId {
        self.feed.id
    }

    pub fn has_media(&self) -> bool {
        self.media.is_some()
    }

    pub fn is_played(&self) -> bool {
        self.state == PlayState::Played
    }

    pub fn is_new(&self) -> bool {
        self.state == PlayState::New
    }

    pub fn is_queued(&self) -> bool {
        self.tags.queue
    }

    pub fn is_favorite(&self) -> bool {
        self.tags.favorite
    }

    /// Whether the item has playable media that is not on disk or on its way
    pub fn is_downloadable(&self) -> bool {
        self.media.as_ref().is_some_and(|media| {
            media.state == DownloadState::NotDownloaded && media.kind() != MediaKind::Other
        })
    }

    /// Whether the policy may pick this item for an automatic download
    pub fn is_auto_downloadable(&self, now: DateTime<Utc>) -> bool {
        self.is_downloadable() && self.auto_download.enabled && self.auto_download.backoff_elapsed(now)
    }
}
