// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::{FeedId, ItemId};

/// Errors that can occur when reading or writing the episode library
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to read library file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write library file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse library JSON in {path}: {source}")]
    JsonParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize library: {0}")]
    JsonSerializeFailed(#[from] serde_json::Error),

    #[error("Unknown item {0}")]
    UnknownItem(ItemId),

    #[error("Item {item} references unknown feed {feed}")]
    UnknownFeed { item: ItemId, feed: FeedId },

    #[error("Item {0} has no media")]
    NoMedia(ItemId),

    #[error("Failed to remove media file {path}: {source}")]
    MediaFileRemovalFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while building a download request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DownloadRequestError {
    #[error("Item {item} has no media to download")]
    NoMedia { item: ItemId },

    #[error("Media of item {item} has no download URL")]
    MissingUrl { item: ItemId },

    #[error("Download of item {item} rejected: {reason}")]
    Rejected { item: ItemId, reason: String },
}

/// Errors that can occur when loading the policy configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level errors for a policy evaluation pass
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
