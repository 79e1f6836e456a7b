// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod library;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::model::{FeedItem, ItemId};

pub use library::{ItemRecord, JsonLibrary, LibraryData};

/// Read access to the episode library
///
/// Every call returns a fresh snapshot; the policies never hold a lock across
/// an evaluation.
#[async_trait]
pub trait StorageReader: Send + Sync {
    /// Items in playback queue order
    async fn queue(&self) -> Result<Vec<FeedItem>, StorageError>;

    /// Newly published items the user has not looked at yet
    async fn new_items(&self) -> Result<Vec<FeedItem>, StorageError>;

    /// Items whose media is stored locally
    async fn downloaded_items(&self) -> Result<Vec<FeedItem>, StorageError>;

    async fn downloaded_count(&self) -> Result<usize, StorageError>;
}

/// Write access used by the cleanup policy
#[async_trait]
pub trait StorageWriter: Send + Sync {
    /// Delete the downloaded media of an item, keeping the item itself
    async fn delete_media(&self, item: ItemId) -> Result<(), StorageError>;
}
