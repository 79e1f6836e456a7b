mod feed;
mod item;

pub use feed::{AutoDeleteAction, AutoDownloadFilter, Feed, FeedId, FeedPreferences, FeedPriority};
pub use item::{
    AutoDownloadState, DownloadState, FeedItem, FeedMedia, ItemId, ItemTags, MAX_AUTO_DOWNLOAD_ATTEMPTS,
    MediaId, MediaKind, PlayState,
};
