pub mod autodownload;
pub mod cleanup;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod model;
pub mod queue;
pub mod storage;
pub mod worker;

// Re-export main types for convenience
pub use autodownload::{AutoDownloadOutcome, AutoDownloadPolicy, CandidateSet, PolicyContext, SkipReason};
pub use cleanup::{CleanupOutcome, CleanupPolicy};
pub use config::{CacheSize, EnqueueOptions, PolicyConfig, RandomSampling};
pub use device::{DeviceState, StaticDeviceState};
pub use dispatch::{
    DownloadRequest, DownloadRequester, DownloadResult, DownloadStatus, RecordedDownloadStatus,
};
pub use error::{ConfigError, DownloadRequestError, PolicyError, StorageError};
pub use events::{EventReporter, NoopReporter, PolicyEvent, RecordingReporter, SharedEventReporter};
pub use model::{Feed, FeedId, FeedItem, FeedMedia, FeedPriority, ItemId};
pub use queue::{EnqueuePositionCalculator, enqueue_batch, order_by_priority};
pub use storage::{JsonLibrary, StorageReader, StorageWriter};
pub use worker::{PolicyHandle, PolicyServices, PolicyWorker, Trigger};
