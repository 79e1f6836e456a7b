// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use crate::autodownload::SkipReason;
use crate::model::ItemId;

/// Events emitted while the policies evaluate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyEvent {
    /// The auto-download pass did not run
    AutoDownloadSkipped { reason: SkipReason },

    /// Candidates for this pass have been collected
    CandidatesSelected {
        queue_len: usize,
        new_items: usize,
        candidates: usize,
        non_auto_download: usize,
    },

    /// Cleanup finished deleting episodes
    CleanupCompleted {
        requested: usize,
        deleted: usize,
        failed: usize,
    },

    /// Items were handed to the download requester
    DownloadsRequested { count: usize },

    /// The download requester refused the batch
    DispatchFailed { error: String },

    /// An episode of a feed without auto-download was requested
    CourtesyDownloadRequested { item_title: String },

    /// An item was inserted into the queue
    ItemEnqueued { item: ItemId, position: usize },
}

/// Trait for observing policy decisions.
///
/// Implementations can use this to print summaries, collect statistics,
/// or drive notifications.
pub trait EventReporter: Send + Sync {
    fn report(&self, event: PolicyEvent);
}

/// A shared reference to an event reporter
pub type SharedEventReporter = Arc<dyn EventReporter>;

/// A reporter that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl EventReporter for NoopReporter {
    fn report(&self, _event: PolicyEvent) {}
}

impl NoopReporter {
    pub fn shared() -> SharedEventReporter {
        Arc::new(Self)
    }
}

/// Reporter that keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: std::sync::Mutex<Vec<PolicyEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events reported so far
    pub fn events(&self) -> Vec<PolicyEvent> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl EventReporter for RecordingReporter {
    fn report(&self, event: PolicyEvent) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event);
    }
}
