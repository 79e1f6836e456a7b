// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::FeedItem;

/// Identifier of a subscribed feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(pub u64);

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Priority tier of a feed, used when ordering the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedPriority {
    High,
    #[default]
    Normal,
    Low,
}

impl FeedPriority {
    /// Sort key, lower ranks come first
    pub fn rank(self) -> u8 {
        match self {
            FeedPriority::High => 0,
            FeedPriority::Normal => 1,
            FeedPriority::Low => 2,
        }
    }

    pub fn is_high(self) -> bool {
        self == FeedPriority::High
    }
}

/// What happens to a feed's episodes once they have been played
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoDeleteAction {
    /// Follow the global cleanup settings
    #[default]
    Global,
    /// Remove played episodes without waiting for the global period
    Always,
    /// Never remove downloaded episodes of this feed
    Never,
}

/// Title-based filter deciding which new episodes of a feed get auto-downloaded
///
/// Terms are matched case-insensitively against the episode title. Exclude
/// terms win over include terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoDownloadFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl AutoDownloadFilter {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    fn terms(list: &[String]) -> impl Iterator<Item = String> + '_ {
        list.iter()
            .map(|term| term.trim().to_lowercase())
            .filter(|term| !term.is_empty())
    }

    pub fn has_include_terms(&self) -> bool {
        Self::terms(&self.include).next().is_some()
    }

    pub fn has_exclude_terms(&self) -> bool {
        Self::terms(&self.exclude).next().is_some()
    }

    /// Check whether the filter lets an item through to auto-download
    pub fn should_auto_download(&self, item: &FeedItem) -> bool {
        let has_include = self.has_include_terms();
        let has_exclude = self.has_exclude_terms();
        if !has_include && !has_exclude {
            return true;
        }

        let title = item.title.to_lowercase();

        if Self::terms(&self.exclude).any(|term| title.contains(&term)) {
            return false;
        }
        if Self::terms(&self.include).any(|term| title.contains(&term)) {
            return true;
        }

        // Only an exclude list: everything not excluded passes
        !has_include && has_exclude
    }
}

/// User preferences attached to a feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPreferences {
    #[serde(default = "default_true")]
    pub auto_download: bool,
    #[serde(default)]
    pub filter: AutoDownloadFilter,
    #[serde(default)]
    pub auto_delete: AutoDeleteAction,
}

fn default_true() -> bool {
    true
}

impl Default for FeedPreferences {
    fn default() -> Self {
        Self {
            auto_download: true,
            filter: AutoDownloadFilter::default(),
            auto_delete: AutoDeleteAction::Global,
        }
    }
}

/// A podcast subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    pub id: FeedId,
    pub title: String,
    #[serde(default)]
    pub priority: FeedPriority,
    #[serde(default)]
    pub preferences: FeedPreferences,
}

impl Feed {
    pub fn new(id: u64, title: impl Into<String>) -> Self {
        Self {
            id: FeedId(id),
            title: title.into(),
            priority: FeedPriority::Normal,
            preferences: FeedPreferences::default(),
        }
    }

    pub fn with_priority(mut self, priority: FeedPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_auto_download(mut self, enabled: bool) -> Self {
        self.preferences.auto_download = enabled;
        self
    }

    pub fn with_filter(mut self, filter: AutoDownloadFilter) -> Self {
        self.preferences.filter = filter;
        self
    }
}
