// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Capacity of the episode cache, counted in downloaded episodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CacheSizeRepr", into = "CacheSizeRepr")]
pub enum CacheSize {
    Limited(usize),
    Unlimited,
}

impl CacheSize {
    pub fn is_unlimited(self) -> bool {
        matches!(self, CacheSize::Unlimited)
    }

    /// The bound, or `None` when unlimited
    pub fn limit(self) -> Option<usize> {
        match self {
            CacheSize::Limited(n) => Some(n),
            CacheSize::Unlimited => None,
        }
    }
}

impl Default for CacheSize {
    fn default() -> Self {
        CacheSize::Limited(20)
    }
}

// Written as a plain number or the string "unlimited"
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum CacheSizeRepr {
    Limited(usize),
    Keyword(CacheKeyword),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum CacheKeyword {
    Unlimited,
}

impl From<CacheSizeRepr> for CacheSize {
    fn from(repr: CacheSizeRepr) -> Self {
        match repr {
            CacheSizeRepr::Limited(n) => CacheSize::Limited(n),
            CacheSizeRepr::Keyword(CacheKeyword::Unlimited) => CacheSize::Unlimited,
        }
    }
}

impl From<CacheSize> for CacheSizeRepr {
    fn from(size: CacheSize) -> Self {
        match size {
            CacheSize::Limited(n) => CacheSizeRepr::Limited(n),
            CacheSize::Unlimited => CacheSizeRepr::Keyword(CacheKeyword::Unlimited),
        }
    }
}

/// Settings of the courtesy download of an episode from a feed that has
/// auto-download turned off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomSampling {
    pub enabled: bool,
    /// Only the first `window` items of the pool are considered
    pub window: usize,
    /// Skip sampling once the queue holds this many such items
    pub queue_threshold: usize,
}

impl Default for RandomSampling {
    fn default() -> Self {
        Self {
            enabled: true,
            window: 20,
            queue_threshold: 2,
        }
    }
}

/// Where newly queued items are inserted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnqueueOptions {
    pub enqueue_at_front: bool,
    /// Keep a partially played front item in place; only used with `enqueue_at_front`
    pub keep_in_progress_at_front: bool,
}

impl EnqueueOptions {
    pub fn at_front() -> Self {
        Self {
            enqueue_at_front: true,
            keep_in_progress_at_front: false,
        }
    }

    pub fn with_keep_in_progress_at_front(mut self, keep: bool) -> Self {
        self.keep_in_progress_at_front = keep;
        self
    }
}

/// Configuration injected into every policy evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub cache_size: CacheSize,
    /// Maximum episodes per feed in the queue; zero or negative is unlimited
    pub max_per_feed: i32,
    /// Days a played episode is kept before cleanup may remove it
    pub days_after_playback: u32,
    pub enable_auto_download: bool,
    pub enable_auto_download_on_battery: bool,
    pub random_sampling: RandomSampling,
    pub enqueue: EnqueueOptions,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            cache_size: CacheSize::default(),
            max_per_feed: 2,
            days_after_playback: 0,
            enable_auto_download: true,
            enable_auto_download_on_battery: false,
            random_sampling: RandomSampling::default(),
            enqueue: EnqueueOptions::default(),
        }
    }
}

impl PolicyConfig {
    /// Load a config from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_json::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_documented_values() {
        let config = PolicyConfig::default();
        assert_eq!(config.cache_size, CacheSize::Limited(20));
        assert_eq!(config.max_per_feed, 2);
        assert!(config.enable_auto_download);
        assert!(!config.enable_auto_download_on_battery);
        assert_eq!(config.random_sampling.window, 20);
        assert_eq!(config.random_sampling.queue_threshold, 2);
        assert!(!config.enqueue.enqueue_at_front);
    }

    #[test]
    fn cache_size_accepts_number_or_unlimited() {
        let limited: CacheSize = serde_json::from_str("5").unwrap();
        assert_eq!(limited, CacheSize::Limited(5));

        let unlimited: CacheSize = serde_json::from_str(r#""unlimited""#).unwrap();
        assert!(unlimited.is_unlimited());
        assert_eq!(serde_json::to_string(&unlimited).unwrap(), r#""unlimited""#);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"cache_size": "unlimited", "enqueue": {"enqueue_at_front": true}}"#,
        )
        .unwrap();

        let config = PolicyConfig::from_json_file(&path).unwrap();
        assert!(config.cache_size.is_unlimited());
        assert!(config.enqueue.enqueue_at_front);
        assert!(!config.enqueue.keep_in_progress_at_front);
        assert_eq!(config.max_per_feed, 2);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempdir().unwrap();
        let result = PolicyConfig::from_json_file(&dir.path().join("nope.json"));
        assert!(matches!(result, Err(ConfigError::ReadFailed { .. })));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        let result = PolicyConfig::from_json_file(&path);
        assert!(matches!(result, Err(ConfigError::ParseFailed { .. })));
    }
}
