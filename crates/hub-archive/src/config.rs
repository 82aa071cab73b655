//! Archive session configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::mode::LiveUpdate;
use crate::window::WindowParams;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Guarded requests are released after this long without a reply (ms)
    pub watchdog_ms: u64,
    /// The worker abandons a catalog request after this long (ms)
    pub request_timeout_ms: u64,
    /// How long a status message stays up (ms)
    pub message_ms: u64,
    /// Age strings refresh interval (ms)
    pub age_refresh_ms: u64,
    /// Wait before asking for a reload after the live feed is lost (ms)
    pub feed_retry_ms: u64,
    pub channel_depth: usize,
    /// Live-update mode applied after `init`
    pub live_update: LiveUpdate,
    pub window: WindowParams,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            watchdog_ms: 3000,
            request_timeout_ms: 10_000,
            message_ms: 2500,
            age_refresh_ms: 1000,
            feed_retry_ms: 10_000,
            channel_depth: 64,
            live_update: LiveUpdate::Scan,
            window: WindowParams::default(),
        }
    }
}

impl ArchiveConfig {
    pub fn watchdog(&self) -> Duration {
        Duration::from_millis(self.watchdog_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn message_lifetime(&self) -> Duration {
        Duration::from_millis(self.message_ms)
    }

    pub fn age_refresh(&self) -> Duration {
        Duration::from_millis(self.age_refresh_ms.max(1))
    }

    pub fn feed_retry(&self) -> Duration {
        Duration::from_millis(self.feed_retry_ms)
    }
}
