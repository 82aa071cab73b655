//! Live session configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Rays per rotation at 2° resolution
pub const DEFAULT_RAY_CAPACITY: usize = 180;

/// Rows of the ray texture (one per degree plus a wrap row)
pub const TEXTURE_RAY_CAPACITY: usize = 361;

/// Live session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Rays held between render ticks before the oldest are overwritten
    pub ray_capacity: usize,
    /// Wait before reconnecting after the socket closes (ms)
    pub reconnect_wait_ms: u64,
    /// Reconnect countdown step (ms)
    pub reconnect_step_ms: u64,
    /// Reconnect once the remaining wait drops to this (ms)
    pub reconnect_threshold_ms: u64,
    /// How long a status message stays up (ms)
    pub message_ms: u64,
    /// How long a command response toast stays up (ms)
    pub response_ms: u64,
    /// Event channel depth between the worker and the session
    pub channel_depth: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            ray_capacity: DEFAULT_RAY_CAPACITY,
            reconnect_wait_ms: 5000,
            reconnect_step_ms: 200,
            reconnect_threshold_ms: 500,
            message_ms: 2000,
            response_ms: 2500,
            channel_depth: 256,
        }
    }
}

impl LiveConfig {
    /// Configuration for a renderer that writes rays into a texture
    pub fn for_texture() -> Self {
        Self {
            ray_capacity: TEXTURE_RAY_CAPACITY,
            ..Self::default()
        }
    }

    pub fn reconnect_step(&self) -> Duration {
        Duration::from_millis(self.reconnect_step_ms.max(1))
    }

    pub fn message_lifetime(&self) -> Duration {
        Duration::from_millis(self.message_ms)
    }

    pub fn response_lifetime(&self) -> Duration {
        Duration::from_millis(self.response_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: LiveConfig = serde_json::from_str(r#"{"ray_capacity": 361}"#).unwrap();
        assert_eq!(config.ray_capacity, TEXTURE_RAY_CAPACITY);
        assert_eq!(config.reconnect_wait_ms, 5000);
    }
}
