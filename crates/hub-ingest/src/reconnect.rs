//! Reconnect countdown
//!
//! After the socket closes the session waits before trying again. The wait
//! starts at 5 s and shrinks by 0.2 s on every 200 ms tick; once it is at or
//! below 0.5 s the next tick reconnects. During the last three seconds each
//! tick also carries a "Connect in N seconds" status line.

use crate::config::LiveConfig;

/// What a tick of the countdown asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectStep {
    /// Keep waiting
    Wait {
        /// Remaining wait before this tick's decrement (ms)
        remaining_ms: u64,
        /// Status line to show, if any
        message: Option<String>,
    },
    /// Open the socket now
    Connect,
}

/// Linear countdown to the next connection attempt
#[derive(Debug, Clone)]
pub struct ReconnectTimer {
    remaining_ms: u64,
    step_ms: u64,
    threshold_ms: u64,
}

impl ReconnectTimer {
    /// Start a countdown using the configured wait
    pub fn start(config: &LiveConfig) -> Self {
        Self {
            remaining_ms: config.reconnect_wait_ms,
            step_ms: config.reconnect_step_ms.max(1),
            threshold_ms: config.reconnect_threshold_ms,
        }
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }

    /// Advance the countdown by one tick
    pub fn tick(&mut self) -> ReconnectStep {
        if self.remaining_ms <= self.threshold_ms {
            return ReconnectStep::Connect;
        }
        // Whole seconds, rounded half up
        let seconds = (self.remaining_ms + 500) / 1000;
        let message = (seconds <= 3).then(|| {
            format!(
                "Connect in {} second{}",
                seconds,
                if seconds > 1 { "s" } else { "" }
            )
        });
        let step = ReconnectStep::Wait {
            remaining_ms: self.remaining_ms,
            message,
        };
        self.remaining_ms = self.remaining_ms.saturating_sub(self.step_ms);
        step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(timer: &mut ReconnectTimer) -> (Vec<u64>, Vec<String>) {
        let mut waits = Vec::new();
        let mut messages = Vec::new();
        loop {
            match timer.tick() {
                ReconnectStep::Wait {
                    remaining_ms,
                    message,
                } => {
                    waits.push(remaining_ms);
                    messages.extend(message);
                }
                ReconnectStep::Connect => break,
            }
        }
        (waits, messages)
    }

    #[test]
    fn test_countdown_sequence() {
        let mut timer = ReconnectTimer::start(&LiveConfig::default());
        let (waits, _) = run(&mut timer);
        let expected: Vec<u64> = (0..23).map(|k| 5000 - 200 * k).collect();
        assert_eq!(waits, expected);
        assert_eq!(waits.last(), Some(&600));
        assert_eq!(timer.tick(), ReconnectStep::Connect);
    }

    #[test]
    fn test_messages_only_in_last_seconds() {
        let mut timer = ReconnectTimer::start(&LiveConfig::default());
        let (_, messages) = run(&mut timer);
        assert_eq!(messages.first().map(String::as_str), Some("Connect in 3 seconds"));
        assert_eq!(messages.last().map(String::as_str), Some("Connect in 1 second"));
        assert!(messages.iter().all(|m| !m.contains('4') && !m.contains('5')));
    }
}
