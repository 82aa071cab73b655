//! State shared by live and archive sessions
//!
//! A session shows two transient strings to the user: a status message
//! ("Connecting ...", "Loading ...") and the last command response toast.
//! Each clears itself once its lifetime has passed unless it was replaced in
//! the meantime. Every visible change bumps `tic` so a renderer can tell
//! whether what it drew is current.

use std::time::Duration;

use hub_protocol::Response;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Timed<T> {
    value: T,
    expires: Instant,
}

/// Status message and response toast with self-clearing timers
#[derive(Debug, Clone)]
pub struct SessionCore {
    message: Option<Timed<String>>,
    response: Option<Timed<Response>>,
    message_lifetime: Duration,
    response_lifetime: Duration,
    tic: u64,
}

impl SessionCore {
    pub fn new(message_lifetime: Duration, response_lifetime: Duration) -> Self {
        Self {
            message: None,
            response: None,
            message_lifetime,
            response_lifetime,
            tic: 0,
        }
    }

    /// Current status message, empty when none is showing
    pub fn message(&self) -> &str {
        self.message.as_ref().map_or("", |m| m.value.as_str())
    }

    /// Current response toast
    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref().map(|r| &r.value)
    }

    /// Change counter
    pub fn tic(&self) -> u64 {
        self.tic
    }

    /// Record a change made outside this struct (new data arrived)
    pub fn bump(&mut self) {
        self.tic += 1;
    }

    /// Show a status message; it clears itself after the message lifetime
    pub fn show_message(&mut self, text: impl Into<String>, now: Instant) {
        self.message = Some(Timed {
            value: text.into(),
            expires: now + self.message_lifetime,
        });
        self.tic += 1;
    }

    /// Show a status message with a custom lifetime
    pub fn show_message_for(&mut self, text: impl Into<String>, lifetime: Duration, now: Instant) {
        self.message = Some(Timed {
            value: text.into(),
            expires: now + lifetime,
        });
        self.tic += 1;
    }

    /// Show a command response toast
    pub fn show_response(&mut self, response: Response, now: Instant) {
        self.response = Some(Timed {
            value: response,
            expires: now + self.response_lifetime,
        });
        self.tic += 1;
    }

    /// Earliest pending expiry, if anything is showing
    pub fn next_deadline(&self) -> Option<Instant> {
        let m = self.message.as_ref().map(|m| m.expires);
        let r = self.response.as_ref().map(|r| r.expires);
        match (m, r) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Clear whatever has expired by `now`; returns whether anything changed
    pub fn expire(&mut self, now: Instant) -> bool {
        let mut changed = false;
        if self.message.as_ref().is_some_and(|m| m.expires <= now) {
            self.message = None;
            changed = true;
        }
        if self.response.as_ref().is_some_and(|r| r.expires <= now) {
            self.response = None;
            changed = true;
        }
        if changed {
            self.tic += 1;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> SessionCore {
        SessionCore::new(Duration::from_millis(2000), Duration::from_millis(2500))
    }

    #[test]
    fn test_message_clears_after_lifetime() {
        let mut core = core();
        let t0 = Instant::now();
        core.show_message("Connecting ...", t0);
        assert_eq!(core.message(), "Connecting ...");
        assert!(!core.expire(t0 + Duration::from_millis(1999)));
        assert!(core.expire(t0 + Duration::from_millis(2000)));
        assert_eq!(core.message(), "");
    }

    #[test]
    fn test_replacement_extends_lifetime() {
        let mut core = core();
        let t0 = Instant::now();
        core.show_message("one", t0);
        core.show_message("two", t0 + Duration::from_millis(1500));
        assert!(!core.expire(t0 + Duration::from_millis(2000)));
        assert_eq!(core.message(), "two");
    }

    #[test]
    fn test_response_and_deadline() {
        let mut core = core();
        let t0 = Instant::now();
        core.show_response(Response::ack("ACK t y"), t0);
        core.show_message("Hub Connected", t0);
        assert_eq!(core.next_deadline(), Some(t0 + Duration::from_millis(2000)));
        core.expire(t0 + Duration::from_millis(2000));
        assert!(core.response().is_some());
        assert_eq!(core.next_deadline(), Some(t0 + Duration::from_millis(2500)));
        core.expire(t0 + Duration::from_millis(2500));
        assert!(core.response().is_none());
        assert_eq!(core.next_deadline(), None);
    }

    #[test]
    fn test_tic_counts_changes() {
        let mut core = core();
        let t0 = Instant::now();
        let start = core.tic();
        core.show_message("a", t0);
        core.expire(t0);
        core.expire(t0 + Duration::from_secs(5));
        assert_eq!(core.tic(), start + 2);
    }
}
