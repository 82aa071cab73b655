//! In-flight request guards
//!
//! Each request category (item list, month coverage, sweep load, product
//! switch) allows one outstanding request. A guard is either idle or pending
//! on a specific [`RequestId`] with an optional deadline. It returns to idle
//! when the matching reply arrives or the deadline passes, whichever is first.
//! Replies carrying any other id are stale and are not applied.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::error;

/// Identifier attached to a request and echoed by its reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out increasing request ids
#[derive(Debug, Default)]
pub struct RequestIds {
    next: u64,
}

impl RequestIds {
    pub fn next_id(&mut self) -> RequestId {
        self.next += 1;
        RequestId(self.next)
    }
}

/// Request categories, one guard each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardKind {
    /// `table`, `prepend`, `append`
    Items,
    /// `month`
    Days,
    /// `load_index`
    Sweep,
    /// `switch`
    Product,
}

impl GuardKind {
    pub fn name(&self) -> &'static str {
        match self {
            GuardKind::Items => "items",
            GuardKind::Days => "days",
            GuardKind::Sweep => "sweep",
            GuardKind::Product => "product",
        }
    }
}

/// State of one guard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InFlight {
    #[default]
    Idle,
    Pending {
        request: RequestId,
        deadline: Option<Instant>,
    },
}

/// One request category's guard
#[derive(Debug, Clone)]
pub struct Guard {
    kind: GuardKind,
    timeout: Option<Duration>,
    state: InFlight,
}

impl Guard {
    /// Guard whose requests expire after `timeout` (`None`: never)
    pub fn new(kind: GuardKind, timeout: Option<Duration>) -> Self {
        Self {
            kind,
            timeout,
            state: InFlight::Idle,
        }
    }

    pub fn kind(&self) -> GuardKind {
        self.kind
    }

    pub fn state(&self) -> InFlight {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, InFlight::Pending { .. })
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            InFlight::Pending { deadline, .. } => deadline,
            InFlight::Idle => None,
        }
    }

    /// Start a request; fails while another one is pending
    pub fn begin(&mut self, request: RequestId, now: Instant) -> Result<(), RequestId> {
        if let InFlight::Pending { request: pending, .. } = self.state {
            return Err(pending);
        }
        self.state = InFlight::Pending {
            request,
            deadline: self.timeout.map(|t| now + t),
        };
        Ok(())
    }

    /// A reply for `request` arrived; true if it was the pending one
    pub fn settle(&mut self, request: RequestId) -> bool {
        match self.state {
            InFlight::Pending { request: pending, .. } if pending == request => {
                self.state = InFlight::Idle;
                true
            }
            _ => false,
        }
    }

    /// Clear a pending request whose deadline has passed; true if it did
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.state {
            InFlight::Pending {
                request,
                deadline: Some(deadline),
            } if deadline <= now => {
                error!(
                    "No {} response for {} within the watchdog, releasing",
                    self.kind.name(),
                    request
                );
                self.state = InFlight::Idle;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_settle() {
        let mut ids = RequestIds::default();
        let mut guard = Guard::new(GuardKind::Items, Some(Duration::from_secs(3)));
        let now = Instant::now();
        let first = ids.next_id();
        assert!(guard.begin(first, now).is_ok());
        assert_eq!(guard.begin(ids.next_id(), now), Err(first));
        assert!(!guard.settle(RequestId(99)));
        assert!(guard.settle(first));
        assert!(!guard.is_pending());
    }

    #[test]
    fn test_watchdog() {
        let mut guard = Guard::new(GuardKind::Days, Some(Duration::from_millis(3000)));
        let now = Instant::now();
        guard.begin(RequestId(1), now).unwrap();
        assert_eq!(guard.deadline(), Some(now + Duration::from_millis(3000)));
        assert!(!guard.expire(now + Duration::from_millis(2999)));
        assert!(guard.expire(now + Duration::from_millis(3000)));
        // A late reply is stale
        assert!(!guard.settle(RequestId(1)));
    }

    #[test]
    fn test_no_timeout_never_expires() {
        let mut guard = Guard::new(GuardKind::Product, None);
        let now = Instant::now();
        guard.begin(RequestId(1), now).unwrap();
        assert_eq!(guard.deadline(), None);
        assert!(!guard.expire(now + Duration::from_secs(3600)));
    }
}
