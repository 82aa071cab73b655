//! Inertial scrolling with rubber-band edges
//!
//! The scroller turns drag and wheel input into pans of a [`ScrollTarget`].
//! Past either end of the list the target reports an overdrive; drags are
//! damped by it, and on release the view coasts and then bounces back.
//!
//! Timers are external: after an input call, [`Scroller::tick_period`] says
//! whether (and how often) [`Scroller::tick`] should be called.
//!
//! ```text
//! Idle --release (|v| >= 2)--> Coasting --|v| < 0.25--> Idle
//!   |                             |
//!   +--release past an end--> Bouncing <--stopped past an end--+
//!                                 |
//!                                 +--|overdrive| < 1--> Idle
//! ```

use std::time::Duration;

use tracing::trace;

/// Something that can be scrolled
pub trait ScrollTarget {
    /// Move by `delta` pixels (positive: towards later items)
    fn pan(&mut self, delta: f32);

    /// Pixels currently past an end of the content, signed
    fn overdrive(&self) -> f32;
}

/// Release velocity below which the view does not coast
pub const COAST_MIN_VELOCITY: f32 = 2.0;
/// Coasting stops below this velocity
pub const COAST_STOP_VELOCITY: f32 = 0.25;
pub const COAST_DECAY: f32 = 0.95;
/// Decay while stretched past an end
pub const STRETCH_DECAY: f32 = 0.7;
/// Bounce moves this fraction of the overdrive per tick
pub const BOUNCE_GAIN: f32 = 0.2;
/// Bounce stops once the overdrive is below this
pub const BOUNCE_STOP: f32 = 1.0;
/// 60 Hz
pub const BOUNCE_PERIOD: Duration = Duration::from_micros(16_667);
/// Wheel input this far past an end bounces right away
pub const WHEEL_BOUNCE_OVERDRIVE: f32 = 30.0;

const HISTORY: usize = 3;

/// Drag damping for an overdrive magnitude
pub fn drag_damping(overdrive: f32) -> f32 {
    let magnitude = overdrive.abs();
    if magnitude < 80.0 {
        1.0
    } else if magnitude < 160.0 {
        0.5
    } else if magnitude < 320.0 {
        0.25
    } else {
        0.0
    }
}

/// Wheel damping for a stretch count
pub fn wheel_damping(stretch: u32) -> f32 {
    match stretch {
        0..=2 => 1.0,
        3..=5 => 0.7,
        6..=8 => 0.6,
        _ => 0.5,
    }
}

/// What the scroller is doing between inputs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollMode {
    Idle,
    Coasting { period: Duration },
    Bouncing,
}

#[derive(Debug, Clone, Copy, Default)]
struct Sample {
    delta: f32,
    dt: Duration,
}

#[derive(Debug, Clone)]
pub struct Scroller {
    samples: [Sample; HISTORY],
    next: usize,
    count: usize,
    velocity: f32,
    overdrive: f32,
    stretch: u32,
    mode: ScrollMode,
    last: Option<(f32, Duration)>,
}

impl Default for Scroller {
    fn default() -> Self {
        Self::new()
    }
}

impl Scroller {
    pub fn new() -> Self {
        Self {
            samples: [Sample::default(); HISTORY],
            next: 0,
            count: 0,
            velocity: 0.0,
            overdrive: 0.0,
            stretch: 0,
            mode: ScrollMode::Idle,
            last: None,
        }
    }

    pub fn mode(&self) -> ScrollMode {
        self.mode
    }

    /// Mean of the recent deltas
    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    /// Overdrive as last queried from the target
    pub fn overdrive(&self) -> f32 {
        self.overdrive
    }

    /// Consecutive pans that ended past an end
    pub fn stretch(&self) -> u32 {
        self.stretch
    }

    /// Tick interval for the current mode, `None` when idle
    pub fn tick_period(&self) -> Option<Duration> {
        match self.mode {
            ScrollMode::Idle => None,
            ScrollMode::Coasting { period } => Some(period),
            ScrollMode::Bouncing => Some(BOUNCE_PERIOD),
        }
    }

    fn reset_history(&mut self) {
        self.samples = [Sample::default(); HISTORY];
        self.next = 0;
        self.count = 0;
    }

    fn record(&mut self, delta: f32, dt: Duration) {
        self.samples[self.next] = Sample { delta, dt };
        self.next = (self.next + 1) % HISTORY;
        self.count = (self.count + 1).min(HISTORY);
        self.velocity = self.samples.iter().map(|s| s.delta).sum::<f32>() / self.count as f32;
    }

    fn mean_interval(&self) -> Duration {
        let total: Duration = self.samples.iter().map(|s| s.dt).sum();
        total / self.count.max(1) as u32
    }

    fn pan<T: ScrollTarget>(&mut self, target: &mut T, delta: f32) {
        target.pan(delta);
        if self.mode == ScrollMode::Bouncing {
            return;
        }
        if target.overdrive() != 0.0 {
            self.stretch += 1;
        } else {
            self.stretch = 0;
        }
    }

    /// Finger down at `position` (pixels along the scroll axis) at time `t`
    pub fn touch_start(&mut self, position: f32, t: Duration) {
        if self.mode != ScrollMode::Idle {
            trace!("Touch stops {:?}", self.mode);
            self.mode = ScrollMode::Idle;
        }
        self.last = Some((position, t));
        self.reset_history();
    }

    /// Finger moved; moving up scrolls towards later items
    pub fn touch_move<T: ScrollTarget>(&mut self, target: &mut T, position: f32, t: Duration) {
        let (last_position, last_t) = self.last.unwrap_or((position, t));
        let delta = last_position - position;
        self.last = Some((position, t));
        self.record(delta, t.saturating_sub(last_t));
        self.overdrive = target.overdrive();
        let damped = delta * drag_damping(self.overdrive);
        self.pan(target, damped);
    }

    /// Finger lifted: coast, bounce, or stop
    pub fn release<T: ScrollTarget>(&mut self, target: &mut T) {
        self.last = None;
        if self.count < 2 || self.velocity.abs() < COAST_MIN_VELOCITY {
            self.overdrive = target.overdrive();
            if self.overdrive != 0.0 && self.stretch > 0 {
                self.bounce();
            }
            return;
        }
        let period = self.mean_interval().max(Duration::from_millis(1));
        trace!("Coasting at {} every {:?}", self.velocity, period);
        self.mode = ScrollMode::Coasting { period };
    }

    /// Mouse wheel; no inertia
    pub fn wheel<T: ScrollTarget>(&mut self, target: &mut T, delta: f32) {
        if self.mode == ScrollMode::Bouncing {
            return;
        }
        self.record(delta, Duration::ZERO);
        self.overdrive = target.overdrive();
        if self.stretch > 0 && self.overdrive.abs() > WHEEL_BOUNCE_OVERDRIVE {
            self.reset_history();
            self.bounce();
            return;
        }
        let damped = delta * wheel_damping(self.stretch);
        self.pan(target, damped);
    }

    /// Spring back to the nearest end
    pub fn bounce(&mut self) {
        self.mode = ScrollMode::Bouncing;
    }

    /// Advance the current animation one step; false once idle
    pub fn tick<T: ScrollTarget>(&mut self, target: &mut T) -> bool {
        match self.mode {
            ScrollMode::Idle => false,
            ScrollMode::Coasting { .. } => self.coast(target),
            ScrollMode::Bouncing => self.bounce_step(target),
        }
    }

    fn coast<T: ScrollTarget>(&mut self, target: &mut T) -> bool {
        self.overdrive = target.overdrive();
        let velocity = self.velocity;
        self.pan(target, velocity);
        if self.velocity.abs() < COAST_STOP_VELOCITY {
            self.mode = ScrollMode::Idle;
            self.overdrive = target.overdrive();
            if self.overdrive != 0.0 && self.stretch > 0 {
                self.bounce();
                return true;
            }
            return false;
        }
        self.velocity *= if self.stretch > 0 {
            STRETCH_DECAY
        } else {
            COAST_DECAY
        };
        true
    }

    fn bounce_step<T: ScrollTarget>(&mut self, target: &mut T) -> bool {
        if self.overdrive.abs() < BOUNCE_STOP {
            self.mode = ScrollMode::Idle;
            self.overdrive = 0.0;
            self.stretch = 0;
            return false;
        }
        let d = -BOUNCE_GAIN * self.overdrive;
        target.pan(d);
        self.overdrive += d;
        true
    }
}
