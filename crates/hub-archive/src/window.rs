//! Visible window over the item list
//!
//! The list shows `extent = body + 2 * stem` rows starting at `start`, offset
//! by `head_padding` pixels. Two pure functions move the window:
//!
//! - [`compute_window`] reconciles it after the grid changed, according to
//!   the grid's [`ListMode`]
//! - [`scroll_window`] moves it by a scroll delta and decides when to fetch
//!   the neighbouring hour, early enough that the fetch lands before the user
//!   reaches the end of what is loaded
//!
//! `hourly_start` is `start` relative to the anchor hour, which lets the window
//! keep its place when a prepend or append shifts every index.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::grid::Grid;
use crate::mode::ListMode;

/// Travel from the selection that turns live update off
pub const LIVE_TRAVEL_LIMIT: usize = 30;

/// Window geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowParams {
    /// Rows kept above and below the body
    pub stem: usize,
    /// Rows on screen
    pub body: usize,
    /// Distance from either end of the list at which the next hour is fetched
    pub fetch: usize,
    /// Row height in pixels
    pub row_height: f32,
}

impl Default for WindowParams {
    fn default() -> Self {
        Self {
            stem: 5,
            body: 15,
            fetch: 72,
            row_height: 32.0,
        }
    }
}

impl WindowParams {
    pub fn extent(&self) -> usize {
        self.body + 2 * self.stem
    }

    fn rest_padding(&self) -> f32 {
        -(self.stem as f32) * self.row_height
    }
}

/// The part of the grid the window math needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListShape {
    pub len: usize,
    pub index: Option<usize>,
    pub counts: [usize; 2],
    pub more_before: bool,
    pub more_after: bool,
    pub mode: ListMode,
}

impl From<&Grid> for ListShape {
    fn from(grid: &Grid) -> Self {
        Self {
            len: grid.items.len(),
            index: grid.index,
            counts: grid.counts,
            more_before: grid.more_before,
            more_after: grid.more_after,
            mode: grid.list_mode,
        }
    }
}

/// Window position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub start: usize,
    pub head_padding: f32,
    pub hourly_start: usize,
    /// A prepend or append was requested and has not landed yet
    pub task_pending: bool,
}

impl Window {
    pub fn new(params: &WindowParams) -> Self {
        Self {
            start: 0,
            head_padding: params.rest_padding(),
            hourly_start: 0,
            task_pending: false,
        }
    }

    /// Row indices on screen for a list of `len` items
    pub fn rows(&self, len: usize, params: &WindowParams) -> std::ops::Range<usize> {
        let end = len.min(self.start + params.extent());
        self.start.min(end)..end
    }
}

fn hourly(start: usize, counts: [usize; 2]) -> usize {
    if start >= counts[0] {
        start - counts[0]
    } else {
        start
    }
}

/// Window after the grid changed
pub fn compute_window(previous: &Window, shape: &ListShape, params: &WindowParams) -> Window {
    let h = params.row_height;
    let mut padding = previous.head_padding;
    let start = match shape.mode {
        ListMode::Prepend => shape.counts[0] + previous.hourly_start,
        ListMode::Append => previous.hourly_start,
        ListMode::Catchup => {
            padding = params.rest_padding();
            shape
                .index
                .unwrap_or(0)
                .saturating_sub(params.body + params.stem)
        }
        ListMode::Select | ListMode::Navigate => {
            let anchor = shape.index.unwrap_or(shape.counts[0]);
            let start = anchor.saturating_sub(params.stem);
            padding = (start as f32 - anchor as f32) * h;
            start
        }
    };
    let start = start.min(shape.len.saturating_sub(1));
    Window {
        start,
        head_padding: padding,
        hourly_start: hourly(start, shape.counts),
        task_pending: false,
    }
}

/// Neighbouring hour to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    Prepend,
    Append,
}

/// Result of a scroll step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollOutcome {
    pub window: Window,
    pub fetch: Option<Fetch>,
    /// Scrolled far from the selection while following live data
    pub disable_live: bool,
    /// Part of the delta the window could not absorb (past an end)
    pub excess: f32,
}

/// Move the window by `delta` pixels (positive: towards later items)
pub fn scroll_window(
    previous: &Window,
    delta: f32,
    shape: &ListShape,
    params: &WindowParams,
    live: bool,
) -> ScrollOutcome {
    let h = params.row_height;
    let stem = params.stem as f32;
    let max_start = shape.len.saturating_sub(params.extent());

    let mut start = previous.start;
    let mut padding = previous.head_padding - delta;
    if delta > 0.0 {
        while padding < -stem * h && start < max_start {
            padding += h;
            start += 1;
        }
    } else if delta < 0.0 {
        while padding > (1.0 - stem) * h && start > 0 {
            padding -= h;
            start -= 1;
        }
    } else {
        return ScrollOutcome {
            window: *previous,
            fetch: None,
            disable_live: false,
            excess: 0.0,
        };
    }

    let mut excess = 0.0;
    if padding < -2.0 * stem * h || padding > h {
        excess = previous.head_padding - padding;
        padding = previous.head_padding;
    }

    let travel = shape.index.map_or(0, |i| start.abs_diff(i));
    let disable_live = live && travel > LIVE_TRAVEL_LIMIT;

    let mut fetch = None;
    if !previous.task_pending && start != previous.start {
        let fetch_max = shape
            .len
            .saturating_sub(params.stem + params.body + params.fetch);
        if start < params.fetch && delta < 0.0 && shape.more_before {
            fetch = Some(Fetch::Prepend);
        } else if start > fetch_max && delta > 0.0 && shape.more_after {
            fetch = Some(Fetch::Append);
        }
    }
    if let Some(fetch) = fetch {
        debug!("Window start {} asks for {:?}", start, fetch);
    }

    ScrollOutcome {
        window: Window {
            start,
            head_padding: padding,
            hourly_start: hourly(start, shape.counts),
            task_pending: previous.task_pending || fetch.is_some(),
        },
        fetch,
        disable_live,
        excess,
    }
}

/// Scrollable list state: the window plus how far it is dragged past an end
#[derive(Debug, Clone)]
pub struct ListView {
    params: WindowParams,
    window: Window,
    overdrive: f32,
}

impl ListView {
    pub fn new(params: WindowParams) -> Self {
        Self {
            window: Window::new(&params),
            params,
            overdrive: 0.0,
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn params(&self) -> &WindowParams {
        &self.params
    }

    /// Pixels past the top (negative) or bottom (positive) of the list
    pub fn overdrive(&self) -> f32 {
        self.overdrive
    }

    /// Re-anchor after the grid changed
    pub fn reconcile(&mut self, shape: &ListShape) {
        self.window = compute_window(&self.window, shape, &self.params);
        self.overdrive = 0.0;
    }

    /// Recentre on the selection only if it is off screen
    pub fn reveal(&mut self, shape: &ListShape) {
        let Some(index) = shape.index else {
            return;
        };
        if self.window.rows(shape.len, &self.params).contains(&index) {
            return;
        }
        let shape = ListShape {
            mode: ListMode::Navigate,
            ..*shape
        };
        self.reconcile(&shape);
    }

    /// Scroll by `delta`; movement towards the list consumes overdrive first
    pub fn pan(&mut self, delta: f32, shape: &ListShape, live: bool) -> ScrollOutcome {
        let mut delta = delta;
        if self.overdrive != 0.0 && delta.signum() != self.overdrive.signum() {
            let consumed = if delta.abs() >= self.overdrive.abs() {
                -self.overdrive
            } else {
                delta
            };
            self.overdrive += consumed;
            delta -= consumed;
            if delta == 0.0 {
                return ScrollOutcome {
                    window: self.window,
                    fetch: None,
                    disable_live: false,
                    excess: 0.0,
                };
            }
        }

        let before = self.window.start;
        let mut outcome = scroll_window(&self.window, delta, shape, &self.params, live);
        let max_start = shape.len.saturating_sub(self.params.extent());
        let stuck = outcome.window.start == before
            && ((delta < 0.0 && before == 0) || (delta > 0.0 && before >= max_start));
        if stuck {
            // Nothing left to scroll to: the whole delta stretches the list
            outcome.window.head_padding = self.window.head_padding;
            outcome.excess = delta;
        }
        self.overdrive += outcome.excess;
        self.window = outcome.window;
        outcome
    }

    /// Clear the pending-fetch mark (e.g. after the fetch was refused)
    pub fn clear_pending(&mut self) {
        self.window.task_pending = false;
    }
}
