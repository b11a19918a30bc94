use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

pub const DEFAULT_BACKFILL_ROUNDS: u32 = 6;
pub const DEFAULT_SCROLL_THRESHOLD: u32 = 10;

pub fn default_backfill_step() -> Duration {
    Duration::hours(1)
}

/// Measured display state, in whatever unit the front-end lays out in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewport {
    pub content_height: u32,
    pub viewport_height: u32,
    pub scroll_offset: u32,
}

impl Viewport {
    pub fn is_underfilled(&self) -> bool {
        self.content_height <= self.viewport_height
    }

    /// Distance still left to scroll before the end of the content.
    pub fn remaining(&self) -> u32 {
        self.content_height
            .saturating_sub(self.scroll_offset.saturating_add(self.viewport_height))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    ViewportExhausted,
    ScrollExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillRequest {
    pub anchor: DateTime<Utc>,
    pub trigger: Trigger,
}

/// Progress of the current viewport-filling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillState {
    Idle,
    Filling { rounds: u32, baseline: usize },
    /// Round cap hit or a round brought nothing new. Stays put until a
    /// reload or a resize.
    Settled,
}

/// Decides when older pages are worth asking for.
#[derive(Debug, Clone)]
pub struct ScrollPaginator {
    last_anchor: DateTime<Utc>,
    step: Duration,
    max_rounds: u32,
    scroll_threshold: u32,
    fill: FillState,
    in_flight: Option<Trigger>,
}

impl ScrollPaginator {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_anchor: now,
            step: default_backfill_step(),
            max_rounds: DEFAULT_BACKFILL_ROUNDS,
            scroll_threshold: DEFAULT_SCROLL_THRESHOLD,
            fill: FillState::Idle,
            in_flight: None,
        }
    }

    pub fn with_limits(mut self, max_rounds: u32, step: Duration, scroll_threshold: u32) -> Self {
        self.max_rounds = max_rounds;
        self.step = step;
        self.scroll_threshold = scroll_threshold;
        self
    }

    pub fn last_anchor(&self) -> DateTime<Utc> {
        self.last_anchor
    }

    pub fn fill_state(&self) -> FillState {
        self.fill
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Full reload: anchor back to now, new pass.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.last_anchor = now;
        self.fill = FillState::Idle;
        self.in_flight = None;
    }

    pub fn viewport_resized(&mut self) {
        if self.fill == FillState::Settled {
            self.fill = FillState::Idle;
        }
    }

    /// Viewport-exhaustion trigger. Call after every layout pass.
    pub fn poll_viewport(&mut self, viewport: Viewport, cached: usize) -> Option<BackfillRequest> {
        if self.in_flight.is_some() {
            return None;
        }

        match self.fill {
            FillState::Settled => None,
            FillState::Idle => {
                if !viewport.is_underfilled() {
                    return None;
                }
                if self.max_rounds == 0 {
                    self.fill = FillState::Settled;
                    return None;
                }
                self.fill = FillState::Filling {
                    rounds: 0,
                    baseline: cached,
                };
                self.request(Trigger::ViewportExhausted)
            }
            FillState::Filling { rounds, .. } => {
                if !viewport.is_underfilled() {
                    self.fill = FillState::Idle;
                    None
                } else if rounds >= self.max_rounds {
                    self.fill = FillState::Settled;
                    None
                } else {
                    self.request(Trigger::ViewportExhausted)
                }
            }
        }
    }

    /// Scroll-exhaustion trigger. Call on scroll events only.
    pub fn on_scroll(&mut self, viewport: Viewport) -> Option<BackfillRequest> {
        if self.in_flight.is_some() || viewport.remaining() >= self.scroll_threshold {
            return None;
        }
        self.request(Trigger::ScrollExhausted)
    }

    /// Report the cache size once the requested page has been merged.
    pub fn finish(&mut self, cached: usize) {
        let Some(trigger) = self.in_flight.take() else {
            return;
        };
        if trigger != Trigger::ViewportExhausted {
            return;
        }

        if let FillState::Filling { rounds, baseline } = self.fill {
            let rounds = rounds + 1;
            self.fill = if cached <= baseline || rounds >= self.max_rounds {
                debug!(rounds, cached, "viewport backfill settled");
                FillState::Settled
            } else {
                FillState::Filling {
                    rounds,
                    baseline: cached,
                }
            };
        }
    }

    /// Step the anchor back one page. Running off the representable
    /// range settles the pass instead.
    fn request(&mut self, trigger: Trigger) -> Option<BackfillRequest> {
        let Some(anchor) = self.last_anchor.checked_sub_signed(self.step) else {
            warn!(anchor = %self.last_anchor, step = %self.step, "no older anchor to request");
            self.fill = FillState::Settled;
            return None;
        };
        self.last_anchor = anchor;
        self.in_flight = Some(trigger);
        debug!(anchor = %self.last_anchor, ?trigger, "requesting older page");
        Some(BackfillRequest { anchor, trigger })
    }
}
