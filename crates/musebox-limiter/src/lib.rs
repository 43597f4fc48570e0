//! Press rate limiting over a rolling time window.
//!
//! The limiter is a small state machine over one counter-and-clock pair:
//!
//! - **Open** - fewer presses than the limit inside the current window.
//! - **Throttled** - the limit is reached and the window is still live;
//!   further presses increment a post-limit counter that drives escalating
//!   feedback, ending in a simulated crash.
//! - **Expired** - the window is older than its duration; any query observes
//!   this lazily, zeroes the counters, and collapses back to Open.
//!
//! State is persisted write-through after every mutation. A store failure
//! never blocks a press; it only forfeits durability.

mod clock;

#[cfg(any(test, feature = "test-utils"))]
pub use clock::ManualClock;
pub use clock::{Clock, SystemClock};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use musebox_store::KvStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Storage key for the persisted window state.
pub const STATE_KEY: &str = "rate_limit";

/// Post-limit feedback, most gentle first. Presses past the end of the list
/// keep receiving the final message until the crash threshold hits.
pub const ESCALATION_MESSAGES: [&str; 6] = [
    "Still here?",
    "Maybe stretch your legs instead?",
    "The idea well needs a moment to refill.",
    "Seriously, the button is getting tired.",
    "You cannot out-click a countdown.",
    "Final warning. Do not press again.",
];

/// Limiter tuning. Defaults match the shipped widget: ten presses per
/// four-hour window, with the simulated crash twenty presses past the limit.
#[derive(Debug, Clone, Copy)]
pub struct LimiterConfig {
    /// Rolling window duration.
    pub window: Duration,
    /// Presses allowed inside one window.
    pub limit: u32,
    /// Post-limit presses before the crash signal.
    pub crash_threshold: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(4 * 60 * 60),
            limit: 10,
            crash_threshold: 20,
        }
    }
}

/// Persisted counter-and-clock pair. `started_at == None` means no window is
/// active; one is lazily created on the first press.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowState {
    pub started_at: Option<DateTime<Utc>>,
    pub presses: u32,
    pub post_limit_presses: u32,
}

/// Outcome of a press made while throttled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Show this message and carry on.
    Warning(&'static str),
    /// Terminal: the caller must perform a hard reset of client state.
    Crash,
}

/// Tracks presses within a rolling window and escalates once exceeded.
pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    config: LimiterConfig,
    state: WindowState,
}

impl RateLimiter {
    /// Load persisted window state, degrading to a fresh window on any
    /// storage failure or corrupt blob.
    pub fn load(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, config: LimiterConfig) -> Self {
        let state = match store.get(STATE_KEY) {
            Ok(Some(blob)) => serde_json::from_str(&blob).unwrap_or_else(|err| {
                warn!(error = %err, "corrupt rate-limit state, starting fresh");
                WindowState::default()
            }),
            Ok(None) => WindowState::default(),
            Err(err) => {
                warn!(error = %err, "rate-limit state unavailable, starting fresh");
                WindowState::default()
            }
        };
        Self {
            store,
            clock,
            config,
            state,
        }
    }

    /// Whether the current window has used up its allowance.
    ///
    /// Expiry is checked first: an expired window is reset (and the reset
    /// persisted) as a side effect of this query, so the transition back to
    /// Open does not wait for an explicit action.
    pub fn is_limit_reached(&mut self) -> bool {
        self.expire_if_needed();
        self.state.presses >= self.config.limit
    }

    /// Record one press, lazily starting a window if none is active.
    /// Returns whether the press was still within the limit.
    pub fn register_press(&mut self) -> bool {
        self.expire_if_needed();
        if self.state.started_at.is_none() {
            self.state.started_at = Some(self.clock.now());
        }
        self.state.presses += 1;
        self.persist();
        self.state.presses <= self.config.limit
    }

    /// Record a press made after the limit was already reached.
    pub fn register_post_limit_press(&mut self) -> Escalation {
        self.state.post_limit_presses += 1;
        self.persist();
        if self.state.post_limit_presses >= self.config.crash_threshold {
            Escalation::Crash
        } else {
            let index = (self.state.post_limit_presses as usize - 1)
                .min(ESCALATION_MESSAGES.len() - 1);
            Escalation::Warning(ESCALATION_MESSAGES[index])
        }
    }

    /// Time until the active window expires; zero when no window is active.
    #[must_use]
    pub fn time_to_reset(&self) -> Duration {
        let Some(started_at) = self.state.started_at else {
            return Duration::ZERO;
        };
        let elapsed = (self.clock.now() - started_at)
            .to_std()
            .unwrap_or_default();
        self.config.window.saturating_sub(elapsed)
    }

    /// Presses left in the current window.
    #[must_use]
    pub fn remaining_allowance(&self) -> u32 {
        self.config.limit.saturating_sub(self.state.presses)
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.config.limit
    }

    #[must_use]
    pub fn state(&self) -> &WindowState {
        &self.state
    }

    /// Zero all counters and persist the reset.
    pub fn reset(&mut self) {
        self.state = WindowState::default();
        self.persist();
    }

    fn expire_if_needed(&mut self) {
        let Some(started_at) = self.state.started_at else {
            return;
        };
        let window = TimeDelta::from_std(self.config.window).unwrap_or(TimeDelta::MAX);
        if self.clock.now() - started_at >= window {
            debug!("rate-limit window expired, resetting counters");
            self.state = WindowState::default();
            self.persist();
        }
    }

    fn persist(&self) {
        let blob = match serde_json::to_string(&self.state) {
            Ok(blob) => blob,
            Err(err) => {
                warn!(error = %err, "could not encode rate-limit state");
                return;
            }
        };
        if let Err(err) = self.store.set(STATE_KEY, &blob) {
            warn!(error = %err, "could not persist rate-limit state, continuing in memory");
        }
    }
}

/// Render a countdown largest-unit-first, dropping zero leading units.
/// Seconds always render when nothing larger remains.
#[must_use]
pub fn format_remaining(remaining: Duration) -> String {
    let total = remaining.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
