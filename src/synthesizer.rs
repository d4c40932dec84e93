//! Composite metric synthesis
//!
//! Maps one window's signal set to the three composite scores (UFI, RCS, MIV).
//! Stateless: every window is scored independently, with no cross-window
//! memory. Ablation runs reuse the exact same formula with masked inputs so
//! the base and ablated computations can never silently diverge.

use serde::{Deserialize, Serialize};

use crate::types::{WindowMetrics, WindowRecord, WindowSignals};

/// Linear clip divisor mapping "full friction" rage-click counts to 1.0
const RAGE_FULL_COUNT: f64 = 2.0;
/// Linear clip divisor for dead clicks
const DEAD_FULL_COUNT: f64 = 2.0;
/// Linear clip divisor for hover stalls
const STALL_FULL_COUNT: f64 = 1.0;
/// Linear clip divisor for scroll oscillations
const OSC_FULL_COUNT: f64 = 3.0;
/// Logistic divisor for the cursor-jitter term and RCS smoothness term
const SPEED_STD_SCALE: f64 = 150.0;
/// Logistic divisor for the RCS scroll-velocity term
const SCROLL_VEL_SCALE: f64 = 200.0;
/// |scroll velocity| below which scrolling is judged stopped for MIV
const MIV_STOPPED_PX_PER_SEC: f64 = 20.0;
/// Coarse proxy for time-to-first-click: a fixed mid-window offset in seconds
const MIV_MID_WINDOW_OFFSET_SEC: f64 = 2.5;

/// UFI term weights; fixed design constants, not learned
const UFI_W_RAGE: f64 = 0.35;
const UFI_W_DEAD: f64 = 0.20;
const UFI_W_STALL: f64 = 0.15;
const UFI_W_OSC: f64 = 0.15;
const UFI_W_JITTER: f64 = 0.15;

/// Feature mask for ablation runs: a disabled term is forced to zero inside
/// the one shared formula
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeatureMask {
    /// Include the cursor-jitter term
    pub cursor_jitter: bool,
    /// Include the scroll oscillation and velocity terms
    pub scroll_terms: bool,
}

impl Default for FeatureMask {
    fn default() -> Self {
        Self {
            cursor_jitter: true,
            scroll_terms: true,
        }
    }
}

impl FeatureMask {
    /// Mask for ablating the cursor-jitter term
    pub fn without_cursor() -> Self {
        Self {
            cursor_jitter: false,
            scroll_terms: true,
        }
    }

    /// Mask for ablating the scroll oscillation/velocity terms
    pub fn without_scroll() -> Self {
        Self {
            cursor_jitter: true,
            scroll_terms: false,
        }
    }
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn clip01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Synthesize the composite scores for one window
pub fn synthesize(window: &WindowRecord, mask: FeatureMask) -> WindowMetrics {
    let s = &window.signals;

    let rage = clip01(s.rage_clicks as f64 / RAGE_FULL_COUNT);
    let dead = clip01(s.dead_clicks as f64 / DEAD_FULL_COUNT);
    let stall = clip01(s.hover_stall as f64 / STALL_FULL_COUNT);

    let (osc, scroll_velocity) = if mask.scroll_terms {
        (
            clip01(s.scroll_oscillations as f64 / OSC_FULL_COUNT),
            s.scroll_velocity,
        )
    } else {
        (0.0, 0.0)
    };

    // Jitter only counts as friction when the user is not clicking decisively.
    let jitter = if mask.cursor_jitter && s.clicks == 0 {
        logistic(s.speed_std / SPEED_STD_SCALE)
    } else {
        0.0
    };

    let ufi = clip01(
        UFI_W_RAGE * rage
            + UFI_W_DEAD * dead
            + UFI_W_STALL * stall
            + UFI_W_OSC * osc
            + UFI_W_JITTER * jitter,
    );

    // Direction-thrashing suppresses comfort regardless of speed smoothness.
    let rcs_base = 0.6 * logistic(-s.speed_std / SPEED_STD_SCALE)
        + 0.4 * logistic(scroll_velocity / SCROLL_VEL_SCALE);
    let rcs = clip01(rcs_base) * (1.0 - osc);

    let miv = miv_proxy(s, scroll_velocity);

    WindowMetrics {
        sess_key: window.sess_key.clone(),
        uid: window.uid.clone(),
        w_start: window.w_start,
        w_end: window.w_end,
        ufi,
        rcs,
        miv,
        signals: window.signals.clone(),
    }
}

/// Score a full window batch with one mask
pub fn synthesize_all(windows: &[WindowRecord], mask: FeatureMask) -> Vec<WindowMetrics> {
    windows.iter().map(|w| synthesize(w, mask)).collect()
}

/// Decision-latency proxy: defined only when the window has at least one click
/// and scrolling is judged stopped. The value is a fixed mid-window offset
/// standing in for "time from stop-scrolling to first click".
fn miv_proxy(signals: &WindowSignals, scroll_velocity: f64) -> Option<f64> {
    if signals.clicks > 0 && scroll_velocity.abs() < MIV_STOPPED_PX_PER_SEC {
        Some(MIV_MID_WINDOW_OFFSET_SEC)
    } else {
        None
    }
}
