//! Rule-based attention classifier.
//!
//! Rules are evaluated in a fixed order and the first match wins:
//! idle, then distracted, then focused, otherwise neutral. Idle dominates so
//! a user who walked away is never told they are distracted.

use crate::config::UserProfile;
use crate::core::signals::SignalSnapshot;
use crate::core::state::StateLabel;
use serde::{Deserialize, Serialize};

/// Seconds since last typing at or below which typing counts as recent.
const RECENT_TYPING_SECONDS: f64 = 4.0;

/// Tunable thresholds for one classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassificationOptions {
    /// No input for this long means idle
    pub idle_seconds: f64,
    /// Switches in 60s that mean distracted
    pub tab_burst_threshold: u32,
    /// Switches in the short window that mean distracted
    pub tab_burst_threshold_short: u32,
    /// Length of the short window
    pub short_window_seconds: u32,
    /// Focus requires fewer switches than this in 60s
    pub focus_tab_limit: u32,
    /// Pointer idle time for the stale-input rule
    pub mouse_idle_distracted: f64,
    /// Typing idle time for the stale-input rule
    pub no_typing_distracted: f64,
    /// Tabs per minute that mean distracted
    pub tab_rate_distracted: f64,
}

impl Default for ClassificationOptions {
    fn default() -> Self {
        Self {
            idle_seconds: 10.0,
            tab_burst_threshold: 5,
            tab_burst_threshold_short: 3,
            short_window_seconds: 10,
            focus_tab_limit: 3,
            mouse_idle_distracted: 15.0,
            no_typing_distracted: 10.0,
            tab_rate_distracted: 8.0,
        }
    }
}

impl ClassificationOptions {
    /// Apply a user profile's sensitivity overrides.
    pub fn with_profile(mut self, profile: &UserProfile) -> Self {
        if let Some(ref sensitivity) = profile.sensitivity {
            if let Some(idle) = sensitivity.idle_timeout.filter(|v| v.is_finite() && *v > 0.0) {
                self.idle_seconds = idle;
            }
            if let Some(threshold) = sensitivity.distraction_threshold.filter(|v| *v > 0) {
                self.tab_burst_threshold = threshold;
            }
        }
        self
    }
}

pub fn is_idle(signals: &SignalSnapshot, opts: &ClassificationOptions) -> bool {
    signals.no_input_seconds >= opts.idle_seconds
}

pub fn is_distracted(signals: &SignalSnapshot, opts: &ClassificationOptions) -> bool {
    signals.tab_switches_60s >= opts.tab_burst_threshold
        || signals.tab_switches_10s >= opts.tab_burst_threshold_short
        || signals.tab_rate_per_min >= opts.tab_rate_distracted
        || (signals.mouse_idle_seconds >= opts.mouse_idle_distracted
            && signals.no_typing_seconds >= opts.no_typing_distracted)
}

pub fn is_focused(signals: &SignalSnapshot, opts: &ClassificationOptions) -> bool {
    signals.no_typing_seconds <= RECENT_TYPING_SECONDS
        && signals.tab_switches_60s < opts.focus_tab_limit
        && signals.tab_switches_10s < opts.tab_burst_threshold_short.max(1)
        && signals.no_input_seconds < opts.idle_seconds
}

/// Map a snapshot to a label. Pure: no side effects, no clock access.
pub fn derive_label(signals: &SignalSnapshot, opts: &ClassificationOptions) -> StateLabel {
    if is_idle(signals, opts) {
        StateLabel::Idle
    } else if is_distracted(signals, opts) {
        StateLabel::Distracted
    } else if is_focused(signals, opts) {
        StateLabel::Focused
    } else {
        StateLabel::Neutral
    }
}
