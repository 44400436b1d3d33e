//! Signal aggregation.
//!
//! Input listeners update last-seen timestamps; the tab side pushes windowed
//! counts. [`SignalAggregator::compute_signals`] folds both into an immutable
//! [`SignalSnapshot`] that the classifier consumes by value.

use crate::collector::types::TabStatsPayload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default pointer throttle window (milliseconds).
pub const POINTER_THROTTLE_MS: i64 = 500;

/// Tab statistics as held by the aggregator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabStats {
    pub last10: u32,
    pub last30: u32,
    pub last60: u32,
    pub rate_per_min: f64,
}

impl TabStats {
    /// Enforce `last10 <= last30 <= last60` by raising the wider windows.
    pub fn clamped(mut self) -> Self {
        if self.last30 < self.last10 {
            self.last30 = self.last10;
        }
        if self.last60 < self.last30 {
            self.last60 = self.last30;
        }
        self
    }
}

/// Raw behavioral signals. Timestamps only - no key content or coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSignals {
    pub last_input_time: DateTime<Utc>,
    pub last_key_time: DateTime<Utc>,
    pub last_mouse_time: DateTime<Utc>,
    pub tab_stats: TabStats,
}

impl RawSignals {
    /// Fresh signals with every input timestamp set to `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_input_time: now,
            last_key_time: now,
            last_mouse_time: now,
            tab_stats: TabStats::default(),
        }
    }
}

/// Immutable view of aggregated signals at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignalSnapshot {
    pub tab_switches_60s: u32,
    pub tab_switches_30s: u32,
    pub tab_switches_10s: u32,
    pub tab_rate_per_min: f64,
    pub no_typing_seconds: f64,
    pub no_input_seconds: f64,
    pub mouse_idle_seconds: f64,
}

/// Owns [`RawSignals`] and applies updates from listeners.
#[derive(Debug, Clone)]
pub struct SignalAggregator {
    raw: RawSignals,
    pointer_throttle_ms: i64,
    last_pointer_accepted: Option<DateTime<Utc>>,
}

impl SignalAggregator {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_throttle(now, POINTER_THROTTLE_MS)
    }

    pub fn with_throttle(now: DateTime<Utc>, pointer_throttle_ms: i64) -> Self {
        Self {
            raw: RawSignals::new(now),
            pointer_throttle_ms: pointer_throttle_ms.max(0),
            last_pointer_accepted: None,
        }
    }

    /// Copy of the current raw signals.
    pub fn raw(&self) -> RawSignals {
        self.raw
    }

    /// Record a keystroke.
    pub fn on_key_activity(&mut self, now: DateTime<Utc>) {
        self.raw.last_input_time = now;
        self.raw.last_key_time = now;
    }

    /// Record pointer movement.
    ///
    /// The first event of a burst is applied and opens a throttle window;
    /// events inside that window are dropped. Returns whether it was applied.
    pub fn on_pointer_activity(&mut self, now: DateTime<Utc>) -> bool {
        if let Some(accepted) = self.last_pointer_accepted {
            let elapsed = (now - accepted).num_milliseconds();
            if (0..self.pointer_throttle_ms).contains(&elapsed) {
                return false;
            }
        }
        self.last_pointer_accepted = Some(now);
        self.raw.last_input_time = now;
        self.raw.last_mouse_time = now;
        true
    }

    /// Merge a tab statistics payload.
    ///
    /// Missing fields keep their previous value, negative or fractional
    /// counts are clamped, and the nested-window order is restored.
    pub fn on_tab_stats_update(&mut self, payload: &TabStatsPayload) {
        let previous = self.raw.tab_stats;
        let counts = payload.counts.unwrap_or_default();

        let stats = TabStats {
            last10: to_count(counts.last10.or(payload.count_last10s), previous.last10),
            last30: to_count(counts.last30, previous.last30),
            last60: to_count(counts.last60.or(payload.count_last60s), previous.last60),
            rate_per_min: payload
                .rate_per_min
                .filter(|r| r.is_finite())
                .map(|r| r.max(0.0))
                .unwrap_or(previous.rate_per_min),
        };

        self.raw.tab_stats = stats.clamped();
    }

    /// Build a snapshot as of `now`.
    pub fn compute_signals(&self, now: DateTime<Utc>) -> SignalSnapshot {
        // Re-applied here: stats may have been written by a looser source.
        let stats = self.raw.tab_stats.clamped();

        SignalSnapshot {
            tab_switches_60s: stats.last60,
            tab_switches_30s: stats.last30,
            tab_switches_10s: stats.last10,
            tab_rate_per_min: stats.rate_per_min,
            no_typing_seconds: seconds_since(self.raw.last_key_time, now),
            no_input_seconds: seconds_since(self.raw.last_input_time, now),
            mouse_idle_seconds: seconds_since(self.raw.last_mouse_time, now),
        }
    }
}

fn to_count(value: Option<f64>, fallback: u32) -> u32 {
    match value {
        Some(v) if v.is_finite() => v.clamp(0.0, f64::from(u32::MAX)).floor() as u32,
        _ => fallback,
    }
}

fn seconds_since(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    ((now - then).num_milliseconds() as f64 / 1000.0).max(0.0)
}
