//! Windowed tab-activation statistics.
//!
//! Activations are retained for the longest window (60 seconds) and pruned
//! lazily before every read or write. Counts are always computed per browser
//! window, so switching inside one window never inflates another's stats.

use crate::collector::types::{TabId, TabNotification, WindowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

/// Longest retained window (milliseconds).
pub const HISTORY_WINDOW_MS: i64 = 60_000;
/// Mid window (milliseconds).
pub const MID_WINDOW_MS: i64 = 30_000;
/// Short window (milliseconds).
pub const SHORT_WINDOW_MS: i64 = 10_000;
/// Switches within 60 seconds that count as a burst.
pub const BURST_THRESHOLD: u32 = 5;
/// Switches within 10 seconds that count as a burst.
pub const SHORT_BURST_THRESHOLD: u32 = 3;

/// Nested window counts. `last10 <= last30 <= last60` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabCounts {
    pub last10: u32,
    pub last30: u32,
    pub last60: u32,
}

/// Point-in-time statistics for one browser window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStats {
    pub counts: TabCounts,
    pub rate_per_min: f64,
}

impl WindowStats {
    /// Whether these stats cross either burst threshold.
    pub fn is_burst(&self) -> bool {
        self.counts.last60 >= BURST_THRESHOLD || self.counts.last10 >= SHORT_BURST_THRESHOLD
    }
}

/// Failure to hand a notification to its receiver.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("receiver is gone")]
    Closed,
    #[error("receiver queue is full")]
    Full,
}

/// Receiver of tab notifications (the content side of the extension).
pub trait TabNotifier {
    fn deliver(&self, notification: TabNotification) -> Result<(), DeliveryError>;
}

/// A single tab activation. Never leaves the tracker.
#[derive(Debug, Clone, Copy)]
struct TabActivation {
    time: DateTime<Utc>,
    window_id: WindowId,
}

/// Tracks tab activations and computes windowed counts and rates.
#[derive(Debug, Default)]
pub struct TabActivityTracker {
    history: VecDeque<TabActivation>,
}

impl TabActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an activation and notify the receiver.
    ///
    /// Emits `TabActivity` and the legacy `TabSwitched` shape on every call,
    /// plus `TabBurst` when a threshold is crossed. Delivery failures are
    /// dropped; the history stays consistent either way.
    pub fn record_activation(
        &mut self,
        window_id: WindowId,
        tab_id: TabId,
        now: DateTime<Utc>,
        notifier: &dyn TabNotifier,
    ) -> WindowStats {
        self.prune(now);
        self.history.push_back(TabActivation {
            time: now,
            window_id,
        });

        let stats = self.compute_stats(window_id, now);

        send(
            notifier,
            TabNotification::TabActivity {
                counts: stats.counts,
                rate_per_min: stats.rate_per_min,
                window_id,
                timestamp: now,
            },
        );
        send(
            notifier,
            TabNotification::TabSwitched {
                count: stats.counts.last60,
                counts: stats.counts,
                timestamp: now,
            },
        );

        if stats.is_burst() {
            tracing::debug!(
                window_id,
                tab_id,
                last10 = stats.counts.last10,
                last60 = stats.counts.last60,
                "tab burst"
            );
            send(
                notifier,
                TabNotification::TabBurst {
                    count_last60s: stats.counts.last60,
                    count_last10s: stats.counts.last10,
                    rate_per_min: stats.rate_per_min,
                    timestamp: now,
                },
            );
        }

        stats
    }

    /// Compute stats for one browser window as of `now`.
    pub fn compute_stats(&mut self, window_id: WindowId, now: DateTime<Utc>) -> WindowStats {
        self.prune(now);

        let mut counts = TabCounts::default();
        let mut oldest_age_ms: Option<i64> = None;

        for entry in self.history.iter().filter(|e| e.window_id == window_id) {
            let age_ms = (now - entry.time).num_milliseconds();
            if age_ms > HISTORY_WINDOW_MS {
                continue;
            }
            counts.last60 += 1;
            if age_ms <= MID_WINDOW_MS {
                counts.last30 += 1;
            }
            if age_ms <= SHORT_WINDOW_MS {
                counts.last10 += 1;
            }
            oldest_age_ms = Some(oldest_age_ms.map_or(age_ms, |o| o.max(age_ms)));
        }

        WindowStats {
            counts,
            rate_per_min: rate_per_min(counts.last60, oldest_age_ms),
        }
    }

    /// Drop every activation older than the 60 second horizon.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        self.history
            .retain(|entry| (now - entry.time).num_milliseconds() <= HISTORY_WINDOW_MS);
    }

    /// Total retained activations across all windows.
    pub fn switch_count(&mut self, now: DateTime<Utc>) -> usize {
        self.prune(now);
        self.history.len()
    }

    /// Forget all activations.
    pub fn reset(&mut self) {
        self.history.clear();
    }
}

/// Switches per minute over the span covered by the retained events.
///
/// With fewer than two events the full 60 second window is used; otherwise
/// the span is the oldest event's age, at least 1 ms and at most 60 seconds.
fn rate_per_min(last60: u32, oldest_age_ms: Option<i64>) -> f64 {
    if last60 == 0 {
        return 0.0;
    }
    let span_ms = match oldest_age_ms {
        Some(age) if last60 >= 2 => age.clamp(1, HISTORY_WINDOW_MS),
        _ => HISTORY_WINDOW_MS,
    };
    let rate = f64::from(last60) * 60_000.0 / span_ms as f64;
    (rate * 10.0).round() / 10.0
}

fn send(notifier: &dyn TabNotifier, notification: TabNotification) {
    if let Err(e) = notifier.deliver(notification) {
        tracing::debug!("tab notification dropped: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        delivered: RefCell<Vec<TabNotification>>,
    }

    impl TabNotifier for Recorder {
        fn deliver(&self, notification: TabNotification) -> Result<(), DeliveryError> {
            self.delivered.borrow_mut().push(notification);
            Ok(())
        }
    }

    struct Unreachable;

    impl TabNotifier for Unreachable {
        fn deliver(&self, _: TabNotification) -> Result<(), DeliveryError> {
            Err(DeliveryError::Closed)
        }
    }

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    fn bursts(recorder: &Recorder) -> usize {
        recorder
            .delivered
            .borrow()
            .iter()
            .filter(|n| n.is_burst())
            .count()
    }

    #[test]
    fn test_six_activations_within_eight_seconds() {
        let mut tracker = TabActivityTracker::new();
        let recorder = Recorder::default();

        for i in 0..6 {
            tracker.record_activation(1, i, at(i * 1_600), &recorder);
        }

        let now = at(8_000);
        let stats = tracker.compute_stats(1, now);
        assert_eq!(stats.counts.last10, 6);
        assert_eq!(stats.counts.last60, 6);
        assert!(bursts(&recorder) > 0);
    }

    #[test]
    fn test_burst_fires_exactly_at_thresholds() {
        let mut tracker = TabActivityTracker::new();
        let recorder = Recorder::default();

        // Two quick switches: below both thresholds.
        tracker.record_activation(1, 1, at(0), &recorder);
        tracker.record_activation(1, 2, at(1_000), &recorder);
        assert_eq!(bursts(&recorder), 0);

        // Third within 10 seconds: short threshold.
        tracker.record_activation(1, 3, at(2_000), &recorder);
        assert_eq!(bursts(&recorder), 1);

        // Spread out, three older than 10s then two more: 5 within 60s.
        let mut tracker = TabActivityTracker::new();
        let recorder = Recorder::default();
        for (i, t) in [0, 12_000, 24_000, 36_000].into_iter().enumerate() {
            tracker.record_activation(1, i as i64, at(t), &recorder);
        }
        assert_eq!(bursts(&recorder), 0);
        tracker.record_activation(1, 9, at(48_000), &recorder);
        assert_eq!(bursts(&recorder), 1);
    }

    #[test]
    fn test_every_activation_emits_both_shapes() {
        let mut tracker = TabActivityTracker::new();
        let recorder = Recorder::default();
        tracker.record_activation(3, 1, at(0), &recorder);

        let delivered = recorder.delivered.borrow();
        assert_eq!(delivered.len(), 2);
        assert!(matches!(delivered[0], TabNotification::TabActivity { window_id: 3, .. }));
        assert!(matches!(delivered[1], TabNotification::TabSwitched { count: 1, .. }));
    }

    #[test]
    fn test_counts_are_per_window_and_nested() {
        let mut tracker = TabActivityTracker::new();
        let recorder = Recorder::default();
        tracker.record_activation(1, 1, at(0), &recorder);
        tracker.record_activation(1, 2, at(25_000), &recorder);
        tracker.record_activation(2, 3, at(40_000), &recorder);
        tracker.record_activation(1, 4, at(45_000), &recorder);

        let stats = tracker.compute_stats(1, at(50_000));
        assert_eq!(
            stats.counts,
            TabCounts {
                last10: 1,
                last30: 2,
                last60: 3
            }
        );
        assert!(stats.counts.last10 <= stats.counts.last30);
        assert!(stats.counts.last30 <= stats.counts.last60);

        let other = tracker.compute_stats(2, at(50_000));
        assert_eq!(other.counts.last60, 1);
    }

    #[test]
    fn test_prune_drops_old_events() {
        let mut tracker = TabActivityTracker::new();
        let recorder = Recorder::default();
        tracker.record_activation(1, 1, at(0), &recorder);
        tracker.record_activation(1, 2, at(30_000), &recorder);

        assert_eq!(tracker.switch_count(at(60_000)), 2);
        assert_eq!(tracker.switch_count(at(60_001)), 1);
        assert_eq!(tracker.compute_stats(1, at(90_001)).counts.last60, 0);
        assert_eq!(tracker.switch_count(at(90_001)), 0);
    }

    #[test]
    fn test_rate_per_minute() {
        let mut tracker = TabActivityTracker::new();
        let recorder = Recorder::default();

        assert_eq!(tracker.compute_stats(1, at(0)).rate_per_min, 0.0);

        // A single sample is spread over the full minute.
        tracker.record_activation(1, 1, at(0), &recorder);
        assert_eq!(tracker.compute_stats(1, at(0)).rate_per_min, 1.0);

        // Four samples over 20 seconds.
        for (i, t) in [5_000, 10_000, 20_000].into_iter().enumerate() {
            tracker.record_activation(1, i as i64, at(t), &recorder);
        }
        assert_eq!(tracker.compute_stats(1, at(20_000)).rate_per_min, 12.0);

        // Three samples over five seconds.
        let mut tracker = TabActivityTracker::new();
        for (i, t) in [0, 2_500, 5_000].into_iter().enumerate() {
            tracker.record_activation(1, i as i64, at(t), &recorder);
        }
        assert_eq!(tracker.compute_stats(1, at(5_000)).rate_per_min, 36.0);

        // Simultaneous samples use a 1 ms span.
        let mut tracker = TabActivityTracker::new();
        tracker.record_activation(1, 1, at(0), &recorder);
        tracker.record_activation(1, 2, at(0), &recorder);
        assert_eq!(tracker.compute_stats(1, at(0)).rate_per_min, 120_000.0);
    }

    #[test]
    fn test_delivery_failures_are_swallowed() {
        let mut tracker = TabActivityTracker::new();
        for i in 0..4 {
            tracker.record_activation(1, i, at(i * 100), &Unreachable);
        }
        let stats = tracker.compute_stats(1, at(500));
        assert_eq!(stats.counts.last10, 4);
        assert!(stats.is_burst());
    }

    #[test]
    fn test_reset() {
        let mut tracker = TabActivityTracker::new();
        tracker.record_activation(1, 1, at(0), &Unreachable);
        tracker.reset();
        assert_eq!(tracker.switch_count(at(0) + Duration::seconds(1)), 0);
    }
}
