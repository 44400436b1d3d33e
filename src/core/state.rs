//! Attention-state labels and transition history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Attention-state label.
///
/// `Upbeat` is a presentation-only variant for theming; the classifier never
/// produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateLabel {
    Focused,
    Neutral,
    Distracted,
    Idle,
    Upbeat,
}

impl StateLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateLabel::Focused => "focused",
            StateLabel::Neutral => "neutral",
            StateLabel::Distracted => "distracted",
            StateLabel::Idle => "idle",
            StateLabel::Upbeat => "upbeat",
        }
    }
}

impl fmt::Display for StateLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "focused" => Ok(StateLabel::Focused),
            "neutral" => Ok(StateLabel::Neutral),
            "distracted" => Ok(StateLabel::Distracted),
            "idle" => Ok(StateLabel::Idle),
            "upbeat" => Ok(StateLabel::Upbeat),
            other => Err(format!("unknown state label: {other}")),
        }
    }
}

/// One entry of the label history. `duration_ms` is back-filled when the
/// next entry is appended and stays 0 while the entry is current.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateHistoryEntry {
    pub label: StateLabel,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: i64,
}

/// Emitted on every label edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChange {
    pub previous_label: StateLabel,
    pub new_label: StateLabel,
    pub timestamp: DateTime<Utc>,
}

/// Session report derived from the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub started_at: DateTime<Utc>,
    pub duration_sec: i64,
    /// Cumulative milliseconds per label
    pub state_histogram: BTreeMap<StateLabel, i64>,
    pub total_states: usize,
}

/// Tracks the current label and its history.
#[derive(Debug, Clone)]
pub struct StateTracker {
    session_start: DateTime<Utc>,
    current: StateLabel,
    previous: Option<StateLabel>,
    history: Vec<StateHistoryEntry>,
}

impl StateTracker {
    /// Start a session. The initial label is `neutral` with an empty history.
    pub fn new(session_start: DateTime<Utc>) -> Self {
        Self {
            session_start,
            current: StateLabel::Neutral,
            previous: None,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> StateLabel {
        self.current
    }

    pub fn previous(&self) -> Option<StateLabel> {
        self.previous
    }

    pub fn session_start(&self) -> DateTime<Utc> {
        self.session_start
    }

    pub fn history(&self) -> &[StateHistoryEntry] {
        &self.history
    }

    /// Move to `label`. Returns the edge, or `None` when unchanged.
    pub fn set_label(&mut self, label: StateLabel, now: DateTime<Utc>) -> Option<StateChange> {
        if label == self.current {
            return None;
        }

        if let Some(last) = self.history.last_mut() {
            last.duration_ms = (now - last.timestamp).num_milliseconds();
        }
        self.history.push(StateHistoryEntry {
            label,
            timestamp: now,
            duration_ms: 0,
        });

        let change = StateChange {
            previous_label: self.current,
            new_label: label,
            timestamp: now,
        };
        self.previous = Some(self.current);
        self.current = label;
        Some(change)
    }

    /// Fold the history into a summary. The open entry contributes 0.
    pub fn session_summary(&self, now: DateTime<Utc>) -> SessionSummary {
        let mut histogram = BTreeMap::new();
        for entry in &self.history {
            *histogram.entry(entry.label).or_insert(0) += entry.duration_ms;
        }

        SessionSummary {
            started_at: self.session_start,
            duration_sec: ((now - self.session_start).num_milliseconds() / 1000).max(0),
            state_histogram: histogram,
            total_states: self.history.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_duration_backfill() {
        let mut tracker = StateTracker::new(at(0));
        assert!(tracker.set_label(StateLabel::Focused, at(1_000)).is_some());
        assert!(tracker.set_label(StateLabel::Distracted, at(4_000)).is_some());

        let history = tracker.history();
        assert_eq!(history[0].duration_ms, 3_000);
        assert_eq!(history[1].duration_ms, 0);
        assert_eq!(tracker.previous(), Some(StateLabel::Focused));
        assert_eq!(tracker.current(), StateLabel::Distracted);
    }

    #[test]
    fn test_repeated_label_is_noop() {
        let mut tracker = StateTracker::new(at(0));
        tracker.set_label(StateLabel::Focused, at(1_000));
        assert!(tracker.set_label(StateLabel::Focused, at(2_000)).is_none());
        assert!(tracker.set_label(StateLabel::Focused, at(3_000)).is_none());
        assert_eq!(tracker.history().len(), 1);
    }

    #[test]
    fn test_initial_neutral_is_not_a_change() {
        let mut tracker = StateTracker::new(at(0));
        assert!(tracker.set_label(StateLabel::Neutral, at(10)).is_none());
        assert!(tracker.history().is_empty());
    }

    #[test]
    fn test_change_carries_edge() {
        let mut tracker = StateTracker::new(at(0));
        let change = tracker.set_label(StateLabel::Idle, at(500)).unwrap();
        assert_eq!(
            change,
            StateChange {
                previous_label: StateLabel::Neutral,
                new_label: StateLabel::Idle,
                timestamp: at(500),
            }
        );
    }

    #[test]
    fn test_session_summary() {
        let mut tracker = StateTracker::new(at(0));
        tracker.set_label(StateLabel::Focused, at(1_000));
        tracker.set_label(StateLabel::Distracted, at(4_000));
        tracker.set_label(StateLabel::Focused, at(6_000));
        tracker.set_label(StateLabel::Idle, at(7_500));

        let summary = tracker.session_summary(at(9_999));
        assert_eq!(summary.duration_sec, 9);
        assert_eq!(summary.total_states, 4);
        assert_eq!(summary.state_histogram.get(&StateLabel::Focused), Some(&4_500));
        assert_eq!(summary.state_histogram.get(&StateLabel::Distracted), Some(&2_000));
        // Open entry is undercounted until superseded.
        assert_eq!(summary.state_histogram.get(&StateLabel::Idle), Some(&0));
    }

    #[test]
    fn test_label_parsing() {
        assert_eq!("Focused".parse::<StateLabel>(), Ok(StateLabel::Focused));
        assert!("sleepy".parse::<StateLabel>().is_err());
        assert_eq!(StateLabel::Distracted.to_string(), "distracted");
    }
}
