//! Core behavioral-inference functionality for the HMB agent.
//!
//! This module contains:
//! - Windowed tab-activation statistics
//! - Signal aggregation into immutable snapshots
//! - The rule-based attention classifier
//! - Label transition tracking and session summaries
//! - Page and typed-text context used as refresh triggers

pub mod context;
pub mod rules;
pub mod signals;
pub mod state;
pub mod tabs;

// Re-export commonly used types
pub use context::{extract_cues, Mood, PageContext, TextCues};
pub use rules::{derive_label, is_distracted, is_focused, is_idle, ClassificationOptions};
pub use signals::{RawSignals, SignalAggregator, SignalSnapshot, TabStats};
pub use state::{SessionSummary, StateChange, StateHistoryEntry, StateLabel, StateTracker};
pub use tabs::{DeliveryError, TabActivityTracker, TabCounts, TabNotifier, WindowStats};
