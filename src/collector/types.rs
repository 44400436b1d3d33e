//! Privacy-preserving event types for the HMB agent.
//!
//! These types capture ONLY timing information and tab identifiers - never
//! key content, cursor coordinates or page text beyond the opt-in context.

use crate::core::context::{PageContext, TextCues};
use crate::core::state::{SessionSummary, StateLabel};
use crate::core::tabs::TabCounts;
use crate::engine::session::{ModeOverride, StateReport};
use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

/// Browser window identifier.
pub type WindowId = i64;

/// Browser tab identifier.
pub type TabId = i64;

/// Notification emitted by the tab tracker after every activation.
///
/// The `TabSwitched` shape carries only a raw count and exists for consumers
/// that predate the windowed statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TabNotification {
    #[serde(rename_all = "camelCase")]
    TabActivity {
        counts: TabCounts,
        rate_per_min: f64,
        window_id: WindowId,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    TabSwitched {
        count: u32,
        counts: TabCounts,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    TabBurst {
        count_last60s: u32,
        count_last10s: u32,
        rate_per_min: f64,
        timestamp: DateTime<Utc>,
    },
}

impl TabNotification {
    /// Whether this notification signals a burst of tab switching.
    pub fn is_burst(&self) -> bool {
        matches!(self, TabNotification::TabBurst { .. })
    }

    /// Convert into the loose payload shape consumed by the aggregator.
    pub fn to_payload(&self) -> TabStatsPayload {
        match self {
            TabNotification::TabActivity {
                counts,
                rate_per_min,
                ..
            } => TabStatsPayload {
                counts: Some(LooseCounts::from(*counts)),
                rate_per_min: Some(*rate_per_min),
                ..Default::default()
            },
            TabNotification::TabSwitched { counts, .. } => TabStatsPayload {
                counts: Some(LooseCounts::from(*counts)),
                ..Default::default()
            },
            TabNotification::TabBurst {
                count_last60s,
                count_last10s,
                rate_per_min,
                ..
            } => TabStatsPayload {
                count_last10s: Some(f64::from(*count_last10s)),
                count_last60s: Some(f64::from(*count_last60s)),
                rate_per_min: Some(*rate_per_min),
                ..Default::default()
            },
        }
    }
}

/// Window counts as received from an external message.
///
/// Values are kept as floats so negative or fractional input can be clamped
/// instead of rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LooseCounts {
    pub last10: Option<f64>,
    pub last30: Option<f64>,
    pub last60: Option<f64>,
}

impl From<TabCounts> for LooseCounts {
    fn from(counts: TabCounts) -> Self {
        Self {
            last10: Some(f64::from(counts.last10)),
            last30: Some(f64::from(counts.last30)),
            last60: Some(f64::from(counts.last60)),
        }
    }
}

/// Tab statistics payload with looser invariants than the tracker's own
/// output. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TabStatsPayload {
    pub counts: Option<LooseCounts>,
    pub count_last10s: Option<f64>,
    pub count_last60s: Option<f64>,
    pub rate_per_min: Option<f64>,
}

/// Requests answered by the scheduler loop.
#[derive(Debug)]
pub enum Control {
    GetState(Sender<StateReport>),
    SessionSummary(Sender<SessionSummary>),
    SetMode(ModeOverride),
    PlayMusic,
    PauseMusic,
    Subscribe(Sender<crate::core::state::StateChange>),
    Shutdown,
}

/// Unified event type fed into the scheduler.
#[derive(Debug)]
pub enum InputEvent {
    KeyActivity {
        timestamp: DateTime<Utc>,
    },
    PointerActivity {
        timestamp: DateTime<Utc>,
    },
    TabActivated {
        window_id: WindowId,
        tab_id: TabId,
        timestamp: DateTime<Utc>,
    },
    TabNotice(TabNotification),
    TabStats(TabStatsPayload),
    PageContext(PageContext),
    TypedText(String),
    TextCues(TextCues),
    Control(Control),
}

impl InputEvent {
    pub fn key() -> Self {
        InputEvent::KeyActivity {
            timestamp: Utc::now(),
        }
    }

    pub fn pointer() -> Self {
        InputEvent::PointerActivity {
            timestamp: Utc::now(),
        }
    }

    pub fn tab_activated(window_id: WindowId, tab_id: TabId) -> Self {
        InputEvent::TabActivated {
            window_id,
            tab_id,
            timestamp: Utc::now(),
        }
    }

    /// Short name used in logs and tick triggers.
    pub fn kind(&self) -> &'static str {
        match self {
            InputEvent::KeyActivity { .. } => "key",
            InputEvent::PointerActivity { .. } => "pointer",
            InputEvent::TabActivated { .. } => "tab-activated",
            InputEvent::TabNotice(n) => match n {
                TabNotification::TabActivity { .. } => "tab-activity",
                TabNotification::TabSwitched { .. } => "tab-switch",
                TabNotification::TabBurst { .. } => "tab-burst",
            },
            InputEvent::TabStats(_) => "tab-stats",
            InputEvent::PageContext(_) => "page-context",
            InputEvent::TypedText(_) | InputEvent::TextCues(_) => "typed-cues",
            InputEvent::Control(_) => "control",
        }
    }
}

/// Line-oriented wire messages accepted by the `hmb run` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireMessage {
    Key,
    Pointer,
    #[serde(rename_all = "camelCase")]
    TabActivated {
        window_id: WindowId,
        tab_id: TabId,
    },
    TabActivity(TabStatsPayload),
    PageContext(PageContext),
    TypedText(String),
    SetMode {
        mode: String,
    },
    PlayMusic,
    PauseMusic,
    GetState,
    Summary,
}

/// Label carried by a wire `SET_MODE` request, parsed leniently.
pub fn parse_mode_override(mode: &str) -> Option<ModeOverride> {
    if mode.eq_ignore_ascii_case("auto") {
        return Some(ModeOverride::Auto);
    }
    mode.parse().ok().map(ModeOverride::Fixed)
}

/// Human-readable label for a state, used by the CLI.
pub fn describe_label(label: StateLabel) -> &'static str {
    match label {
        StateLabel::Focused => "Focused",
        StateLabel::Neutral => "Neutral",
        StateLabel::Distracted => "Distracted",
        StateLabel::Idle => "Idle",
        StateLabel::Upbeat => "Upbeat",
    }
}
