//! Session context owning all mutable engine state.
//!
//! A [`Session`] is created when monitoring starts and consumed by
//! [`Session::end`]. Everything here is synchronous: a tick reads a snapshot,
//! classifies, records the edge and returns a [`TickPlan`] describing the
//! collaborator work. Results of that work come back through
//! [`Session::apply_report`].

use crate::collector::types::{TabId, TabNotification, TabStatsPayload, WindowId};
use crate::config::Config;
use crate::core::context::{self, Mood, PageContext, TextCues};
use crate::core::rules::{self, ClassificationOptions};
use crate::core::signals::{RawSignals, SignalAggregator, SignalSnapshot};
use crate::core::state::{SessionSummary, StateChange, StateLabel, StateTracker};
use crate::core::tabs::{TabActivityTracker, TabNotifier, WindowStats};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Ambient music mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MusicMode {
    Focus,
    Refocus,
    Calm,
}

impl MusicMode {
    /// Mode driven by a label when no override is active.
    pub fn for_label(label: StateLabel) -> Self {
        match label {
            StateLabel::Focused => MusicMode::Focus,
            StateLabel::Distracted => MusicMode::Refocus,
            StateLabel::Neutral | StateLabel::Idle | StateLabel::Upbeat => MusicMode::Calm,
        }
    }
}

impl fmt::Display for MusicMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MusicMode::Focus => "focus",
            MusicMode::Refocus => "refocus",
            MusicMode::Calm => "calm",
        })
    }
}

impl FromStr for MusicMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "focus" => Ok(MusicMode::Focus),
            "refocus" => Ok(MusicMode::Refocus),
            "calm" => Ok(MusicMode::Calm),
            other => Err(format!("unknown music mode: {other}")),
        }
    }
}

/// Manual mode override.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeOverride {
    #[default]
    Auto,
    Fixed(MusicMode),
}

/// What caused a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickTrigger {
    Startup,
    Interval,
    Queued,
    TabActivity,
    TabSwitch,
    TabBurst,
    PageContext,
    TypedCues,
    Manual,
}

impl fmt::Display for TickTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TickTrigger::Startup => "startup",
            TickTrigger::Interval => "interval",
            TickTrigger::Queued => "queued",
            TickTrigger::TabActivity => "tab-activity",
            TickTrigger::TabSwitch => "tab-switch",
            TickTrigger::TabBurst => "tab-burst",
            TickTrigger::PageContext => "page-context",
            TickTrigger::TypedCues => "typed-cues",
            TickTrigger::Manual => "manual",
        })
    }
}

/// Voice coach line kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoachCue {
    Celebrate,
    Nudge,
}

impl CoachCue {
    pub fn line(&self) -> &'static str {
        match self {
            CoachCue::Celebrate => "Nice, back in flow. Holding steady.",
            CoachCue::Nudge => "Let's pick one tab and settle in. I'll cue focus music.",
        }
    }
}

const MAX_COOLDOWN_SECS: u64 = 24 * 60 * 60;

/// Rate-limits coach lines.
#[derive(Debug, Clone)]
pub struct VoiceCoach {
    enabled: bool,
    cooldown: Duration,
    last_line: Option<DateTime<Utc>>,
}

impl VoiceCoach {
    pub fn new(enabled: bool, cooldown_secs: u64) -> Self {
        Self {
            enabled,
            cooldown: Duration::seconds(cooldown_secs.min(MAX_COOLDOWN_SECS) as i64),
            last_line: None,
        }
    }

    /// Line to speak for `cue`, or `None` if disabled or cooling down.
    pub fn cue(&mut self, cue: CoachCue, now: DateTime<Utc>) -> Option<&'static str> {
        if !self.enabled {
            return None;
        }
        if let Some(last) = self.last_line {
            if now - last < self.cooldown {
                return None;
            }
        }
        self.last_line = Some(now);
        Some(cue.line())
    }
}

/// Inputs handed to message generators. A copy; never a live reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContext {
    pub label: StateLabel,
    pub raw: RawSignals,
    pub page: Option<PageContext>,
    pub cues: Option<TextCues>,
}

/// Request to (re)start ambient music.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicRequest {
    pub mode: MusicMode,
    pub label: StateLabel,
    pub signals: SignalSnapshot,
    pub page: Option<PageContext>,
    pub cues: Option<TextCues>,
    pub page_signature: String,
    pub cue_signature: String,
}

/// Collaborator work produced by a tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchJob {
    pub message: Option<MessageContext>,
    pub coach_line: Option<&'static str>,
    pub music: Option<MusicRequest>,
}

impl DispatchJob {
    pub fn is_empty(&self) -> bool {
        self.message.is_none() && self.coach_line.is_none() && self.music.is_none()
    }
}

/// Result of one tick's synchronous part.
#[derive(Debug, Clone)]
pub struct TickPlan {
    pub trigger: TickTrigger,
    pub signals: SignalSnapshot,
    pub label: StateLabel,
    pub change: Option<StateChange>,
    pub job: DispatchJob,
}

/// Outcome of a music request.
#[derive(Debug, Clone, PartialEq)]
pub struct MusicOutcome {
    pub mode: MusicMode,
    pub played: bool,
    pub page_signature: String,
    pub cue_signature: String,
}

/// Results of collaborator work, applied back onto the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    pub message: Option<String>,
    pub music: Option<MusicOutcome>,
}

/// `GET_STATE` answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateReport {
    pub label: StateLabel,
    pub is_playing: bool,
    pub raw: RawSignals,
    pub current_mode: Option<MusicMode>,
    pub mode_override: ModeOverride,
    pub status_message: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct Playback {
    is_playing: bool,
    paused: bool,
    current_mode: Option<MusicMode>,
    last_page_signature: String,
    last_cue_signature: String,
    last_status_message: Option<String>,
}

/// Owns the tab tracker, aggregator, state history and playback state.
pub struct Session {
    id: Uuid,
    options: ClassificationOptions,
    allow_page_context: bool,
    allow_typed_cues: bool,
    tabs: TabActivityTracker,
    signals: SignalAggregator,
    state: StateTracker,
    coach: VoiceCoach,
    playback: Playback,
    mode_override: ModeOverride,
    latest_page: Option<PageContext>,
    latest_cues: Option<TextCues>,
    pending_coach: Option<CoachCue>,
}

impl Session {
    /// Start a session at `now`.
    pub fn new(config: &Config, now: DateTime<Utc>) -> Self {
        let throttle = i64::try_from(config.pointer_throttle_ms).unwrap_or(i64::MAX);
        Self {
            id: Uuid::new_v4(),
            options: config.effective_options(),
            allow_page_context: config.allow_page_context,
            allow_typed_cues: config.allow_typed_cues,
            tabs: TabActivityTracker::new(),
            signals: SignalAggregator::with_throttle(now, throttle),
            state: StateTracker::new(now),
            coach: VoiceCoach::new(config.voice_coach.enabled, config.voice_coach.cooldown_secs),
            playback: Playback::default(),
            mode_override: ModeOverride::Auto,
            latest_page: None,
            latest_cues: None,
            pending_coach: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn label(&self) -> StateLabel {
        self.state.current()
    }

    pub fn options(&self) -> &ClassificationOptions {
        &self.options
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_playing
    }

    pub fn on_key(&mut self, now: DateTime<Utc>) {
        self.signals.on_key_activity(now);
    }

    pub fn on_pointer(&mut self, now: DateTime<Utc>) -> bool {
        self.signals.on_pointer_activity(now)
    }

    pub fn on_tab_stats(&mut self, payload: &TabStatsPayload) {
        self.signals.on_tab_stats_update(payload);
    }

    /// Record a tab activation in the tracker.
    pub fn record_tab_activation(
        &mut self,
        window_id: WindowId,
        tab_id: TabId,
        now: DateTime<Utc>,
        notifier: &dyn TabNotifier,
    ) -> WindowStats {
        self.tabs.record_activation(window_id, tab_id, now, notifier)
    }

    /// Apply a tab notification. Bursts queue a coach nudge.
    pub fn on_tab_notice(&mut self, notice: &TabNotification) {
        self.signals.on_tab_stats_update(&notice.to_payload());
        if notice.is_burst() {
            self.pending_coach = Some(CoachCue::Nudge);
        }
    }

    /// Store page context. Returns whether it was accepted.
    pub fn set_page_context(&mut self, page: PageContext) -> bool {
        if !self.allow_page_context {
            return false;
        }
        self.latest_page = Some(page);
        true
    }

    /// Replace typed cues. Returns whether their signature changed.
    pub fn set_cues(&mut self, cues: TextCues) -> bool {
        let cues = if self.allow_typed_cues {
            cues
        } else {
            TextCues::default()
        };
        let before = context::cue_signature(self.latest_cues.as_ref());
        self.latest_cues = Some(cues);
        before != context::cue_signature(self.latest_cues.as_ref())
    }

    /// Scan typed text for cues.
    pub fn set_typed_text(&mut self, text: &str) -> bool {
        self.set_cues(context::extract_cues(text))
    }

    pub fn set_mode_override(&mut self, mode: ModeOverride) {
        self.mode_override = mode;
    }

    pub fn mode_override(&self) -> ModeOverride {
        self.mode_override
    }

    /// Resume music; the next tick restarts playback.
    pub fn resume_music(&mut self) {
        self.playback.paused = false;
        self.playback.is_playing = false;
    }

    /// Stop music until [`Session::resume_music`].
    pub fn pause_music(&mut self) {
        self.playback.paused = true;
        self.playback.is_playing = false;
    }

    fn desired_mode(&self) -> MusicMode {
        match self.mode_override {
            ModeOverride::Fixed(mode) => mode,
            ModeOverride::Auto => MusicMode::for_label(self.state.current()),
        }
    }

    /// Label used for theming and messages.
    pub fn presentation_label(&self) -> StateLabel {
        presentation_label(self.state.current(), self.latest_cues.as_ref())
    }

    /// Snapshot of the aggregated signals.
    pub fn signals(&self, now: DateTime<Utc>) -> SignalSnapshot {
        self.signals.compute_signals(now)
    }

    /// Run one tick: aggregate, classify, transition, plan collaborator work.
    pub fn run_tick(&mut self, trigger: TickTrigger, now: DateTime<Utc>) -> TickPlan {
        let signals = self.signals.compute_signals(now);
        let label = rules::derive_label(&signals, &self.options);
        let change = self.state.set_label(label, now);

        let mut job = DispatchJob::default();

        let mut coach = self.pending_coach.take();
        if change.is_some() {
            job.message = Some(MessageContext {
                label: self.presentation_label(),
                raw: self.signals.raw(),
                page: self.latest_page.clone(),
                cues: self.latest_cues,
            });
            match label {
                StateLabel::Focused => coach = Some(CoachCue::Celebrate),
                StateLabel::Distracted => coach = Some(CoachCue::Nudge),
                _ => {}
            }
        }
        job.coach_line = coach.and_then(|cue| self.coach.cue(cue, now));

        let page_signature = context::page_signature(self.latest_page.as_ref());
        let cue_signature = context::cue_signature(self.latest_cues.as_ref());
        let mode = self.desired_mode();
        let refresh = !self.playback.paused
            && (!self.playback.is_playing
                || change.is_some()
                || self.playback.current_mode != Some(mode)
                || page_signature != self.playback.last_page_signature
                || cue_signature != self.playback.last_cue_signature);

        if refresh {
            job.music = Some(MusicRequest {
                mode,
                label,
                signals,
                page: self.latest_page.clone(),
                cues: self.latest_cues,
                page_signature,
                cue_signature,
            });
        }

        TickPlan {
            trigger,
            signals,
            label,
            change,
            job,
        }
    }

    /// Apply collaborator results.
    pub fn apply_report(&mut self, report: DispatchReport) {
        if let Some(message) = report.message {
            self.playback.last_status_message = Some(message);
        }
        if let Some(outcome) = report.music {
            if outcome.played && !self.playback.paused {
                self.playback.is_playing = true;
                self.playback.current_mode = Some(outcome.mode);
                self.playback.last_page_signature = outcome.page_signature;
                self.playback.last_cue_signature = outcome.cue_signature;
            } else if !outcome.played {
                self.playback.is_playing = false;
            }
        }
    }

    /// Answer a `GET_STATE` query.
    pub fn report(&self) -> StateReport {
        StateReport {
            label: self.state.current(),
            is_playing: self.playback.is_playing,
            raw: self.signals.raw(),
            current_mode: self.playback.current_mode,
            mode_override: self.mode_override,
            status_message: self.playback.last_status_message.clone(),
        }
    }

    pub fn summary(&self, now: DateTime<Utc>) -> SessionSummary {
        self.state.session_summary(now)
    }

    /// Tear the session down and return its summary.
    pub fn end(self, now: DateTime<Utc>) -> SessionSummary {
        tracing::info!(session = %self.id, "session ended");
        self.state.session_summary(now)
    }
}

/// `Upbeat` replaces focused/neutral when typed cues report a happy mood.
pub fn presentation_label(label: StateLabel, cues: Option<&TextCues>) -> StateLabel {
    let happy = cues.and_then(|c| c.mood) == Some(Mood::Happy);
    match label {
        StateLabel::Focused | StateLabel::Neutral if happy => StateLabel::Upbeat,
        other => other,
    }
}
