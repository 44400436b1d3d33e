//! Tick scheduler.
//!
//! One thread owns the [`Session`] and drains a single `select!` over:
//!
//! - the event feed (input, tab, context and control events)
//! - tab notices raised by the session's own tracker
//! - the periodic ticker
//! - completion reports from dispatched collaborator work
//! - the deferred queued tick
//!
//! Collaborator work runs on a tokio runtime and reports back over a channel,
//! so every mutation of session state happens on the scheduler thread. A tick
//! is in flight from its synchronous part until its report arrives; requests
//! made meanwhile are coalesced by the [`TickGate`]. Every dispatched tick
//! reports back, even when a collaborator hangs or panics.
//!
//! The loop ends on `shutdown()` or once every [`SchedulerHandle`] is dropped.

use crate::collector::types::{
    Control, InputEvent, TabId, TabNotification, TabStatsPayload, WindowId,
};
use crate::collector::{ChannelNotifier, EventFeed, FeedSender};
use crate::config::Config;
use crate::core::context::{PageContext, TextCues};
use crate::core::state::{SessionSummary, StateChange};
use crate::core::tabs::DeliveryError;
use crate::engine::dispatch::Dispatcher;
use crate::engine::gate::TickGate;
use crate::engine::session::{
    DispatchReport, ModeOverride, MusicOutcome, Session, StateReport, TickTrigger,
};
use crate::transparency::{create_shared_log, SharedTransparencyLog};
use chrono::Utc;
use crossbeam_channel::{select, unbounded, Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Shortest accepted tick interval.
const MIN_TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Capacity of each state-change subscription.
const SUBSCRIPTION_CAPACITY: usize = 64;

/// Scheduler errors seen by handle users.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler has stopped")]
    Stopped,
    #[error("event queue is full")]
    Busy,
    #[error("no reply within {0:?}")]
    NoReply(Duration),
}

impl From<DeliveryError> for SchedulerError {
    fn from(e: DeliveryError) -> Self {
        match e {
            DeliveryError::Closed => SchedulerError::Stopped,
            DeliveryError::Full => SchedulerError::Busy,
        }
    }
}

/// Timing knobs for the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub tick_interval: Duration,
    pub queued_tick_delay: Duration,
    pub dispatch_timeout: Duration,
    pub reply_timeout: Duration,
}

impl SchedulerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tick_interval: config.tick_interval,
            queued_tick_delay: Duration::from_millis(config.queued_tick_delay_ms),
            dispatch_timeout: config.dispatch_timeout,
            reply_timeout: Duration::from_secs(1),
        }
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

enum Step {
    Event(InputEvent),
    Tick(TickTrigger),
    Done(DispatchReport),
    Deferred,
    Stop,
}

/// Owns the session and runs the event/tick loop.
pub struct TickScheduler {
    session: Session,
    gate: TickGate,
    options: SchedulerOptions,
    events: Receiver<InputEvent>,
    notifier: ChannelNotifier,
    notices: Receiver<TabNotification>,
    dispatcher: Arc<Dispatcher>,
    runtime: tokio::runtime::Handle,
    done_tx: Sender<DispatchReport>,
    done_rx: Receiver<DispatchReport>,
    deferred_at: Option<Instant>,
    subscribers: Vec<Sender<StateChange>>,
    log: SharedTransparencyLog,
}

impl TickScheduler {
    /// Build a scheduler and the handle that feeds it.
    pub fn new(
        config: &Config,
        dispatcher: Dispatcher,
        runtime: tokio::runtime::Handle,
    ) -> (Self, SchedulerHandle) {
        let feed = EventFeed::new(config.feed_capacity);
        let sender = feed.sender();
        let events = feed.into_receiver();
        let (notifier, notices) = ChannelNotifier::channel(config.feed_capacity);
        let (done_tx, done_rx) = unbounded();
        let options = SchedulerOptions::from_config(config);

        let scheduler = Self {
            session: Session::new(config, Utc::now()),
            gate: TickGate::new(),
            options,
            events,
            notifier,
            notices,
            dispatcher: Arc::new(dispatcher),
            runtime,
            done_tx,
            done_rx,
            deferred_at: None,
            subscribers: Vec::new(),
            log: create_shared_log(),
        };
        let handle = SchedulerHandle {
            feed: sender,
            reply_timeout: options.reply_timeout,
        };
        (scheduler, handle)
    }

    /// Override timing. The handle keeps the reply timeout it was built with.
    pub fn with_options(mut self, options: SchedulerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_transparency(mut self, log: SharedTransparencyLog) -> Self {
        self.log = log;
        self
    }

    pub fn transparency(&self) -> SharedTransparencyLog {
        Arc::clone(&self.log)
    }

    /// Run the loop on a dedicated thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<SessionSummary>> {
        thread::Builder::new()
            .name("hmb-scheduler".to_string())
            .spawn(move || self.run())
    }

    /// Run until shutdown and return the session summary.
    pub fn run(mut self) -> SessionSummary {
        let events = self.events.clone();
        let notices = self.notices.clone();
        let done = self.done_rx.clone();
        let ticker = crossbeam_channel::tick(self.options.tick_interval.max(MIN_TICK_INTERVAL));

        tracing::info!(session = %self.session.id(), "scheduler started");
        self.request_tick(TickTrigger::Startup);

        loop {
            let deferred = match self.deferred_at {
                Some(at) => crossbeam_channel::at(at),
                None => crossbeam_channel::never(),
            };

            let step = select! {
                recv(events) -> event => match event {
                    Ok(event) => Step::Event(event),
                    Err(_) => Step::Stop,
                },
                recv(notices) -> notice => match notice {
                    Ok(notice) => Step::Event(InputEvent::TabNotice(notice)),
                    Err(_) => Step::Stop,
                },
                recv(ticker) -> _ => Step::Tick(TickTrigger::Interval),
                recv(done) -> report => match report {
                    Ok(report) => Step::Done(report),
                    Err(_) => Step::Stop,
                },
                recv(deferred) -> _ => Step::Deferred,
            };

            match step {
                Step::Event(event) => {
                    if !self.handle_event(event) {
                        break;
                    }
                }
                Step::Tick(trigger) => self.request_tick(trigger),
                Step::Done(report) => self.finish_tick(report),
                Step::Deferred => {
                    self.deferred_at = None;
                    self.request_tick(TickTrigger::Queued);
                }
                Step::Stop => break,
            }
        }

        tracing::info!("scheduler stopping");
        self.session.end(Utc::now())
    }

    /// Apply one event. Returns `false` on shutdown.
    fn handle_event(&mut self, event: InputEvent) -> bool {
        tracing::trace!(kind = event.kind(), "event");
        match event {
            InputEvent::KeyActivity { timestamp } => {
                self.session.on_key(timestamp);
                self.log.record_keyboard_event();
            }
            InputEvent::PointerActivity { timestamp } => {
                if self.session.on_pointer(timestamp) {
                    self.log.record_pointer_event();
                }
            }
            InputEvent::TabActivated {
                window_id,
                tab_id,
                timestamp,
            } => {
                self.log.record_tab_event();
                self.session
                    .record_tab_activation(window_id, tab_id, timestamp, &self.notifier);
            }
            InputEvent::TabNotice(notice) => {
                self.session.on_tab_notice(&notice);
                self.request_tick(trigger_for(&notice));
            }
            InputEvent::TabStats(payload) => {
                self.log.record_tab_event();
                self.session.on_tab_stats(&payload);
                self.request_tick(TickTrigger::TabActivity);
            }
            InputEvent::PageContext(page) => {
                if self.session.set_page_context(page) {
                    self.log.record_context_event();
                    self.request_tick(TickTrigger::PageContext);
                }
            }
            InputEvent::TypedText(text) => {
                if self.session.set_typed_text(&text) {
                    self.log.record_context_event();
                    self.request_tick(TickTrigger::TypedCues);
                }
            }
            InputEvent::TextCues(cues) => {
                if self.session.set_cues(cues) {
                    self.log.record_context_event();
                    self.request_tick(TickTrigger::TypedCues);
                }
            }
            InputEvent::Control(control) => return self.handle_control(control),
        }
        true
    }

    fn handle_control(&mut self, control: Control) -> bool {
        match control {
            Control::GetState(reply) => {
                let _ = reply.send(self.session.report());
            }
            Control::SessionSummary(reply) => {
                let _ = reply.send(self.session.summary(Utc::now()));
            }
            Control::SetMode(mode) => {
                tracing::info!(?mode, "mode override");
                self.session.set_mode_override(mode);
                self.request_tick(TickTrigger::Manual);
            }
            Control::PlayMusic => {
                self.session.resume_music();
                self.request_tick(TickTrigger::Manual);
            }
            Control::PauseMusic => {
                self.session.pause_music();
                let dispatcher = Arc::clone(&self.dispatcher);
                self.runtime.spawn(async move { dispatcher.stop_music().await });
            }
            Control::Subscribe(subscriber) => self.subscribers.push(subscriber),
            Control::Shutdown => return false,
        }
        true
    }

    fn request_tick(&mut self, trigger: TickTrigger) {
        if !self.gate.try_begin() {
            tracing::debug!(%trigger, "tick in flight, queued");
            return;
        }

        let plan = self.session.run_tick(trigger, Utc::now());
        self.log.record_tick();
        tracing::debug!(%trigger, label = %plan.label, "tick");

        if let Some(change) = plan.change {
            self.log.record_transition();
            tracing::info!(
                from = %change.previous_label,
                to = %change.new_label,
                %trigger,
                "state changed"
            );
            self.broadcast(change);
        }

        if plan.job.is_empty() {
            self.finish_tick(DispatchReport::default());
            return;
        }

        let job = plan.job;
        let requested = job.music.as_ref().map(|m| MusicOutcome {
            mode: m.mode,
            played: false,
            page_signature: m.page_signature.clone(),
            cue_signature: m.cue_signature.clone(),
        });
        let dispatcher = Arc::clone(&self.dispatcher);
        let done = self.done_tx.clone();
        let limit = self.options.dispatch_timeout;

        self.runtime.spawn(async move {
            let mut work = tokio::spawn(dispatcher.run(job));
            let report = match tokio::time::timeout(limit, &mut work).await {
                Ok(Ok(report)) => report,
                Ok(Err(e)) => {
                    tracing::warn!("collaborator dispatch failed: {e}");
                    DispatchReport {
                        message: None,
                        music: requested,
                    }
                }
                Err(_) => {
                    work.abort();
                    tracing::warn!(?limit, "collaborator dispatch timed out");
                    DispatchReport {
                        message: None,
                        music: requested,
                    }
                }
            };
            let _ = done.send(report);
        });
    }

    fn finish_tick(&mut self, report: DispatchReport) {
        self.session.apply_report(report);
        if self.gate.finish() {
            self.deferred_at = Some(Instant::now() + self.options.queued_tick_delay);
        }
    }

    fn broadcast(&mut self, change: StateChange) {
        self.subscribers.retain(|subscriber| match subscriber.try_send(change) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!("state subscriber lagging, change dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

fn trigger_for(notice: &TabNotification) -> TickTrigger {
    match notice {
        TabNotification::TabActivity { .. } => TickTrigger::TabActivity,
        TabNotification::TabSwitched { .. } => TickTrigger::TabSwitch,
        TabNotification::TabBurst { .. } => TickTrigger::TabBurst,
    }
}

/// Cloneable producer side of a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    feed: FeedSender,
    reply_timeout: Duration,
}

impl SchedulerHandle {
    pub fn send(&self, event: InputEvent) -> Result<(), SchedulerError> {
        Ok(self.feed.push(event)?)
    }

    pub fn key(&self) -> Result<(), SchedulerError> {
        self.send(InputEvent::key())
    }

    pub fn pointer(&self) -> Result<(), SchedulerError> {
        self.send(InputEvent::pointer())
    }

    pub fn tab_activated(&self, window_id: WindowId, tab_id: TabId) -> Result<(), SchedulerError> {
        self.send(InputEvent::tab_activated(window_id, tab_id))
    }

    pub fn tab_stats(&self, payload: TabStatsPayload) -> Result<(), SchedulerError> {
        self.send(InputEvent::TabStats(payload))
    }

    pub fn page_context(&self, page: PageContext) -> Result<(), SchedulerError> {
        self.send(InputEvent::PageContext(page))
    }

    pub fn typed_text(&self, text: impl Into<String>) -> Result<(), SchedulerError> {
        self.send(InputEvent::TypedText(text.into()))
    }

    pub fn text_cues(&self, cues: TextCues) -> Result<(), SchedulerError> {
        self.send(InputEvent::TextCues(cues))
    }

    pub fn set_mode(&self, mode: ModeOverride) -> Result<(), SchedulerError> {
        self.send(InputEvent::Control(Control::SetMode(mode)))
    }

    pub fn play_music(&self) -> Result<(), SchedulerError> {
        self.send(InputEvent::Control(Control::PlayMusic))
    }

    pub fn pause_music(&self) -> Result<(), SchedulerError> {
        self.send(InputEvent::Control(Control::PauseMusic))
    }

    /// Subscribe to label edges.
    pub fn subscribe(&self) -> Result<Receiver<StateChange>, SchedulerError> {
        let (tx, rx) = crossbeam_channel::bounded(SUBSCRIPTION_CAPACITY);
        self.send(InputEvent::Control(Control::Subscribe(tx)))?;
        Ok(rx)
    }

    /// `GET_STATE`: label, playback flag and raw signals.
    pub fn get_state(&self) -> Result<StateReport, SchedulerError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.send(InputEvent::Control(Control::GetState(tx)))?;
        rx.recv_timeout(self.reply_timeout)
            .map_err(|_| SchedulerError::NoReply(self.reply_timeout))
    }

    pub fn session_summary(&self) -> Result<SessionSummary, SchedulerError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.send(InputEvent::Control(Control::SessionSummary(tx)))?;
        rx.recv_timeout(self.reply_timeout)
            .map_err(|_| SchedulerError::NoReply(self.reply_timeout))
    }

    pub fn shutdown(&self) -> Result<(), SchedulerError> {
        self.send(InputEvent::Control(Control::Shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_errors_map_to_scheduler_errors() {
        assert_eq!(SchedulerError::from(DeliveryError::Closed), SchedulerError::Stopped);
        assert_eq!(SchedulerError::from(DeliveryError::Full), SchedulerError::Busy);
    }

    #[test]
    fn test_options_follow_config() {
        let config = Config {
            queued_tick_delay_ms: 250,
            ..Config::default()
        };
        let options = SchedulerOptions::from_config(&config);
        assert_eq!(options.queued_tick_delay, Duration::from_millis(250));
        assert_eq!(options.tick_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_notice_triggers() {
        let notice = TabNotification::TabSwitched {
            count: 1,
            counts: Default::default(),
            timestamp: Utc::now(),
        };
        assert_eq!(trigger_for(&notice), TickTrigger::TabSwitch);
    }
}
