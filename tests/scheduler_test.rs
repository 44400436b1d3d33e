//! Integration tests for the tick scheduler

use async_trait::async_trait;
use hmb_agent::config::Config;
use hmb_agent::core::{PageContext, StateLabel};
use hmb_agent::engine::{
    CollaboratorError, Dispatcher, ModeOverride, MusicBackend, MusicMode, MusicRequest,
    SchedulerHandle, SchedulerOptions, TickScheduler, VoiceBackend,
};
use hmb_agent::transparency::{create_shared_log, SharedTransparencyLog};
use hmb_agent::SessionSummary;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Default)]
struct RecordingMusic {
    modes: Mutex<Vec<MusicMode>>,
    stops: Mutex<u32>,
}

#[async_trait]
impl MusicBackend for RecordingMusic {
    async fn play(&self, request: &MusicRequest) -> Result<(), CollaboratorError> {
        self.modes.lock().unwrap().push(request.mode);
        Ok(())
    }

    async fn stop(&self) -> Result<(), CollaboratorError> {
        *self.stops.lock().unwrap() += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

#[derive(Default)]
struct RecordingVoice {
    lines: Mutex<Vec<String>>,
}

#[async_trait]
impl VoiceBackend for RecordingVoice {
    async fn speak(&self, text: &str) -> Result<(), CollaboratorError> {
        self.lines.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Takes a while to start and tracks how many plays overlap.
#[derive(Default)]
struct SlowMusic {
    active: AtomicUsize,
    max_active: AtomicUsize,
    plays: AtomicUsize,
}

#[async_trait]
impl MusicBackend for SlowMusic {
    async fn play(&self, _: &MusicRequest) -> Result<(), CollaboratorError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        self.plays.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), CollaboratorError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "slow"
    }
}

struct HangingMusic;

#[async_trait]
impl MusicBackend for HangingMusic {
    async fn play(&self, _: &MusicRequest) -> Result<(), CollaboratorError> {
        std::future::pending().await
    }

    async fn stop(&self) -> Result<(), CollaboratorError> {
        std::future::pending().await
    }

    fn name(&self) -> &str {
        "hanging"
    }
}

struct PanickingMusic;

#[async_trait]
impl MusicBackend for PanickingMusic {
    async fn play(&self, _: &MusicRequest) -> Result<(), CollaboratorError> {
        panic!("music backend crashed");
    }

    async fn stop(&self) -> Result<(), CollaboratorError> {
        panic!("music backend crashed");
    }

    fn name(&self) -> &str {
        "panicking"
    }
}

struct Harness {
    _runtime: tokio::runtime::Runtime,
    handle: SchedulerHandle,
    worker: JoinHandle<SessionSummary>,
    log: SharedTransparencyLog,
}

impl Harness {
    fn start(config: Config, dispatcher: Dispatcher) -> Self {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let log = create_shared_log();
        let (scheduler, handle) = TickScheduler::new(&config, dispatcher, runtime.handle().clone());
        let worker = scheduler
            .with_options(SchedulerOptions {
                tick_interval: Duration::from_millis(50),
                queued_tick_delay: Duration::from_millis(20),
                dispatch_timeout: Duration::from_millis(150),
                reply_timeout: Duration::from_secs(1),
            })
            .with_transparency(log.clone())
            .spawn()
            .expect("scheduler thread");

        Self {
            _runtime: runtime,
            handle,
            worker,
            log,
        }
    }

    fn stop(self) -> SessionSummary {
        self.handle.shutdown().expect("shutdown");
        self.worker.join().expect("scheduler thread panicked")
    }
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

fn quiet_coach() -> Config {
    let mut config = Config::default();
    config.voice_coach.cooldown_secs = 0;
    config
}

#[test]
fn test_tab_burst_reaches_distracted() {
    let music = Arc::new(RecordingMusic::default());
    let voice = Arc::new(RecordingVoice::default());
    let dispatcher = Dispatcher::new(Duration::from_secs(1))
        .with_music(music.clone())
        .with_voice(voice.clone());
    let harness = Harness::start(quiet_coach(), dispatcher);

    let changes = harness.handle.subscribe().unwrap();
    for tab in 0..6 {
        harness.handle.key().unwrap();
        harness.handle.tab_activated(1, tab).unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(3);
    let mut reached = false;
    while let Ok(change) = changes.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        if change.new_label == StateLabel::Distracted {
            reached = true;
            break;
        }
    }
    assert!(reached, "never classified as distracted");

    // Notices of later activations may still be queued behind the change.
    assert!(wait_until(Duration::from_secs(2), || {
        harness
            .handle
            .get_state()
            .map(|s| s.label == StateLabel::Distracted && s.raw.tab_stats.last60 == 6)
            .unwrap_or(false)
    }));

    assert!(wait_until(Duration::from_secs(2), || {
        music.modes.lock().unwrap().contains(&MusicMode::Refocus)
    }));
    assert!(wait_until(Duration::from_secs(2), || {
        voice
            .lines
            .lock()
            .unwrap()
            .iter()
            .any(|line| line.starts_with("Let's pick one tab"))
    }));

    let summary = harness.stop();
    assert!(summary.total_states >= 2);
}

#[test]
fn test_get_state_reports_playback() {
    let music = Arc::new(RecordingMusic::default());
    let dispatcher = Dispatcher::new(Duration::from_secs(1)).with_music(music.clone());
    let harness = Harness::start(Config::default(), dispatcher);

    assert!(wait_until(Duration::from_secs(2), || {
        harness.handle.get_state().map(|s| s.is_playing).unwrap_or(false)
    }));

    harness.handle.pause_music().unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        *music.stops.lock().unwrap() == 1
    }));
    let state = harness.handle.get_state().unwrap();
    assert!(!state.is_playing);

    // Paused music stays off across ticks.
    let played = music.modes.lock().unwrap().len();
    thread::sleep(Duration::from_millis(200));
    assert_eq!(music.modes.lock().unwrap().len(), played);

    harness.handle.play_music().unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        harness.handle.get_state().map(|s| s.is_playing).unwrap_or(false)
    }));

    harness.stop();
}

#[test]
fn test_manual_override_switches_music() {
    let music = Arc::new(RecordingMusic::default());
    let dispatcher = Dispatcher::new(Duration::from_secs(1)).with_music(music.clone());
    let harness = Harness::start(Config::default(), dispatcher);

    harness
        .handle
        .set_mode(ModeOverride::Fixed(MusicMode::Calm))
        .unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        music.modes.lock().unwrap().last() == Some(&MusicMode::Calm)
    }));
    assert!(wait_until(Duration::from_secs(2), || {
        harness
            .handle
            .get_state()
            .map(|s| s.current_mode == Some(MusicMode::Calm))
            .unwrap_or(false)
    }));

    let state = harness.handle.get_state().unwrap();
    assert_eq!(state.mode_override, ModeOverride::Fixed(MusicMode::Calm));

    harness.stop();
}

#[test]
fn test_hung_collaborator_does_not_block_ticks() {
    let dispatcher = Dispatcher::new(Duration::from_secs(30)).with_music(Arc::new(HangingMusic));
    let harness = Harness::start(Config::default(), dispatcher);

    let started = Instant::now();
    let state = harness.handle.get_state().unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!state.is_playing);

    assert!(wait_until(Duration::from_secs(3), || {
        harness.log.stats().ticks_run >= 3
    }));

    // Pausing with a hung stop call must not stall the loop either.
    harness.handle.pause_music().unwrap();
    assert!(harness.handle.get_state().is_ok());

    harness.stop();
}

#[test]
fn test_ticks_never_overlap_under_trigger_storm() {
    let music = Arc::new(SlowMusic::default());
    let dispatcher = Dispatcher::new(Duration::from_secs(1)).with_music(music.clone());
    let harness = Harness::start(Config::default(), dispatcher);

    // Every page change asks for a music refresh.
    for n in 0..20 {
        harness
            .handle
            .page_context(PageContext {
                host: "example.com".to_string(),
                title: format!("Page {n}"),
                snippet: String::new(),
            })
            .unwrap();
    }

    assert!(wait_until(Duration::from_secs(3), || {
        harness.handle.get_state().map(|s| s.is_playing).unwrap_or(false)
            && music.active.load(Ordering::SeqCst) == 0
    }));
    thread::sleep(Duration::from_millis(200));

    assert_eq!(music.max_active.load(Ordering::SeqCst), 1);
    assert!(music.plays.load(Ordering::SeqCst) < 20);
    assert_eq!(harness.log.stats().context_events, 20);

    harness.stop();
}

#[test]
fn test_panicking_collaborator_does_not_stall_ticks() {
    let dispatcher = Dispatcher::new(Duration::from_secs(1)).with_music(Arc::new(PanickingMusic));
    let harness = Harness::start(quiet_coach(), dispatcher);

    assert!(wait_until(Duration::from_secs(3), || {
        harness.log.stats().ticks_run >= 10
    }));

    // Classification keeps running after the crashes.
    for tab in 0..6 {
        harness.handle.key().unwrap();
        harness.handle.tab_activated(1, tab).unwrap();
    }
    assert!(wait_until(Duration::from_secs(2), || {
        harness
            .handle
            .get_state()
            .map(|s| s.label == StateLabel::Distracted && !s.is_playing)
            .unwrap_or(false)
    }));

    harness.stop();
}

#[test]
fn test_scheduler_stops_when_handles_are_dropped() {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let config = Config::default();
    let dispatcher = Dispatcher::new(Duration::from_secs(1));
    let (scheduler, handle) = TickScheduler::new(&config, dispatcher, runtime.handle().clone());
    let worker = scheduler.spawn().expect("scheduler thread");

    let second = handle.clone();
    handle.tab_activated(1, 1).unwrap();
    drop(handle);
    assert!(second.get_state().is_ok());
    drop(second);

    assert!(wait_until(Duration::from_secs(2), || worker.is_finished()));
    assert!(worker.join().is_ok());
}
