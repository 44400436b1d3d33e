//! Privacy-preserving transparency log.
//!
//! Counts what the agent ingested and did, without storing any content:
//! no keys, no coordinates, no page text, no typed text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Transparency counters for the current session.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Number of keystroke notifications ingested
    keyboard_events: AtomicU64,
    /// Number of pointer notifications applied (after throttling)
    pointer_events: AtomicU64,
    /// Number of tab activations and statistics updates
    tab_events: AtomicU64,
    /// Number of page-context and typed-cue updates
    context_events: AtomicU64,
    /// Number of ticks run
    ticks_run: AtomicU64,
    /// Number of label transitions
    transitions: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    pub fn new() -> Self {
        Self {
            keyboard_events: AtomicU64::new(0),
            pointer_events: AtomicU64::new(0),
            tab_events: AtomicU64::new(0),
            context_events: AtomicU64::new(0),
            ticks_run: AtomicU64::new(0),
            transitions: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that accumulates onto counters persisted at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::debug!("could not load previous transparency stats: {e}");
        }

        log
    }

    pub fn record_keyboard_event(&self) {
        self.keyboard_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pointer_event(&self) {
        self.pointer_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tab_event(&self) {
        self.tab_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_context_event(&self) {
        self.context_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick(&self) {
        self.ticks_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transition(&self) {
        self.transitions.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            keyboard_events: self.keyboard_events.load(Ordering::Relaxed),
            pointer_events: self.pointer_events.load(Ordering::Relaxed),
            tab_events: self.tab_events.load(Ordering::Relaxed),
            context_events: self.context_events.load(Ordering::Relaxed),
            ticks_run: self.ticks_run.load(Ordering::Relaxed),
            transitions: self.transitions.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Keyboard events: {}\n\
             - Pointer events: {}\n\
             - Tab events: {}\n\
             - Context updates: {}\n\
             - Ticks run: {}\n\
             - State transitions: {}\n\
             - Session duration: {} seconds\n\
             \n\
             Privacy Guarantee:\n\
             - No key content captured\n\
             - No cursor coordinates captured\n\
             - Typed text reduced to mood and sleep cues",
            stats.keyboard_events,
            stats.pointer_events,
            stats.tab_events,
            stats.context_events,
            stats.ticks_run,
            stats.transitions,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                keyboard_events: stats.keyboard_events,
                pointer_events: stats.pointer_events,
                tab_events: stats.tab_events,
                context_events: stats.context_events,
                ticks_run: stats.ticks_run,
                transitions: stats.transitions,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.keyboard_events
                    .store(persisted.keyboard_events, Ordering::Relaxed);
                self.pointer_events
                    .store(persisted.pointer_events, Ordering::Relaxed);
                self.tab_events.store(persisted.tab_events, Ordering::Relaxed);
                self.context_events
                    .store(persisted.context_events, Ordering::Relaxed);
                self.ticks_run.store(persisted.ticks_run, Ordering::Relaxed);
                self.transitions
                    .store(persisted.transitions, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.keyboard_events.store(0, Ordering::Relaxed);
        self.pointer_events.store(0, Ordering::Relaxed);
        self.tab_events.store(0, Ordering::Relaxed);
        self.context_events.store(0, Ordering::Relaxed);
        self.ticks_run.store(0, Ordering::Relaxed);
        self.transitions.store(0, Ordering::Relaxed);
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub keyboard_events: u64,
    pub pointer_events: u64,
    pub tab_events: u64,
    pub context_events: u64,
    pub ticks_run: u64,
    pub transitions: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct PersistedStats {
    keyboard_events: u64,
    pointer_events: u64,
    tab_events: u64,
    context_events: u64,
    ticks_run: u64,
    transitions: u64,
    last_updated: DateTime<Utc>,
}

impl Default for PersistedStats {
    fn default() -> Self {
        Self {
            keyboard_events: 0,
            pointer_events: 0,
            tab_events: 0,
            context_events: 0,
            ticks_run: 0,
            transitions: 0,
            last_updated: Utc::now(),
        }
    }
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}
