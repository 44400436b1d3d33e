//! HMB Agent - privacy-first attention-state engine.
//!
//! The agent watches interaction timing (keystrokes, pointer movement, tab
//! switches), classifies the user's attention as focused, neutral, distracted
//! or idle, and drives ambient music, voice lines and supportive messages
//! from the resulting label edges.
//!
//! # Privacy Guarantees
//!
//! - **No key content**: only the time of the last keystroke is kept
//! - **No coordinates**: pointer events only refresh a timestamp
//! - **No browsing history**: tab activations expire after 60 seconds
//! - **Transparency**: all ingestion is counted and auditable
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          HMB Agent                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌─────────────┐   ┌─────────────┐          │
//! │  │ Event feed │──▶│  Scheduler  │──▶│   Session   │          │
//! │  │ (channel)  │   │ (tick gate) │   │ aggregate → │          │
//! │  └────────────┘   └─────────────┘   │ classify →  │          │
//! │         ▲                │          │ transition  │          │
//! │         │                ▼          └─────────────┘          │
//! │  ┌────────────┐   ┌─────────────┐                            │
//! │  │ Tab tracker│   │ Dispatcher  │ music / voice / messages   │
//! │  └────────────┘   │ (tokio)     │                            │
//! │                   └─────────────┘                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use hmb_agent::{Config, Dispatcher, TickScheduler};
//!
//! let runtime = tokio::runtime::Runtime::new().expect("runtime");
//! let config = Config::default();
//! let dispatcher = Dispatcher::logging(config.dispatch_timeout);
//! let (scheduler, handle) = TickScheduler::new(&config, dispatcher, runtime.handle().clone());
//! let worker = scheduler.spawn().expect("scheduler thread");
//!
//! handle.key().unwrap();
//! handle.tab_activated(1, 42).unwrap();
//! println!("{:?}", handle.get_state().unwrap().label);
//!
//! handle.shutdown().unwrap();
//! let summary = worker.join().unwrap();
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod engine;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use collector::{EventFeed, FeedSender, InputEvent, TabNotification, WireMessage};
pub use config::{Config, ConfigError, UserProfile};
pub use crate::core::{
    derive_label, ClassificationOptions, SessionSummary, SignalSnapshot, StateChange, StateLabel,
    TabActivityTracker,
};
pub use engine::{
    Dispatcher, ModeOverride, MusicMode, SchedulerError, SchedulerHandle, Session, StateReport,
    TickScheduler,
};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Privacy declaration that can be displayed to users.
pub const PRIVACY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║                HMB AGENT - PRIVACY DECLARATION                   ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent estimates your attention to pick ambient music.      ║
║                                                                  ║
║  ✓ WHAT WE USE:                                                  ║
║    • When you last typed (timing only)                           ║
║    • When the pointer last moved (timing only)                   ║
║    • How often you switch tabs (last 60 seconds only)            ║
║    • Page host, title and snippet (opt-in)                       ║
║    • Mood and sleep mentions in typed text (opt-in)              ║
║                                                                  ║
║  ✗ WHAT WE NEVER KEEP:                                           ║
║    • Which keys you press (no passwords, messages, etc.)         ║
║    • Where your cursor is (no screen position tracking)          ║
║    • Your browsing history                                       ║
║    • The text you type                                           ║
║                                                                  ║
║  All inference runs locally. Only session summaries and          ║
║  collection counters are written to disk.                        ║
║                                                                  ║
║  You can review the configuration anytime with:                  ║
║    hmb config                                                    ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privacy_declaration_contents() {
        assert!(PRIVACY_DECLARATION.contains("PRIVACY"));
        assert!(PRIVACY_DECLARATION.contains("NEVER KEEP"));
        assert!(PRIVACY_DECLARATION.contains("keys you press"));
    }
}
