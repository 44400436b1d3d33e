//! Transparency module for the HMB agent.
//!
//! Tracks and exposes what the agent ingests so users can audit it.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog,
    TransparencyStats,
};
