//! Orchestration: the session context, tick gating, collaborator dispatch
//! and the scheduler loop that ties them together.

pub mod dispatch;
pub mod gate;
pub mod scheduler;
pub mod session;

// Re-export commonly used types
pub use dispatch::{
    CollaboratorError, Dispatcher, FallbackChain, LocalMessages, LoggingMusic, LoggingVoice,
    MessageGenerator, MusicBackend, VoiceBackend,
};
pub use gate::TickGate;
pub use scheduler::{SchedulerError, SchedulerHandle, SchedulerOptions, TickScheduler};
pub use session::{
    presentation_label, CoachCue, DispatchJob, DispatchReport, MessageContext, ModeOverride,
    MusicMode, MusicOutcome, MusicRequest, Session, StateReport, TickPlan, TickTrigger, VoiceCoach,
};
