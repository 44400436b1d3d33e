//! Collaborator dispatch.
//!
//! Music, voice and message generation are pluggable strategies behind
//! async traits. Each kind is an ordered [`FallbackChain`]: candidates are
//! tried in order, each bounded by a per-call timeout, and the first success
//! wins. Message generation always ends in the local pool, so a message is
//! produced even when every remote generator fails.

use crate::core::context;
use crate::core::state::StateLabel;
use crate::engine::session::{DispatchJob, DispatchReport, MessageContext, MusicOutcome, MusicRequest};
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure of a collaborator call.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{0} is unavailable")]
    Unavailable(String),
    #[error("{backend} failed: {message}")]
    Failed { backend: String, message: String },
    #[error("{0} timed out")]
    TimedOut(String),
    #[error("no {0} backend succeeded")]
    Exhausted(&'static str),
}

/// Ambient music player.
#[async_trait]
pub trait MusicBackend: Send + Sync {
    /// Start or switch playback for the request's mode.
    async fn play(&self, request: &MusicRequest) -> Result<(), CollaboratorError>;

    /// Stop playback.
    async fn stop(&self) -> Result<(), CollaboratorError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Text-to-speech output.
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), CollaboratorError>;

    fn name(&self) -> &str;
}

/// Supportive message generator.
#[async_trait]
pub trait MessageGenerator: Send + Sync {
    async fn generate(&self, context: &MessageContext) -> Result<String, CollaboratorError>;

    fn name(&self) -> &str;
}

/// Ordered candidates for one kind of collaborator.
pub struct FallbackChain<T: ?Sized> {
    candidates: Vec<Arc<T>>,
}

impl<T: ?Sized> FallbackChain<T> {
    pub fn new() -> Self {
        Self {
            candidates: Vec::new(),
        }
    }

    /// Append a candidate; earlier candidates have priority.
    pub fn with(mut self, candidate: Arc<T>) -> Self {
        self.candidates.push(candidate);
        self
    }

    pub fn push(&mut self, candidate: Arc<T>) {
        self.candidates.push(candidate);
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.candidates.iter()
    }
}

impl<T: ?Sized> Default for FallbackChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one call under `limit`, mapping expiry to [`CollaboratorError::TimedOut`].
async fn attempt<R, F>(name: &str, limit: Duration, call: F) -> Result<R, CollaboratorError>
where
    F: Future<Output = Result<R, CollaboratorError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::TimedOut(name.to_string())),
    }
}

/// Fallback message pools, one per label.
fn message_pool(label: StateLabel) -> &'static [&'static str] {
    match label {
        StateLabel::Focused => &[
            "You're in the zone! Keep going.",
            "Great focus. You've got this.",
            "Flowing nicely. Stay with it.",
            "Deep work mode activated.",
            "Momentum is building beautifully.",
        ],
        StateLabel::Neutral => &[
            "Taking it steady. All good.",
            "Finding your rhythm.",
            "No rush, you're doing fine.",
            "Ease into it at your pace.",
            "Gentle progress is still progress.",
        ],
        StateLabel::Distracted => &[
            "Lots happening. Let's refocus gently.",
            "It's okay. One thing at a time.",
            "Breathe. You can return to center.",
            "Refocusing is always available.",
            "No judgment. Let's ease back in.",
        ],
        StateLabel::Idle => &[
            "Taking a break? That's wise.",
            "Rest is part of the process.",
            "Recharging. Come back when ready.",
            "Pausing mindfully is productive.",
            "Stillness has its own value.",
        ],
        StateLabel::Upbeat => &[
            "Energy rising, ride the wave!",
            "All smiles here. Let's go!",
            "Bright vibes, bright focus.",
        ],
    }
}

/// Local message generator. Never fails; rotates through the label's pool
/// and appends the context line when there is one.
#[derive(Debug, Default)]
pub struct LocalMessages {
    next: AtomicUsize,
}

impl LocalMessages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_for(&self, context: &MessageContext) -> String {
        let pool = message_pool(context.label);
        let index = self.next.fetch_add(1, Ordering::Relaxed) % pool.len();
        let base = pool[index];
        match context::context_line(context.page.as_ref(), context.cues.as_ref()) {
            Some(line) => format!("{base} {line}"),
            None => base.to_string(),
        }
    }
}

#[async_trait]
impl MessageGenerator for LocalMessages {
    async fn generate(&self, context: &MessageContext) -> Result<String, CollaboratorError> {
        Ok(self.message_for(context))
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// Music backend that only logs what it would play.
#[derive(Debug, Default)]
pub struct LoggingMusic;

#[async_trait]
impl MusicBackend for LoggingMusic {
    async fn play(&self, request: &MusicRequest) -> Result<(), CollaboratorError> {
        tracing::info!(mode = %request.mode, label = %request.label, "music playing");
        Ok(())
    }

    async fn stop(&self) -> Result<(), CollaboratorError> {
        tracing::info!("music stopped");
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Voice backend that writes lines to the log.
#[derive(Debug, Default)]
pub struct LoggingVoice;

#[async_trait]
impl VoiceBackend for LoggingVoice {
    async fn speak(&self, text: &str) -> Result<(), CollaboratorError> {
        tracing::info!(line = text, "voice");
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Runs a tick's collaborator work.
pub struct Dispatcher {
    music: FallbackChain<dyn MusicBackend>,
    voice: FallbackChain<dyn VoiceBackend>,
    messages: FallbackChain<dyn MessageGenerator>,
    local: LocalMessages,
    call_timeout: Duration,
}

impl Dispatcher {
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            music: FallbackChain::new(),
            voice: FallbackChain::new(),
            messages: FallbackChain::new(),
            local: LocalMessages::new(),
            call_timeout,
        }
    }

    /// Dispatcher wired to the logging backends.
    pub fn logging(call_timeout: Duration) -> Self {
        Self::new(call_timeout)
            .with_music(Arc::new(LoggingMusic))
            .with_voice(Arc::new(LoggingVoice))
    }

    pub fn with_music(mut self, backend: Arc<dyn MusicBackend>) -> Self {
        self.music.push(backend);
        self
    }

    pub fn with_voice(mut self, backend: Arc<dyn VoiceBackend>) -> Self {
        self.voice.push(backend);
        self
    }

    pub fn with_messages(mut self, generator: Arc<dyn MessageGenerator>) -> Self {
        self.messages.push(generator);
        self
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Run a job. Voice output is detached so a slow speaker never holds
    /// the tick open.
    pub async fn run(self: Arc<Self>, job: DispatchJob) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut lines = Vec::new();

        if let Some(context) = job.message {
            let message = self.generate(&context).await;
            lines.push(message.clone());
            report.message = Some(message);
        }
        if let Some(line) = job.coach_line {
            lines.push(line.to_string());
        }
        if !lines.is_empty() {
            let dispatcher = Arc::clone(&self);
            tokio::spawn(async move {
                for line in lines {
                    if let Err(e) = dispatcher.speak(&line).await {
                        tracing::debug!("voice skipped: {e}");
                    }
                }
            });
        }

        if let Some(request) = job.music {
            let played = match self.play(&request).await {
                Ok(backend) => {
                    tracing::debug!(backend = %backend, mode = %request.mode, "music refreshed");
                    true
                }
                Err(e) => {
                    tracing::warn!("music refresh failed: {e}");
                    false
                }
            };
            report.music = Some(MusicOutcome {
                mode: request.mode,
                played,
                page_signature: request.page_signature,
                cue_signature: request.cue_signature,
            });
        }

        report
    }

    /// First successful generator's message, else the local pool.
    pub async fn generate(&self, context: &MessageContext) -> String {
        for generator in self.messages.iter() {
            match attempt(generator.name(), self.call_timeout, generator.generate(context)).await {
                Ok(message) if !message.trim().is_empty() => return message,
                Ok(_) => tracing::warn!(generator = generator.name(), "empty message"),
                Err(e) => tracing::warn!("message generator failed, falling back: {e}"),
            }
        }
        self.local.message_for(context)
    }

    /// Play through the music chain. Returns the backend that succeeded.
    pub async fn play(&self, request: &MusicRequest) -> Result<String, CollaboratorError> {
        for backend in self.music.iter() {
            match attempt(backend.name(), self.call_timeout, backend.play(request)).await {
                Ok(()) => return Ok(backend.name().to_string()),
                Err(e) => tracing::warn!("music backend failed, falling back: {e}"),
            }
        }
        Err(CollaboratorError::Exhausted("music"))
    }

    /// Stop every music backend.
    pub async fn stop_music(&self) {
        for backend in self.music.iter() {
            if let Err(e) = attempt(backend.name(), self.call_timeout, backend.stop()).await {
                tracing::warn!("music stop failed: {e}");
            }
        }
    }

    pub async fn speak(&self, text: &str) -> Result<(), CollaboratorError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        for backend in self.voice.iter() {
            match attempt(backend.name(), self.call_timeout, backend.speak(text)).await {
                Ok(()) => return Ok(()),
                Err(e) => tracing::warn!("voice backend failed, falling back: {e}"),
            }
        }
        Err(CollaboratorError::Exhausted("voice"))
    }
}
