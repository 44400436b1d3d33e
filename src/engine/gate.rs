//! Single-flight gate for ticks.
//!
//! At most one tick is in flight. A request that arrives meanwhile only sets
//! the queued flag; when the running tick finishes, the caller learns whether
//! exactly one follow-up tick is owed.

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickGate {
    running: bool,
    queued: bool,
}

impl TickGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to start a tick. Returns `false` (and queues) if one is running.
    pub fn try_begin(&mut self) -> bool {
        if self.running {
            self.queued = true;
            false
        } else {
            self.running = true;
            true
        }
    }

    /// Finish the running tick. Returns whether a follow-up was queued.
    pub fn finish(&mut self) -> bool {
        self.running = false;
        std::mem::take(&mut self.queued)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_queued(&self) -> bool {
        self.queued
    }
}
