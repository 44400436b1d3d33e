//! Event collection module for the HMB agent.
//!
//! Every external signal source (input listeners, page/cue observers, control
//! requests) pushes [`InputEvent`]s into one bounded channel that the
//! scheduler drains. Ingestion is decoupled from orchestration: senders never
//! block and never observe engine state. The tab tracker's own notices use a
//! separate channel, so the feed closes once every outside producer is gone.

pub mod types;

use crate::core::tabs::{DeliveryError, TabNotifier};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

// Re-export commonly used types
pub use types::{
    Control, InputEvent, LooseCounts, TabId, TabNotification, TabStatsPayload, WindowId,
    WireMessage,
};

/// Default capacity of the event channel.
pub const DEFAULT_FEED_CAPACITY: usize = 10_000;

/// Owning side of the event channel.
pub struct EventFeed {
    sender: Sender<InputEvent>,
    receiver: Receiver<InputEvent>,
}

impl EventFeed {
    /// Create a feed with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self { sender, receiver }
    }

    /// Get a cloneable sender for producers.
    pub fn sender(&self) -> FeedSender {
        FeedSender {
            inner: self.sender.clone(),
        }
    }

    /// Keep only the receiving side. The feed disconnects when the last
    /// [`FeedSender`] is dropped.
    pub fn into_receiver(self) -> Receiver<InputEvent> {
        self.receiver
    }
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

/// Non-blocking producer handle.
#[derive(Clone)]
pub struct FeedSender {
    inner: Sender<InputEvent>,
}

impl FeedSender {
    /// Push an event without blocking.
    pub fn push(&self, event: InputEvent) -> Result<(), DeliveryError> {
        self.inner.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Disconnected(_) => DeliveryError::Closed,
        })
    }
}

/// Delivers tab notifications to the scheduler, the way the background
/// tracker messages the content side.
#[derive(Clone)]
pub struct ChannelNotifier {
    inner: Sender<TabNotification>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiver its notices arrive on.
    pub fn channel(capacity: usize) -> (Self, Receiver<TabNotification>) {
        let (inner, receiver) = bounded(capacity.max(1));
        (Self { inner }, receiver)
    }
}

impl TabNotifier for ChannelNotifier {
    fn deliver(&self, notification: TabNotification) -> Result<(), DeliveryError> {
        self.inner.try_send(notification).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Disconnected(_) => DeliveryError::Closed,
        })
    }
}
