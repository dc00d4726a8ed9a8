//! Transient user-visible messages.
//!
//! Transport failures and authority rejections surface here and nowhere
//! else: components publish a [`UiMessage`] on the bus, the queue
//! collects them, and the presentation layer shows [`MessageQueue::active`]
//! however it likes. Messages are non-blocking and auto-dismiss after a
//! TTL; nothing in the sync layer ever halts on an error.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::bus::{EventBus, Subscription};

/// Bus event: something the user should see, once, briefly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiMessage {
    pub text: String,
}

impl UiMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone)]
pub struct MessageQueueConfig {
    /// Oldest messages are evicted beyond this bound.
    pub capacity: usize,
    /// How long a message stays visible.
    pub ttl: Duration,
}

impl Default for MessageQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 32,
            ttl: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
struct QueuedMessage {
    text: String,
    posted: Instant,
}

/// Bounded queue of transient messages.
pub struct MessageQueue {
    config: MessageQueueConfig,
    entries: Mutex<VecDeque<QueuedMessage>>,
}

impl MessageQueue {
    pub fn new(config: MessageQueueConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            entries: Mutex::new(VecDeque::new()),
        })
    }

    pub fn with_defaults() -> Arc<Self> {
        Self::new(MessageQueueConfig::default())
    }

    /// Start collecting [`UiMessage`] events from `bus`. The queue stops
    /// collecting when the returned subscription is dropped.
    pub fn attach(self: &Arc<Self>, bus: &EventBus) -> Subscription {
        let queue = Arc::downgrade(self);
        bus.subscribe(move |message: &UiMessage| {
            if let Some(queue) = queue.upgrade() {
                queue.push(&message.text);
            }
        })
    }

    pub fn push(&self, text: &str) {
        log::info!("{text}");
        let mut entries = self.entries.lock().unwrap();
        if entries.len() == self.config.capacity {
            entries.pop_front();
        }
        entries.push_back(QueuedMessage {
            text: text.to_owned(),
            posted: Instant::now(),
        });
    }

    /// Dismiss every queued message with this exact text (a long-running
    /// operation removes its own "loading" notice when it completes).
    pub fn remove(&self, text: &str) {
        self.entries.lock().unwrap().retain(|entry| entry.text != text);
    }

    /// Currently visible messages, oldest first. Expired entries are
    /// pruned on the way out.
    pub fn active(&self) -> Vec<String> {
        let mut entries = self.entries.lock().unwrap();
        let ttl = self.config.ttl;
        entries.retain(|entry| entry.posted.elapsed() < ttl);
        entries.iter().map(|entry| entry.text.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_active() {
        let queue = MessageQueue::with_defaults();
        queue.push("Connection established to the server");
        assert_eq!(queue.active(), ["Connection established to the server"]);
    }

    #[test]
    fn test_remove_by_text() {
        let queue = MessageQueue::with_defaults();
        queue.push("Loading scene");
        queue.push("Goblin rejected");
        queue.remove("Loading scene");
        assert_eq!(queue.active(), ["Goblin rejected"]);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let queue = MessageQueue::new(MessageQueueConfig {
            capacity: 2,
            ttl: Duration::from_secs(60),
        });
        queue.push("one");
        queue.push("two");
        queue.push("three");
        assert_eq!(queue.active(), ["two", "three"]);
    }

    #[test]
    fn test_ttl_expiry() {
        let queue = MessageQueue::new(MessageQueueConfig {
            capacity: 8,
            ttl: Duration::from_millis(0),
        });
        queue.push("gone");
        assert!(queue.active().is_empty());
    }

    #[test]
    fn test_attach_collects_bus_messages() {
        let bus = EventBus::new();
        let queue = MessageQueue::with_defaults();
        let sub = queue.attach(&bus);

        bus.publish(&UiMessage::new("Scene is locked"));
        assert_eq!(queue.active(), ["Scene is locked"]);

        drop(sub);
        bus.publish(&UiMessage::new("after detach"));
        assert_eq!(queue.len(), 1);
    }
}
