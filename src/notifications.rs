//! User-visible notifications
//!
//! Everything that would be a toast in a browser is pushed onto one bounded
//! queue. Clients drain it through `GET /api/notifications`; when the queue is
//! full the oldest entry is dropped.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

const DEFAULT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    #[default]
    Default,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub variant: Variant,
}

impl Notification {
    #[must_use]
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: Variant::Default,
        }
    }

    #[must_use]
    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: Variant::Destructive,
        }
    }
}

#[derive(Debug)]
pub struct Notifier {
    queue: Mutex<VecDeque<Notification>>,
    capacity: usize,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl Notifier {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, notification: Notification) {
        match notification.variant {
            Variant::Default => info!(
                "Notification: {} - {}",
                notification.title, notification.description
            ),
            Variant::Destructive => warn!(
                "Notification: {} - {}",
                notification.title, notification.description
            ),
        }

        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        if queue.len() == self.capacity {
            queue.pop_front();
        }
        queue.push_back(notification);
    }

    /// Take every pending notification, oldest first
    pub fn drain(&self) -> Vec<Notification> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_returns_in_order_and_empties() {
        let notifier = Notifier::default();
        notifier.push(Notification::info("QR Code Generated", "first"));
        notifier.push(Notification::error("Login Failed", "second"));

        let drained = notifier.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].description, "first");
        assert_eq!(drained[1].variant, Variant::Destructive);
        assert!(notifier.is_empty());
    }

    #[test]
    fn test_full_queue_drops_oldest() {
        let notifier = Notifier::with_capacity(2);
        for n in 0..3 {
            notifier.push(Notification::info("n", n.to_string()));
        }
        let drained = notifier.drain();
        assert_eq!(
            drained.iter().map(|n| n.description.as_str()).collect::<Vec<_>>(),
            vec!["1", "2"]
        );
    }

    #[test]
    fn test_variant_serializes_lowercase() {
        let json = serde_json::to_value(Notification::error("Error", "Failed to sign out")).unwrap();
        assert_eq!(json["variant"], "destructive");
    }
}
