use chrono::NaiveDate;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::Message;

/// Every known message, keyed by signature.
#[derive(Debug, Default)]
pub struct MessageCache {
    messages: HashMap<String, Message>,
}

impl MessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by signature; never appends a duplicate.
    pub fn upsert(&mut self, message: Message) {
        self.messages.insert(message.signature.clone(), message);
    }

    /// Snapshot copy, detached from later mutation.
    pub fn all(&self) -> Vec<Message> {
        self.messages.values().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Read-only side of the shared cache handed to the presentation layer.
#[derive(Debug, Clone)]
pub struct FeedHandle {
    cache: Arc<RwLock<MessageCache>>,
}

impl FeedHandle {
    pub(crate) fn new(cache: Arc<RwLock<MessageCache>>) -> Self {
        Self { cache }
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.cache.read().all()
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }
}

/// How the feed is shown: sort direction and an optional calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedView {
    pub sort_by_newest: bool,
    pub date: Option<NaiveDate>,
}

impl Default for FeedView {
    fn default() -> Self {
        Self {
            sort_by_newest: true,
            date: None,
        }
    }
}

impl FeedView {
    pub fn apply(&self, mut messages: Vec<Message>) -> Vec<Message> {
        if let Some(date) = self.date {
            messages.retain(|m| m.local_time().map(|t| t.date_naive()) == Some(date));
        }

        // signature breaks timestamp ties so the order is stable between reads
        messages.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.signature.cmp(&b.signature))
        });
        if self.sort_by_newest {
            messages.reverse();
        }
        messages
    }
}
