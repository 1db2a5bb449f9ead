//! Topic-keyed publish/subscribe used by record stores to report outcomes.
//!
//! A record store publishes one [`CompletionEvent`] when a requested
//! operation finishes or fails. Whoever is waiting subscribes to the topics
//! it cares about before calling the store and unsubscribes once it has its
//! answer.
//!
//! Every request carries a [`RequestId`] issued by the bus. The store echoes
//! it on the event, so a waiter only accepts the answer to its own request
//! even when several waiters share one bus.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::record::SaveId;

/// Kinds of completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    FinishSaving,
    FailSaving,
    FinishLoading,
    FailLoading,
    FinishDeleting,
    FailDeleting,
    FinishRenaming,
    FailRenaming,
}

impl Topic {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Topic::FailSaving | Topic::FailLoading | Topic::FailDeleting | Topic::FailRenaming
        )
    }
}

/// Correlates a store request with the event that answers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A completion signal published on the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionEvent {
    pub topic: Topic,
    /// Request this event answers.
    pub request: Option<RequestId>,
    /// Record the operation acted on, when known.
    pub save_id: Option<SaveId>,
    /// Failure reason or other detail from the store.
    pub detail: Option<String>,
}

impl CompletionEvent {
    pub fn new(topic: Topic) -> Self {
        Self {
            topic,
            request: None,
            save_id: None,
            detail: None,
        }
    }

    pub fn with_request(mut self, request: RequestId) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_save_id(mut self, save_id: SaveId) -> Self {
        self.save_id = Some(save_id);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Identifies one subscription so it can be released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&CompletionEvent) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    next_request: u64,
    by_topic: HashMap<Topic, Vec<(SubscriptionId, Handler)>>,
}

/// Shared subscriber table. Clones publish to and subscribe on the same bus.
#[derive(Clone, Default)]
pub struct CompletionBus {
    inner: Arc<Mutex<Subscribers>>,
}

impl CompletionBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issues a request ID unique across every clone of this bus.
    pub fn next_request(&self) -> RequestId {
        let mut subs = self.lock();
        subs.next_request += 1;
        RequestId(subs.next_request)
    }

    /// Registers a handler for one topic.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&CompletionEvent) + Send + Sync + 'static,
    {
        let mut subs = self.lock();
        let id = SubscriptionId(subs.next_id);
        subs.next_id += 1;
        subs.by_topic
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Releases a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.lock();
        let mut removed = false;
        for handlers in subs.by_topic.values_mut() {
            let before = handlers.len();
            handlers.retain(|(sub_id, _)| *sub_id != id);
            removed |= handlers.len() != before;
        }
        subs.by_topic.retain(|_, handlers| !handlers.is_empty());
        removed
    }

    /// Delivers an event once to every current subscriber of its topic.
    ///
    /// Handlers run after the subscriber table is released, so a handler may
    /// subscribe, unsubscribe or publish. Returns the number of handlers
    /// invoked.
    pub fn publish(&self, event: CompletionEvent) -> usize {
        let handlers: Vec<Handler> = self
            .lock()
            .by_topic
            .get(&event.topic)
            .map(|hs| hs.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        for handler in &handlers {
            handler(&event);
        }
        handlers.len()
    }

    /// Number of live subscriptions on a topic.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.lock().by_topic.get(&topic).map_or(0, Vec::len)
    }

    /// Number of live subscriptions across all topics.
    pub fn total_subscribers(&self) -> usize {
        self.lock().by_topic.values().map(Vec::len).sum()
    }
}

impl fmt::Debug for CompletionBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionBus")
            .field("subscribers", &self.total_subscribers())
            .finish()
    }
}
