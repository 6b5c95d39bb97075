//! Knowledge graph subscription hub.
//!
//! Mirrors [`crate::server::event_queue::EventQueue`]'s broadcast-channel
//! fan-out, but keyed by subscription filter rather than by task id: every
//! applied patch is tested against each live subscription's compiled
//! [`StatementFilter`], and only matching changes are forwarded.
//!
//! Where the task event queue logs and continues on `RecvError::Lagged`,
//! a knowledge subscriber that lags is disconnected outright — a missed
//! graph change is not safe to silently skip over the way a missed
//! intermediate status update is, since graph state is cumulative.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::A2AResult;
use crate::knowledge::query_lang::StatementsQuery;
use crate::knowledge::types::KnowledgeGraphChangeEvent;

const DEFAULT_CAPACITY: usize = 256;

/// A compiled filter narrowing which change events a subscription
/// receives. Reuses the same subject/predicate/object/graph shape the
/// query executor matches on, since `knowledge/subscribe`'s
/// `subscriptionQuery` is the same `statements(...)` shape as
/// `knowledge/query`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementFilter {
    subject: Option<String>,
    predicate: Option<String>,
    object: Option<String>,
    graph: Option<String>,
}

impl From<&StatementsQuery> for StatementFilter {
    fn from(query: &StatementsQuery) -> Self {
        Self {
            subject: query.subject.clone(),
            predicate: query.predicate.clone(),
            object: query.object.clone(),
            graph: query.graph.clone(),
        }
    }
}

impl StatementFilter {
    /// A filter matching every change event.
    pub fn any() -> Self {
        Self::default()
    }

    /// True if `event`'s statement matches every constraint this filter
    /// specifies.
    pub fn matches(&self, event: &KnowledgeGraphChangeEvent) -> bool {
        let statement = &event.statement;
        self.subject.as_deref().map_or(true, |v| statement.subject.id == v)
            && self
                .predicate
                .as_deref()
                .map_or(true, |v| statement.predicate.id == v)
            && self
                .object
                .as_deref()
                .map_or(true, |v| statement.object.identity_key() == v)
            && self.graph.as_deref().map_or(true, |v| statement.graph.as_deref() == Some(v))
    }
}

/// Broadcast hub for knowledge graph change events.
///
/// One hub serves every `knowledge/subscribe` call; each subscriber holds
/// its own [`StatementFilter`] alongside its receiver and applies it
/// client-side, since `tokio::sync::broadcast` has no server-side per-
/// consumer filtering.
#[derive(Debug, Clone)]
pub struct KnowledgeSubscriptionHub {
    tx: broadcast::Sender<KnowledgeGraphChangeEvent>,
}

impl KnowledgeSubscriptionHub {
    /// Create a new hub with the default channel capacity.
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_CAPACITY);
        Self { tx }
    }

    /// Publish a change event to all subscribers.
    pub fn publish(&self, event: KnowledgeGraphChangeEvent) {
        match self.tx.send(event) {
            Ok(count) => debug!(subscriber_count = count, "published KG change event"),
            Err(_) => debug!("published KG change event to no subscribers"),
        }
    }

    /// Subscribe with the given filter. Returns a handle whose
    /// [`KnowledgeSubscription::recv`] yields only matching events and
    /// ends the subscription (rather than skip-and-continue) on lag.
    pub fn subscribe(&self, filter: StatementFilter) -> KnowledgeSubscription {
        KnowledgeSubscription {
            rx: self.tx.subscribe(),
            filter,
        }
    }
}

impl Default for KnowledgeSubscriptionHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription to knowledge graph changes.
pub struct KnowledgeSubscription {
    rx: broadcast::Receiver<KnowledgeGraphChangeEvent>,
    filter: StatementFilter,
}

/// Outcome of polling a [`KnowledgeSubscription`] for its next event.
#[derive(Debug)]
pub enum SubscriptionEvent {
    /// A matching change event.
    Change(KnowledgeGraphChangeEvent),
    /// The subscriber fell too far behind the publisher and must
    /// reconnect; the caller should close the stream rather than keep
    /// polling.
    Lagged,
    /// The hub has no more senders (process shutting down).
    Closed,
}

impl KnowledgeSubscription {
    /// Await and return the next event matching this subscription's
    /// filter, skipping non-matching events.
    pub async fn recv(&mut self) -> A2AResult<SubscriptionEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(SubscriptionEvent::Change(event));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "KG subscriber lagged, disconnecting");
                    return Ok(SubscriptionEvent::Lagged);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Ok(SubscriptionEvent::Closed);
                }
            }
        }
    }
}
