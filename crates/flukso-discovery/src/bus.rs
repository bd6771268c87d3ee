//! Publish/subscribe seam between the discovery protocol and a broker.
//!
//! [`PubSub`] is what the coordinator and the agent talk to. [`MemoryBus`]
//! is an in-process broker with retained messages; [`crate::mqtt::MqttBus`]
//! talks to a real MQTT broker.

use async_trait::async_trait;
use flukso_proto::topic_matches;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::{mpsc, Mutex};

/// Buffered messages per subscription.
pub const SUBSCRIPTION_CAPACITY: usize = 100;

/// One message delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Topic the message was published on
    pub topic: String,
    /// Raw payload
    pub payload: Vec<u8>,
    /// Whether the broker retains the message
    pub retain: bool,
}

impl BusMessage {
    /// Create a message.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>, retain: bool) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain,
        }
    }
}

/// Names one subscription on a bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    filter: String,
    id: u64,
}

impl SubscriptionId {
    /// Topic filter of the subscription.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }
}

/// Receiving end of a subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::Receiver<BusMessage>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, rx: mpsc::Receiver<BusMessage>) -> Self {
        Self { id, rx }
    }

    /// Handle to pass to [`PubSub::unsubscribe`].
    #[must_use]
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Next message, or `None` once the subscription is dropped.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.rx.recv().await
    }

    /// Next message if one is buffered.
    ///
    /// # Errors
    ///
    /// Returns error if nothing is buffered or the subscription is dropped.
    pub fn try_recv(&mut self) -> Result<BusMessage, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }
}

/// Broker operations used by discovery and the agent.
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Subscribe to a topic filter.
    ///
    /// # Errors
    ///
    /// Returns error if the broker rejects the subscription.
    async fn subscribe(&self, filter: &str) -> Result<Subscription, BusError>;

    /// Drop one subscription.
    ///
    /// Other subscriptions on the same filter keep receiving.
    ///
    /// # Errors
    ///
    /// Returns error if the broker rejects the request.
    async fn unsubscribe(&self, subscription: &SubscriptionId) -> Result<(), BusError>;

    /// Publish a message.
    ///
    /// # Errors
    ///
    /// Returns error if the message cannot be handed to the broker.
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), BusError>;
}

/// Errors talking to a broker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// Invalid broker URL
    #[error("invalid MQTT URL: {0}")]
    InvalidUrl(String),
    /// Subscription failed
    #[error("subscription error: {0}")]
    Subscribe(String),
    /// Unsubscription failed
    #[error("unsubscription error: {0}")]
    Unsubscribe(String),
    /// Publish failed
    #[error("publish error: {0}")]
    Publish(String),
}

/// Subscribers keyed by topic filter.
#[derive(Debug, Default)]
pub(crate) struct Routes {
    filters: HashMap<String, Vec<(u64, mpsc::Sender<BusMessage>)>>,
    next_id: u64,
}

impl Routes {
    pub(crate) fn add(&mut self, filter: &str, tx: mpsc::Sender<BusMessage>) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.filters.entry(filter.to_string()).or_default().push((id, tx));
        SubscriptionId {
            filter: filter.to_string(),
            id,
        }
    }

    /// Remove one subscription. Returns `true` when its filter has no
    /// subscribers left.
    pub(crate) fn remove(&mut self, subscription: &SubscriptionId) -> bool {
        let Some(senders) = self.filters.get_mut(&subscription.filter) else {
            return true;
        };
        senders.retain(|(id, _)| *id != subscription.id);
        if senders.is_empty() {
            self.filters.remove(&subscription.filter);
            return true;
        }
        false
    }

    /// Senders whose filter matches `topic`; closed senders are pruned.
    pub(crate) fn matching(&mut self, topic: &str) -> Vec<mpsc::Sender<BusMessage>> {
        self.filters.retain(|_, senders| {
            senders.retain(|(_, tx)| !tx.is_closed());
            !senders.is_empty()
        });
        self.filters
            .iter()
            .filter(|(filter, _)| topic_matches(filter, topic))
            .flat_map(|(_, senders)| senders.iter().map(|(_, tx)| tx.clone()))
            .collect()
    }

    pub(crate) fn filters(&self) -> Vec<String> {
        let mut filters: Vec<String> = self.filters.keys().cloned().collect();
        filters.sort();
        filters
    }
}

pub(crate) async fn deliver(targets: Vec<mpsc::Sender<BusMessage>>, message: &BusMessage) {
    for tx in targets {
        if tx.send(message.clone()).await.is_err() {
            tracing::debug!(topic = %message.topic, "Subscriber dropped before delivery");
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    routes: Routes,
    retained: BTreeMap<String, Vec<u8>>,
    published: Vec<BusMessage>,
}

/// In-process broker.
///
/// Retained messages are replayed to new subscribers, like an MQTT broker
/// does. Every publish is recorded for inspection.
#[derive(Debug, Default)]
pub struct MemoryBus {
    state: Mutex<MemoryState>,
}

impl MemoryBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Topic filters with at least one subscription.
    pub async fn active_filters(&self) -> Vec<String> {
        self.state.lock().await.routes.filters()
    }

    /// Retained payload on a topic.
    pub async fn retained(&self, topic: &str) -> Option<Vec<u8>> {
        self.state.lock().await.retained.get(topic).cloned()
    }

    /// Every message published so far, in order.
    pub async fn published(&self) -> Vec<BusMessage> {
        self.state.lock().await.published.clone()
    }
}

#[async_trait]
impl PubSub for MemoryBus {
    async fn subscribe(&self, filter: &str) -> Result<Subscription, BusError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        let mut state = self.state.lock().await;

        for (topic, payload) in &state.retained {
            if !topic_matches(filter, topic) {
                continue;
            }
            if tx.try_send(BusMessage::new(topic.clone(), payload.clone(), true)).is_err() {
                tracing::warn!(filter, topic = %topic, "Retained message dropped, subscription full");
            }
        }

        let id = state.routes.add(filter, tx);
        tracing::debug!(filter, "Subscribed");
        Ok(Subscription::new(id, rx))
    }

    async fn unsubscribe(&self, subscription: &SubscriptionId) -> Result<(), BusError> {
        if self.state.lock().await.routes.remove(subscription) {
            tracing::debug!(filter = subscription.filter(), "Unsubscribed");
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), BusError> {
        let message = BusMessage::new(topic, payload, retain);

        let targets = {
            let mut state = self.state.lock().await;
            if retain {
                // An empty retained payload clears the topic.
                if message.payload.is_empty() {
                    state.retained.remove(topic);
                } else {
                    state.retained.insert(topic.to_string(), message.payload.clone());
                }
            }
            state.published.push(message.clone());
            state.routes.matching(topic)
        };

        deliver(targets, &message).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn retained_messages_replay_on_subscribe() {
        let bus = MemoryBus::new();
        bus.publish("/device/a/config/sensor", b"{}".to_vec(), true)
            .await
            .unwrap();
        bus.publish("/device/a/config/kube", b"{}".to_vec(), false)
            .await
            .unwrap();

        let mut rx = bus.subscribe("/device/a/config/+").await.unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.topic, "/device/a/config/sensor");
        assert!(first.retain);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn live_messages_follow_filters() {
        let bus = MemoryBus::new();
        let mut rx = bus.subscribe("/sensor/+/gauge").await.unwrap();

        bus.publish("/sensor/x/gauge", b"1,2".to_vec(), false).await.unwrap();
        bus.publish("/sensor/x/counter", b"1,3".to_vec(), false).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().payload, b"1,2");
        assert!(rx.try_recv().is_err());
        assert_eq!(bus.published().await.len(), 2);
    }

    #[tokio::test]
    async fn unsubscribe_closes_route() {
        let bus = MemoryBus::new();
        let mut rx = bus.subscribe("/device/#").await.unwrap();
        assert_eq!(bus.active_filters().await, vec!["/device/#".to_string()]);

        bus.unsubscribe(rx.id()).await.unwrap();
        assert!(bus.active_filters().await.is_empty());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn unsubscribe_leaves_other_subscribers_on_filter() {
        let bus = MemoryBus::new();
        let mut first = bus.subscribe("/device/a/test/tap").await.unwrap();
        let mut second = bus.subscribe("/device/a/test/tap").await.unwrap();
        assert_ne!(first.id(), second.id());

        bus.unsubscribe(first.id()).await.unwrap();
        assert_eq!(bus.active_filters().await, vec!["/device/a/test/tap".to_string()]);

        bus.publish("/device/a/test/tap", b"# serial: x".to_vec(), false)
            .await
            .unwrap();
        assert_eq!(second.recv().await.unwrap().payload, b"# serial: x");
        assert!(first.recv().await.is_none());

        bus.unsubscribe(second.id()).await.unwrap();
        assert!(bus.active_filters().await.is_empty());
    }

    #[tokio::test]
    async fn empty_retained_payload_clears_topic() {
        let bus = MemoryBus::new();
        bus.publish("t", b"x".to_vec(), true).await.unwrap();
        assert_eq!(bus.retained("t").await, Some(b"x".to_vec()));
        bus.publish("t", Vec::new(), true).await.unwrap();
        assert_eq!(bus.retained("t").await, None);
    }
}
