//! MQTT broker connection.

use crate::bus::{
    deliver, BusError, BusMessage, PubSub, Routes, Subscription, SubscriptionId, SUBSCRIPTION_CAPACITY,
};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use url::Url;

/// Default MQTT port.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Configuration for the MQTT connection.
#[derive(Debug, Clone)]
pub struct MqttBusConfig {
    /// MQTT broker URL (e.g., <tcp://localhost:1883>)
    pub mqtt_broker: String,
    /// Client ID for MQTT connection
    pub client_id: String,
    /// Keep-alive interval
    pub keep_alive: Duration,
}

impl Default for MqttBusConfig {
    fn default() -> Self {
        Self {
            mqtt_broker: "tcp://localhost:1883".to_string(),
            client_id: "flukso-discovery".to_string(),
            keep_alive: Duration::from_secs(30),
        }
    }
}

/// [`PubSub`] over an MQTT broker.
///
/// A background task drives the event loop and routes incoming publishes to
/// subscribers by topic filter. The task stops when the bus is dropped.
pub struct MqttBus {
    client: AsyncClient,
    routes: Arc<Mutex<Routes>>,
    task: JoinHandle<()>,
}

impl MqttBus {
    /// Connect to a broker.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the broker URL is invalid.
    pub fn connect(config: &MqttBusConfig) -> Result<Self, BusError> {
        let (host, port) = parse_mqtt_url(&config.mqtt_broker)?;

        let mut mqtt_options = MqttOptions::new(&config.client_id, host, port);
        mqtt_options.set_keep_alive(config.keep_alive);

        let (client, eventloop) = AsyncClient::new(mqtt_options, 100);
        let routes = Arc::new(Mutex::new(Routes::default()));
        let task = tokio::spawn(run_eventloop(eventloop, Arc::clone(&routes)));

        tracing::info!(broker = %config.mqtt_broker, client_id = %config.client_id, "MQTT bus started");

        Ok(Self {
            client,
            routes,
            task,
        })
    }

    /// Disconnect from the broker and stop the event loop.
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            tracing::warn!(error = %e, "MQTT disconnect failed");
        }
        self.task.abort();
    }
}

impl Drop for MqttBus {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl PubSub for MqttBus {
    async fn subscribe(&self, filter: &str) -> Result<Subscription, BusError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        // Routed before the request so retained replies are not missed.
        let id = self.routes.lock().await.add(filter, tx);

        tracing::debug!(filter, "Subscribing");
        if let Err(e) = self.client.subscribe(filter, QoS::AtMostOnce).await {
            self.routes.lock().await.remove(&id);
            return Err(BusError::Subscribe(e.to_string()));
        }
        Ok(Subscription::new(id, rx))
    }

    async fn unsubscribe(&self, subscription: &SubscriptionId) -> Result<(), BusError> {
        let filter = subscription.filter();
        // The broker filter stays while another subscriber still uses it.
        if !self.routes.lock().await.remove(subscription) {
            tracing::debug!(filter, "Filter still in use, keeping broker subscription");
            return Ok(());
        }
        tracing::debug!(filter, "Unsubscribing");
        self.client
            .unsubscribe(filter)
            .await
            .map_err(|e| BusError::Unsubscribe(e.to_string()))
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), BusError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await
            .map_err(|e| BusError::Publish(e.to_string()))
    }
}

async fn run_eventloop(mut eventloop: EventLoop, routes: Arc<Mutex<Routes>>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = BusMessage::new(publish.topic, publish.payload.to_vec(), publish.retain);
                tracing::debug!(
                    topic = %message.topic,
                    payload_len = message.payload.len(),
                    retain = message.retain,
                    "Received MQTT message"
                );

                let targets = routes.lock().await.matching(&message.topic);
                deliver(targets, &message).await;
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("Connected to MQTT broker");
            }
            Ok(Event::Incoming(Packet::SubAck(_))) => {
                tracing::debug!("Subscription acknowledged");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "MQTT error");
                // Try to reconnect after a delay
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

/// Split a broker address into host and port.
///
/// Accepts `tcp://host[:port]`, `mqtt://host[:port]` and bare `host[:port]`.
/// The port defaults to [`DEFAULT_MQTT_PORT`].
///
/// # Errors
///
/// Returns error if the address has another scheme, no host or a bad port.
pub fn parse_mqtt_url(input: &str) -> Result<(String, u16), BusError> {
    let invalid = |reason: String| BusError::InvalidUrl(format!("{input}: {reason}"));

    let (host, port) = if input.contains("://") {
        let url = Url::parse(input).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "tcp" | "mqtt") {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        (url.host_str().unwrap_or_default().to_string(), url.port())
    } else {
        match input.split_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| invalid(format!("invalid port '{port}'")))?;
                (host.to_string(), Some(port))
            }
            None => (input.to_string(), None),
        }
    };

    if host.is_empty() {
        return Err(invalid("missing host".to_string()));
    }
    Ok((host, port.unwrap_or(DEFAULT_MQTT_PORT)))
}
