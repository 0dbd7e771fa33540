//! MQTT transport backed by `rumqttc`.
//!
//! [`MqttTransport::connect`] spawns a background dispatch loop that polls
//! the broker connection, routes inbound publishes to subscribed handlers,
//! and applies the configured reconnect policy. Handlers run in their own
//! tasks; a failing handler can never stall or kill the loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, Publish};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use loralink_core::config::MqttConfig;
use loralink_core::topic;

use crate::traits::{MessageHandler, PublishError, Qos, SubscribeError, Transport};

/// Broker connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Initial state, before the first CONNACK.
    Connecting,
    /// Active broker session.
    Connected,
    /// Gave up reconnecting.
    Disconnected,
    /// Connection lost, reconnect in progress.
    Error,
}

/// One registered subscription.
struct Subscription {
    filter: String,
    handler: Arc<dyn MessageHandler>,
}

/// MQTT transport adapter.
pub struct MqttTransport {
    client: AsyncClient,
    status: Arc<RwLock<ConnectionStatus>>,
    subscriptions: Arc<RwLock<Vec<Subscription>>>,
}

impl MqttTransport {
    /// Build the client and start the background dispatch loop.
    ///
    /// Returns immediately; the broker session is established asynchronously.
    /// Use [`MqttTransport::wait_until_connected`] when the caller needs an
    /// active session before proceeding.
    pub async fn connect(config: MqttConfig) -> Arc<Self> {
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("loralink_{}", Uuid::new_v4()));

        let mut options = MqttOptions::new(client_id, &config.broker, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_max_packet_size(1024 * 1024, 1024 * 1024);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        if config.tls {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }

        let (client, eventloop) = AsyncClient::new(options, 10);

        let transport = Arc::new(Self {
            client,
            status: Arc::new(RwLock::new(ConnectionStatus::Connecting)),
            subscriptions: Arc::new(RwLock::new(Vec::new())),
        });

        transport.spawn_dispatch_loop(
            eventloop,
            config.reconnect_interval(),
            config.max_reconnect_attempts,
        );

        transport
    }

    /// Current connection status.
    pub async fn status(&self) -> ConnectionStatus {
        *self.status.read().await
    }

    /// Whether an active broker session exists.
    pub async fn is_connected(&self) -> bool {
        *self.status.read().await == ConnectionStatus::Connected
    }

    /// Poll until the broker session is established or `timeout` elapses.
    pub async fn wait_until_connected(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.is_connected().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.is_connected().await
    }

    fn spawn_dispatch_loop(
        &self,
        eventloop: EventLoop,
        reconnect_interval: Duration,
        max_attempts: u32,
    ) {
        let client = self.client.clone();
        let status = self.status.clone();
        let subscriptions = self.subscriptions.clone();

        tokio::spawn(async move {
            let mut eventloop = eventloop;
            let mut attempts: u32 = 0;

            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        attempts = 0;
                        *status.write().await = ConnectionStatus::Connected;
                        tracing::info!("MQTT broker session established");

                        // The broker may have lost our session across the
                        // reconnect; re-issue every registered filter.
                        let subs = subscriptions.read().await;
                        for sub in subs.iter() {
                            if let Err(e) = client
                                .subscribe(sub.filter.clone(), rumqttc::QoS::AtLeastOnce)
                                .await
                            {
                                tracing::warn!(filter = %sub.filter, "re-subscribe failed: {e}");
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        Self::dispatch(&subscriptions, publish).await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        *status.write().await = ConnectionStatus::Error;
                        attempts += 1;

                        if max_attempts != 0 && attempts >= max_attempts {
                            tracing::error!(
                                "MQTT connection failed after {attempts} attempts, giving up: {e}"
                            );
                            *status.write().await = ConnectionStatus::Disconnected;
                            break;
                        }

                        tracing::warn!(
                            attempt = attempts,
                            "MQTT connection error, retrying in {:?}: {e}",
                            reconnect_interval
                        );
                        tokio::time::sleep(reconnect_interval).await;
                    }
                }
            }
        });
    }

    /// Route one inbound publish to every matching handler.
    async fn dispatch(subscriptions: &RwLock<Vec<Subscription>>, publish: Publish) {
        let topic = publish.topic;
        let payload = publish.payload.to_vec();

        let subs = subscriptions.read().await;
        for sub in subs.iter() {
            if topic::matches(&sub.filter, &topic) {
                let handler = sub.handler.clone();
                let topic = topic.clone();
                let payload = payload.clone();

                // A failing or panicking handler must never take down the
                // dispatch loop.
                tokio::spawn(async move {
                    if let Err(e) = handler.on_message(&topic, &payload).await {
                        tracing::warn!(
                            handler = handler.name(),
                            topic = %topic,
                            "handler failed: {e}"
                        );
                    }
                });
            }
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: Qos) -> Result<(), PublishError> {
        if !self.is_connected().await {
            return Err(PublishError::NotConnected);
        }

        let qos = match qos {
            Qos::AtMostOnce => rumqttc::QoS::AtMostOnce,
            Qos::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            Qos::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        };

        self.client
            .publish(topic, qos, false, payload)
            .await
            .map_err(|e| PublishError::Rejected(e.to_string()))
    }

    async fn subscribe(
        &self,
        filter: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), SubscribeError> {
        self.subscriptions.write().await.push(Subscription {
            filter: filter.to_string(),
            handler,
        });

        self.client
            .subscribe(filter, rumqttc::QoS::AtLeastOnce)
            .await
            .map_err(|e| SubscribeError::Rejected(e.to_string()))?;

        tracing::info!(filter, "subscribed");
        Ok(())
    }
}
