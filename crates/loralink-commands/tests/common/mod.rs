//! In-process transport for correlator tests.
//!
//! Records publishes and lets tests inject inbound messages that are routed
//! to subscribed handlers exactly like the real dispatch loop would, minus
//! the broker.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::RwLock;

use loralink_core::envelope::CommandEnvelope;
use loralink_core::topic;
use loralink_transport::{MessageHandler, PublishError, Qos, SubscribeError, Transport};

/// One recorded publish.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: Qos,
}

impl PublishedMessage {
    /// Parse the payload back into a command envelope.
    pub fn envelope(&self) -> CommandEnvelope {
        serde_json::from_slice(&self.payload).expect("published payload is a command envelope")
    }
}

/// Transport double: records publishes, dispatches injected messages.
pub struct MockTransport {
    published: Mutex<Vec<PublishedMessage>>,
    handlers: RwLock<Vec<(String, Arc<dyn MessageHandler>)>>,
    fail_publishes: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            published: Mutex::new(Vec::new()),
            handlers: RwLock::new(Vec::new()),
            fail_publishes: AtomicBool::new(false),
        })
    }

    /// Make subsequent publishes fail synchronously.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::Relaxed);
    }

    /// Everything published so far.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    /// Wait until at least `count` messages have been published.
    pub async fn wait_for_publishes(&self, count: usize) -> Vec<PublishedMessage> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let published = self.published();
            if published.len() >= count {
                return published;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "expected {count} publishes, saw {} within 2s",
                    published.len()
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Deliver an inbound message to every matching handler.
    pub async fn inject(&self, topic: &str, payload: &[u8]) {
        let handlers = self.handlers.read().await;
        for (filter, handler) in handlers.iter() {
            if topic::matches(filter, topic) {
                handler
                    .on_message(topic, payload)
                    .await
                    .expect("handlers absorb their own failures");
            }
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: Qos) -> Result<(), PublishError> {
        if self.fail_publishes.load(Ordering::Relaxed) {
            return Err(PublishError::Rejected("injected publish failure".into()));
        }

        self.published.lock().unwrap().push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            qos,
        });
        Ok(())
    }

    async fn subscribe(
        &self,
        filter: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), SubscribeError> {
        self.handlers
            .write()
            .await
            .push((filter.to_string(), handler));
        Ok(())
    }
}

/// Build a gateway response payload in the deployed wire shape.
pub fn response_payload(
    correlation_id: &str,
    success: bool,
    message: &str,
    extra: serde_json::Value,
) -> Vec<u8> {
    let mut response = json!({ "success": success, "message": message });
    if let (Some(target), Some(source)) = (response.as_object_mut(), extra.as_object()) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }
    serde_json::to_vec(&json!({
        "correlation_id": correlation_id,
        "response": response
    }))
    .unwrap()
}
