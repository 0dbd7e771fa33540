//! Embedded MQTT broker.
//!
//! Hosts a `rumqttd` broker inside the daemon process so small fleets run
//! from a single binary with no external broker installation. Larger
//! deployments disable this and point `[mqtt]` at their own broker.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use thiserror::Error;

use loralink_core::config::BrokerConfig;

/// Embedded broker error type.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("broker error: {0}")]
    Broker(String),

    #[error("invalid listen address: {0}")]
    Config(String),
}

/// Handle managing the lifecycle of the embedded broker.
pub struct EmbeddedBroker {
    config: BrokerConfig,
    running: Arc<AtomicBool>,
}

impl EmbeddedBroker {
    /// Create a broker handle with the given configuration.
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the broker thread is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// The broker configuration.
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    fn socket_addr(&self) -> Result<SocketAddr, BrokerError> {
        format!("{}:{}", self.config.listen, self.config.port)
            .parse()
            .map_err(|e| BrokerError::Config(format!("{e}")))
    }

    /// Start the broker on a dedicated OS thread.
    ///
    /// If something is already listening on the configured port it is assumed
    /// to be a broker from a previous instance and the call succeeds without
    /// spawning. `rumqttd` blocks its thread until shutdown, so the thread is
    /// detached and lives for the rest of the process.
    pub fn start(&self) -> Result<(), BrokerError> {
        if self.is_running() {
            tracing::warn!("embedded broker is already running");
            return Ok(());
        }

        if is_broker_running(self.config.port) {
            tracing::info!(
                port = self.config.port,
                "broker port already in use, assuming a broker is running"
            );
            self.running.store(true, Ordering::Relaxed);
            return Ok(());
        }

        let addr = self.socket_addr()?;
        let running = self.running.clone();
        let max_connections = self.config.max_connections;
        let max_payload_size = self.config.max_payload_size;
        let connection_timeout_ms = self.config.connection_timeout_ms;

        running.store(true, Ordering::Relaxed);

        let _handle = thread::Builder::new()
            .name("loralink-broker".to_string())
            .spawn(move || {
                tracing::info!(%addr, "starting embedded MQTT broker");

                let mut broker_config = rumqttd::Config {
                    id: 0,
                    router: rumqttd::RouterConfig {
                        max_connections,
                        max_outgoing_packet_count: 200,
                        max_segment_size: 1048576,
                        max_segment_count: 10,
                        custom_segment: None,
                        initialized_filters: None,
                        ..Default::default()
                    },
                    v4: None,
                    v5: None,
                    ws: None,
                    cluster: None,
                    console: None,
                    bridge: None,
                    prometheus: None,
                    metrics: None,
                };

                // MQTT 3.1.1 listener; the deployed gateways speak v4 only.
                let mut v4 = HashMap::new();
                v4.insert(
                    "main".to_string(),
                    rumqttd::ServerSettings {
                        name: "loralink-broker".to_string(),
                        listen: addr,
                        tls: None,
                        next_connection_delay_ms: 1,
                        connections: rumqttd::ConnectionSettings {
                            connection_timeout_ms,
                            max_payload_size,
                            max_inflight_count: 200,
                            auth: None,
                            external_auth: None,
                            dynamic_filters: true,
                        },
                    },
                );
                broker_config.v4 = Some(v4);

                let mut broker = rumqttd::Broker::new(broker_config);
                match broker.start() {
                    Ok(_) => tracing::info!("embedded MQTT broker stopped"),
                    Err(e) => tracing::error!("embedded MQTT broker error: {e}"),
                }

                running.store(false, Ordering::Relaxed);
            })?;

        // Short grace period, then verify the listener actually came up.
        thread::sleep(std::time::Duration::from_millis(500));
        if !is_broker_running(self.config.port) {
            self.running.store(false, Ordering::Relaxed);
            return Err(BrokerError::Broker(format!(
                "broker did not open port {}",
                self.config.port
            )));
        }

        tracing::info!(port = self.config.port, "embedded MQTT broker ready");
        Ok(())
    }
}

/// Check whether a local port is free.
pub fn is_port_available(port: u16) -> bool {
    use std::net::{IpAddr, Ipv4Addr, TcpListener};

    TcpListener::bind((IpAddr::V4(Ipv4Addr::LOCALHOST), port)).is_ok()
}

/// Check whether something is already listening on the given port.
pub fn is_broker_running(port: u16) -> bool {
    !is_port_available(port)
}
