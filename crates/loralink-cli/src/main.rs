//! Command-line interface for the LoraLink control plane.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use loralink_commands::{CommandCorrelator, ResponseDemultiplexer};
use loralink_core::config::Config;
use loralink_core::envelope::CommandAction;
use loralink_devices::{ConnectionRegistry, StatusMonitor, TelemetryCollector};
use loralink_transport::{MqttTransport, Qos, Transport};

#[cfg(feature = "embedded-broker")]
use loralink_transport::EmbeddedBroker;

/// LoraLink - control plane for LoRa gateway fleets.
#[derive(Parser, Debug)]
#[command(name = "loralink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Path to the TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the control-plane daemon.
    Serve,
    /// Issue one command to a gateway and print its response.
    Send {
        /// Target gateway id.
        device_id: String,
        /// Action name, e.g. RELAY_CONTROL or ENROLL_NODE.
        action: String,
        /// JSON payload for the action.
        #[arg(default_value = "{}")]
        data: String,
        /// Response deadline in milliseconds (defaults to the configured one).
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Serve => serve(config).await,
        Command::Send {
            device_id,
            action,
            data,
            timeout_ms,
        } => send_command(config, device_id, action, data, timeout_ms).await,
    }
}

fn init_tracing(verbose: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(if verbose { "debug" } else { "info" })
        });

    // JSON logs for production/container environments.
    let json_logging = std::env::var("LORALINK_LOG_JSON")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init();
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None if Path::new("loralink.toml").exists() => Config::from_file("loralink.toml")
            .context("failed to load config from loralink.toml"),
        None => Ok(Config::default()),
    }
}

#[cfg(feature = "embedded-broker")]
fn start_embedded_broker(config: &Config) -> Result<()> {
    if config.broker.enabled {
        let broker = EmbeddedBroker::new(config.broker.clone());
        broker
            .start()
            .context("embedded MQTT broker failed to start")?;
    }
    Ok(())
}

#[cfg(not(feature = "embedded-broker"))]
fn start_embedded_broker(config: &Config) -> Result<()> {
    if config.broker.enabled {
        tracing::warn!("broker.enabled is set but this build carries no embedded broker");
    }
    Ok(())
}

/// Run the control-plane daemon.
///
/// Builds the component graph once at startup (embedded broker, transport,
/// registry, correlator, demultiplexer, monitors) and keeps it alive until
/// ctrl-c. The HTTP and signaling layers consume these components as a
/// library; this binary is the process shell around them.
async fn serve(config: Config) -> Result<()> {
    tracing::info!(version = loralink_core::VERSION, "starting LoraLink control plane");

    start_embedded_broker(&config)?;

    let transport = MqttTransport::connect(config.mqtt.clone()).await;
    if !transport
        .wait_until_connected(Duration::from_secs(10))
        .await
    {
        tracing::warn!("no broker session yet; reconnecting in the background");
    }

    let registry = Arc::new(ConnectionRegistry::new());

    let qos = Qos::from_u8(config.mqtt.qos).unwrap_or_default();
    let correlator = Arc::new(
        CommandCorrelator::new(transport.clone() as Arc<dyn Transport>, &config.commands)
            .with_qos(qos),
    );

    let demux = Arc::new(ResponseDemultiplexer::new(correlator.clone()));
    demux
        .clone()
        .attach(transport.as_ref())
        .await
        .context("failed to subscribe to gateway responses")?;

    let status_monitor = Arc::new(StatusMonitor::new(registry.clone()));
    status_monitor
        .clone()
        .attach(transport.as_ref())
        .await
        .context("failed to subscribe to gateway status")?;

    let telemetry = Arc::new(TelemetryCollector::new());
    telemetry
        .clone()
        .attach(transport.as_ref())
        .await
        .context("failed to subscribe to sensor telemetry")?;

    spawn_fleet_snapshot_task(
        registry.clone(),
        correlator.clone(),
        demux.clone(),
        telemetry.clone(),
    );

    tracing::info!("control plane ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");

    Ok(())
}

/// Log a periodic one-line overview of the fleet and the command engine.
fn spawn_fleet_snapshot_task(
    registry: Arc<ConnectionRegistry>,
    correlator: Arc<CommandCorrelator>,
    demux: Arc<ResponseDemultiplexer>,
    telemetry: Arc<TelemetryCollector>,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        // The first tick fires immediately; skip it.
        interval.tick().await;

        loop {
            interval.tick().await;

            let sessions = registry.statuses().await;
            let online = sessions.iter().filter(|s| s.online).count();
            let stats = correlator.stats();

            tracing::info!(
                gateways = sessions.len(),
                online,
                in_flight = stats.in_flight,
                sent = stats.sent,
                timeouts = stats.timeouts,
                unmatched_responses = demux.stats().unmatched,
                readings = telemetry.readings_received(),
                "fleet snapshot"
            );
        }
    });
}

/// Issue a single command and print the gateway's reply as JSON.
async fn send_command(
    config: Config,
    device_id: String,
    action: String,
    data: String,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let data: serde_json::Value =
        serde_json::from_str(&data).context("command data must be valid JSON")?;

    let transport = MqttTransport::connect(config.mqtt.clone()).await;
    anyhow::ensure!(
        transport
            .wait_until_connected(Duration::from_secs(10))
            .await,
        "could not reach the MQTT broker at {}:{}",
        config.mqtt.broker,
        config.mqtt.port
    );

    let qos = Qos::from_u8(config.mqtt.qos).unwrap_or_default();
    let correlator = Arc::new(
        CommandCorrelator::new(transport.clone() as Arc<dyn Transport>, &config.commands)
            .with_qos(qos),
    );
    let demux = Arc::new(ResponseDemultiplexer::new(correlator.clone()));
    demux
        .clone()
        .attach(transport.as_ref())
        .await
        .context("failed to subscribe to gateway responses")?;

    // Give the broker a moment to ack the response subscription before the
    // command goes out.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let timeout = timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.commands.default_timeout());

    let body = correlator
        .send_with_timeout(&device_id, CommandAction::from(action.as_str()), data, timeout)
        .await?;

    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
