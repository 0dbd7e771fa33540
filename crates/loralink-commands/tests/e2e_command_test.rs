//! End-to-end control-plane scenarios.
//!
//! Wires registry, correlator and demultiplexer together over the mock
//! transport and walks the flows the HTTP layer drives in production.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use common::{response_payload, MockTransport};
use loralink_commands::{CommandCorrelator, CommandError, ResponseDemultiplexer};
use loralink_core::config::CommandConfig;
use loralink_core::envelope::CommandAction;
use loralink_core::topic;
use loralink_devices::{ConnectionRegistry, SessionHandle};
use loralink_transport::Transport;

struct Plane {
    transport: Arc<MockTransport>,
    registry: Arc<ConnectionRegistry>,
    correlator: Arc<CommandCorrelator>,
}

async fn control_plane() -> Plane {
    let transport = MockTransport::new();
    let registry = Arc::new(ConnectionRegistry::new());
    let correlator = Arc::new(CommandCorrelator::new(
        transport.clone() as Arc<dyn Transport>,
        &CommandConfig::default(),
    ));
    let demux = Arc::new(ResponseDemultiplexer::new(correlator.clone()));
    demux.clone().attach(transport.as_ref()).await.unwrap();

    Plane {
        transport,
        registry,
        correlator,
    }
}

#[tokio::test]
async fn registered_gateway_round_trip_and_absent_gateway_timeout() {
    let plane = control_plane().await;

    // The signaling layer reports G1 online.
    plane
        .registry
        .register("G1", SessionHandle::new(7), "192.168.1.50:7077")
        .await;
    assert!(plane.registry.is_online("G1").await);

    // Command to the live gateway resolves within the deadline.
    let task = {
        let correlator = plane.correlator.clone();
        tokio::spawn(async move {
            correlator
                .send("G1", CommandAction::Other("PING".into()), json!({}))
                .await
        })
    };

    let published = plane.transport.wait_for_publishes(1).await;
    assert_eq!(published[0].topic, "gateway/G1/command");

    let envelope = published[0].envelope();
    plane
        .transport
        .inject(
            &topic::response_topic("G1"),
            &response_payload(&envelope.correlation_id, true, "pong", json!({})),
        )
        .await;

    let body = task.await.unwrap().expect("live gateway answers");
    assert_eq!(body.message, "pong");

    // G2 was never registered; the send still publishes (registration is not
    // a precondition) and settles by timeout.
    let deadline = Duration::from_millis(120);
    let started = Instant::now();
    let err = plane
        .correlator
        .send_with_timeout("G2", CommandAction::Other("PING".into()), json!({}), deadline)
        .await
        .unwrap_err();

    assert!(matches!(err, CommandError::Timeout(_)));
    assert!(started.elapsed() >= deadline);

    let published = plane.transport.published();
    assert!(published.iter().any(|m| m.topic == "gateway/G2/command"));
    assert!(plane.registry.lookup("G2").await.is_none());
}

#[tokio::test]
async fn enrollment_flow_uses_the_uniform_send_surface() {
    let plane = control_plane().await;
    plane
        .registry
        .register("G100101", SessionHandle::new(1), "192.168.1.60:7077")
        .await;

    // Enrollment command, as the gateway controller would issue it.
    let task = {
        let correlator = plane.correlator.clone();
        tokio::spawn(async move {
            correlator
                .send(
                    "G100101",
                    CommandAction::RegisterGateway,
                    json!({
                        "gateway_id": "G100101",
                        "user_id": "u-17",
                        "gateway_name": "greenhouse"
                    }),
                )
                .await
        })
    };

    let published = plane.transport.wait_for_publishes(1).await;
    let envelope = published[0].envelope();
    assert_eq!(envelope.action, CommandAction::RegisterGateway);
    assert_eq!(envelope.data["gateway_name"], json!("greenhouse"));

    plane
        .transport
        .inject(
            &topic::response_topic("G100101"),
            &response_payload(
                &envelope.correlation_id,
                true,
                "Gateway registered",
                json!({ "gateway_id": "G100101" }),
            ),
        )
        .await;

    let body = task.await.unwrap().unwrap();
    assert_eq!(body.get("gateway_id"), Some(&json!("G100101")));

    // The device refusing a command surfaces as a remote failure, not a
    // transport problem.
    let task = {
        let correlator = plane.correlator.clone();
        tokio::spawn(async move {
            correlator
                .send(
                    "G100101",
                    CommandAction::UnenrollNode,
                    json!({ "node_id": "N404" }),
                )
                .await
        })
    };

    let published = plane.transport.wait_for_publishes(2).await;
    let envelope = published[1].envelope();
    plane
        .transport
        .inject(
            &topic::response_topic("G100101"),
            &response_payload(&envelope.correlation_id, false, "Node not enrolled", json!({})),
        )
        .await;

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, CommandError::Remote(ref m) if m == "Node not enrolled"));
}

#[tokio::test]
async fn responses_settle_by_correlation_id_not_arrival_order() {
    let plane = control_plane().await;

    let first = {
        let correlator = plane.correlator.clone();
        tokio::spawn(async move {
            correlator
                .send("G1", CommandAction::Other("FIRST".into()), json!({}))
                .await
        })
    };
    plane.transport.wait_for_publishes(1).await;

    let second = {
        let correlator = plane.correlator.clone();
        tokio::spawn(async move {
            correlator
                .send("G1", CommandAction::Other("SECOND".into()), json!({}))
                .await
        })
    };
    let published = plane.transport.wait_for_publishes(2).await;

    // Answer in reverse order of issue.
    let second_envelope = published[1].envelope();
    let first_envelope = published[0].envelope();
    plane
        .transport
        .inject(
            &topic::response_topic("G1"),
            &response_payload(&second_envelope.correlation_id, true, "second", json!({})),
        )
        .await;
    plane
        .transport
        .inject(
            &topic::response_topic("G1"),
            &response_payload(&first_envelope.correlation_id, true, "first", json!({})),
        )
        .await;

    assert_eq!(first.await.unwrap().unwrap().message, "first");
    assert_eq!(second.await.unwrap().unwrap().message, "second");
}
