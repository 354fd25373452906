//! End-to-end tests over real Unix sockets.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use pc_components::ComponentError;
use pc_memory::{EchoOutputBinding, MemoryPubSub, MemoryStateStore};
use pc_proto::messages::{
    GetRequest, GetResponse, InvokeRequest, InvokeResponse, ListOperationsRequest,
    ListOperationsResponse, PingRequest, PingResponse, PublishRequest, PublishResponse,
    PullMessagesRequest, PullMessagesResponse, SetRequest, SetResponse, Topic,
};
use pc_proto::{
    Code, ComponentClient, TransportError, OUTPUT_BINDING_SERVICE, PUB_SUB_SERVICE,
    STATE_STORE_SERVICE, TRANSACTIONAL_STATE_STORE_SERVICE,
};
use pc_runtime::{
    HostConfig, HostError, PluggableApplication, RegistrationError, RunningApplication,
    ServiceOptions, INSTANCE_ID_METADATA_KEY,
};
use serde_json::json;
use tempfile::TempDir;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn app(dir: &TempDir) -> PluggableApplication {
    PluggableApplication::new(HostConfig {
        socket_folder: dir.path().to_path_buf(),
        ..HostConfig::default()
    })
}

async fn start_memory_host(dir: &TempDir) -> RunningApplication {
    let mut app = app(dir);
    app.register_service(ServiceOptions::new("memory-state"), |builder| {
        builder.register_state_store(|ctx| match ctx.instance_id() {
            Some("broken") => Err(ComponentError::construction("no backing store")),
            _ => Ok(MemoryStateStore::new()),
        })?;
        Ok(())
    })
    .unwrap()
    .register_service(ServiceOptions::new("memory-pubsub"), |builder| {
        builder.register_singleton_pub_sub(|_| Ok(MemoryPubSub::new()))?;
        Ok(())
    })
    .unwrap()
    .register_service(ServiceOptions::new("echo-binding"), |builder| {
        builder.register_output_binding(|_| Ok(EchoOutputBinding::new()))?;
        Ok(())
    })
    .unwrap();
    app.start().await.unwrap()
}

fn instance(id: &str) -> HashMap<String, String> {
    HashMap::from([(INSTANCE_ID_METADATA_KEY.to_string(), id.to_string())])
}

async fn connect(dir: &TempDir, socket: &str) -> ComponentClient {
    ComponentClient::connect(dir.path().join(format!("{socket}.sock")))
        .await
        .unwrap()
}

async fn get(client: &ComponentClient, id: &str, key: &str) -> GetResponse {
    client
        .call_unary(
            STATE_STORE_SERVICE,
            "Get",
            instance(id),
            &GetRequest {
                key: key.to_string(),
                ..GetRequest::default()
            },
        )
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_calls_route_by_instance_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let host = start_memory_host(&dir).await;
    let client = connect(&dir, "memory-state").await;

    let _: SetResponse = client
        .call_unary(
            STATE_STORE_SERVICE,
            "Set",
            instance("a"),
            &SetRequest {
                key: "k".to_string(),
                value: Bytes::from_static(b"from-a"),
                ..SetRequest::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(get(&client, "a", "k").await.data, Bytes::from_static(b"from-a"));
    let other = get(&client, "b", "k").await;
    assert!(other.data.is_empty());
    assert!(other.etag.is_none());

    host.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_construction_failure_reported_as_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let host = start_memory_host(&dir).await;
    let client = connect(&dir, "memory-state").await;

    let err = client
        .call_unary::<_, PingResponse>(
            STATE_STORE_SERVICE,
            "Ping",
            instance("broken"),
            &PingRequest {},
        )
        .await
        .unwrap_err();
    assert_eq!(err.status().map(|s| s.code), Some(Code::Unavailable));

    let _: PingResponse = client
        .call_unary(STATE_STORE_SERVICE, "Ping", instance("fine"), &PingRequest {})
        .await
        .unwrap();

    host.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_transact_drops_unknown_steps() {
    // Already registered when another test got here first.
    let _ = pc_telemetry::register_metrics();
    let dir = tempfile::tempdir().unwrap();
    let host = start_memory_host(&dir).await;
    let client = connect(&dir, "memory-state").await;

    let _: SetResponse = client
        .call_unary(
            STATE_STORE_SERVICE,
            "Set",
            instance("tx"),
            &SetRequest {
                key: "b".to_string(),
                value: Bytes::from_static(b"old"),
                ..SetRequest::default()
            },
        )
        .await
        .unwrap();

    // "31" is the hex encoding of "1".
    let request = json!({
        "operations": [
            { "request": { "set": { "key": "a", "value": "31" } } },
            { "request": { "delete": { "key": "b" } } },
            { "request": { "upsert": { "key": "c", "value": "32" } } }
        ]
    });
    let _: serde_json::Value = client
        .call_unary(
            TRANSACTIONAL_STATE_STORE_SERVICE,
            "Transact",
            instance("tx"),
            &request,
        )
        .await
        .unwrap();

    assert_eq!(get(&client, "tx", "a").await.data, Bytes::from_static(b"1"));
    assert!(get(&client, "tx", "b").await.data.is_empty());
    assert!(get(&client, "tx", "c").await.data.is_empty());

    let metrics = host.metrics().unwrap();
    assert!(metrics.contains("pc_adaptor_transact_operations_dropped_total"));

    let malformed = json!({
        "operations": [
            { "request": { "set": { "key": "d", "value": "34" } } },
            { "request": { "delete": { "key": 7 } } }
        ]
    });
    let err = client
        .call_unary::<_, serde_json::Value>(
            TRANSACTIONAL_STATE_STORE_SERVICE,
            "Transact",
            instance("tx"),
            &malformed,
        )
        .await
        .unwrap_err();
    assert_eq!(err.status().map(|s| s.code), Some(Code::InvalidArgument));
    assert!(get(&client, "tx", "d").await.data.is_empty());

    host.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_service_and_method_unimplemented() {
    let dir = tempfile::tempdir().unwrap();
    let host = start_memory_host(&dir).await;
    let client = connect(&dir, "echo-binding").await;

    let err = client
        .call_unary::<_, serde_json::Value>(STATE_STORE_SERVICE, "Get", HashMap::new(), &json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.status().map(|s| s.code), Some(Code::Unimplemented));

    let err = client
        .call_unary::<_, serde_json::Value>(
            OUTPUT_BINDING_SERVICE,
            "Explode",
            HashMap::new(),
            &json!({}),
        )
        .await
        .unwrap_err();
    assert_eq!(err.status().map(|s| s.code), Some(Code::Unimplemented));

    host.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_output_binding_over_socket() {
    let dir = tempfile::tempdir().unwrap();
    let host = start_memory_host(&dir).await;
    let client = connect(&dir, "echo-binding").await;

    let operations: ListOperationsResponse = client
        .call_unary(
            OUTPUT_BINDING_SERVICE,
            "ListOperations",
            HashMap::new(),
            &ListOperationsRequest {},
        )
        .await
        .unwrap();
    assert_eq!(operations.operations, vec!["echo".to_string()]);

    let response: InvokeResponse = client
        .call_unary(
            OUTPUT_BINDING_SERVICE,
            "Invoke",
            HashMap::new(),
            &InvokeRequest {
                operation: "echo".to_string(),
                data: Bytes::from_static(b"hello"),
                ..InvokeRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(response.data, Bytes::from_static(b"hello"));

    host.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pull_messages_delivers_then_cancels() {
    let dir = tempfile::tempdir().unwrap();
    let host = start_memory_host(&dir).await;
    let client = connect(&dir, "memory-pubsub").await;

    let mut stream = client
        .open_stream(PUB_SUB_SERVICE, "PullMessages", HashMap::new())
        .await
        .unwrap();
    stream
        .send(&PullMessagesRequest {
            topic: Some(Topic {
                name: "orders".to_string(),
                ..Topic::default()
            }),
            ..PullMessagesRequest::default()
        })
        .await
        .unwrap();

    // Messages published before the subscription is live are dropped, so
    // publish until one arrives.
    let mut delivered = None;
    for _ in 0..100 {
        let _: PublishResponse = client
            .call_unary(
                PUB_SUB_SERVICE,
                "Publish",
                HashMap::new(),
                &PublishRequest {
                    topic: "orders".to_string(),
                    data: Bytes::from_static(b"order-1"),
                    ..PublishRequest::default()
                },
            )
            .await
            .unwrap();
        if let Ok(message) =
            timeout(Duration::from_millis(50), stream.message::<PullMessagesResponse>()).await
        {
            delivered = message.unwrap();
            break;
        }
    }
    let delivered = delivered.expect("no message delivered");
    assert_eq!(delivered.topic_name, "orders");
    assert_eq!(delivered.data, Bytes::from_static(b"order-1"));

    stream.cancel().await.unwrap();
    let outcome = timeout(WAIT, async {
        loop {
            match stream.message::<PullMessagesResponse>().await {
                Ok(Some(_)) => continue,
                other => break other,
            }
        }
    })
    .await
    .expect("stream did not end after cancel");
    let err = outcome.unwrap_err();
    assert_eq!(err.status().map(|s| s.code), Some(Code::Cancelled));

    host.shutdown().await;
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_socket_permissions_relaxed_once() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let host = start_memory_host(&dir).await;

    for socket in host.sockets() {
        let mode = std::fs::metadata(socket.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o666);
        assert!(socket.is_relaxed());
        assert!(!socket.relax_permissions().await.unwrap());
    }

    host.shutdown().await;
}

#[tokio::test]
async fn test_stale_socket_replaced_and_removed_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let stale = dir.path().join("echo-binding.sock");
    std::fs::write(&stale, b"stale").unwrap();

    let mut app = app(&dir);
    app.register_service(ServiceOptions::new("echo-binding"), |builder| {
        builder.register_output_binding(|_| Ok(EchoOutputBinding::new()))?;
        Ok(())
    })
    .unwrap();
    let host = app.start().await.unwrap();
    assert_eq!(host.socket_paths(), vec![stale.clone()]);

    let client = ComponentClient::connect(&stale).await.unwrap();
    let _: PingResponse = client
        .call_unary(OUTPUT_BINDING_SERVICE, "Ping", HashMap::new(), &PingRequest {})
        .await
        .unwrap();

    host.shutdown().await;
    assert!(!stale.exists());
}

#[tokio::test]
async fn test_failed_start_leaves_nothing_serving() {
    let dir = tempfile::tempdir().unwrap();
    let blocked = dir.path().join("second.sock");
    std::fs::create_dir(&blocked).unwrap();
    std::fs::write(blocked.join("keep"), b"x").unwrap();

    let mut app = app(&dir);
    app.register_service(ServiceOptions::new("first"), |builder| {
        builder.register_output_binding(|_| Ok(EchoOutputBinding::new()))?;
        Ok(())
    })
    .unwrap()
    .register_service(ServiceOptions::new("second"), |builder| {
        builder.register_output_binding(|_| Ok(EchoOutputBinding::new()))?;
        Ok(())
    })
    .unwrap();

    assert!(app.start().await.is_err());

    let first = dir.path().join("first.sock");
    assert!(!first.exists());
    assert!(ComponentClient::connect(&first).await.is_err());
    assert!(blocked.join("keep").exists());
}

#[test]
fn test_duplicate_state_store_rejected_before_serving() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = app(&dir);

    let err = app
        .register_service(ServiceOptions::new("memory-state"), |builder| {
            builder
                .register_state_store(|_| Ok(MemoryStateStore::new()))?
                .register_singleton_state_store(|_| Ok(MemoryStateStore::new()))?;
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(
        err,
        HostError::Registration(RegistrationError::DuplicateCapability { .. })
    ));
    assert!(app.socket_paths().is_empty());
}

#[test]
fn test_duplicate_socket_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = app(&dir);
    app.register_service(ServiceOptions::new("shared"), |builder| {
        builder.register_output_binding(|_| Ok(EchoOutputBinding::new()))?;
        Ok(())
    })
    .unwrap();

    let err = app
        .register_service(ServiceOptions::new("shared"), |builder| {
            builder.register_pub_sub(|_| Ok(MemoryPubSub::new()))?;
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, HostError::DuplicateSocket(_)));
}

#[tokio::test]
async fn test_connection_error_is_not_a_status() {
    let dir = tempfile::tempdir().unwrap();
    let missing = ComponentClient::connect(dir.path().join("absent.sock")).await;
    assert!(matches!(missing, Err(TransportError::Io(_))));
}
