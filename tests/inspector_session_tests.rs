// End-to-end inspector sessions against a fake runtime on a loopback socket
//
// The fake answers one discovery request over plain HTTP, then accepts the
// websocket the client opens from the listing and replies per a script.

mod utils;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::EnvFilter;
use v8scope::client::{InspectorClient, RuntimeKind};
use v8scope::config::ClientConfig;
use v8scope::heap::DecodeOptions;
use v8scope::InspectError;

type Script = fn(u64, &str) -> Vec<Value>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(port: u16) -> ClientConfig {
    ClientConfig::local(port)
        .with_command_timeout(Duration::from_secs(2))
        .with_capture_grace(Duration::from_millis(50))
        .with_progress_timeout(Duration::from_secs(2))
}

async fn read_request(stream: &mut TcpStream) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await.unwrap();
        if n == 0 {
            return;
        }
        request.extend_from_slice(&buf[..n]);
    }
}

async fn serve_discovery(listener: &TcpListener, listing: &str) {
    let (mut stream, _) = listener.accept().await.unwrap();
    read_request(&mut stream).await;
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        listing.len(),
        listing
    );
    stream.write_all(response.as_bytes()).await.unwrap();
    let _ = stream.shutdown().await;
}

/// Serve one discovery listing pointing back at this listener, then one
/// websocket session
async fn spawn_runtime(script: Script) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let listing = json!([{
        "description": "node.js instance",
        "id": "c0ffee",
        "title": "server.js",
        "type": "node",
        "url": "file:///srv/server.js",
        "webSocketDebuggerUrl": format!("ws://127.0.0.1:{port}/c0ffee")
    }])
    .to_string();

    tokio::spawn(async move {
        serve_discovery(&listener, &listing).await;

        let (stream, _) = listener.accept().await.unwrap();
        let socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (mut sink, mut source) = socket.split();
        while let Some(Ok(message)) = source.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            let command: Value = serde_json::from_str(&text).unwrap();
            let id = command["id"].as_u64().unwrap();
            for frame in script(id, command["method"].as_str().unwrap()) {
                if sink.send(Message::Text(frame.to_string())).await.is_err() {
                    return;
                }
            }
        }
    });

    port
}

fn profile() -> Value {
    json!({
        "nodes": [
            { "id": 1, "callFrame": { "functionName": "(root)", "scriptId": "0", "url": "", "lineNumber": -1, "columnNumber": -1 }, "children": [2] },
            { "id": 2, "callFrame": { "functionName": "main", "scriptId": "7", "url": "file:///srv/server.js", "lineNumber": 0, "columnNumber": 0 }, "children": [3] },
            { "id": 3, "callFrame": { "functionName": "render", "scriptId": "7", "url": "file:///srv/server.js", "lineNumber": 40, "columnNumber": 2 } }
        ],
        "startTime": 0,
        "endTime": 5000,
        "samples": [3, 3, 3, 2, 1],
        "timeDeltas": [1000, 1000, 1000, 1000, 1000]
    })
}

fn node_runtime(id: u64, method: &str) -> Vec<Value> {
    match method {
        "HeapProfiler.takeHeapSnapshot" => {
            let payload = utils::leaking_heap(3);
            let third = payload.len() / 3;
            let mut frames: Vec<Value> = [
                &payload[..third],
                &payload[third..2 * third],
                &payload[2 * third..],
            ]
            .iter()
            .map(|chunk| json!({ "method": "HeapProfiler.addHeapSnapshotChunk", "params": { "chunk": chunk } }))
            .collect();
            frames.push(json!({
                "method": "HeapProfiler.reportHeapSnapshotProgress",
                "params": { "done": 10, "total": 10, "finished": true }
            }));
            frames.push(json!({ "id": id, "result": {} }));
            frames
        }
        "Profiler.stop" => vec![json!({ "id": id, "result": { "profile": profile() } })],
        "Runtime.evaluate" => vec![json!({
            "id": id,
            "result": { "result": { "type": "number", "value": 2, "description": "2" } }
        })],
        _ => vec![json!({ "id": id, "result": {} })],
    }
}

#[tokio::test]
async fn test_connect_capture_and_profile() {
    init_tracing();
    let port = spawn_runtime(node_runtime).await;

    let client = InspectorClient::connect(config(port)).await.unwrap();
    assert_eq!(client.target().unwrap().id, "c0ffee");
    assert_eq!(client.runtime(), RuntimeKind::Node);

    let graph = client
        .capture_heap_snapshot(true, DecodeOptions::default())
        .await
        .unwrap();
    let sessions = graph.nodes_by_name("Session");
    assert_eq!(sessions.len(), 3);
    let path = graph.find_retaining_path(sessions[2].id, 8).unwrap().unwrap();
    assert_eq!(path.len(), 3);
    assert_eq!(client.handler_count(), 0);

    client.start_profiling().await.unwrap();
    let profile = client.stop_profiling().await.unwrap();
    let names: Vec<String> = profile
        .hot_functions(3)
        .into_iter()
        .map(|f| f.function_name)
        .collect();
    assert_eq!(names, vec!["(root)", "main", "render"]);

    let value = client.evaluate("1 + 1", None, None).await.unwrap();
    assert_eq!(value["value"], 2);

    client.close();
    assert!(matches!(
        client.send_command("Runtime.evaluate", None).await,
        Err(InspectError::ConnectionLost)
    ));

    // The socket winds down once the runtime sees the close frame
    tokio::time::timeout(Duration::from_secs(2), async {
        while !client.is_closed() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_connect_without_targets() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move { serve_discovery(&listener, "[]").await });

    match InspectorClient::connect(config(port)).await.unwrap_err() {
        InspectError::Connection(message) => assert_eq!(message, "No debugger targets found"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_connect_unreachable_port() {
    init_tracing();
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let err = InspectorClient::connect(config(port)).await.unwrap_err();
    assert!(matches!(err, InspectError::Connection(_)));
    assert!(!err.is_transient());
}
