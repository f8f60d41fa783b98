use std::io::IsTerminal;
use std::time::Duration;

use client::testing::{Reply, StubRemote, connect_stub};
use client::{Client, ClientConfig, ClientError, Protocol};
use eyre::WrapErr;
use futures::StreamExt;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;
use wire::testing::MemoryTransport;
use bytes::Bytes;
use wire::{Frame, FrameSink, FrameStream, Request, Transport, TransportError, WireCodec};

// test suite "constructor"
#[ctor::ctor]
fn init() {
    let in_ci = std::env::var("CI")
        .map(|val| val == "true")
        .unwrap_or(false);

    if std::io::stderr().is_terminal() || in_ci {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .json()
            .try_init();
    }

    // error traces
    let _ = color_eyre::install();
}

const TIMEOUT: Duration = Duration::from_secs(1);

fn get_property_params() -> Option<Value> {
    Some(json!({"path": "/X", "property": "y"}))
}

fn answer_get_property(request: &Request) -> Reply {
    match request.method.as_str() {
        "get_property" => Reply::Result(json!({"value": 42})),
        other => Reply::error(format!("unknown method {other}")),
    }
}

#[tokio::test]
async fn call_receives_result() -> eyre::Result<()> {
    for protocol in [Protocol::Text, Protocol::Binary] {
        let (client, remote) = connect_stub(protocol, answer_get_property).await;

        let result = client
            .send("get_property", get_property_params(), TIMEOUT)
            .await
            .wrap_err_with(|| format!("calling get_property over {protocol:?}"))?;
        assert_eq!(result["value"], json!(42));

        let requests = remote.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "get_property");
        assert_eq!(requests[0].params, get_property_params());

        client.disconnect().await;
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn silent_remote_times_out_after_timeout() {
    let (client, _remote) = connect_stub(Protocol::Text, |_| Reply::Silent).await;

    let start = Instant::now();
    let err = client
        .send("get_property", get_property_params(), TIMEOUT)
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert!(
        matches!(&err, ClientError::RequestTimeout { operation, timeout } if operation == "get_property" && *timeout == TIMEOUT),
        "unexpected error {err:?}"
    );
    assert!(elapsed >= TIMEOUT, "timed out early after {elapsed:?}");
    assert!(elapsed < TIMEOUT + Duration::from_millis(50), "timed out late after {elapsed:?}");
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn remote_error_is_surfaced_verbatim() {
    let (client, _remote) =
        connect_stub(Protocol::Text, |_| Reply::error("no such node")).await;

    let err = client
        .send("get_property", get_property_params(), TIMEOUT)
        .await
        .unwrap_err();

    match err {
        ClientError::Remote { method, message, .. } => {
            assert_eq!(method, "get_property");
            assert_eq!(message, "no such node");
        }
        other => panic!("expected a remote error, got {other:?}"),
    }
    assert!(client.is_connected());
}

#[tokio::test]
async fn remote_error_code_survives_binary_protocol() {
    let (client, _remote) = connect_stub(Protocol::Binary, |_| Reply::Error {
        code: Some(404),
        message: "no such node".to_string(),
    })
    .await;

    let err = client.call("get_node", None).await.unwrap_err();
    assert!(matches!(err, ClientError::Remote { code: Some(404), .. }));
}

#[tokio::test(start_paused = true)]
async fn concurrent_calls_get_their_own_answers() {
    // Later requests are answered sooner, so responses arrive in reverse.
    let (client, _remote) = connect_stub(Protocol::Binary, |request| {
        let n = request.params.as_ref().and_then(|p| p["n"].as_u64()).unwrap_or(0);
        Reply::delayed(
            Duration::from_millis(100 - n),
            Reply::Result(json!({"n": n})),
        )
    })
    .await;

    let calls = (0..50u64).map(|n| {
        let client = client.clone();
        tokio::spawn(async move {
            let result = client
                .send("echo", Some(json!({"n": n})), TIMEOUT)
                .await
                .unwrap();
            (n, result)
        })
    });

    for handle in calls.collect::<Vec<_>>() {
        let (n, result) = handle.await.unwrap();
        assert_eq!(result, json!({"n": n}));
    }
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn disconnect_fails_pending_calls() {
    let (client, _remote) = connect_stub(Protocol::Text, |_| Reply::Silent).await;

    let calls: Vec<_> = (0..5)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .send("wait_frames", None, Duration::from_secs(60))
                    .await
            })
        })
        .collect();

    while client.pending_requests() < 5 {
        tokio::task::yield_now().await;
    }
    client.disconnect().await;

    for call in calls {
        let err = call.await.unwrap().unwrap_err();
        assert!(
            matches!(err, ClientError::ConnectionClosed { .. }),
            "unexpected error {err:?}"
        );
    }

    // disconnect is idempotent and later calls fail fast
    client.disconnect().await;
    assert!(!client.is_connected());
    assert!(matches!(
        client.call("get_tree", None).await,
        Err(ClientError::ConnectionClosed { .. })
    ));
}

#[tokio::test]
async fn concurrent_disconnects_both_wait_for_shutdown() {
    let (client, _remote) = connect_stub(Protocol::Binary, |_| Reply::Silent).await;
    let mut events = client.subscribe_all().unwrap();

    let other = client.clone();
    tokio::join!(client.disconnect(), other.disconnect());

    // The receive loop closes subscriptions before it exits, so once either
    // disconnect returns the subscription has already ended.
    let next = tokio::time::timeout(Duration::ZERO, events.recv()).await;
    assert!(matches!(next, Ok(None)), "subscription still open: {next:?}");
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn remote_close_fails_pending_calls() {
    let (client, remote) = connect_stub(Protocol::Binary, |request| {
        if request.method == "quit" {
            Reply::Close
        } else {
            Reply::Silent
        }
    })
    .await;

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.send("get_tree", None, Duration::from_secs(60)).await }
    });
    while client.pending_requests() < 1 {
        tokio::task::yield_now().await;
    }

    let err = client.call("quit", None).await.unwrap_err();
    assert!(err.is_connection_fatal(), "unexpected error {err:?}");

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::ConnectionClosed { .. }));
    assert!(!client.is_connected());

    remote.close().await;
}

#[tokio::test]
async fn not_connected_before_connect() {
    let client = Client::new(ClientConfig::default());
    assert!(!client.is_connected());
    assert!(matches!(
        client.call("get_tree", None).await,
        Err(ClientError::NotConnected)
    ));
    assert!(matches!(client.subscribe("ready"), Err(ClientError::NotConnected)));
    client.disconnect().await;
}

#[tokio::test]
async fn notifications_reach_subscribers() -> eyre::Result<()> {
    let (client, remote) = connect_stub(Protocol::Text, |_| Reply::Result(Value::Null)).await;

    let mut pressed = client.subscribe("pressed")?;
    let all = client.subscribe_all()?;

    remote.notify("unwatched", None);
    remote.notify("pressed", Some(json!({"source": "/root/Main/Button"})));

    let event = pressed.recv().await.expect("subscription ended early");
    assert_eq!(event.name, "pressed");
    assert_eq!(event.payload, Some(json!({"source": "/root/Main/Button"})));

    // a round trip after the notifications keeps the client healthy
    client.call("ping", None).await?;

    remote.close().await;
    assert!(pressed.recv().await.is_none());

    let names: Vec<_> = all.into_stream().map(|event| event.name).collect().await;
    assert_eq!(names, vec!["unwatched", "pressed"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancelled_call_is_deregistered() {
    let (client, remote) = connect_stub(Protocol::Text, |_| Reply::Silent).await;

    let call = tokio::spawn({
        let client = client.clone();
        async move { client.send("wait_seconds", None, Duration::from_secs(60)).await }
    });
    while remote.requests().is_empty() {
        tokio::task::yield_now().await;
    }
    assert_eq!(client.pending_requests(), 1);

    call.abort();
    assert!(call.await.unwrap_err().is_cancelled());
    assert_eq!(client.pending_requests(), 0);
    assert_eq!(remote.methods(), vec!["wait_seconds"]);
}

#[tokio::test]
async fn malformed_frame_closes_connection() {
    let (local, remote) = MemoryTransport::pair();
    let client = Client::new(ClientConfig {
        protocol: Protocol::Binary,
        ..ClientConfig::default()
    });
    client.connect_with(local);

    let (mut sink, mut stream) = remote.into_split();
    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.send("get_tree", None, Duration::from_secs(60)).await }
    });

    // wait for the request, then answer with garbage
    let request = stream.next().await.unwrap().unwrap();
    let request = WireCodec::variant().decode_request(&request).unwrap();
    assert_eq!(request.method, "get_tree");
    futures::SinkExt::send(&mut sink, bytes::Bytes::from_static(&[0xff; 8]))
        .await
        .unwrap();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::MalformedFrame(_)), "unexpected error {err:?}");
    assert!(!client.is_connected());
}

#[tokio::test]
async fn late_response_for_abandoned_request_is_dropped() {
    let (local, remote) = MemoryTransport::pair();
    let client = Client::new(ClientConfig {
        protocol: Protocol::Binary,
        ..ClientConfig::default()
    });
    client.connect_with(local);

    let codec = WireCodec::variant();
    let (mut sink, mut stream) = remote.into_split();

    let err = client
        .send("get_tree", None, Duration::from_millis(10))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::RequestTimeout { .. }));

    let first = codec.decode_request(&stream.next().await.unwrap().unwrap()).unwrap();
    let late = codec
        .encode_frame(&Frame::Response {
            id: first.id,
            result: json!("late"),
        })
        .unwrap();
    futures::SinkExt::send(&mut sink, late).await.unwrap();

    // the next call is unaffected by the stale answer
    let next = tokio::spawn({
        let client = client.clone();
        async move { client.send("get_tree", None, TIMEOUT).await }
    });
    let second = codec.decode_request(&stream.next().await.unwrap().unwrap()).unwrap();
    assert_ne!(first.id, second.id);
    let answer = codec
        .encode_frame(&Frame::Response {
            id: second.id,
            result: json!("fresh"),
        })
        .unwrap();
    futures::SinkExt::send(&mut sink, answer).await.unwrap();

    assert_eq!(next.await.unwrap().unwrap(), json!("fresh"));
}

#[tokio::test]
async fn reconnect_after_disconnect() -> eyre::Result<()> {
    let client = Client::new(ClientConfig {
        protocol: Protocol::Binary,
        ..ClientConfig::default()
    });

    let (local, remote) = MemoryTransport::pair();
    client.connect_with(local);
    let first = StubRemote::spawn(remote, WireCodec::variant(), |_| Reply::Result(json!(1)));
    assert_eq!(client.call("get_tree", None).await?, json!(1));

    client.disconnect().await;
    assert!(client.call("get_tree", None).await.is_err());

    let (local, remote) = MemoryTransport::pair();
    client.connect_with(local);
    let _second = StubRemote::spawn(remote, WireCodec::variant(), |_| Reply::Result(json!(2)));
    assert_eq!(client.call("get_tree", None).await?, json!(2));
    assert!(client.is_connected());

    first.close().await;
    Ok(())
}

#[tokio::test]
async fn connect_to_nothing_fails() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = Client::new(ClientConfig {
        host: "127.0.0.1".to_string(),
        port: Some(port),
        connect_timeout: Duration::from_secs(5),
        ..ClientConfig::default()
    });

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectFailed { .. }), "unexpected error {err:?}");
    assert!(!client.is_connected());
}

/// A transport whose writes always fail and which never delivers anything.
struct UnwritableTransport;

impl Transport for UnwritableTransport {
    fn into_split(self) -> (FrameSink, FrameStream) {
        let sink = futures::sink::unfold((), |(), _payload: Bytes| async {
            Err::<(), _>(TransportError::Closed)
        });
        let stream = futures::stream::pending::<Result<Bytes, TransportError>>();
        (Box::pin(sink), Box::pin(stream))
    }
}

#[tokio::test]
async fn write_failure_fails_the_call_at_once() {
    let client = Client::new(ClientConfig::default());
    client.connect_with(UnwritableTransport);

    let outcome = tokio::time::timeout(
        Duration::from_millis(500),
        client.send("get_tree", None, Duration::from_secs(30)),
    )
    .await
    .expect("call should fail before its own timeout");

    let err = outcome.unwrap_err();
    assert!(matches!(err, ClientError::ConnectionClosed { .. }), "unexpected error {err:?}");
    assert_eq!(client.pending_requests(), 0);
    assert!(!client.is_connected());

    let err = client.call("get_tree", None).await.unwrap_err();
    assert!(err.is_connection_fatal(), "unexpected error {err:?}");
}
