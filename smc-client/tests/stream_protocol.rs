//! Integration tests for the monitoring stream protocol.
//!
//! Each test spins up a real websocket server scripted with the server side
//! of one scenario and connects the real query executor to it. No SMC, no
//! network beyond loopback.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use smc_client::monitoring::{
    resolve_field_ids, LogQuery, QueryFormat, QueryPayload, SessionQuery, StreamOptions,
};
use smc_client::{QueryError, SessionContext};

type ServerSocket = WebSocketStream<TcpStream>;

/// Messages the mock server received, for post-test assertions
type Inbox = Arc<Mutex<Vec<Value>>>;

/// Fast options so tests do not wait out the production poll interval
fn fast_options() -> StreamOptions {
    StreamOptions::default()
        .with_read_timeout(Duration::from_secs(5))
        .with_poll_interval(Duration::from_millis(10))
}

async fn start_server<F, Fut>(script: F) -> (SessionContext, Inbox)
where
    F: FnOnce(ServerSocket, Inbox) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let inbox: Inbox = Arc::new(Mutex::new(Vec::new()));

    let server_inbox = inbox.clone();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        script(socket, server_inbox).await;
    });

    let session = SessionContext::new(
        format!("http://{addr}/6.4"),
        format!("ws://{addr}"),
        "JSESSIONID=test",
    );
    (session, inbox)
}

/// Read the next JSON message from the client and record it
async fn recv_json(socket: &mut ServerSocket, inbox: &Inbox) -> Option<Value> {
    while let Some(frame) = socket.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let message: Value = serde_json::from_str(&text).unwrap();
                inbox.lock().await.push(message.clone());
                return Some(message);
            }
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

async fn send_json(socket: &mut ServerSocket, message: Value) {
    socket
        .send(Message::Text(message.to_string()))
        .await
        .unwrap();
}

/// Keep reading (and recording) until the client closes the socket
async fn drain(mut socket: ServerSocket, inbox: Inbox) {
    while recv_json(&mut socket, &inbox).await.is_some() {}
}

#[tokio::test]
async fn stored_query_streams_fields_and_records_until_end() {
    let (session, inbox) = start_server(|mut socket, inbox| async move {
        recv_json(&mut socket, &inbox).await.unwrap();
        send_json(
            &mut socket,
            json!({
                "success": "Query received",
                "fetch": 7,
                "fields": [{ "id": 1, "name": "Src" }]
            }),
        )
        .await;
        send_json(
            &mut socket,
            json!({ "status": "Query running", "records": [{ "Src": "1.1.1.1" }] }),
        )
        .await;
        // Batches without records are not passed on to the consumer
        send_json(&mut socket, json!({ "status": "Query running", "records": [] })).await;
        send_json(
            &mut socket,
            json!({ "end": true, "records": [{ "Src": "2.2.2.2" }] }),
        )
        .await;
        drain(socket, inbox).await;
    })
    .await;

    let query = LogQuery::new()
        .with_fetch_size(2)
        .with_format(QueryFormat::detailed(vec![1]));
    let stream = query.execute(&session, fast_options()).await.unwrap();

    // QueryStream is also a futures Stream; drive it with the combinators
    let payloads: Vec<QueryPayload> = stream.map(|item| item.unwrap()).collect().await;

    assert_eq!(payloads.len(), 3);
    assert!(matches!(&payloads[0], QueryPayload::Fields(fields) if fields.len() == 1));
    match &payloads[1] {
        QueryPayload::Records(batch) => {
            assert_eq!(batch.records, vec![json!({ "Src": "1.1.1.1" })]);
            assert!(!batch.end);
        }
        other => panic!("expected a record batch, got {other:?}"),
    }
    match &payloads[2] {
        QueryPayload::Records(batch) => {
            assert_eq!(batch.records, vec![json!({ "Src": "2.2.2.2" })]);
            assert!(batch.end);
        }
        other => panic!("expected a record batch, got {other:?}"),
    }

    // Normal completion sends no abort frame: the server only ever saw the
    // request document
    let seen = inbox.lock().await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0]["query"]["type"], json!("stored"));
    assert_eq!(seen[0]["fetch"]["quantity"], json!(2));
}

#[tokio::test]
async fn failure_reply_surfaces_query_failed() {
    let (session, _inbox) = start_server(|mut socket, inbox| async move {
        recv_json(&mut socket, &inbox).await.unwrap();
        send_json(&mut socket, json!({ "failure": "bad filter" })).await;
        drain(socket, inbox).await;
    })
    .await;

    let query = LogQuery::new().with_fetch_size(10);
    let mut stream = query.execute(&session, fast_options()).await.unwrap();

    match stream.next().await {
        Some(Err(QueryError::Failed(reason))) => assert_eq!(reason, "bad filter"),
        other => panic!("expected a query failure, got {other:?}"),
    }
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn zero_fetch_size_aborts_after_one_round_trip() {
    let (session, inbox) = start_server(|mut socket, inbox| async move {
        recv_json(&mut socket, &inbox).await.unwrap();
        send_json(&mut socket, json!({ "success": "Query received", "fetch": 42 })).await;

        let abort = recv_json(&mut socket, &inbox).await.unwrap();
        assert_eq!(abort, json!({ "abort": 42 }));
        send_json(&mut socket, json!({ "success": "Query aborted" })).await;
        drain(socket, inbox).await;
    })
    .await;

    let query = LogQuery::new().with_fetch_size(0);
    let mut stream = query.execute(&session, fast_options()).await.unwrap();
    assert!(stream.next().await.is_none());

    let seen = inbox.lock().await;
    assert_eq!(seen.len(), 2, "expected the request and exactly one abort");
    assert_eq!(seen[1], json!({ "abort": 42 }));
}

#[tokio::test]
async fn dropping_the_stream_aborts_a_live_query() {
    let (session, inbox) = start_server(|mut socket, inbox| async move {
        recv_json(&mut socket, &inbox).await.unwrap();
        send_json(&mut socket, json!({ "success": "Query received", "fetch": 9 })).await;
        send_json(
            &mut socket,
            json!({ "status": "Query running", "records": [{ "event": "connection opened" }] }),
        )
        .await;

        // The consumer walks away; the executor owes us an abort frame
        let abort = recv_json(&mut socket, &inbox).await.unwrap();
        assert_eq!(abort, json!({ "abort": 9 }));
        send_json(&mut socket, json!({ "success": "Query aborted" })).await;
        drain(socket, inbox).await;
    })
    .await;

    let query = LogQuery::current();
    let mut stream = query.execute(&session, fast_options()).await.unwrap();

    let first = stream.next().await.unwrap().unwrap();
    assert!(matches!(first, QueryPayload::Records(_)));

    // Cancel waits for the abort round trip and close to finish
    stream.cancel().await;

    let seen = inbox.lock().await;
    assert_eq!(seen[1], json!({ "abort": 9 }));
}

#[tokio::test]
async fn read_timeout_truncates_the_stream_silently() {
    let (session, inbox) = start_server(|mut socket, inbox| async move {
        recv_json(&mut socket, &inbox).await.unwrap();
        send_json(&mut socket, json!({ "success": "Query received", "fetch": 3 })).await;
        send_json(
            &mut socket,
            json!({ "status": "Query running", "records": [{ "Src": "1.1.1.1" }] }),
        )
        .await;
        // Then go quiet: the client read must time out
        let abort = recv_json(&mut socket, &inbox).await.unwrap();
        assert_eq!(abort, json!({ "abort": 3 }));
        send_json(&mut socket, json!({ "success": "Query aborted" })).await;
        drain(socket, inbox).await;
    })
    .await;

    let query = LogQuery::new().with_fetch_size(10);
    let options = fast_options().with_read_timeout(Duration::from_millis(200));
    let mut stream = query.execute(&session, options).await.unwrap();

    let mut payloads = Vec::new();
    while let Some(item) = stream.next().await {
        payloads.push(item.unwrap());
    }

    // One batch was delivered, then the stream ended without an error
    assert_eq!(payloads.len(), 1);
    let seen = inbox.lock().await;
    assert_eq!(seen[1], json!({ "abort": 3 }));
}

#[tokio::test]
async fn session_query_yields_a_single_snapshot() {
    let (session, inbox) = start_server(|mut socket, inbox| async move {
        recv_json(&mut socket, &inbox).await.unwrap();
        send_json(&mut socket, json!({ "success": "Query received", "fetch": 5 })).await;
        send_json(
            &mut socket,
            json!({ "records": [{ "src": "10.0.0.1", "dst": "10.0.0.2" }] }),
        )
        .await;
        drain(socket, inbox).await;
    })
    .await;

    let query = SessionQuery::connections("helsinki-fw");
    let mut stream = query.execute(&session, fast_options()).await.unwrap();

    let first = stream.next().await.unwrap().unwrap();
    match first {
        QueryPayload::Records(batch) => {
            assert_eq!(batch.records.len(), 1);
            assert!(!batch.end);
        }
        other => panic!("expected a record batch, got {other:?}"),
    }
    assert!(stream.next().await.is_none());

    let seen = inbox.lock().await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0]["query"]["type"], json!("CONNECTIONS"));
    assert_eq!(seen[0]["query"]["target"], json!("helsinki-fw"));
}

#[tokio::test]
async fn malformed_messages_are_skipped() {
    let (session, _inbox) = start_server(|mut socket, inbox| async move {
        recv_json(&mut socket, &inbox).await.unwrap();
        send_json(&mut socket, json!({ "success": "Query received", "fetch": 1 })).await;
        // Not a protocol shape at all; the executor must skip it
        socket
            .send(Message::Text("not json".to_string()))
            .await
            .unwrap();
        send_json(
            &mut socket,
            json!({ "end": true, "records": [{ "Src": "1.1.1.1" }] }),
        )
        .await;
        drain(socket, inbox).await;
    })
    .await;

    let query = LogQuery::new().with_fetch_size(1);
    let mut stream = query.execute(&session, fast_options()).await.unwrap();

    let first = stream.next().await.unwrap().unwrap();
    assert!(matches!(first, QueryPayload::Records(batch) if batch.end));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn resolve_field_ids_returns_the_field_payload() {
    let (session, inbox) = start_server(|mut socket, inbox| async move {
        recv_json(&mut socket, &inbox).await.unwrap();
        send_json(
            &mut socket,
            json!({
                "success": "Query received",
                "fetch": 11,
                "fields": [
                    { "id": 4, "name": "Timestamp" },
                    { "id": 7, "name": "Src" }
                ]
            }),
        )
        .await;
        let abort = recv_json(&mut socket, &inbox).await.unwrap();
        assert_eq!(abort, json!({ "abort": 11 }));
        send_json(&mut socket, json!({ "success": "Query aborted" })).await;
        drain(socket, inbox).await;
    })
    .await;

    let fields = resolve_field_ids(&session, vec![4, 7]).await.unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[0]["name"], json!("Timestamp"));

    let seen = inbox.lock().await;
    assert_eq!(seen[0]["fetch"]["quantity"], json!(0));
    assert_eq!(seen[0]["format"]["type"], json!("detailed"));
    assert_eq!(seen[0]["format"]["field_ids"], json!([4, 7]));
}

#[tokio::test]
async fn connection_refused_surfaces_from_execute() {
    // Bind a listener and drop it so the port is unreachable
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let session = SessionContext::new(
        format!("http://{addr}/6.4"),
        format!("ws://{addr}"),
        "JSESSIONID=test",
    );

    let query = LogQuery::new().with_fetch_size(1);
    match query.execute(&session, fast_options()).await {
        Err(QueryError::Connection(_)) => {}
        other => panic!("expected a connection error, got {other:?}"),
    }
}
