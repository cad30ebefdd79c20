//! Websocket transport for monitoring queries.
//!
//! One driver task per executed query owns the socket and feeds payloads to
//! the consumer through a bounded channel. The protocol is a short handshake
//! followed by a record stream:
//!
//! 1. The serialized request document is sent once.
//! 2. The first reply is either a failure or a status message carrying the
//!    fetch correlation token (and, for detailed formats, field metadata).
//! 3. Record batches follow until a message carries an end marker, the
//!    consumer cancels, or a read times out.
//!
//! The cleanup path (abort frame, acknowledgment drain, close) runs exactly
//! once, on every exit route.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::error::QueryError;
use crate::session::SessionContext;

/// Smallest poll interval; forced for real-time queries
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// How long to wait for the abort acknowledgment during cleanup
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Tuning knobs for query execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// How long a single read may block before the stream is truncated
    pub read_timeout: Duration,
    /// Sleep between polls while the query is still running server-side.
    /// Real-time queries ignore this and poll at [`MIN_POLL_INTERVAL`].
    pub poll_interval: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl StreamOptions {
    /// Set the per-read timeout
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the sleep between polls for stored queries
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Possible states of the stream executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Socket not yet established
    Connecting,
    /// Request sent, waiting for the first status reply
    AwaitingStatus,
    /// Receiving record batches
    Streaming,
    /// Sleeping between polls while the query runs server-side
    Waiting,
    /// Natural end reached, shutting the socket down
    Closing,
    /// Socket closed after a natural end
    Closed,
    /// Terminated early: fetch size 0, consumer cancel or read timeout
    Aborted,
    /// Server rejected the query
    Failed,
}

impl StreamState {
    /// Terminal states admit no further transition
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StreamState::Closed | StreamState::Aborted | StreamState::Failed
        )
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamState::Connecting => write!(f, "Connecting"),
            StreamState::AwaitingStatus => write!(f, "Awaiting Status"),
            StreamState::Streaming => write!(f, "Streaming"),
            StreamState::Waiting => write!(f, "Waiting"),
            StreamState::Closing => write!(f, "Closing"),
            StreamState::Closed => write!(f, "Closed"),
            StreamState::Aborted => write!(f, "Aborted"),
            StreamState::Failed => write!(f, "Failed"),
        }
    }
}

/// Tracks the executor state and validates transitions
#[derive(Debug)]
struct StreamLifecycle {
    state: StreamState,
}

impl StreamLifecycle {
    fn new() -> Self {
        Self {
            state: StreamState::Connecting,
        }
    }

    fn current_state(&self) -> StreamState {
        self.state
    }

    /// Move to `new_state`; transitions are fixed by the protocol, so an
    /// illegal one is a driver bug.
    fn transition_to(&mut self, new_state: StreamState) {
        debug_assert!(
            Self::is_valid_transition(self.state, new_state),
            "invalid stream state transition from {} to {}",
            self.state,
            new_state
        );
        debug!("stream state {} -> {}", self.state, new_state);
        self.state = new_state;
    }

    fn is_valid_transition(old: StreamState, new: StreamState) -> bool {
        match (old, new) {
            // Early termination and rejection can happen at any point
            // before the stream settles
            (old, StreamState::Aborted | StreamState::Failed) => !old.is_terminal(),

            // Normal forward transitions
            (StreamState::Connecting, StreamState::AwaitingStatus) => true,
            (StreamState::AwaitingStatus, StreamState::Streaming | StreamState::Closing) => true,
            (StreamState::Streaming, StreamState::Waiting | StreamState::Closing) => true,
            (StreamState::Waiting, StreamState::Streaming) => true,
            (StreamState::Closing, StreamState::Closed) => true,

            // Same state transition is a no-op
            (old, new) if old == new => true,

            _ => false,
        }
    }
}

/// One inbound message from the monitoring socket.
///
/// Every field is optional; the combination present decides how the message
/// is handled, and unknown combinations are skipped rather than fatal.
#[derive(Debug, Clone, Default, Deserialize)]
struct StreamMessage {
    /// Query rejection reason; terminal
    failure: Option<String>,
    /// Human-readable acknowledgment on the first status reply
    success: Option<String>,
    /// Correlation token for the abort frame
    fetch: Option<Value>,
    /// Field-id metadata, only for detailed formats
    fields: Option<Vec<Value>>,
    /// Progress line while the query runs server-side
    status: Option<String>,
    /// A batch of result records
    records: Option<Vec<Value>>,
    /// Present on the final message of a stored query
    end: Option<Value>,
}

/// One element of the lazy response sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPayload {
    /// Field-id to field-name metadata. At most one per stream, always
    /// first, and only when a detailed format was requested.
    Fields(Vec<Value>),
    /// A batch of records
    Records(RecordBatch),
}

/// Records carried by a single server message.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    /// Server-side progress line, when the query was still running
    pub status: Option<String>,
    pub records: Vec<Value>,
    /// True on the final batch of a stored query
    pub end: bool,
}

impl RecordBatch {
    fn from_message(message: StreamMessage) -> Self {
        Self {
            status: message.status,
            end: message.end.is_some(),
            records: message.records.unwrap_or_default(),
        }
    }
}

/// Lazy, single-pass sequence of query payloads.
///
/// Dropping the stream cancels the query: the driver task notices the closed
/// channel, sends an abort frame for the active fetch and closes the socket.
/// Use [`QueryStream::cancel`] to additionally wait for that cleanup to
/// finish.
#[derive(Debug)]
pub struct QueryStream {
    rx: mpsc::Receiver<Result<QueryPayload, QueryError>>,
    driver: tokio::task::JoinHandle<()>,
}

impl QueryStream {
    /// Next payload; `None` once the stream is exhausted. The only error
    /// ever surfaced here is a server-side query failure.
    pub async fn next(&mut self) -> Option<Result<QueryPayload, QueryError>> {
        self.rx.recv().await
    }

    /// Cancel the query and wait until the abort frame is sent and the
    /// socket is closed.
    pub async fn cancel(self) {
        drop(self.rx);
        let _ = self.driver.await;
    }
}

impl futures_util::Stream for QueryStream {
    type Item = Result<QueryPayload, QueryError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Open the socket, submit the request document and hand the connection to
/// a driver task.
///
/// Establishment errors (unreachable host, rejected upgrade, bad cookie)
/// surface here; everything after request submission flows through the
/// returned stream.
pub(crate) async fn open_stream(
    session: &SessionContext,
    location: &str,
    request: Value,
    fetch_size: Option<u64>,
    options: StreamOptions,
) -> Result<QueryStream, QueryError> {
    let url = session.socket_url(location);
    let mut ws_request = url.as_str().into_client_request()?;
    ws_request.headers_mut().insert(
        COOKIE,
        session.session_cookie().parse().map_err(|_| {
            QueryError::Connection("session cookie is not a valid header value".to_string())
        })?,
    );

    debug!(url = %url, "opening monitoring socket");
    let connect = tokio_tungstenite::connect_async(ws_request);
    let (mut socket, _) = match tokio::time::timeout(session.connect_timeout(), connect).await {
        Ok(connected) => connected?,
        Err(_) => {
            return Err(QueryError::Connection(format!(
                "connect to {url} timed out after {:?}",
                session.connect_timeout()
            )))
        }
    };

    debug!(request = %request, "submitting query");
    socket.send(Message::Text(request.to_string())).await?;

    // Capacity 1: at most one payload is buffered ahead of the consumer
    let (tx, rx) = mpsc::channel(1);
    let driver = StreamDriver {
        socket,
        lifecycle: StreamLifecycle::new(),
        options,
        fetch_size,
        fetch_id: None,
        tx,
    };
    let driver = tokio::spawn(driver.run());

    Ok(QueryStream { rx, driver })
}

/// Owns the socket for the lifetime of one query execution.
struct StreamDriver {
    socket: Socket,
    lifecycle: StreamLifecycle,
    options: StreamOptions,
    fetch_size: Option<u64>,
    fetch_id: Option<Value>,
    tx: mpsc::Sender<Result<QueryPayload, QueryError>>,
}

impl StreamDriver {
    /// Drive the protocol to a terminal state, then run the cleanup path.
    async fn run(mut self) {
        let outcome = self.drive().await;

        // Decide the terminal state and whether an abort frame is owed.
        // Normal completion and server rejection end the exchange by
        // themselves; every early exit has to tell the server to stop.
        let send_abort = match &outcome {
            Ok(()) => {
                self.lifecycle.transition_to(StreamState::Closing);
                false
            }
            Err(QueryError::Aborted(reason)) => {
                info!("aborting query: {reason}");
                self.lifecycle.transition_to(StreamState::Aborted);
                true
            }
            Err(QueryError::Timeout(timeout)) => {
                error!("socket read timed out after {timeout:?}, truncating stream");
                self.lifecycle.transition_to(StreamState::Aborted);
                true
            }
            Err(QueryError::Failed(reason)) => {
                warn!("query rejected by server: {reason}");
                self.lifecycle.transition_to(StreamState::Failed);
                false
            }
            Err(err) => {
                warn!("monitoring stream ended: {err}");
                self.lifecycle.transition_to(StreamState::Failed);
                false
            }
        };

        self.finalize(send_abort).await;
    }

    async fn drive(&mut self) -> Result<(), QueryError> {
        self.lifecycle.transition_to(StreamState::AwaitingStatus);

        // First inbound message: a rejection, or the status acknowledgment
        // carrying the fetch token and optional field metadata
        let first = self.recv().await?;
        if let Some(reason) = first.failure {
            let _ = self.tx.send(Err(QueryError::Failed(reason.clone()))).await;
            return Err(QueryError::Failed(reason));
        }

        if let Some(fields) = first.fields {
            self.emit(QueryPayload::Fields(fields)).await?;
        }
        if let Some(success) = &first.success {
            debug!(status = %success, "waiting for monitoring results");
        }
        self.fetch_id = first.fetch;

        // Quantity 0 is the no-results sentinel: acknowledge and bail out
        if self.fetch_size == Some(0) {
            return Err(QueryError::Aborted(
                "fetch size is 0, no results requested".to_string(),
            ));
        }

        // The first substantive payload decides the stream shape
        self.lifecycle.transition_to(StreamState::Streaming);
        let response = self.recv().await?;

        if let Some(status) = response.status.clone() {
            info!(%status);
            let running = status.starts_with("Query");
            self.emit_records(response).await?;
            if running {
                self.poll_records().await?;
            }
        } else if response.end.is_some() {
            // Small result set: the whole fetch fit into the first reply
            self.emit(QueryPayload::Records(RecordBatch::from_message(response)))
                .await?;
        } else if response.records.is_some() {
            // Session monitoring answers with a single snapshot
            self.emit(QueryPayload::Records(RecordBatch::from_message(response)))
                .await?;
        } else {
            debug!("first payload matched no known shape, ending stream");
        }

        Ok(())
    }

    /// Poll while the query keeps running server-side; a message carrying
    /// an end marker finishes the stream.
    async fn poll_records(&mut self) -> Result<(), QueryError> {
        loop {
            self.lifecycle.transition_to(StreamState::Waiting);
            tokio::select! {
                () = self.tx.closed() => {
                    return Err(QueryError::Aborted(
                        "consumer dropped the stream".to_string(),
                    ));
                }
                () = tokio::time::sleep(self.options.poll_interval) => {}
            }

            self.lifecycle.transition_to(StreamState::Streaming);
            let message = self.recv().await?;
            let ended = message.end.is_some();
            self.emit_records(message).await?;
            if ended {
                return Ok(());
            }
        }
    }

    /// Emit the records of `message`, skipping empty batches
    async fn emit_records(&mut self, message: StreamMessage) -> Result<(), QueryError> {
        let has_records = message.records.as_ref().is_some_and(|r| !r.is_empty());
        if has_records {
            self.emit(QueryPayload::Records(RecordBatch::from_message(message)))
                .await?;
        }
        Ok(())
    }

    /// Push a payload to the consumer; a closed channel means the consumer
    /// stopped pulling and the stream should be aborted.
    async fn emit(&mut self, payload: QueryPayload) -> Result<(), QueryError> {
        self.tx
            .send(Ok(payload))
            .await
            .map_err(|_| QueryError::Aborted("consumer dropped the stream".to_string()))
    }

    /// Receive and decode the next JSON message. Frames that do not decode
    /// are skipped, to tolerate protocol additions.
    async fn recv(&mut self) -> Result<StreamMessage, QueryError> {
        loop {
            let frame = tokio::select! {
                () = self.tx.closed() => {
                    return Err(QueryError::Aborted(
                        "consumer dropped the stream".to_string(),
                    ));
                }
                frame = tokio::time::timeout(self.options.read_timeout, self.socket.next()) => frame,
            };

            let message = match frame {
                Err(_) => return Err(QueryError::Timeout(self.options.read_timeout)),
                Ok(None) => {
                    return Err(QueryError::Connection(
                        "socket closed by server".to_string(),
                    ))
                }
                Ok(Some(Err(err))) => return Err(err.into()),
                Ok(Some(Ok(message))) => message,
            };

            match message {
                Message::Text(text) => match serde_json::from_str::<StreamMessage>(&text) {
                    Ok(decoded) => return Ok(decoded),
                    Err(err) => {
                        let err = QueryError::Malformed(err.to_string());
                        warn!("skipping message: {err}");
                    }
                },
                Message::Close(_) => {
                    return Err(QueryError::Connection(
                        "socket closed by server".to_string(),
                    ))
                }
                _ => debug!("ignoring non-text frame"),
            }
        }
    }

    /// Cleanup path, run exactly once on every exit route: best-effort
    /// abort frame for an active fetch, one acknowledgment drain, close.
    async fn finalize(mut self, send_abort: bool) {
        if send_abort {
            if let Some(fetch_id) = self.fetch_id.take() {
                let abort = json!({ "abort": fetch_id });
                match self.socket.send(Message::Text(abort.to_string())).await {
                    Err(err) => debug!("abort frame not delivered: {err}"),
                    Ok(()) => {
                        // One best-effort drain of the acknowledgment
                        if let Ok(Some(Ok(Message::Text(ack)))) =
                            tokio::time::timeout(DRAIN_TIMEOUT, self.socket.next()).await
                        {
                            info!(ack = %ack, "query abort acknowledged");
                        }
                    }
                }
            }
        }

        if let Err(err) = self.socket.close(None).await {
            debug!("socket close: {err}");
        }
        if self.lifecycle.current_state() == StreamState::Closing {
            self.lifecycle.transition_to(StreamState::Closed);
        }
        info!(
            state = %self.lifecycle.current_state(),
            "monitoring socket closed"
        );
    }
}
