use std::time::Duration;

use thiserror::Error;

/// Errors produced by the monitoring query pipeline.
///
/// Only two of these ever reach a caller: `Connection` (from `execute()`
/// when the socket cannot be opened) and `Failed` (through the stream when
/// the server rejects the query). `Aborted`, `Timeout` and `Malformed` are
/// logged by the executor and end or continue the stream silently.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The server answered the request with a failure message. Terminal:
    /// the query must be reissued from scratch.
    #[error("query failed: {0}")]
    Failed(String),

    /// The stream ended before completion, either because the fetch size
    /// was 0 or because the consumer stopped pulling.
    #[error("query aborted: {0}")]
    Aborted(String),

    /// A read exceeded the configured socket timeout. The stream is
    /// truncated at the last delivered payload.
    #[error("socket read timed out after {0:?}")]
    Timeout(Duration),

    /// A message did not decode as a known protocol shape. Skippable, to
    /// tolerate protocol additions.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The websocket connection could not be established or broke down.
    #[error("connection error: {0}")]
    Connection(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for QueryError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        QueryError::Connection(err.to_string())
    }
}
