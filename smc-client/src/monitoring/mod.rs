//! Monitoring queries against the SMC log and session sockets.
//!
//! A [`Query`] assembles the request document (query parameters, fetch
//! bounds, format and an optional filter), and `execute` hands it to the
//! stream executor which feeds back a lazy sequence of payloads:
//!
//! ```no_run
//! # async fn example(session: &smc_client::SessionContext) -> Result<(), smc_client::QueryError> {
//! use smc_client::monitoring::{LogQuery, QueryPayload, StreamOptions};
//!
//! let mut query = LogQuery::new().with_fetch_size(50);
//! query.time_range().last_hour();
//!
//! let mut stream = query.execute(session, StreamOptions::default()).await?;
//! while let Some(payload) = stream.next().await {
//!     if let QueryPayload::Records(batch) = payload? {
//!         println!("{} records", batch.records.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod filter;
pub mod format;
pub mod query;
pub mod stream;
pub mod time;

pub use filter::QueryFilter;
pub use format::{FieldFormat, QueryFormat};
pub use query::{resolve_field_ids, LogQuery, Query, SessionQuery};
pub use stream::{
    QueryPayload, QueryStream, RecordBatch, StreamOptions, StreamState, MIN_POLL_INTERVAL,
};
pub use time::TimeRange;
