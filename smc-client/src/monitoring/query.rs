use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::QueryError;
use crate::monitoring::filter::QueryFilter;
use crate::monitoring::format::QueryFormat;
use crate::monitoring::stream::{
    self, QueryPayload, QueryStream, StreamOptions, MIN_POLL_INTERVAL,
};
use crate::monitoring::time::TimeRange;
use crate::session::SessionContext;
use crate::{MONITORING_LOG_SOCKET, MONITORING_SESSION_SOCKET};

/// A monitoring query: the request document plus the socket location it is
/// submitted to.
///
/// The document has three sections: free-form `query` parameters (the query
/// type, an optional target, time bounds and filter), `fetch` bounds, and
/// the response `format`. [`LogQuery`] and [`SessionQuery`] preconfigure the
/// location and type; this type carries everything shared between them.
#[derive(Debug, Clone)]
pub struct Query {
    location: &'static str,
    query: Map<String, Value>,
    quantity: Option<u64>,
    backwards: Option<bool>,
    format: QueryFormat,
    filter: Option<QueryFilter>,
    time_range: Option<TimeRange>,
}

impl Query {
    pub(crate) fn new(location: &'static str) -> Self {
        Self {
            location,
            query: Map::new(),
            quantity: None,
            backwards: None,
            format: QueryFormat::default(),
            filter: None,
            time_range: None,
        }
    }

    /// Socket location this query is submitted to
    pub fn location(&self) -> &'static str {
        self.location
    }

    /// Merge a parameter into the query section. Last write wins per key.
    pub fn update_query(&mut self, key: impl Into<String>, value: Value) {
        self.query.insert(key.into(), value);
    }

    /// Install `filter` as the active filter, replacing any prior one.
    ///
    /// Only one filter tree is active per query; combine multiple conditions
    /// explicitly with `And`/`Or`/`Not`. The returned reference can be used
    /// to refine the filter before execution; it is rendered into the
    /// request document when the query runs.
    pub fn update_filter(&mut self, filter: QueryFilter) -> &mut QueryFilter {
        self.filter.insert(filter)
    }

    /// Currently installed filter, if any
    pub fn filter(&self) -> Option<&QueryFilter> {
        self.filter.as_ref()
    }

    /// Max number of records to fetch. `None` means no fetch bound is set
    /// (fetch all); 0 aborts the query right after the first status reply.
    ///
    /// It is recommended to set a fetch size on stored queries.
    pub fn fetch_size(&self) -> Option<u64> {
        self.quantity
    }

    /// Set or clear the fetch bound.
    pub fn set_fetch_size(&mut self, quantity: Option<u64>) {
        self.quantity = quantity;
    }

    pub(crate) fn set_backwards(&mut self, backwards: bool) {
        self.backwards = Some(backwards);
    }

    /// Response format of this query
    pub fn format(&self) -> &QueryFormat {
        &self.format
    }

    pub fn format_mut(&mut self) -> &mut QueryFormat {
        &mut self.format
    }

    pub(crate) fn set_format(&mut self, format: QueryFormat) {
        self.format = format;
    }

    /// Time bounds of the query, created unbounded on first access. Once
    /// attached, the range is the authoritative source of the bounds.
    pub fn time_range(&mut self) -> &mut TimeRange {
        self.time_range.get_or_insert_with(TimeRange::new)
    }

    pub(crate) fn set_time_range(&mut self, range: TimeRange) {
        self.time_range = Some(range);
    }

    /// Real-time queries stream continuously; there is nothing to batch, so
    /// they always poll at the minimum interval.
    fn is_current(&self) -> bool {
        self.query
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|fetch_type| fetch_type.contains("current"))
    }

    pub(crate) fn effective_options(&self, mut options: StreamOptions) -> StreamOptions {
        if self.is_current() {
            options.poll_interval = MIN_POLL_INTERVAL;
        }
        options
    }

    /// Build the request document submitted over the socket.
    pub fn request_document(&self) -> Value {
        let mut query = self.query.clone();
        if let Some(range) = &self.time_range {
            query.insert("start_ms".to_string(), json!(range.start_ms));
            query.insert("end_ms".to_string(), json!(range.end_ms));
        }
        if let Some(filter) = &self.filter {
            query.insert("filter".to_string(), filter.render());
        }

        let mut fetch = Map::new();
        if let Some(quantity) = self.quantity {
            fetch.insert("quantity".to_string(), json!(quantity));
        }
        if let Some(backwards) = self.backwards {
            fetch.insert("backwards".to_string(), json!(backwards));
        }

        json!({
            "query": query,
            "fetch": fetch,
            "format": self.format,
        })
    }

    /// Execute the query.
    ///
    /// Opens the monitoring socket, submits the request once and returns the
    /// lazy payload stream; this call blocks only for request submission.
    /// Connection-establishment failures surface here, everything later
    /// flows through the stream.
    pub async fn execute(
        &self,
        session: &SessionContext,
        options: StreamOptions,
    ) -> Result<QueryStream, QueryError> {
        let options = self.effective_options(options);
        debug!(location = self.location, "executing monitoring query");
        stream::open_stream(
            session,
            self.location,
            self.request_document(),
            self.fetch_size(),
            options,
        )
        .await
    }
}

/// A log query fetching stored log data or monitoring logs in real time.
///
/// Stored queries page through historical data and terminate; set a fetch
/// size, direction and time range to bound them. Real-time queries
/// ([`LogQuery::current`]) stream until cancelled and ignore fetch size,
/// time range and direction.
///
/// ```no_run
/// # async fn example(session: &smc_client::SessionContext) -> Result<(), smc_client::QueryError> {
/// use serde_json::json;
/// use smc_client::monitoring::{LogQuery, StreamOptions};
///
/// let mut query = LogQuery::new().with_fetch_size(50);
/// query.time_range().last_five_minutes();
/// query.add_in_filter(vec![json!("192.168.4.84")]);
/// let stream = query.execute(session, StreamOptions::default()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LogQuery {
    query: Query,
}

impl LogQuery {
    /// Stored-log query, fetching backwards from the most recent entry
    pub fn new() -> Self {
        let mut query = Query::new(MONITORING_LOG_SOCKET);
        query.update_query("type", json!("stored"));
        query.set_backwards(true);
        query.set_time_range(TimeRange::new());
        Self { query }
    }

    /// Real-time log query, streaming entries as they arrive
    pub fn current() -> Self {
        let mut query = Query::new(MONITORING_LOG_SOCKET);
        query.update_query("type", json!("current"));
        Self { query }
    }

    /// Set the max number of records to fetch
    #[must_use]
    pub fn with_fetch_size(mut self, quantity: u64) -> Self {
        self.query.set_fetch_size(Some(quantity));
        self
    }

    /// Fetch from most recent to oldest (true, the default) or oldest to
    /// most recent (false)
    #[must_use]
    pub fn with_backwards(mut self, backwards: bool) -> Self {
        self.query.set_backwards(backwards);
        self
    }

    /// Set the response format
    #[must_use]
    pub fn with_format(mut self, format: QueryFormat) -> Self {
        self.query.set_format(format);
        self
    }

    /// Set the time bounds
    #[must_use]
    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.query.set_time_range(range);
        self
    }

    /// Shared query document and parameters
    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut Query {
        &mut self.query
    }

    /// Time bounds of the query
    pub fn time_range(&mut self) -> &mut TimeRange {
        self.query.time_range()
    }

    /// Max number of records to fetch, if bounded
    pub fn fetch_size(&self) -> Option<u64> {
        self.query.fetch_size()
    }

    /// Install a translated filter: a server-side expression string in the
    /// SMC "Show Expression" syntax, passed through without validation.
    pub fn add_translated_filter(&mut self, expression: impl Into<String>) -> &mut QueryFilter {
        self.query
            .update_filter(QueryFilter::Translated(expression.into()))
    }

    /// Install an IN filter matching any of `values`. Typically the primary
    /// filter, e.g. an IP address searched across one or more log fields.
    pub fn add_in_filter(
        &mut self,
        values: impl IntoIterator<Item = Value>,
    ) -> &mut QueryFilter {
        self.query
            .update_filter(QueryFilter::In(values.into_iter().collect()))
    }

    /// Install an AND filter requiring every child to match
    pub fn add_and_filter(&mut self, filters: Vec<QueryFilter>) -> &mut QueryFilter {
        self.query.update_filter(QueryFilter::And(filters))
    }

    /// Install an OR filter matching when any child matches
    pub fn add_or_filter(&mut self, filters: Vec<QueryFilter>) -> &mut QueryFilter {
        self.query.update_filter(QueryFilter::Or(filters))
    }

    /// Install a NOT filter negating the combination of its children.
    /// Useful on its own for filtering unwanted entry types out of a
    /// real-time stream.
    pub fn add_not_filter(&mut self, filters: Vec<QueryFilter>) -> &mut QueryFilter {
        self.query.update_filter(QueryFilter::Not(filters))
    }

    /// Install a DEFINED filter matching when `value` is present
    pub fn add_defined_filter(&mut self, value: Value) -> &mut QueryFilter {
        self.query.update_filter(QueryFilter::Defined(value))
    }

    /// Execute the query. See [`Query::execute`].
    pub async fn execute(
        &self,
        session: &SessionContext,
        options: StreamOptions,
    ) -> Result<QueryStream, QueryError> {
        self.query.execute(session, options).await
    }
}

impl Default for LogQuery {
    fn default() -> Self {
        Self::new()
    }
}

/// A session monitoring query against a single engine target.
///
/// Each constructor fixes the query type understood by the session socket;
/// the target is the name of the engine whose state is inspected. These
/// queries answer with a snapshot of the current state.
#[derive(Debug, Clone)]
pub struct SessionQuery {
    query: Query,
}

impl SessionQuery {
    fn new(query_type: &'static str, target: &str) -> Self {
        let mut query = Query::new(MONITORING_SESSION_SOCKET);
        query.update_query("type", json!(query_type));
        query.update_query("target", json!(target));
        Self { query }
    }

    /// Entries currently on the engine's blacklist
    pub fn blacklist(target: &str) -> Self {
        Self::new("BLACKLIST", target)
    }

    /// Connections currently tracked by the engine
    pub fn connections(target: &str) -> Self {
        Self::new("CONNECTIONS", target)
    }

    /// Established VPN security associations
    pub fn vpn_security_associations(target: &str) -> Self {
        Self::new("VPN_SA", target)
    }

    /// Active SSL VPN sessions
    pub fn ssl_vpn_sessions(target: &str) -> Self {
        Self::new("SSLVPNV2", target)
    }

    /// The engine's routing table
    pub fn routing(target: &str) -> Self {
        Self::new("ROUTING", target)
    }

    /// Authenticated users known to the engine
    pub fn users(target: &str) -> Self {
        Self::new("USERS", target)
    }

    /// Alerts currently active on the engine
    pub fn active_alerts(target: &str) -> Self {
        Self::new("ACTIVE_ALERTS", target)
    }

    /// Shared query document and parameters
    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut Query {
        &mut self.query
    }

    /// Execute the query. See [`Query::execute`].
    pub async fn execute(
        &self,
        session: &SessionContext,
        options: StreamOptions,
    ) -> Result<QueryStream, QueryError> {
        self.query.execute(session, options).await
    }
}

/// Resolve log field IDs to their field descriptors.
///
/// Issues a one-shot detailed-format query with a fetch size of 0: the
/// server acknowledges with the field metadata and the stream is aborted
/// before any records flow. Returns an empty list when no field payload
/// arrives.
pub async fn resolve_field_ids(
    session: &SessionContext,
    ids: Vec<i64>,
) -> Result<Vec<Value>, QueryError> {
    let mut query = Query::new(MONITORING_LOG_SOCKET);
    query.set_fetch_size(Some(0));
    query.set_format(QueryFormat::detailed(ids));

    let mut stream = query.execute(session, StreamOptions::default()).await?;
    while let Some(payload) = stream.next().await {
        match payload? {
            QueryPayload::Fields(fields) => return Ok(fields),
            QueryPayload::Records(_) => {}
        }
    }
    Ok(Vec::new())
}
