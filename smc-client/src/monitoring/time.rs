use chrono::Utc;

/// Start/end bounds for a stored query, in epoch milliseconds.
///
/// Preset methods compute their window at call time, not at construction
/// time, and overwrite any prior bounds. All methods mutate in place and
/// return the instance so calls can be chained. Once attached to a query,
/// the range is the authoritative source of the query's time bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    /// Oldest point of the window
    pub start_ms: i64,
    /// Most recent point of the window
    pub end_ms: i64,
}

impl TimeRange {
    /// Unbounded range; results are limited by the fetch size only
    pub fn new() -> Self {
        Self::default()
    }

    fn window_ending_now(&mut self, window: chrono::Duration) -> &mut Self {
        let now = Utc::now().timestamp_millis();
        self.start_ms = now - window.num_milliseconds();
        self.end_ms = now;
        self
    }

    /// Bounds from the current time back 5 minutes
    pub fn last_five_minutes(&mut self) -> &mut Self {
        self.window_ending_now(chrono::Duration::minutes(5))
    }

    /// Bounds from the current time back 15 minutes
    pub fn last_fifteen_minutes(&mut self) -> &mut Self {
        self.window_ending_now(chrono::Duration::minutes(15))
    }

    /// Bounds from the current time back 30 minutes
    pub fn last_thirty_minutes(&mut self) -> &mut Self {
        self.window_ending_now(chrono::Duration::minutes(30))
    }

    /// Bounds from the current time back 1 hour
    pub fn last_hour(&mut self) -> &mut Self {
        self.window_ending_now(chrono::Duration::hours(1))
    }

    /// Bounds from the current time back 1 day
    pub fn last_day(&mut self) -> &mut Self {
        self.window_ending_now(chrono::Duration::days(1))
    }

    /// Bounds from the current time back 7 days
    pub fn last_week(&mut self) -> &mut Self {
        self.window_ending_now(chrono::Duration::days(7))
    }

    /// Custom bounds in epoch milliseconds. `start_ms` should be the oldest
    /// point; when `end_ms` is omitted the current time is used.
    pub fn custom_range(&mut self, start_ms: i64, end_ms: Option<i64>) -> &mut Self {
        self.start_ms = start_ms;
        self.end_ms = end_ms.unwrap_or_else(|| Utc::now().timestamp_millis());
        self
    }
}
