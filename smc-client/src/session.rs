use std::time::Duration;

/// Connection context for a logged-in SMC session.
///
/// The SMC hands out a session cookie at login; this library does not manage
/// the login lifecycle itself and instead receives the cookie together with
/// the REST and websocket base URLs from the caller. The context is passed
/// explicitly into every client and executor call, so two contexts can talk
/// to two different controllers from the same process.
#[derive(Debug, Clone)]
pub struct SessionContext {
    api_url: String,
    socket_url: String,
    session_cookie: String,
    connect_timeout: Duration,
}

impl SessionContext {
    /// Create a new session context.
    ///
    /// `api_url` is the versioned REST entry point
    /// (e.g. `http://smc.example.net:8082/6.4`), `socket_url` the websocket
    /// base (e.g. `ws://smc.example.net:8082`), and `session_cookie` the
    /// cookie of an authenticated session (`JSESSIONID=...`).
    pub fn new(
        api_url: impl Into<String>,
        socket_url: impl Into<String>,
        session_cookie: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            socket_url: socket_url.into(),
            session_cookie: session_cookie.into(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Set the timeout applied when opening connections
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Session cookie sent with every request
    pub fn session_cookie(&self) -> &str {
        &self.session_cookie
    }

    /// Timeout applied when opening connections
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Absolute websocket URL for a monitoring socket location
    pub fn socket_url(&self, location: &str) -> String {
        format!("{}{location}", self.socket_url.trim_end_matches('/'))
    }

    /// Absolute REST URL for `path`. Hrefs returned by the SMC are already
    /// absolute and pass through untouched.
    pub fn api_href(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{path}", self.api_url.trim_end_matches('/'))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_url_join() {
        let session = SessionContext::new("http://smc:8082/6.4", "ws://smc:8082", "JSESSIONID=x");
        assert_eq!(
            session.socket_url("/monitoring/log/socket"),
            "ws://smc:8082/monitoring/log/socket"
        );

        let trailing = SessionContext::new("http://smc:8082/6.4", "ws://smc:8082/", "JSESSIONID=x");
        assert_eq!(
            trailing.socket_url("/monitoring/session/socket"),
            "ws://smc:8082/monitoring/session/socket"
        );
    }

    #[test]
    fn test_api_href_join_and_passthrough() {
        let session = SessionContext::new("http://smc:8082/6.4/", "ws://smc:8082", "JSESSIONID=x");
        assert_eq!(
            session.api_href("/elements?filter=host"),
            "http://smc:8082/6.4/elements?filter=host"
        );
        assert_eq!(
            session.api_href("http://smc:8082/6.4/elements/host/5"),
            "http://smc:8082/6.4/elements/host/5"
        );
    }
}
