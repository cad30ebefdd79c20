use anyhow::{anyhow, Context, Result};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, CONTENT_TYPE, COOKIE, ETAG, LOCATION};
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde_json::Value;

use crate::session::SessionContext;

/// JSON client for the SMC REST API, carrying the session cookie
pub struct SmcClient {
    session: SessionContext,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl SmcClient {
    /// Create a new client for a logged-in session
    pub fn new(session: SessionContext) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self { session, client }
    }

    /// Session context this client operates under
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Make a GET request against the SMC API
    #[tracing::instrument(name = "smc.get", skip(self), fields(path = %path))]
    pub async fn get(&self, path: &str) -> Result<SmcResponse> {
        let response = self.send(Method::GET, path, None, None).await?;
        Self::expect_status(response, &[200, 204, 304])
    }

    /// Make a POST request against the SMC API
    #[tracing::instrument(name = "smc.post", skip(self, body), fields(path = %path))]
    pub async fn post(&self, path: &str, body: &Value) -> Result<SmcResponse> {
        let response = self.send(Method::POST, path, Some(body), None).await?;
        // 202 is an asynchronous reply carrying a follower link
        Self::expect_status(response, &[200, 201, 202])
    }

    /// Make a PUT request against the SMC API. Modifications require the
    /// current ETag of the element being changed.
    #[tracing::instrument(name = "smc.put", skip(self, body), fields(path = %path))]
    pub async fn put(&self, path: &str, body: &Value, etag: &str) -> Result<SmcResponse> {
        let response = self.send(Method::PUT, path, Some(body), Some(etag)).await?;
        Self::expect_status(response, &[200])
    }

    /// Make a DELETE request against the SMC API
    #[tracing::instrument(name = "smc.delete", skip(self), fields(path = %path))]
    pub async fn delete(&self, path: &str) -> Result<SmcResponse> {
        let response = self.send(Method::DELETE, path, None, None).await?;
        Self::expect_status(response, &[200, 204])
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        etag: Option<&str>,
    ) -> Result<SmcResponse> {
        let uri = self.session.api_href(path);

        let mut builder = Request::builder()
            .method(method)
            .uri(&uri)
            .header(COOKIE, self.session.session_cookie());
        if let Some(etag) = etag {
            builder = builder.header("Etag", etag);
        }

        let request = match body {
            Some(body) => {
                let json =
                    serde_json::to_vec(body).context("Failed to serialize request body")?;
                builder
                    .header(CONTENT_TYPE, "application/json")
                    .body(Full::new(Bytes::from(json)))
            }
            None => builder.body(Full::new(Bytes::new())),
        }
        .context("Failed to build request")?;

        let response = self.client.request(request).await.with_context(|| {
            format!("Connection problem to SMC, ensure the API service is running: {uri}")
        })?;

        let (parts, body) = response.into_parts();
        let bytes = body
            .collect()
            .await
            .context("Failed to read response body")?
            .to_bytes();

        Ok(SmcResponse::unpack(parts.status, &parts.headers, &bytes))
    }

    fn expect_status(response: SmcResponse, accepted: &[u16]) -> Result<SmcResponse> {
        if accepted.contains(&response.status) {
            return Ok(response);
        }
        Err(anyhow!(
            "SMC operation failed with status {}: {}",
            response.status,
            response.error_message()
        ))
    }
}

/// Decoded REST reply: the status plus the headers and body callers use.
///
/// Search results arrive as a JSON list, direct href fetches as a single
/// document; both land in `json`. Non-JSON bodies (text, exports) land in
/// `content`.
#[derive(Debug, Clone, Default)]
pub struct SmcResponse {
    pub status: u16,
    /// ETag of the fetched element, required for modifications
    pub etag: Option<String>,
    /// Location header, set on creation replies
    pub location: Option<String>,
    pub json: Option<Value>,
    pub content: Option<String>,
}

impl SmcResponse {
    fn unpack(status: StatusCode, headers: &HeaderMap, bytes: &[u8]) -> Self {
        let header_string = |name| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");

        let mut json = None;
        let mut content = None;
        if content_type.starts_with("application/json") {
            match serde_json::from_slice::<Value>(bytes) {
                // Search replies wrap their hits in a result list
                Ok(Value::Object(mut document)) if document.contains_key("result") => {
                    json = document.remove("result");
                }
                Ok(document) => json = Some(document),
                Err(_) => {}
            }
        } else if !bytes.is_empty() {
            content = Some(String::from_utf8_lossy(bytes).into_owned());
        }

        Self {
            status: status.as_u16(),
            etag: header_string(ETAG),
            location: header_string(LOCATION),
            json,
            content,
        }
    }

    /// Error detail from the body of a failed operation
    fn error_message(&self) -> String {
        if let Some(json) = &self.json {
            for key in ["message", "details"] {
                match json.get(key) {
                    Some(Value::String(message)) => return message.clone(),
                    Some(detail) => return detail.to_string(),
                    None => {}
                }
            }
            return json.to_string();
        }
        self.content
            .clone()
            .unwrap_or_else(|| "no detail provided".to_string())
    }
}
