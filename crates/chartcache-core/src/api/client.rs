//! HTTP client for the chart data API.
//!
//! Every chart endpoint is a `POST` that takes an optional JSON body of
//! request parameters and answers with a JSON array of rows.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use reqwest::{header, Client};
use serde_json::Value;
use tracing::{debug, warn};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow chart queries while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Where chart rows come from.
pub trait ChartSource: Send + Sync {
    /// `POST` to `endpoint` with `body` (or no body) and return the rows of
    /// the JSON array response. Anything other than a 2xx with an array body
    /// is an error.
    fn post_json(
        &self,
        endpoint: &str,
        body: Option<&Value>,
    ) -> impl Future<Output = Result<Vec<Value>, ApiError>> + Send;
}

/// How rate-limited requests are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RATE_LIMIT_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }
}

/// API client for the chart backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ChartClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    retry: RetryPolicy,
}

impl ChartClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            retry: RetryPolicy::default(),
        })
    }

    /// Create a new ChartClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
            retry: self.retry,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_rows(response: reqwest::Response, url: &str) -> Result<Vec<Value>, ApiError> {
        let text = response.text().await?;
        let parsed: Value = serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })?;

        match parsed {
            Value::Array(rows) => {
                debug!(url, rows = rows.len(), "Chart rows received");
                Ok(rows)
            }
            other => Err(ApiError::InvalidResponse(format!(
                "Expected a JSON array from {}, got {}",
                url,
                json_kind(&other)
            ))),
        }
    }
}

impl ChartSource for ChartClient {
    async fn post_json(&self, endpoint: &str, body: Option<&Value>) -> Result<Vec<Value>, ApiError> {
        let url = self.url(endpoint);
        let mut retries = 0;
        let mut backoff = self.retry.initial_backoff;

        loop {
            let mut request = self
                .client
                .post(&url)
                .header(header::ACCEPT, "application/json")
                .header(header::CONTENT_TYPE, "application/json");
            if let Some(ref token) = self.token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Self::parse_rows(response, &url).await,
                None => {
                    retries += 1;
                    if retries > self.retry.max_retries {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = %url, retry = retries, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
    }

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.expect("read request");
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Answer one connection per canned response, in order, and hand back
    /// the raw requests that were received.
    async fn serve(responses: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for response in responses {
                let (mut stream, _) = listener.accept().await.expect("accept");
                requests.push(read_request(&mut stream).await);
                stream.write_all(response.as_bytes()).await.expect("write response");
                stream.shutdown().await.ok();
            }
            requests
        });
        (format!("http://{}", addr), handle)
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 1,
            initial_backoff: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_url_joining() {
        let client = ChartClient::new("http://api.local/").unwrap();
        assert_eq!(client.base_url(), "http://api.local");
        assert_eq!(client.url("/v1/graficas/x"), "http://api.local/v1/graficas/x");
        assert_eq!(client.url("v1/graficas/x"), "http://api.local/v1/graficas/x");
    }

    #[tokio::test]
    async fn test_post_json_returns_rows() {
        let (base_url, server) = serve(vec![http_response("200 OK", r#"[{"fecha":"2025-05-01"}]"#)]).await;
        let client = ChartClient::new(&base_url).unwrap().with_token("secret".to_string());

        let body = json!({"fecha_inicio": "2025-05-01"});
        let rows = client.post_json("/v1/graficas/demo", Some(&body)).await.unwrap();
        assert_eq!(rows, vec![json!({"fecha": "2025-05-01"})]);

        let requests = server.await.unwrap();
        let request = &requests[0];
        assert!(request.starts_with("POST /v1/graficas/demo HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer secret"));
        assert!(request.contains(r#""fecha_inicio":"2025-05-01""#));
    }

    #[tokio::test]
    async fn test_post_without_body() {
        let (base_url, server) = serve(vec![http_response("200 OK", "[]")]).await;
        let client = ChartClient::new(&base_url).unwrap();

        let rows = client.post_json("/v1/graficas/curve", None).await.unwrap();
        assert!(rows.is_empty());

        let requests = server.await.unwrap();
        assert!(!requests[0].to_ascii_lowercase().contains("authorization"));
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let (base_url, _server) = serve(vec![http_response("500 Internal Server Error", "boom")]).await;
        let client = ChartClient::new(&base_url).unwrap();

        let err = client.post_json("/x", None).await.unwrap_err();
        assert!(matches!(err, ApiError::ServerError { status: 500, ref detail } if detail == "boom"));
    }

    #[tokio::test]
    async fn test_non_array_body_is_invalid() {
        let (base_url, _server) = serve(vec![http_response("200 OK", r#"{"rows": []}"#)]).await;
        let client = ChartClient::new(&base_url).unwrap();

        let err = client.post_json("/x", None).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(ref m) if m.contains("an object")));
    }

    #[tokio::test]
    async fn test_malformed_json_is_invalid() {
        let (base_url, _server) = serve(vec![http_response("200 OK", "[{")]).await;
        let client = ChartClient::new(&base_url).unwrap();

        let err = client.post_json("/x", None).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let (base_url, server) = serve(vec![
            http_response("429 Too Many Requests", ""),
            http_response("200 OK", "[1]"),
        ])
        .await;
        let client = ChartClient::new(&base_url).unwrap().with_retry_policy(fast_retry());

        let rows = client.post_json("/x", None).await.unwrap();
        assert_eq!(rows, vec![json!(1)]);
        assert_eq!(server.await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_gives_up() {
        let (base_url, _server) = serve(vec![
            http_response("429 Too Many Requests", ""),
            http_response("429 Too Many Requests", ""),
        ])
        .await;
        let client = ChartClient::new(&base_url).unwrap().with_retry_policy(fast_retry());

        let err = client.post_json("/x", None).await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimited));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ChartClient::new(&format!("http://{}", addr)).unwrap();
        let err = client.post_json("/x", None).await.unwrap_err();
        assert!(matches!(err, ApiError::NetworkError(_)));
    }
}
