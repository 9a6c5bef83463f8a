//! HTTP transport and JSON response validation
//!
//! [`HttpTransport`] is the pluggable backend that moves bytes;
//! [`ApiTransport`] layers JSON parsing and shape validation on top of it and
//! reports each failure category separately:
//! - transport failure (the request never produced a response)
//! - decode failure (the body is not JSON)
//! - shape failure (the body is JSON but not the expected shape)

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, SyncError};

/// An HTTP request to be sent by an [`HttpTransport`]
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Fully-qualified URL
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// An HTTP response returned by an [`HttpTransport`]
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Pluggable HTTP backend
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request. Only network-level failures are errors; any status
    /// code the server returns is a response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// [`HttpTransport`] backed by [`reqwest`]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .http
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let resp = builder.send().await.map_err(map_reqwest_error)?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(map_reqwest_error)?;
        Ok(HttpResponse { status, body })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Transport(format!("request timed out: {}", err))
    } else if err.is_connect() {
        SyncError::Transport(format!("connection failed: {}", err))
    } else {
        SyncError::Transport(err.to_string())
    }
}

/// JSON request/response helper over an [`HttpTransport`]
#[derive(Clone)]
pub struct ApiTransport {
    http: Arc<dyn HttpTransport>,
}

impl ApiTransport {
    pub fn new(http: Arc<dyn HttpTransport>) -> Self {
        Self { http }
    }

    /// Perform a request and validate the response body as `T`.
    ///
    /// Non-2xx responses become [`SyncError::Rejected`], carrying the JSON
    /// `message` field when the body has one.
    pub async fn request_json<T, B>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        headers: HeaderMap,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut headers = headers;
        let body = match body {
            Some(b) => {
                headers.insert(
                    reqwest::header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                let data = serde_json::to_vec(b)
                    .map_err(|e| SyncError::Decode(format!("request body: {}", e)))?;
                Some(Bytes::from(data))
            }
            None => None,
        };

        tracing::debug!("{} {}", method, url);
        let response = self
            .http
            .send(HttpRequest {
                method: method.clone(),
                url: url.to_string(),
                headers,
                body,
            })
            .await?;
        tracing::debug!("{} {} -> {}", method, url, response.status);

        if !response.is_success() {
            return Err(SyncError::Rejected {
                status: response.status,
                message: error_message(&response.body),
            });
        }

        let value: serde_json::Value = serde_json::from_slice(&response.body)
            .map_err(|e| SyncError::Decode(format!("{} {}: {}", method, url, e)))?;
        serde_json::from_value(value)
            .map_err(|e| SyncError::ShapeInvalid(format!("{} {}: {}", method, url, e)))
    }
}

/// Extract a human-readable message from an error body.
fn error_message(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
            return message.to_string();
        }
    }
    String::from_utf8_lossy(body).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Mutex;

    struct FixedTransport {
        response: Mutex<Option<Result<HttpResponse>>>,
    }

    impl FixedTransport {
        fn new(response: Result<HttpResponse>) -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Some(response)),
            })
        }
    }

    #[async_trait]
    impl HttpTransport for FixedTransport {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse> {
            self.response.lock().unwrap().take().unwrap()
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Marker {
        sha: String,
    }

    fn ok(body: &str) -> Result<HttpResponse> {
        Ok(HttpResponse {
            status: 200,
            body: Bytes::from(body.to_string()),
        })
    }

    async fn fetch(response: Result<HttpResponse>) -> Result<Marker> {
        ApiTransport::new(FixedTransport::new(response))
            .request_json::<Marker, ()>(Method::GET, "https://api.test/x", None, HeaderMap::new())
            .await
    }

    #[tokio::test]
    async fn test_valid_shape() {
        let marker = fetch(ok(r#"{"sha": "abc", "extra": 1}"#)).await.unwrap();
        assert_eq!(marker, Marker { sha: "abc".to_string() });
    }

    #[tokio::test]
    async fn test_non_json_is_decode_failure() {
        let err = fetch(ok("<html>oops</html>")).await.unwrap_err();
        assert_eq!(err.category(), "decode-failure");
    }

    #[tokio::test]
    async fn test_wrong_shape_is_shape_invalid() {
        let err = fetch(ok(r#"{"sha": 42}"#)).await.unwrap_err();
        assert_eq!(err.category(), "shape-invalid");

        let err = fetch(ok(r#"{"other": "x"}"#)).await.unwrap_err();
        assert_eq!(err.category(), "shape-invalid");
    }

    #[tokio::test]
    async fn test_transport_failure_passes_through() {
        let err = fetch(Err(SyncError::Transport("dns".to_string()))).await.unwrap_err();
        assert_eq!(err, SyncError::Transport("dns".to_string()));
    }

    #[tokio::test]
    async fn test_error_status_carries_message() {
        let err = fetch(Ok(HttpResponse {
            status: 404,
            body: Bytes::from_static(br#"{"message": "Not Found"}"#),
        }))
        .await
        .unwrap_err();
        assert_eq!(
            err,
            SyncError::Rejected {
                status: 404,
                message: "Not Found".to_string()
            }
        );
    }
}
