use crate::delivery::events::{OutboundRequest, ResponseInfo};
use crate::error::DeliveryError;
use log::warn;
use reqwest::Client;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// A response as seen by the client: status, headers and the body text
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub info: ResponseInfo,
    pub body: String,
}

/// Trait for HTTP transport implementations
///
/// A transport performs exactly one exchange per call. Any HTTP status is a
/// successful exchange; `Err` means no response was obtained.
pub trait Transport: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: &'a OutboundRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, DeliveryError>> + Send + 'a>>;
}

/// reqwest-backed transport
///
/// Connections are never pooled, matching the `Connection: close` header the
/// client sends.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a new HTTP transport
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ClientBuild` if the HTTP client cannot be
    /// initialized (e.g. TLS backend failure).
    pub fn new() -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| DeliveryError::ClientBuild(e.to_string()))?;

        Ok(Self { client })
    }

    /// Use an already configured reqwest client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn execute<'a>(
        &'a self,
        request: &'a OutboundRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, DeliveryError>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .client
                .request(request.method.clone(), request.url.clone())
                .headers(request.headers.clone())
                .body(request.body.clone())
                .send()
                .await?;

            let info = ResponseInfo {
                status: response.status().as_u16(),
                headers: response.headers().clone(),
            };

            // A response without a readable body is still a response
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    warn!("Failed to read response body from {}: {}", request.url, e);
                    String::new()
                }
            };

            Ok(TransportResponse { info, body })
        })
    }
}

/// In-memory transport for tests and dry runs
///
/// Records every request it is given and answers each with the same canned
/// outcome.
pub struct MockTransport {
    outcome: Result<(u16, String), String>,
    requests: Arc<Mutex<Vec<OutboundRequest>>>,
}

impl MockTransport {
    /// Answer every request with `status` and `body`
    pub fn with_response(status: u16, body: impl Into<String>) -> Self {
        Self {
            outcome: Ok((status, body.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answer every request with a transport error
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            outcome: Err(message.into()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of requests executed so far
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Most recent request, if any
    pub fn last_request(&self) -> Option<OutboundRequest> {
        self.requests.lock().ok().and_then(|r| r.last().cloned())
    }
}

impl Transport for MockTransport {
    fn execute<'a>(
        &'a self,
        request: &'a OutboundRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, DeliveryError>> + Send + 'a>> {
        Box::pin(async move {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request.clone());
            }

            match &self.outcome {
                Ok((status, body)) => Ok(TransportResponse {
                    info: ResponseInfo::new(*status),
                    body: body.clone(),
                }),
                Err(message) => Err(DeliveryError::Dispatch(message.clone())),
            }
        })
    }
}
