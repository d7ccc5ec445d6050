//! Transport seam between the dispatcher and the remote service.

use crate::error::{HarnessError, HarnessResult};
use crate::request::Method;
use crate::response::ResponseView;
use log::debug;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

/// Boxed future returned by [`Transport::execute`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = HarnessResult<ResponseView>> + Send + 'a>>;

/// A fully resolved HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

/// Executes prepared requests against the remote service.
///
/// Implementations must surface connection failures and client timeouts as
/// [`HarnessError::Network`]. Non-2xx statuses are ordinary responses.
pub trait Transport: Send + Sync {
    fn execute(&self, request: PreparedRequest) -> TransportFuture<'_>;
}

/// [`Transport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a fresh client.
    pub fn new() -> HarnessResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| HarnessError::invalid_request(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: PreparedRequest) -> TransportFuture<'_> {
        Box::pin(async move {
            let network = |e: reqwest::Error| HarnessError::Network {
                url: request.url.clone(),
                message: e.to_string(),
            };

            let mut builder = self
                .client
                .request(to_reqwest(request.method), &request.url)
                .timeout(request.timeout);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = request.body.clone() {
                builder = builder.body(body);
            }

            let start = Instant::now();
            let response = builder.send().await.map_err(network)?;
            let status = response.status();
            debug!(
                "{} {} -> {} in {:?}",
                request.method,
                request.url,
                status,
                start.elapsed()
            );

            let headers: Vec<(String, String)> = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.as_str().to_string(), value.to_string()))
                })
                .collect();
            let body = response.bytes().await.map_err(network)?;

            Ok(ResponseView::new(
                request.method,
                request.url.clone(),
                status.as_u16(),
                status.canonical_reason().unwrap_or_default(),
                headers,
                body.to_vec(),
            ))
        })
    }
}
