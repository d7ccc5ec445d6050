//! Request execution.
//!
//! The [`Dispatcher`] resolves a [`RequestSpec`] against the configured base
//! URL, sends it through a [`Transport`] and keeps the most recent response
//! around for assertions. Each test works on its own [`Dispatcher::session`]
//! so that "the last response" never leaks between concurrently running
//! tests.

mod polling;
mod transport;

pub use polling::{Observation, PollPolicy, poll_until, wait_for};
pub use transport::{HttpTransport, PreparedRequest, Transport, TransportFuture};

use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::request::{RequestSpec, SerializationFormat};
use crate::response::ResponseView;
use log::debug;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug)]
struct DispatchSettings {
    base_url: String,
    api_version: Option<String>,
    request_timeout: Duration,
    default_headers: BTreeMap<String, String>,
    poll_policy: PollPolicy,
}

/// Executes requests and remembers the last response.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    settings: Arc<DispatchSettings>,
    last: Arc<Mutex<Option<Arc<ResponseView>>>>,
}

/// A response that has been received but not yet decoded.
#[derive(Debug, Clone)]
pub struct PendingResponse {
    response: Arc<ResponseView>,
}

impl PendingResponse {
    /// Decode the body as `T`.
    pub fn take<T: DeserializeOwned>(&self) -> HarnessResult<T> {
        self.response.take()
    }

    /// Decode the body as `T` with an explicit format.
    pub fn take_as<T: DeserializeOwned>(&self, format: SerializationFormat) -> HarnessResult<T> {
        self.response.take_as(format)
    }

    /// The received response.
    pub fn response(&self) -> &Arc<ResponseView> {
        &self.response
    }

    pub fn status(&self) -> u16 {
        self.response.status()
    }

    /// Fail unless the status is 2xx.
    pub fn ensure_success(self) -> HarnessResult<Self> {
        self.response.ensure_success()?;
        Ok(self)
    }
}

impl Dispatcher {
    /// Create a dispatcher over an arbitrary transport.
    pub fn new(transport: impl Transport + 'static, config: &HarnessConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            settings: Arc::new(DispatchSettings {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                api_version: config
                    .api_version
                    .as_ref()
                    .map(|v| v.trim_matches('/').to_string()),
                request_timeout: config.request_timeout(),
                default_headers: config.default_headers.clone(),
                poll_policy: config.poll_policy(),
            }),
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a dispatcher that talks HTTP through `reqwest`.
    pub fn http(config: &HarnessConfig) -> HarnessResult<Self> {
        Ok(Self::new(HttpTransport::new()?, config))
    }

    /// A dispatcher sharing this one's transport and settings but with its
    /// own last-response slot.
    pub fn session(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            settings: Arc::clone(&self.settings),
            last: Arc::new(Mutex::new(None)),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.settings.base_url
    }

    /// Compute the absolute URL a request will be sent to.
    pub fn resolve_url(&self, spec: &RequestSpec) -> HarnessResult<String> {
        let version = if spec.requires_api_version() {
            Some(self.settings.api_version.as_deref().ok_or_else(|| {
                HarnessError::invalid_request(format!(
                    "{} requires an API version but none is configured",
                    spec
                ))
            })?)
        } else {
            None
        };

        let raw = spec.url();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            let mut url = reqwest::Url::parse(raw).map_err(|e| {
                HarnessError::invalid_request(format!("invalid URL '{}': {}", raw, e))
            })?;
            if let Some(version) = version {
                let path = format!("/{}{}", version, url.path());
                url.set_path(&path);
            }
            return Ok(url.to_string());
        }

        let path = raw.trim_start_matches('/');
        Ok(match version {
            Some(version) => format!("{}/{}/{}", self.settings.base_url, version, path),
            None => format!("{}/{}", self.settings.base_url, path),
        })
    }

    /// Resolve a spec into the exact call the transport will make.
    pub fn prepare(&self, spec: &RequestSpec) -> HarnessResult<PreparedRequest> {
        let url = self.resolve_url(spec)?;
        let mut headers: Vec<(String, String)> = Vec::new();
        let mut set = |name: &str, value: &str| {
            headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
            headers.push((name.to_string(), value.to_string()));
        };
        for (name, value) in &self.settings.default_headers {
            set(name, value);
        }
        let body = match spec.encode_body()? {
            Some((bytes, content_type)) => {
                set("Content-Type", content_type);
                Some(bytes)
            }
            None => None,
        };
        for (name, value) in spec.headers() {
            set(name, value);
        }
        if let Some(authorization) = spec.authorization() {
            set("Authorization", authorization);
        }

        Ok(PreparedRequest {
            method: spec.method(),
            url,
            headers,
            body,
            timeout: self.settings.request_timeout,
        })
    }

    /// Execute a request.
    ///
    /// Any status is a successful send; only transport failures are errors.
    /// The response also becomes this dispatcher's [`Dispatcher::response`].
    pub async fn send(&self, spec: &RequestSpec) -> HarnessResult<PendingResponse> {
        let prepared = self.prepare(spec)?;
        debug!("Sending {} {}", prepared.method, prepared.url);
        let response = self
            .transport
            .execute(prepared)
            .await?
            .with_request_format(spec.format());
        let response = Arc::new(response);
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&response));
        Ok(PendingResponse { response })
    }

    /// The most recent response received by this dispatcher.
    pub fn response(&self) -> Option<Arc<ResponseView>> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Like [`Dispatcher::response`], failing if nothing was sent yet.
    pub fn last_response(&self) -> HarnessResult<Arc<ResponseView>> {
        self.response()
            .ok_or_else(|| HarnessError::invalid_request("no request has been sent yet"))
    }

    /// Wait for an async boolean condition.
    pub async fn wait_for<F, Fut>(
        &self,
        predicate: F,
        timeout: Duration,
        poll_interval: Duration,
    ) -> HarnessResult<Duration>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        wait_for(predicate, timeout, poll_interval).await
    }

    /// Resend `spec` until `accept` holds for the response, using the
    /// configured polling defaults.
    pub async fn send_until<F>(&self, spec: &RequestSpec, accept: F) -> HarnessResult<PendingResponse>
    where
        F: Fn(&ResponseView) -> bool,
    {
        self.send_until_with(spec, accept, self.settings.poll_policy)
            .await
    }

    /// Resend `spec` until `accept` holds, with an explicit policy.
    pub async fn send_until_with<F>(
        &self,
        spec: &RequestSpec,
        accept: F,
        policy: PollPolicy,
    ) -> HarnessResult<PendingResponse>
    where
        F: Fn(&ResponseView) -> bool,
    {
        let accept = &accept;
        poll_until(
            || async move {
                let pending = self.send(spec).await?;
                if accept(pending.response()) {
                    Ok(Observation::Ready(pending))
                } else {
                    let response = pending.response();
                    Ok(Observation::Pending(format!(
                        "status {} body {}",
                        response.status(),
                        crate::verify::truncate(&response.content(), 200)
                    )))
                }
            },
            policy,
        )
        .await
    }
}

#[cfg(test)]
mod tests;
