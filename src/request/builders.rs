//! Constructors for [`RequestSpec`].
//!
//! These consume and return the request under construction; once a request
//! is shared, it is only customised through [`RequestSpec::with`].

use crate::error::{HarnessError, HarnessResult};
use crate::request::core::{Method, RequestSpec, SerializationFormat};
use serde::Serialize;

/// Value for a bearer `Authorization` header.
pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

impl RequestSpec {
    /// Create a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Create a POST request with no body yet.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    /// Create a PUT request with no body yet.
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    /// Create a PATCH request with no body yet.
    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::Patch, url)
    }

    /// Create a DELETE request.
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    /// Set the target URL.
    pub fn to(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Attach a JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> HarnessResult<Self> {
        self.body = Some(serde_json::to_value(body).map_err(|e| {
            HarnessError::invalid_request(format!("body is not serializable: {}", e))
        })?);
        self.format = SerializationFormat::Json;
        Ok(self)
    }

    /// Attach a plain text body.
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(serde_json::Value::String(body.into()));
        self.format = SerializationFormat::Text;
        self
    }

    /// Declare the serialization format of the body.
    pub fn as_format(mut self, format: SerializationFormat) -> Self {
        self.format = format;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
        self.headers.insert(name, value.into());
        self
    }

    /// Require the configured API version segment in the final URL.
    pub fn requiring_api_version(mut self) -> Self {
        self.requires_api_version = true;
        self
    }
}
