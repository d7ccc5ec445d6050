//! Core request types.

use crate::error::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Uppercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a payload is serialized on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SerializationFormat {
    /// `application/json`
    #[default]
    Json,
    /// `text/plain`
    Text,
    /// No payload
    None,
}

impl SerializationFormat {
    /// Content type sent for this format, if any.
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            SerializationFormat::Json => Some("application/json"),
            SerializationFormat::Text => Some("text/plain; charset=utf-8"),
            SerializationFormat::None => None,
        }
    }

    /// Infer the format from a `Content-Type` header value.
    ///
    /// Returns `None` when the header does not clearly name JSON or text.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if media_type == "application/json" || media_type.ends_with("+json") {
            Some(SerializationFormat::Json)
        } else if media_type.starts_with("text/") {
            Some(SerializationFormat::Text)
        } else {
            None
        }
    }
}

/// A single field replacement applied by [`RequestSpec::with`].
#[derive(Debug, Clone, PartialEq)]
pub enum Override {
    /// Replace (or remove, with `None`) the `Authorization` header value
    Authorization(Option<String>),
    /// Replace the body payload
    Body(Option<Value>),
    /// Replace the target URL
    Url(String),
    /// Replace the whole header map
    Headers(BTreeMap<String, String>),
    /// Set one header, keeping the others
    Header(String, String),
    /// Replace the serialization format
    Format(SerializationFormat),
}

/// Immutable description of one HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) headers: BTreeMap<String, String>,
    pub(crate) authorization: Option<String>,
    pub(crate) body: Option<Value>,
    pub(crate) format: SerializationFormat,
    pub(crate) requires_api_version: bool,
}

impl RequestSpec {
    /// Create a request with no headers and no body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            authorization: None,
            body: None,
            format: SerializationFormat::None,
            requires_api_version: false,
        }
    }

    /// Return a copy of this request with one field replaced.
    ///
    /// The receiver is never modified.
    pub fn with(&self, field: Override) -> Self {
        let mut next = self.clone();
        match field {
            Override::Authorization(value) => next.authorization = value,
            Override::Body(body) => {
                if body.is_some() && next.format == SerializationFormat::None {
                    next.format = SerializationFormat::Json;
                }
                next.body = body;
            }
            Override::Url(url) => next.url = url,
            Override::Headers(headers) => next.headers = headers,
            Override::Header(name, value) => {
                next.headers.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
                next.headers.insert(name, value);
            }
            Override::Format(format) => next.format = format,
        }
        next
    }

    /// Copy with a bearer `Authorization` header.
    pub fn with_bearer(&self, token: &str) -> Self {
        self.with(Override::Authorization(Some(super::bearer(token))))
    }

    /// Copy targeting another URL.
    pub fn with_url(&self, url: impl Into<String>) -> Self {
        self.with(Override::Url(url.into()))
    }

    /// Copy with a serialized body.
    pub fn with_body<T: Serialize + ?Sized>(&self, body: &T) -> HarnessResult<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| HarnessError::invalid_request(format!("body is not serializable: {}", e)))?;
        Ok(self.with(Override::Body(Some(value))))
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Header value by case-insensitive name.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn format(&self) -> SerializationFormat {
        self.format
    }

    /// Whether the dispatcher must insert the API version segment.
    pub fn requires_api_version(&self) -> bool {
        self.requires_api_version
    }

    /// Serialize the body according to the declared format.
    ///
    /// Returns the bytes and the content type to send, or `None` when the
    /// request carries no body.
    pub fn encode_body(&self) -> HarnessResult<Option<(Vec<u8>, &'static str)>> {
        let Some(body) = &self.body else {
            return Ok(None);
        };
        match self.format {
            SerializationFormat::Json => {
                let bytes = serde_json::to_vec(body).map_err(|e| {
                    HarnessError::invalid_request(format!("body is not serializable: {}", e))
                })?;
                Ok(Some((bytes, "application/json")))
            }
            SerializationFormat::Text => {
                let text = match body {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Ok(Some((text.into_bytes(), "text/plain; charset=utf-8")))
            }
            SerializationFormat::None => Err(HarnessError::invalid_request(format!(
                "{} {} has a body but no serialization format",
                self.method, self.url
            ))),
        }
    }
}

impl fmt::Display for RequestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
