//! Received HTTP responses.
//!
//! [`ResponseView`] keeps the raw bytes of a response and decodes them only
//! when asked. The JSON parse is done at most once per response; typed
//! decodes deserialize from that cached document.

use crate::error::{HarnessError, HarnessResult};
use crate::request::{Method, SerializationFormat};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub mod status;

/// A received response.
#[derive(Debug)]
pub struct ResponseView {
    method: Method,
    url: String,
    status: u16,
    reason: String,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
    request_format: SerializationFormat,
    json: OnceLock<Result<Value, HarnessError>>,
}

impl ResponseView {
    /// Build a response view. Header names are stored lowercased; repeated
    /// headers are joined with `", "`.
    pub fn new(
        method: Method,
        url: impl Into<String>,
        status: u16,
        reason: impl Into<String>,
        headers: impl IntoIterator<Item = (String, String)>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            method,
            url: url.into(),
            status,
            reason: reason.into(),
            headers: merge_headers(headers),
            body,
            request_format: SerializationFormat::Json,
            json: OnceLock::new(),
        }
    }

    /// Format to assume when the response does not declare one.
    pub fn with_request_format(mut self, format: SerializationFormat) -> Self {
        self.request_format = format;
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Numeric status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Reason phrase, e.g. `Not Found`.
    pub fn reason_phrase(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Raw body bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Body as text, with invalid UTF-8 replaced.
    pub fn content(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Format used to decode the body: the response's `Content-Type` when it
    /// is recognisable, otherwise the format the request was sent with.
    pub fn format(&self) -> SerializationFormat {
        self.content_type()
            .and_then(SerializationFormat::from_content_type)
            .unwrap_or(match self.request_format {
                SerializationFormat::None => SerializationFormat::Json,
                declared => declared,
            })
    }

    /// Parsed JSON document, computed on first call.
    pub fn json(&self) -> HarnessResult<&Value> {
        self.json
            .get_or_init(|| {
                if self.body.is_empty() {
                    return Err(HarnessError::decode::<Value>("response body is empty"));
                }
                serde_json::from_slice(&self.body).map_err(HarnessError::decode::<Value>)
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Decode the body as `T` using [`ResponseView::format`].
    pub fn take<T: DeserializeOwned>(&self) -> HarnessResult<T> {
        match self.format() {
            SerializationFormat::Text => {
                T::deserialize(Value::String(self.content())).map_err(HarnessError::decode::<T>)
            }
            SerializationFormat::Json | SerializationFormat::None => {
                let document = self.json().map_err(|e| match e {
                    HarnessError::Decode { message, .. } => HarnessError::decode::<T>(message),
                    other => other,
                })?;
                T::deserialize(document).map_err(HarnessError::decode::<T>)
            }
        }
    }

    /// Decode the body as `T` with an explicit format, ignoring headers.
    pub fn take_as<T: DeserializeOwned>(&self, format: SerializationFormat) -> HarnessResult<T> {
        match format {
            SerializationFormat::Text => {
                T::deserialize(Value::String(self.content())).map_err(HarnessError::decode::<T>)
            }
            _ => {
                let document = self.json()?;
                T::deserialize(document).map_err(HarnessError::decode::<T>)
            }
        }
    }

    /// Fail with [`HarnessError::UnexpectedStatus`] unless the status is 2xx.
    pub fn ensure_success(&self) -> HarnessResult<&Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(HarnessError::UnexpectedStatus {
                method: self.method.to_string(),
                url: self.url.clone(),
                status: self.status,
                body: self.content(),
            })
        }
    }
}

fn merge_headers(headers: impl IntoIterator<Item = (String, String)>) -> BTreeMap<String, String> {
    let mut merged: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        merged
            .entry(name.to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct BlacklistedOrg {
        organization: String,
        is_deleted: bool,
    }

    fn json_response(body: &str) -> ResponseView {
        ResponseView::new(
            Method::Get,
            "/admin/blacklist",
            200,
            "OK",
            vec![("Content-Type".to_string(), "application/json".to_string())],
            body.as_bytes().to_vec(),
        )
    }

    #[test]
    fn typed_decode_from_json() {
        let response = json_response(r#"[{"organization":"acme","isDeleted":false}]"#);
        let orgs: Vec<BlacklistedOrg> = response.take().unwrap();
        assert_eq!(
            orgs,
            vec![BlacklistedOrg {
                organization: "acme".to_string(),
                is_deleted: false
            }]
        );
        assert_eq!(response.header("content-type"), Some("application/json"));
    }

    #[test]
    fn repeated_headers_keep_every_value() {
        let response = ResponseView::new(
            Method::Get,
            "/connect/token",
            200,
            "OK",
            vec![
                ("Set-Cookie".to_string(), "session=a".to_string()),
                ("set-cookie".to_string(), "theme=dark".to_string()),
                ("Content-Type".to_string(), "text/plain".to_string()),
            ],
            Vec::new(),
        );
        assert_eq!(response.header("Set-Cookie"), Some("session=a, theme=dark"));
        assert_eq!(response.headers().len(), 2);
    }

    #[test]
    fn shape_mismatch_is_a_decode_error() {
        let response = json_response(r#"{"organization":"acme"}"#);
        let error = response.take::<Vec<BlacklistedOrg>>().unwrap_err();
        assert!(matches!(error, HarnessError::Decode { .. }));
    }

    #[test]
    fn json_document_is_parsed_once() {
        let response = json_response(r#"{"a":1}"#);
        let first = response.json().unwrap() as *const Value;
        let second = response.json().unwrap() as *const Value;
        assert_eq!(first, second);
    }

    #[test]
    fn text_content_type_decodes_to_string() {
        let response = ResponseView::new(
            Method::Post,
            "/share/abc/recipients",
            200,
            "OK",
            vec![("content-type".to_string(), "text/plain; charset=utf-8".to_string())],
            b"Recipients have been added to abc.".to_vec(),
        );
        assert_eq!(response.format(), SerializationFormat::Text);
        let message: String = response.take().unwrap();
        assert_eq!(message, "Recipients have been added to abc.");
    }

    #[test]
    fn missing_content_type_falls_back_to_request_format() {
        let response = ResponseView::new(Method::Get, "/x", 200, "OK", Vec::new(), b"plain".to_vec())
            .with_request_format(SerializationFormat::Text);
        assert_eq!(response.take::<String>().unwrap(), "plain");

        let json = ResponseView::new(Method::Get, "/x", 200, "OK", Vec::new(), b"[1,2]".to_vec());
        assert_eq!(json.take::<Vec<u8>>().unwrap(), vec![1, 2]);
    }

    #[test]
    fn empty_body_and_status_helpers() {
        let response = ResponseView::new(Method::Get, "/x", 401, "Unauthorized", Vec::new(), Vec::new());
        assert_eq!(response.content(), "");
        assert!(!response.is_success());
        assert_eq!(response.reason_phrase(), "Unauthorized");
        assert!(matches!(response.json(), Err(HarnessError::Decode { .. })));
        assert!(matches!(
            response.ensure_success(),
            Err(HarnessError::UnexpectedStatus { status: 401, .. })
        ));
    }
}
