//! Captured requests and the read-only view handed to checks and generators.

use std::borrow::Cow;
use std::str::FromStr;

use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{HeaderMap, Method};
use once_cell::unsync::OnceCell;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::config::JsonConfig;
use crate::error::{MockError, Result};
use crate::media_type::MediaType;
use crate::uri::QueryParams;

/// Immutable snapshot of an intercepted HTTP request.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Bytes,
}

impl CapturedRequest {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        CapturedRequest {
            method,
            uri: uri.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn post(uri: impl Into<String>) -> Self {
        Self::new(Method::POST, uri)
    }

    /// Append a header value. Invalid names or values are skipped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::from_str(name), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => warn!("Skipping invalid request header {}: {}", name, value),
        }
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in headers.iter() {
            self.headers.append(name.clone(), value.clone());
        }
        self
    }

    pub fn content_type(self, media_type: &MediaType) -> Self {
        self.header(CONTENT_TYPE.as_str(), media_type.as_ref())
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Serialize `value` as the body and mark it `application/json`.
    pub fn json<T: Serialize + ?Sized>(self, config: &JsonConfig, value: &T) -> Result<Self> {
        let body = config.to_json_bytes(value)?;
        Ok(self.content_type(&MediaType::APPLICATION_JSON).body(body))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn header_map(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }
}

/// Lazy read view over a [`CapturedRequest`].
///
/// Query parameters and the parsed JSON body are computed on first access and
/// cached for the lifetime of the view.
#[derive(Debug)]
pub struct RequestView<'r> {
    request: &'r CapturedRequest,
    config: &'r JsonConfig,
    params: OnceCell<QueryParams>,
    json: OnceCell<Value>,
}

impl<'r> RequestView<'r> {
    pub fn new(request: &'r CapturedRequest, config: &'r JsonConfig) -> Self {
        RequestView {
            request,
            config,
            params: OnceCell::new(),
            json: OnceCell::new(),
        }
    }

    pub fn request(&self) -> &'r CapturedRequest {
        self.request
    }

    pub fn config(&self) -> &'r JsonConfig {
        self.config
    }

    pub fn method(&self) -> &'r Method {
        &self.request.method
    }

    pub fn uri(&self) -> &'r str {
        &self.request.uri
    }

    pub fn headers(&self) -> &'r HeaderMap {
        &self.request.headers
    }

    pub fn body_as_bytes(&self) -> &'r [u8] {
        &self.request.body
    }

    pub fn body_as_string(&self) -> Cow<'r, str> {
        String::from_utf8_lossy(&self.request.body)
    }

    /// Body parsed as JSON; parse failures surface as `MockError::Parse`.
    pub fn body_as_json(&self) -> Result<&Value> {
        self.json
            .get_or_try_init(|| self.config.parse_value(&self.body_as_string()))
    }

    /// Body deserialized into `T` through the codec.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T> {
        self.config.from_json(&self.body_as_string())
    }

    /// All values of a header, or `None` if the header is absent.
    pub fn get_headers(&self, name: &str) -> Option<Vec<String>> {
        let values: Vec<String> = self
            .request
            .headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values)
        }
    }

    /// Sole value of a header; more than one value is an error.
    pub fn get_header(&self, name: &str) -> Result<Option<String>> {
        let Some(mut values) = self.get_headers(name) else {
            return Ok(None);
        };
        if values.len() != 1 {
            return Err(MockError::mismatch(format!(
                "Request [{name}] header - multiple headers ({})",
                values.len()
            )));
        }
        Ok(values.pop())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.request.headers.contains_key(name)
    }

    pub fn params(&self) -> &QueryParams {
        self.params
            .get_or_init(|| QueryParams::from_uri(&self.request.uri))
    }

    pub fn get_params(&self, name: &str) -> Option<&[Option<String>]> {
        self.params().get(name)
    }

    /// Sole value of a query parameter; more than one value is an error.
    ///
    /// A parameter given without `=` yields `Ok(None)`.
    pub fn get_param(&self, name: &str) -> Result<Option<&str>> {
        let Some(values) = self.get_params(name) else {
            return Ok(None);
        };
        if values.len() != 1 {
            return Err(MockError::mismatch(format!(
                "Request [{name}] param - multiple params ({})",
                values.len()
            )));
        }
        Ok(values[0].as_deref())
    }

    /// Sole value of a query parameter, percent-decoded with `+` read as space.
    pub fn get_param_decoded(&self, name: &str) -> Result<Option<String>> {
        let Some(raw) = self.get_param(name)? else {
            return Ok(None);
        };
        let spaced = raw.replace('+', " ");
        urlencoding::decode(&spaced)
            .map(|decoded| Some(decoded.into_owned()))
            .map_err(|e| MockError::parse(format!("Request [{name}] param invalid encoding: {e}; was {raw}")))
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params().contains(name)
    }
}
