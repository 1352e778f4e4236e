//! Declarative expectations loaded from YAML or JSON.
//!
//! A stub file lists request checks and a canned response per entry:
//!
//! ```yaml
//! stubs:
//!   - method: GET
//!     uri: /testendpoint
//!     count: manyTimes
//!     queryParams:
//!       param1: abc
//!     accept: application/json
//!     response:
//!       status: 200
//!       json: { date: "2022-07-12", extra: OK }
//! ```
//!
//! Definitions are validated and compiled when registered, so a bad media
//! type or status code fails at load time rather than on first request.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::JsonConfig;
use crate::error::{MockError, Result};
use crate::expectation::MockExpectation;
use crate::media_type::MediaType;
use crate::response::{combine_headers, ResponseSpec};
use crate::server::{ExpectedCount, MockServer};
use crate::uri::UriParts;

/// One value or a list of values.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value.clone()],
            OneOrMany::Many(values) => values.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NamedCount {
    Once,
    ManyTimes,
    Never,
}

/// `once`, `manyTimes`, `never` or `{ min, max }`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum StubCount {
    Named(NamedCount),
    Range {
        #[serde(default)]
        min: usize,
        #[serde(default)]
        max: Option<usize>,
    },
}

impl Default for StubCount {
    fn default() -> Self {
        StubCount::Named(NamedCount::Once)
    }
}

impl From<&StubCount> for ExpectedCount {
    fn from(count: &StubCount) -> Self {
        match count {
            StubCount::Named(NamedCount::Once) => ExpectedCount::once(),
            StubCount::Named(NamedCount::ManyTimes) => ExpectedCount::many_times(),
            StubCount::Named(NamedCount::Never) => ExpectedCount::never(),
            StubCount::Range { min, max: Some(max) } => ExpectedCount::between(*min, *max),
            StubCount::Range { min, max: None } => ExpectedCount::min(*min),
        }
    }
}

/// Canned response of a stub.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StubResponse {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

fn default_status() -> u16 {
    200
}

impl Default for StubResponse {
    fn default() -> Self {
        StubResponse {
            status: default_status(),
            headers: BTreeMap::new(),
            content_type: None,
            json: None,
            text: None,
        }
    }
}

/// A declarative expectation.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StubDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Required prefix of the URI path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri_prefix: Option<String>,
    #[serde(default)]
    pub count: StubCount,
    #[serde(default)]
    pub query_params: BTreeMap<String, OneOrMany>,
    #[serde(default)]
    pub headers: BTreeMap<String, OneOrMany>,
    #[serde(default)]
    pub absent_headers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Exact request body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Top-level properties the JSON request body must contain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Map<String, Value>>,
    #[serde(default)]
    pub response: StubResponse,
}

/// Top-level layout of a stub file.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct StubFile {
    #[serde(default)]
    pub stubs: Vec<StubDefinition>,
}

impl StubFile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            MockError::configuration(format!("Failed to read stub file {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&contents)
            .map_err(|e| MockError::parse(format!("{} ({})", e, path.display())))
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| MockError::parse(format!("Invalid stub file: {e}")))
    }
}

/// Request checks of a definition, validated and ready to run.
#[derive(Debug, Clone)]
struct CompiledChecks {
    uri_prefix: Option<String>,
    query_params: Vec<(String, Vec<String>)>,
    headers: Vec<(String, Vec<String>)>,
    absent_headers: Vec<String>,
    accept: Option<MediaType>,
    content_type: Option<MediaType>,
    body: Option<String>,
    json: Option<Map<String, Value>>,
}

impl CompiledChecks {
    fn run(&self, exp: &mut MockExpectation<'_>) -> Result<()> {
        if let Some(prefix) = &self.uri_prefix {
            exp.request_to_matching(|uri| UriParts::parse(uri).path.starts_with(prefix.as_str()))?;
        }
        for (name, values) in &self.query_params {
            exp.query_param(name, &as_strs(values))?;
        }
        for (name, values) in &self.headers {
            exp.header(name, &as_strs(values))?;
        }
        for name in &self.absent_headers {
            exp.header_does_not_exist(name)?;
        }
        if let Some(accept) = &self.accept {
            exp.accept(accept)?;
        }
        if let Some(content_type) = &self.content_type {
            exp.content_type(content_type)?;
        }
        if let Some(body) = &self.body {
            exp.request_content(body)?;
        }
        if let Some(properties) = &self.json {
            exp.request_json(|json| {
                for (name, expected) in properties {
                    json.property(name, expected)?;
                }
                Ok(())
            })?;
        }
        Ok(())
    }
}

fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

fn flatten(map: &BTreeMap<String, OneOrMany>) -> Vec<(String, Vec<String>)> {
    map.iter()
        .map(|(name, values)| (name.clone(), values.to_vec()))
        .collect()
}

fn parse_media_type(value: Option<&str>) -> Result<Option<MediaType>> {
    value.map(MediaType::parse).transpose()
}

impl StubDefinition {
    fn compile_checks(&self) -> Result<CompiledChecks> {
        Ok(CompiledChecks {
            uri_prefix: self.uri_prefix.clone(),
            query_params: flatten(&self.query_params),
            headers: flatten(&self.headers),
            absent_headers: self.absent_headers.clone(),
            accept: parse_media_type(self.accept.as_deref())?,
            content_type: parse_media_type(self.content_type.as_deref())?,
            body: self.body.clone(),
            json: self.json.clone(),
        })
    }

    fn compile_method(&self) -> Result<Option<Method>> {
        self.method
            .as_deref()
            .map(|m| {
                Method::from_str(&m.to_ascii_uppercase())
                    .map_err(|_| MockError::parse(format!("Invalid method: {m}")))
            })
            .transpose()
    }
}

impl StubResponse {
    fn compile(&self, config: &JsonConfig) -> Result<ResponseSpec> {
        let status = StatusCode::from_u16(self.status).map_err(|_| {
            MockError::configuration(format!("Invalid status code: {}", self.status))
        })?;

        let mut headers = HeaderMap::new();
        for (name, values) in &self.headers {
            let header_name = HeaderName::from_str(name)
                .map_err(|_| MockError::parse(format!("Invalid response header name: {name}")))?;
            for value in values.to_vec() {
                let header_value = HeaderValue::from_str(&value).map_err(|_| {
                    MockError::parse(format!("Invalid response header [{name}] value: {value}"))
                })?;
                headers.append(header_name.clone(), header_value);
            }
        }
        let headers = (!headers.is_empty()).then_some(headers);
        let content_type = parse_media_type(self.content_type.as_deref())?;

        match (&self.json, &self.text) {
            (Some(_), Some(_)) => Err(MockError::configuration(
                "Stub response may define json or text, not both",
            )),
            (Some(json), None) => {
                let body = config.to_json_bytes(json)?;
                let content_type = content_type.unwrap_or(MediaType::APPLICATION_JSON);
                Ok(ResponseSpec::fixed(
                    status,
                    combine_headers(headers, Some(&content_type)),
                    Some(Bytes::from(body)),
                ))
            }
            (None, Some(text)) => {
                let content_type = content_type.unwrap_or(MediaType::TEXT_PLAIN);
                Ok(ResponseSpec::fixed(
                    status,
                    combine_headers(headers, Some(&content_type)),
                    Some(Bytes::from(text.clone())),
                ))
            }
            (None, None) => Ok(ResponseSpec::fixed(
                status,
                combine_headers(headers, content_type.as_ref()),
                None,
            )),
        }
    }
}

impl MockServer {
    /// Validate and register a declarative stub.
    pub fn mock_stub(&mut self, definition: &StubDefinition) -> Result<()> {
        let method = definition.compile_method()?;
        let checks = definition.compile_checks()?;
        let response = definition.response.compile(self.config())?;
        debug!(
            "Compiled stub {} {}",
            definition.method.as_deref().unwrap_or("*"),
            definition.uri.as_deref().unwrap_or("*")
        );

        self.register(
            ExpectedCount::from(&definition.count),
            method,
            definition.uri.clone(),
            Box::new(move |exp: &mut MockExpectation<'_>| checks.run(exp)),
        )
        .and_respond(response)
    }

    /// Register every stub in a file; returns how many were added.
    ///
    /// Nothing is registered if any definition is invalid.
    pub fn load_stubs<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let file = StubFile::from_file(path)?;
        for definition in &file.stubs {
            definition.compile_method()?;
            definition.compile_checks()?;
            definition.response.compile(self.config())?;
        }
        for definition in &file.stubs {
            self.mock_stub(definition)?;
        }
        info!("Loaded {} stub(s) from {}", file.stubs.len(), path.display());
        Ok(file.stubs.len())
    }
}
