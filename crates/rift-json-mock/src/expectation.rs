//! A single expectation bound to one captured request.
//!
//! `MockExpectation` is created by the server when a request is dispatched to
//! a registration. Every check runs immediately against the bound request and
//! returns `Err` with a field-named message on mismatch. At most one response
//! may be defined; a second definition of any kind is a configuration error.

use bytes::Bytes;
use hyper::{HeaderMap, Method, StatusCode};
use serde::Serialize;
use tracing::debug;

use crate::config::JsonConfig;
use crate::error::{MockError, Result};
use crate::json_expect::{expect_json, JsonExpect};
use crate::media_type::MediaType;
use crate::request::{CapturedRequest, RequestView};
use crate::response::{combine_headers, BodyGenerator, MockResponse, ResponseSpec};
use crate::uri::equal_ignoring_query;

/// Lifecycle of an expectation within one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectationState {
    /// No request bound
    Idle,
    /// Request bound, checks executing
    Matching,
    /// All checks passed
    Matched,
    /// A check failed; no response was produced
    Failed,
}

pub struct MockExpectation<'r> {
    view: RequestView<'r>,
    state: ExpectationState,
    response: Option<ResponseSpec>,
}

impl<'r> MockExpectation<'r> {
    pub fn new(request: &'r CapturedRequest, config: &'r JsonConfig) -> Self {
        MockExpectation {
            view: RequestView::new(request, config),
            state: ExpectationState::Matching,
            response: None,
        }
    }

    pub fn state(&self) -> ExpectationState {
        self.state
    }

    /// Record the outcome of the checks. Only the first call has any effect.
    pub(crate) fn settle(&mut self, matched: bool) {
        if self.state == ExpectationState::Matching {
            self.state = if matched {
                ExpectationState::Matched
            } else {
                ExpectationState::Failed
            };
        }
    }

    /// The bound request.
    pub fn request(&self) -> &RequestView<'r> {
        &self.view
    }

    pub fn config(&self) -> &'r JsonConfig {
        self.view.config()
    }

    // ===== Request checks =====

    /// Match the URI, ignoring its query string.
    pub fn request_to(&self, expected: &str) -> Result<()> {
        let uri = self.view.uri();
        if !equal_ignoring_query(uri, expected) {
            return Err(mismatch(format!(
                "Request URI doesn't match; expected {expected}, was {uri}"
            )));
        }
        Ok(())
    }

    /// Match the full URI string with a predicate.
    pub fn request_to_matching(&self, test: impl FnOnce(&str) -> bool) -> Result<()> {
        let uri = self.view.uri();
        if !test(uri) {
            return Err(mismatch(format!(
                "Request URI doesn't match; was {uri}"
            )));
        }
        Ok(())
    }

    pub fn method(&self, expected: Method) -> Result<()> {
        let actual = self.view.method();
        if *actual != expected {
            return Err(mismatch(format!(
                "Request method incorrect; expected {expected}, was {actual}"
            )));
        }
        Ok(())
    }

    /// Match a query parameter against an ordered list of values.
    pub fn query_param(&self, name: &str, expected: &[&str]) -> Result<()> {
        let entries = self.query_entries(name)?;
        let n = expected.len();
        let s = entries.len();
        if s != n {
            return Err(mismatch(if n == 1 {
                format!(
                    "Request query param [{name}] incorrect; expected single param, was multiple ({s})"
                )
            } else {
                format!("Request query param [{name}] number incorrect; expected {n}, was {s}")
            }));
        }
        for (want, got) in expected.iter().zip(entries) {
            if got.as_deref() != Some(*want) {
                return Err(mismatch(format!(
                    "Request query param [{name}] incorrect; expected {want}, was {}",
                    got.as_deref().unwrap_or("null")
                )));
            }
        }
        Ok(())
    }

    /// Match a single-valued query parameter with a predicate.
    pub fn query_param_matching(&self, name: &str, test: impl FnOnce(&str) -> bool) -> Result<()> {
        let entries = self.query_entries(name)?;
        if entries.len() != 1 {
            return Err(mismatch(format!(
                "Request query param [{name}] incorrect; expected single param, was multiple ({})",
                entries.len()
            )));
        }
        match entries[0].as_deref() {
            Some(value) if test(value) => Ok(()),
            _ => Err(mismatch(format!(
                "Request query param [{name}] incorrect"
            ))),
        }
    }

    fn query_entries(&self, name: &str) -> Result<&[Option<String>]> {
        match self.view.get_params(name) {
            Some(entries) if !entries.is_empty() => Ok(entries),
            _ => Err(presence(format!(
                "Request query param [{name}] not found"
            ))),
        }
    }

    /// Match a header against an ordered list of values.
    pub fn header(&self, name: &str, expected: &[&str]) -> Result<()> {
        let values = self.header_values(name, expected.len())?;
        for (want, got) in expected.iter().zip(&values) {
            if got != want {
                return Err(mismatch(format!(
                    "Request header [{name}] incorrect; expected {want}, was {got}"
                )));
            }
        }
        Ok(())
    }

    /// Match a single-valued header with a predicate.
    pub fn header_matching(&self, name: &str, test: impl FnOnce(&str) -> bool) -> Result<()> {
        let header = self.single_header(name)?;
        if !test(header.as_str()) {
            return Err(mismatch(format!(
                "Request header [{name}] incorrect; was {header}"
            )));
        }
        Ok(())
    }

    pub fn header_does_not_exist(&self, name: &str) -> Result<()> {
        if self.view.has_header(name) {
            return Err(presence(format!(
                "Request [{name}] header expected not to be present"
            )));
        }
        Ok(())
    }

    fn header_values(&self, name: &str, expected_count: usize) -> Result<Vec<String>> {
        let values = self
            .view
            .get_headers(name)
            .ok_or_else(|| presence(format!("Header [{name}] not found")))?;
        if values.len() != expected_count {
            return Err(mismatch(if expected_count == 1 {
                format!(
                    "Request [{name}] header; expected single header, was multiple ({})",
                    values.len()
                )
            } else {
                format!(
                    "Request [{name}] header number incorrect; expected {expected_count}, was {}",
                    values.len()
                )
            }));
        }
        Ok(values)
    }

    fn single_header(&self, name: &str) -> Result<String> {
        let mut values = self.header_values(name, 1)?;
        values
            .pop()
            .ok_or_else(|| presence(format!("Header [{name}] not found")))
    }

    /// Match `Accept`; succeeds if any comma-separated entry is compatible.
    pub fn accept(&self, expected: &MediaType) -> Result<()> {
        let header = self.single_header("Accept")?;
        for entry in header.split(',').map(str::trim) {
            if check_media_type(entry, "Accept")?.is_compatible_with(expected) {
                return Ok(());
            }
        }
        debug!("No Accept entry compatible with {}", expected);
        Err(mismatch(format!(
            "Request [Accept] header incorrect; expected {expected}, was {header}"
        )))
    }

    pub fn accept_application_json(&self) -> Result<()> {
        self.accept(&MediaType::APPLICATION_JSON)
    }

    pub fn content_type(&self, expected: &MediaType) -> Result<()> {
        let header = self.single_header("Content-Type")?;
        if !check_media_type(&header, "Content-Type")?.is_compatible_with(expected) {
            return Err(mismatch(format!(
                "Request [Content-Type] header incorrect; expected {expected}, was {header}"
            )));
        }
        Ok(())
    }

    pub fn content_type_application_json(&self) -> Result<()> {
        self.content_type(&MediaType::APPLICATION_JSON)
    }

    pub fn request_content(&self, body: &str) -> Result<()> {
        if self.view.body_as_string() != body {
            return Err(mismatch("Request body incorrect"));
        }
        Ok(())
    }

    pub fn request_content_matching(&self, test: impl FnOnce(&str) -> bool) -> Result<()> {
        if !test(self.view.body_as_string().as_ref()) {
            return Err(mismatch("Request body incorrect"));
        }
        Ok(())
    }

    /// Require a JSON body and run declarative expectations over it.
    pub fn request_json<F>(&self, tests: F) -> Result<()>
    where
        F: FnOnce(&JsonExpect<'_>) -> Result<()>,
    {
        self.content_type_application_json()?;
        expect_json(&self.view.body_as_string(), self.config(), tests).map_err(rejected)
    }

    // ===== Response definition =====

    /// Respond with a fixed value serialized to JSON.
    pub fn respond_json<T: Serialize + ?Sized>(
        &mut self,
        status: StatusCode,
        headers: Option<HeaderMap>,
        result: &T,
    ) -> Result<()> {
        let body = self.config().to_json_bytes(result)?;
        self.set_response(ResponseSpec::fixed(
            status,
            combine_headers(headers, Some(&MediaType::APPLICATION_JSON)),
            Some(Bytes::from(body)),
        ))
    }

    /// Respond with a value built from the request and serialized to JSON.
    pub fn respond_json_with<T, F>(
        &mut self,
        status: StatusCode,
        headers: Option<HeaderMap>,
        generator: F,
    ) -> Result<()>
    where
        T: Serialize,
        F: Fn(&RequestView<'_>) -> Result<T> + 'static,
    {
        let generator: BodyGenerator = Box::new(move |request: &RequestView<'_>| {
            let value = generator(request)?;
            request.config().to_json_bytes(&value).map(Some)
        });
        self.set_response(ResponseSpec::generated(
            status,
            combine_headers(headers, Some(&MediaType::APPLICATION_JSON)),
            generator,
        ))
    }

    /// Respond with a fixed string.
    pub fn respond(
        &mut self,
        status: StatusCode,
        headers: Option<HeaderMap>,
        content_type: Option<&MediaType>,
        result: Option<&str>,
    ) -> Result<()> {
        self.set_response(ResponseSpec::fixed(
            status,
            combine_headers(headers, content_type),
            result.map(|s| Bytes::copy_from_slice(s.as_bytes())),
        ))
    }

    /// Respond with a string built from the request.
    pub fn respond_with<F>(
        &mut self,
        status: StatusCode,
        headers: Option<HeaderMap>,
        content_type: Option<&MediaType>,
        generator: F,
    ) -> Result<()>
    where
        F: Fn(&RequestView<'_>) -> Result<Option<String>> + 'static,
    {
        self.set_response(ResponseSpec::generated(
            status,
            combine_headers(headers, content_type),
            string_generator(generator),
        ))
    }

    pub fn respond_text_plain(
        &mut self,
        status: StatusCode,
        headers: Option<HeaderMap>,
        result: Option<&str>,
    ) -> Result<()> {
        self.respond(status, headers, Some(&MediaType::TEXT_PLAIN), result)
    }

    pub fn respond_text_plain_with<F>(
        &mut self,
        status: StatusCode,
        headers: Option<HeaderMap>,
        generator: F,
    ) -> Result<()>
    where
        F: Fn(&RequestView<'_>) -> Result<Option<String>> + 'static,
    {
        self.respond_with(status, headers, Some(&MediaType::TEXT_PLAIN), generator)
    }

    /// Respond with fixed bytes.
    pub fn respond_bytes(
        &mut self,
        status: StatusCode,
        headers: Option<HeaderMap>,
        content_type: Option<&MediaType>,
        result: Option<Bytes>,
    ) -> Result<()> {
        self.set_response(ResponseSpec::fixed(
            status,
            combine_headers(headers, content_type),
            result,
        ))
    }

    /// Respond with bytes built from the request.
    pub fn respond_bytes_with<F>(
        &mut self,
        status: StatusCode,
        headers: Option<HeaderMap>,
        content_type: Option<&MediaType>,
        generator: F,
    ) -> Result<()>
    where
        F: Fn(&RequestView<'_>) -> Result<Option<Vec<u8>>> + 'static,
    {
        self.set_response(ResponseSpec::generated(
            status,
            combine_headers(headers, content_type),
            Box::new(generator),
        ))
    }

    /// Attach a prepared response definition.
    pub fn set_response(&mut self, response: ResponseSpec) -> Result<()> {
        if self.response.is_some() {
            return Err(MockError::configuration("Response already set"));
        }
        self.response = Some(response);
        Ok(())
    }

    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    /// Materialize the response, or `None` if no response was defined here.
    ///
    /// `None` lets the caller fall back to a response attached to the
    /// registration after the fact.
    pub fn create_response(&self) -> Result<Option<MockResponse>> {
        self.response
            .as_ref()
            .map(|spec| spec.materialize(self.view.request(), self.config()))
            .transpose()
    }

    pub fn into_response_spec(self) -> Option<ResponseSpec> {
        self.response
    }
}

fn string_generator<F>(generator: F) -> BodyGenerator
where
    F: Fn(&RequestView<'_>) -> Result<Option<String>> + 'static,
{
    Box::new(move |request: &RequestView<'_>| Ok(generator(request)?.map(String::into_bytes)))
}

fn check_media_type(header: &str, name: &str) -> Result<MediaType> {
    MediaType::parse(header).map_err(|_| {
        rejected(MockError::parse(format!(
            "Request [{name}] header media type invalid: {header}"
        )))
    })
}

fn mismatch(message: impl Into<String>) -> MockError {
    rejected(MockError::mismatch(message))
}

fn presence(message: impl Into<String>) -> MockError {
    rejected(MockError::presence(message))
}

fn rejected(error: MockError) -> MockError {
    debug!("Request check failed: {}", error);
    error
}

impl std::fmt::Debug for MockExpectation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockExpectation")
            .field("method", self.view.method())
            .field("uri", &self.view.uri())
            .field("state", &self.state)
            .field("response", &self.response)
            .finish()
    }
}
