//! In-process JSON mock server for testing outbound HTTP calls.
//!
//! Register expectations on a [`MockServer`], hand it the requests your code
//! would have sent, and get back the canned or request-derived responses.
//! Checks run eagerly: the first mismatch is returned as a [`MockError`]
//! naming the offending field.
//!
//! # Example
//!
//! ```
//! use hyper::StatusCode;
//! use rift_json_mock::{CapturedRequest, ExpectedCount, MockServer};
//! use serde_json::json;
//!
//! let mut server = MockServer::default();
//! server.mock_get(ExpectedCount::once(), "/testendpoint", |exp| {
//!     exp.query_param("param1", &["abc"])?;
//!     exp.accept_application_json()?;
//!     exp.respond_json(StatusCode::OK, None, &json!({"extra": "OK"}))
//! });
//!
//! let request = CapturedRequest::get("/testendpoint?param1=abc")
//!     .header("Accept", "application/json");
//! let response = server.exchange(&request).unwrap();
//! assert_eq!(response.body_as_string(), r#"{"extra":"OK"}"#);
//! server.verify().unwrap();
//! ```

pub mod config;
pub mod error;
pub mod expectation;
pub mod json_expect;
pub mod logging;
pub mod matchers;
pub mod media_type;
pub mod request;
pub mod response;
pub mod server;
pub mod stub;
pub mod uri;

pub use config::{JsonConfig, CONFIG_ENV_VAR};
pub use error::{MockError, Result};
pub use expectation::{ExpectationState, MockExpectation};
pub use json_expect::{expect_json, JsonExpect};
pub use matchers::{is_valid_uuid, media_type_matches};
pub use media_type::MediaType;
pub use request::{CapturedRequest, RequestView};
pub use response::{combine_headers, BodyGenerator, BodySource, MockResponse, ResponseSpec};
pub use server::{
    ExpectationOrder, ExpectedCount, MockBlock, MockServer, RecordedExchange, ResponseActions,
};
pub use stub::{StubDefinition, StubFile, StubResponse};
pub use uri::{equal_ignoring_query, QueryParams, UriParts};
