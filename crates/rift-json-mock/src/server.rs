//! Expectation registry and request dispatcher.
//!
//! Registrations are kept in the order they were added. Each captured request
//! is offered to the registrations per [`ExpectationOrder`]; the first whose
//! checks all pass produces the response. Every dispatch is recorded.

use bytes::Bytes;
use hyper::{HeaderMap, Method, StatusCode};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::JsonConfig;
use crate::error::{MockError, Result};
use crate::expectation::{ExpectationState, MockExpectation};
use crate::media_type::MediaType;
use crate::request::CapturedRequest;
use crate::response::{combine_headers, MockResponse, ResponseSpec};

/// Checks run against each request offered to a registration.
pub type MockBlock = Box<dyn Fn(&mut MockExpectation<'_>) -> Result<()>>;

/// How many requests a registration should receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedCount {
    min: usize,
    max: Option<usize>,
}

impl ExpectedCount {
    pub fn once() -> Self {
        Self::times(1)
    }

    pub fn times(n: usize) -> Self {
        ExpectedCount {
            min: n,
            max: Some(n),
        }
    }

    pub fn min(n: usize) -> Self {
        ExpectedCount { min: n, max: None }
    }

    pub fn max(n: usize) -> Self {
        ExpectedCount {
            min: 0,
            max: Some(n),
        }
    }

    /// Inclusive range; the bounds are swapped if given in reverse.
    pub fn between(min: usize, max: usize) -> Self {
        ExpectedCount {
            min: min.min(max),
            max: Some(min.max(max)),
        }
    }

    /// At least one request.
    pub fn many_times() -> Self {
        Self::min(1)
    }

    pub fn never() -> Self {
        Self::times(0)
    }

    pub fn min_count(&self) -> usize {
        self.min
    }

    pub fn max_count(&self) -> Option<usize> {
        self.max
    }

    fn is_satisfied_by(&self, hits: usize) -> bool {
        hits >= self.min
    }

    fn is_exhausted_by(&self, hits: usize) -> bool {
        self.max.is_some_and(|max| hits >= max)
    }
}

impl Default for ExpectedCount {
    fn default() -> Self {
        Self::once()
    }
}

/// Order in which registrations are offered requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpectationOrder {
    /// Registrations are consumed in sequence
    #[default]
    Ordered,
    /// Any registration with remaining capacity may match
    Unordered,
}

struct Registration {
    count: ExpectedCount,
    method: Option<Method>,
    uri: Option<String>,
    block: MockBlock,
    /// Checks chained after registration; run after `block`
    chained: Vec<MockBlock>,
    response: Option<ResponseSpec>,
    hits: usize,
}

impl Registration {
    fn is_satisfied(&self) -> bool {
        self.count.is_satisfied_by(self.hits)
    }

    fn is_exhausted(&self) -> bool {
        self.count.is_exhausted_by(self.hits)
    }

    fn check(&self, expectation: &mut MockExpectation<'_>) -> Result<()> {
        if let Some(method) = &self.method {
            expectation.method(method.clone())?;
        }
        if let Some(uri) = &self.uri {
            expectation.request_to(uri)?;
        }
        (self.block)(expectation)?;
        self.chained.iter().try_for_each(|check| check(expectation))
    }

    /// Run preset and block checks, then produce the response.
    fn attempt(&self, request: &CapturedRequest, config: &JsonConfig) -> Result<MockResponse> {
        let mut expectation = MockExpectation::new(request, config);
        let checked = self.check(&mut expectation);
        expectation.settle(checked.is_ok());
        checked?;

        match (expectation.create_response()?, &self.response) {
            (Some(_), Some(_)) => Err(MockError::configuration("Response already set")),
            (Some(response), None) => Ok(response),
            (None, Some(spec)) => spec.materialize(request, config),
            (None, None) => Err(MockError::configuration(format!(
                "No response defined for request: HTTP {} {}",
                request.method(),
                request.uri()
            ))),
        }
    }
}

/// Outcome of one dispatched request.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedExchange {
    pub method: Method,
    pub uri: String,
    pub state: ExpectationState,
    /// Index of the registration that answered or last rejected the request
    pub registration: Option<usize>,
    pub error: Option<MockError>,
}

/// In-process mock dispatcher.
pub struct MockServer {
    config: JsonConfig,
    order: ExpectationOrder,
    registrations: Vec<Registration>,
    cursor: usize,
    log: Vec<RecordedExchange>,
}

impl MockServer {
    pub fn new(config: JsonConfig) -> Self {
        MockServer {
            config,
            order: ExpectationOrder::default(),
            registrations: Vec::new(),
            cursor: 0,
            log: Vec::new(),
        }
    }

    /// Server using the process-wide configuration.
    pub fn with_cached_config() -> Self {
        Self::new(JsonConfig::cached().clone())
    }

    pub fn with_order(mut self, order: ExpectationOrder) -> Self {
        self.order = order;
        self
    }

    pub fn config(&self) -> &JsonConfig {
        &self.config
    }

    pub fn order(&self) -> ExpectationOrder {
        self.order
    }

    /// Register an expectation.
    ///
    /// The optional method and URI are checked (in that order) before `block`.
    pub fn mock<F>(
        &mut self,
        count: ExpectedCount,
        method: Option<Method>,
        uri: Option<&str>,
        block: F,
    ) -> ResponseActions<'_>
    where
        F: Fn(&mut MockExpectation<'_>) -> Result<()> + 'static,
    {
        self.register(count, method, uri.map(str::to_string), Box::new(block))
    }

    pub fn mock_get<F>(&mut self, count: ExpectedCount, uri: &str, block: F) -> ResponseActions<'_>
    where
        F: Fn(&mut MockExpectation<'_>) -> Result<()> + 'static,
    {
        self.mock(count, Some(Method::GET), Some(uri), block)
    }

    pub fn mock_post<F>(&mut self, count: ExpectedCount, uri: &str, block: F) -> ResponseActions<'_>
    where
        F: Fn(&mut MockExpectation<'_>) -> Result<()> + 'static,
    {
        self.mock(count, Some(Method::POST), Some(uri), block)
    }

    pub fn mock_put<F>(&mut self, count: ExpectedCount, uri: &str, block: F) -> ResponseActions<'_>
    where
        F: Fn(&mut MockExpectation<'_>) -> Result<()> + 'static,
    {
        self.mock(count, Some(Method::PUT), Some(uri), block)
    }

    pub fn mock_delete<F>(
        &mut self,
        count: ExpectedCount,
        uri: &str,
        block: F,
    ) -> ResponseActions<'_>
    where
        F: Fn(&mut MockExpectation<'_>) -> Result<()> + 'static,
    {
        self.mock(count, Some(Method::DELETE), Some(uri), block)
    }

    pub fn mock_patch<F>(
        &mut self,
        count: ExpectedCount,
        uri: &str,
        block: F,
    ) -> ResponseActions<'_>
    where
        F: Fn(&mut MockExpectation<'_>) -> Result<()> + 'static,
    {
        self.mock(count, Some(Method::PATCH), Some(uri), block)
    }

    pub(crate) fn register(
        &mut self,
        count: ExpectedCount,
        method: Option<Method>,
        uri: Option<String>,
        block: MockBlock,
    ) -> ResponseActions<'_> {
        let index = self.registrations.len();
        debug!(
            "Registering expectation #{}: {} {} ({:?})",
            index,
            method.as_ref().map_or("*", Method::as_str),
            uri.as_deref().unwrap_or("*"),
            count
        );
        self.registrations.push(Registration {
            count,
            method,
            uri,
            block,
            chained: Vec::new(),
            response: None,
            hits: 0,
        });
        ResponseActions {
            config: &self.config,
            registration: &mut self.registrations[index],
        }
    }

    /// Dispatch a captured request and return the response it earns.
    pub fn exchange(&mut self, request: &CapturedRequest) -> Result<MockResponse> {
        debug!("Dispatching HTTP {} {}", request.method(), request.uri());
        let (registration, outcome) = match self.order {
            ExpectationOrder::Ordered => self.dispatch_ordered(request),
            ExpectationOrder::Unordered => self.dispatch_unordered(request),
        };

        let (state, error) = match (&outcome, registration) {
            (Ok(_), _) => (ExpectationState::Matched, None),
            (Err(e), None) => {
                debug!("{}", e);
                (ExpectationState::Idle, Some(e.clone()))
            }
            (Err(e), Some(index)) => {
                debug!("Expectation #{} rejected HTTP {} {}: {}", index, request.method(), request.uri(), e);
                (ExpectationState::Failed, Some(e.clone()))
            }
        };
        self.log.push(RecordedExchange {
            method: request.method().clone(),
            uri: request.uri().to_string(),
            state,
            registration,
            error,
        });
        outcome
    }

    fn dispatch_ordered(
        &mut self,
        request: &CapturedRequest,
    ) -> (Option<usize>, Result<MockResponse>) {
        while let Some(registration) = self.registrations.get_mut(self.cursor) {
            let index = self.cursor;
            if registration.is_exhausted() {
                self.cursor += 1;
                continue;
            }
            match registration.attempt(request, &self.config) {
                Ok(response) => {
                    registration.hits += 1;
                    debug!("Expectation #{} matched ({} hits)", index, registration.hits);
                    return (Some(index), Ok(response));
                }
                Err(e) if e.is_configuration() => return (Some(index), Err(e)),
                Err(e) if registration.is_satisfied() => {
                    debug!("Expectation #{} satisfied, moving on: {}", index, e);
                    self.cursor += 1;
                }
                Err(e) => return (Some(index), Err(e)),
            }
        }
        (None, Err(unexpected(request)))
    }

    fn dispatch_unordered(
        &mut self,
        request: &CapturedRequest,
    ) -> (Option<usize>, Result<MockResponse>) {
        let mut first_failure: Option<(usize, MockError)> = None;
        for (index, registration) in self.registrations.iter_mut().enumerate() {
            if registration.is_exhausted() {
                continue;
            }
            match registration.attempt(request, &self.config) {
                Ok(response) => {
                    registration.hits += 1;
                    debug!("Expectation #{} matched ({} hits)", index, registration.hits);
                    return (Some(index), Ok(response));
                }
                Err(e) if e.is_configuration() => return (Some(index), Err(e)),
                Err(e) => {
                    first_failure.get_or_insert((index, e));
                }
            }
        }
        match first_failure {
            Some((index, e)) => (Some(index), Err(e)),
            None => (None, Err(unexpected(request))),
        }
    }

    /// Fail if any registration received fewer requests than its minimum.
    pub fn verify(&self) -> Result<()> {
        let unsatisfied = self
            .registrations
            .iter()
            .filter(|r| !r.is_satisfied())
            .count();
        if unsatisfied > 0 {
            return Err(MockError::Verification(format!(
                "Further request(s) expected leaving {} unsatisfied expectation(s).\n{} request(s) executed.",
                unsatisfied,
                self.log.len()
            )));
        }
        info!(
            "All {} expectation(s) satisfied by {} request(s)",
            self.registrations.len(),
            self.log.len()
        );
        Ok(())
    }

    /// Drop all registrations and the request log.
    pub fn reset(&mut self) {
        self.registrations.clear();
        self.cursor = 0;
        self.log.clear();
    }

    pub fn requests(&self) -> &[RecordedExchange] {
        &self.log
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.len()
    }
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new(JsonConfig::default())
    }
}

fn unexpected(request: &CapturedRequest) -> MockError {
    MockError::Unexpected(format!(
        "No further requests expected: HTTP {} {}",
        request.method(),
        request.uri()
    ))
}

/// Attaches checks and a response to a registration after the fact.
pub struct ResponseActions<'s> {
    config: &'s JsonConfig,
    registration: &'s mut Registration,
}

impl ResponseActions<'_> {
    /// Add a check that runs after the registration's block.
    pub fn and_expect<F>(&mut self, check: F) -> &mut Self
    where
        F: Fn(&mut MockExpectation<'_>) -> Result<()> + 'static,
    {
        self.registration.chained.push(Box::new(check));
        self
    }

    /// Respond with `value` serialized to JSON now.
    pub fn respond_json<T: Serialize + ?Sized>(
        &mut self,
        status: StatusCode,
        headers: Option<HeaderMap>,
        value: &T,
    ) -> Result<()> {
        let body = self.config.to_json_bytes(value)?;
        self.and_respond(ResponseSpec::fixed(
            status,
            combine_headers(headers, Some(&MediaType::APPLICATION_JSON)),
            Some(Bytes::from(body)),
        ))
    }

    /// Respond with a status and empty body.
    pub fn respond_status(&mut self, status: StatusCode) -> Result<()> {
        self.and_respond(ResponseSpec::fixed(status, None, None))
    }

    pub fn and_respond(&mut self, spec: ResponseSpec) -> Result<()> {
        if self.registration.response.is_some() {
            return Err(MockError::configuration("Response already set"));
        }
        self.registration.response = Some(spec);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::init_test_logging;
    use serde_json::json;

    fn server() -> MockServer {
        init_test_logging();
        MockServer::default()
    }

    #[test]
    fn test_expected_count_bounds() {
        assert_eq!(ExpectedCount::once().max_count(), Some(1));
        assert_eq!(ExpectedCount::many_times().min_count(), 1);
        assert_eq!(ExpectedCount::many_times().max_count(), None);
        assert_eq!(ExpectedCount::between(5, 2), ExpectedCount::between(2, 5));
        assert!(ExpectedCount::never().is_exhausted_by(0));
        assert!(ExpectedCount::max(2).is_satisfied_by(0));
        assert!(!ExpectedCount::min(2).is_satisfied_by(1));
    }

    #[test]
    fn test_inline_response() {
        let mut server = server();
        server.mock_get(ExpectedCount::once(), "/thing", |exp| {
            exp.respond_json(StatusCode::OK, None, &json!({"ok": true}))
        });

        let response = server.exchange(&CapturedRequest::get("/thing?x=1")).unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body_as_string(), r#"{"ok":true}"#);
        server.verify().unwrap();
    }

    #[test]
    fn test_chained_response() {
        let mut server = server();
        server
            .mock_post(ExpectedCount::once(), "/thing", |exp| exp.request_content("hi"))
            .respond_status(StatusCode::NO_CONTENT)
            .unwrap();

        let response = server
            .exchange(&CapturedRequest::post("/thing").body("hi"))
            .unwrap();
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_chained_checks_run_after_block() {
        let mut server = server().with_order(ExpectationOrder::Unordered);
        server
            .mock_post(ExpectedCount::many_times(), "/thing", |exp| exp.request_content("hi"))
            .and_expect(|exp| exp.header("X-Trace", &["1"]))
            .and_expect(|exp| exp.header_does_not_exist("X-Debug"))
            .respond_status(StatusCode::OK)
            .unwrap();

        let ok = CapturedRequest::post("/thing").header("X-Trace", "1").body("hi");
        assert_eq!(server.exchange(&ok).unwrap().status, StatusCode::OK);

        let err = server
            .exchange(&CapturedRequest::post("/thing").header("X-Trace", "2").body("hi"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Request header [X-Trace] incorrect; expected 1, was 2"
        );

        // The block runs first
        let err = server
            .exchange(&CapturedRequest::post("/thing").header("X-Trace", "2").body("bye"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Request body incorrect");

        let err = server
            .exchange(&ok.clone().header("X-Debug", "on"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Request [X-Debug] header expected not to be present"
        );
        assert_eq!(server.requests()[3].state, ExpectationState::Failed);
    }

    #[test]
    fn test_chained_response_twice() {
        let mut server = server();
        let mut actions = server.mock(ExpectedCount::once(), None, None, |_| Ok(()));
        actions.respond_status(StatusCode::OK).unwrap();
        assert_eq!(
            actions.respond_json(StatusCode::OK, None, &1).unwrap_err(),
            MockError::Configuration("Response already set".to_string())
        );
    }

    #[test]
    fn test_inline_and_chained_conflict() {
        let mut server = server();
        server
            .mock(ExpectedCount::once(), None, None, |exp| {
                exp.respond_text_plain(StatusCode::OK, None, Some("inline"))
            })
            .respond_status(StatusCode::OK)
            .unwrap();
        assert_eq!(
            server.exchange(&CapturedRequest::get("/")).unwrap_err(),
            MockError::Configuration("Response already set".to_string())
        );
    }

    #[test]
    fn test_missing_response() {
        let mut server = server();
        server.mock_get(ExpectedCount::once(), "/x", |_| Ok(()));
        let err = server.exchange(&CapturedRequest::get("/x")).unwrap_err();
        assert_eq!(
            err,
            MockError::Configuration("No response defined for request: HTTP GET /x".to_string())
        );
        assert_eq!(server.requests()[0].state, ExpectationState::Failed);
    }

    #[test]
    fn test_ordered_sequence() {
        let mut server = server();
        server
            .mock_get(ExpectedCount::once(), "/first", |_| Ok(()))
            .respond_status(StatusCode::OK)
            .unwrap();
        server
            .mock_get(ExpectedCount::once(), "/second", |_| Ok(()))
            .respond_status(StatusCode::ACCEPTED)
            .unwrap();

        // Out of order: the unsatisfied first registration reports its mismatch
        let err = server.exchange(&CapturedRequest::get("/second")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Request URI doesn't match; expected /first, was /second"
        );

        assert_eq!(
            server.exchange(&CapturedRequest::get("/first")).unwrap().status,
            StatusCode::OK
        );
        assert_eq!(
            server.exchange(&CapturedRequest::get("/second")).unwrap().status,
            StatusCode::ACCEPTED
        );
        assert_eq!(
            server.exchange(&CapturedRequest::get("/third")).unwrap_err(),
            MockError::Unexpected("No further requests expected: HTTP GET /third".to_string())
        );
        server.verify().unwrap();
        assert_eq!(server.requests()[3].state, ExpectationState::Idle);
        assert_eq!(server.requests()[3].registration, None);
    }

    #[test]
    fn test_ordered_moves_past_satisfied() {
        let mut server = server();
        server
            .mock_get(ExpectedCount::many_times(), "/poll", |_| Ok(()))
            .respond_status(StatusCode::OK)
            .unwrap();
        server
            .mock_get(ExpectedCount::once(), "/done", |_| Ok(()))
            .respond_status(StatusCode::CREATED)
            .unwrap();

        for _ in 0..3 {
            server.exchange(&CapturedRequest::get("/poll")).unwrap();
        }
        assert_eq!(
            server.exchange(&CapturedRequest::get("/done")).unwrap().status,
            StatusCode::CREATED
        );
        assert_eq!(server.requests().len(), 4);
        assert_eq!(server.requests()[3].registration, Some(1));
    }

    #[test]
    fn test_unordered() {
        let mut server = server().with_order(ExpectationOrder::Unordered);
        server
            .mock_get(ExpectedCount::once(), "/a", |_| Ok(()))
            .respond_status(StatusCode::OK)
            .unwrap();
        server
            .mock_get(ExpectedCount::once(), "/b", |_| Ok(()))
            .respond_status(StatusCode::ACCEPTED)
            .unwrap();

        assert_eq!(
            server.exchange(&CapturedRequest::get("/b")).unwrap().status,
            StatusCode::ACCEPTED
        );
        let err = server.exchange(&CapturedRequest::get("/c")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Request URI doesn't match; expected /a, was /c"
        );
        server.exchange(&CapturedRequest::get("/a")).unwrap();
        assert!(matches!(
            server.exchange(&CapturedRequest::get("/a")).unwrap_err(),
            MockError::Unexpected(_)
        ));
    }

    #[test]
    fn test_never_is_skipped() {
        let mut server = server();
        server
            .mock_get(ExpectedCount::never(), "/x", |_| Ok(()))
            .respond_status(StatusCode::OK)
            .unwrap();
        assert!(matches!(
            server.exchange(&CapturedRequest::get("/x")).unwrap_err(),
            MockError::Unexpected(_)
        ));
        server.verify().unwrap();
    }

    #[test]
    fn test_verify_reports_unsatisfied() {
        let mut server = server();
        server
            .mock_get(ExpectedCount::times(2), "/x", |_| Ok(()))
            .respond_status(StatusCode::OK)
            .unwrap();
        server
            .mock_get(ExpectedCount::once(), "/y", |_| Ok(()))
            .respond_status(StatusCode::OK)
            .unwrap();
        server.exchange(&CapturedRequest::get("/x")).unwrap();

        assert_eq!(
            server.verify().unwrap_err().to_string(),
            "Further request(s) expected leaving 2 unsatisfied expectation(s).\n1 request(s) executed."
        );
    }

    #[test]
    fn test_reset() {
        let mut server = server();
        server
            .mock_get(ExpectedCount::once(), "/x", |_| Ok(()))
            .respond_status(StatusCode::OK)
            .unwrap();
        server.exchange(&CapturedRequest::get("/x")).unwrap();

        server.reset();
        assert_eq!(server.registration_count(), 0);
        assert!(server.requests().is_empty());
        server.verify().unwrap();
    }

    #[test]
    fn test_method_preset_checked_first() {
        let mut server = server();
        server
            .mock_get(ExpectedCount::once(), "/x", |_| Ok(()))
            .respond_status(StatusCode::OK)
            .unwrap();
        let err = server.exchange(&CapturedRequest::post("/y")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Request method incorrect; expected GET, was POST"
        );
    }
}
