//! Response descriptors and materialized mock responses.

use std::fmt;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{HeaderMap, Response, StatusCode};

use crate::config::JsonConfig;
use crate::error::{MockError, Result};
use crate::media_type::MediaType;
use crate::request::{CapturedRequest, RequestView};

/// Produces a response body from the request being answered.
///
/// Returning `Ok(None)` yields an empty body.
pub type BodyGenerator = Box<dyn Fn(&RequestView<'_>) -> Result<Option<Vec<u8>>>>;

/// Where a response body comes from.
pub enum BodySource {
    Empty,
    Fixed(Bytes),
    Generated(BodyGenerator),
}

impl fmt::Debug for BodySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodySource::Empty => f.write_str("Empty"),
            BodySource::Fixed(bytes) => f.debug_tuple("Fixed").field(bytes).finish(),
            BodySource::Generated(_) => f.write_str("Generated(..)"),
        }
    }
}

/// Response definition attached to an expectation.
#[derive(Debug)]
pub struct ResponseSpec {
    status: StatusCode,
    headers: Option<HeaderMap>,
    body: BodySource,
}

impl ResponseSpec {
    /// Build a response from optional body sources; at most one may be given.
    pub fn new(
        status: StatusCode,
        headers: Option<HeaderMap>,
        body: Option<Bytes>,
        generator: Option<BodyGenerator>,
    ) -> Result<Self> {
        let body = match (body, generator) {
            (Some(_), Some(_)) => {
                return Err(MockError::configuration(
                    "Response body and generator may not both be specified",
                ))
            }
            (Some(bytes), None) => BodySource::Fixed(bytes),
            (None, Some(generator)) => BodySource::Generated(generator),
            (None, None) => BodySource::Empty,
        };
        Ok(ResponseSpec {
            status,
            headers,
            body,
        })
    }

    pub fn fixed(status: StatusCode, headers: Option<HeaderMap>, body: Option<Bytes>) -> Self {
        ResponseSpec {
            status,
            headers,
            body: body.map_or(BodySource::Empty, BodySource::Fixed),
        }
    }

    pub fn generated(
        status: StatusCode,
        headers: Option<HeaderMap>,
        generator: BodyGenerator,
    ) -> Self {
        ResponseSpec {
            status,
            headers,
            body: BodySource::Generated(generator),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> Option<&HeaderMap> {
        self.headers.as_ref()
    }

    pub fn body_source(&self) -> &BodySource {
        &self.body
    }

    /// Compute the body; generators get a fresh view over `request`.
    pub fn body_for(&self, request: &CapturedRequest, config: &JsonConfig) -> Result<Bytes> {
        match &self.body {
            BodySource::Empty => Ok(Bytes::new()),
            BodySource::Fixed(bytes) => Ok(bytes.clone()),
            BodySource::Generated(generator) => {
                let view = RequestView::new(request, config);
                Ok(generator(&view)?.map(Bytes::from).unwrap_or_default())
            }
        }
    }

    pub fn materialize(&self, request: &CapturedRequest, config: &JsonConfig) -> Result<MockResponse> {
        Ok(MockResponse {
            status: self.status,
            headers: self.headers.clone().unwrap_or_default(),
            body: self.body_for(request, config)?,
        })
    }
}

/// Status, headers and body handed back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl MockResponse {
    pub fn body_as_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    /// Convert into a `hyper` response with a full body.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        response.headers_mut().extend(self.headers);
        response
    }
}

/// Merge an optional forced content type into optional headers.
///
/// Without a content type the headers pass through unchanged.
pub fn combine_headers(
    headers: Option<HeaderMap>,
    content_type: Option<&MediaType>,
) -> Option<HeaderMap> {
    let Some(content_type) = content_type else {
        return headers;
    };
    let mut combined = headers.unwrap_or_default();
    if let Ok(value) = HeaderValue::from_str(content_type.as_ref()) {
        combined.insert(CONTENT_TYPE, value);
    }
    Some(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::Method;

    fn request() -> CapturedRequest {
        CapturedRequest::new(Method::GET, "/endpoint?it=works")
    }

    #[test]
    fn test_new_rejects_both_sources() {
        let generator: BodyGenerator = Box::new(|_: &RequestView<'_>| Ok(None));
        let err = ResponseSpec::new(
            StatusCode::OK,
            None,
            Some(Bytes::from_static(b"x")),
            Some(generator),
        )
        .unwrap_err();
        assert_eq!(
            err,
            MockError::Configuration(
                "Response body and generator may not both be specified".to_string()
            )
        );
    }

    #[test]
    fn test_neither_source_gives_empty_body() {
        let spec = ResponseSpec::new(StatusCode::CREATED, None, None, None).unwrap();
        let response = spec.materialize(&request(), &JsonConfig::default()).unwrap();
        assert_eq!(response.status, StatusCode::CREATED);
        assert!(response.body.is_empty());
        assert!(response.headers.is_empty());
    }

    #[test]
    fn test_generator_sees_request() {
        let spec = ResponseSpec::generated(
            StatusCode::OK,
            None,
            Box::new(|req: &RequestView<'_>| Ok(req.get_param("it")?.map(|s| s.as_bytes().to_vec()))),
        );
        let response = spec.materialize(&request(), &JsonConfig::default()).unwrap();
        assert_eq!(response.body_as_string(), "works");
    }

    #[test]
    fn test_generator_none_and_error() {
        let empty = ResponseSpec::generated(StatusCode::OK, None, Box::new(|_: &RequestView<'_>| Ok(None)));
        assert!(empty
            .body_for(&request(), &JsonConfig::default())
            .unwrap()
            .is_empty());

        let failing = ResponseSpec::generated(
            StatusCode::OK,
            None,
            Box::new(|_: &RequestView<'_>| Err(MockError::mismatch("boom"))),
        );
        assert_eq!(
            failing.body_for(&request(), &JsonConfig::default()).unwrap_err(),
            MockError::Mismatch("boom".to_string())
        );
    }

    #[test]
    fn test_combine_headers() {
        assert!(combine_headers(None, None).is_none());

        let mut headers = HeaderMap::new();
        headers.insert("x-custom", HeaderValue::from_static("1"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));

        let passthrough = combine_headers(Some(headers.clone()), None).unwrap();
        assert_eq!(passthrough, headers);

        let combined = combine_headers(Some(headers), Some(&MediaType::APPLICATION_JSON)).unwrap();
        assert_eq!(combined.get("x-custom").unwrap(), "1");
        assert_eq!(combined.get_all(CONTENT_TYPE).iter().count(), 1);
        assert_eq!(combined.get(CONTENT_TYPE).unwrap(), "application/json");

        let only_type = combine_headers(None, Some(&MediaType::TEXT_PLAIN)).unwrap();
        assert_eq!(only_type.get(CONTENT_TYPE).unwrap(), "text/plain");
    }

    #[test]
    fn test_into_response() {
        let response = MockResponse {
            status: StatusCode::ACCEPTED,
            headers: combine_headers(None, Some(&MediaType::TEXT_PLAIN)).unwrap(),
            body: Bytes::from_static(b"ok"),
        };
        let http = response.into_response();
        assert_eq!(http.status(), StatusCode::ACCEPTED);
        assert_eq!(http.headers().get(CONTENT_TYPE).unwrap(), "text/plain");
    }
}
