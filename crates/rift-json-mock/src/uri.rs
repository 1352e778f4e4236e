//! URI component splitting and query-string decoding.
//!
//! URIs are kept as raw strings and split with the RFC 3986 appendix B
//! expression, so relative (`/path?x=1`), absolute and opaque (`mailto:...`)
//! forms are all accepted. No percent-decoding happens here.

use std::sync::OnceLock;

use regex::Regex;

static URI_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_uri_regex() -> &'static Regex {
    URI_REGEX.get_or_init(|| {
        Regex::new(r"^(?:([^:/?#]+):)?(?://([^/?#]*))?([^?#]*)(?:\?([^#]*))?(?:#(.*))?$")
            .unwrap()
    })
}

/// Borrowed components of a raw URI string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UriParts<'a> {
    raw: &'a str,
    pub scheme: Option<&'a str>,
    pub authority: Option<&'a str>,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub fragment: Option<&'a str>,
}

impl<'a> UriParts<'a> {
    pub fn parse(raw: &'a str) -> Self {
        let Some(caps) = get_uri_regex().captures(raw) else {
            return UriParts {
                raw,
                path: raw,
                ..Default::default()
            };
        };
        UriParts {
            raw,
            scheme: caps.get(1).map(|m| m.as_str()),
            authority: caps.get(2).map(|m| m.as_str()),
            path: caps.get(3).map_or("", |m| m.as_str()),
            query: caps.get(4).map(|m| m.as_str()),
            fragment: caps.get(5).map(|m| m.as_str()),
        }
    }

    /// Absolute URI whose scheme-specific part does not start with `/`.
    pub fn is_opaque(&self) -> bool {
        self.scheme.is_some() && self.authority.is_none() && !self.path.starts_with('/')
    }

    /// Everything between `scheme:` and the fragment.
    pub fn scheme_specific_part(&self) -> &'a str {
        let without_fragment = match self.raw.find('#') {
            Some(i) => &self.raw[..i],
            None => self.raw,
        };
        match self.scheme {
            Some(scheme) => &without_fragment[scheme.len() + 1..],
            None => without_fragment,
        }
    }

    pub fn user_info(&self) -> Option<&'a str> {
        self.authority
            .and_then(|a| a.rfind('@').map(|i| &a[..i]))
    }

    fn host_and_port(&self) -> Option<&'a str> {
        self.authority.map(|a| match a.rfind('@') {
            Some(i) => &a[i + 1..],
            None => a,
        })
    }

    pub fn host(&self) -> Option<&'a str> {
        let host_port = self.host_and_port()?;
        let host = if host_port.starts_with('[') {
            match host_port.find(']') {
                Some(end) => &host_port[..=end],
                None => host_port,
            }
        } else {
            match host_port.rfind(':') {
                Some(i) => &host_port[..i],
                None => host_port,
            }
        };
        Some(host).filter(|h| !h.is_empty())
    }

    pub fn port(&self) -> Option<&'a str> {
        let host_port = self.host_and_port()?;
        let after_host = match host_port.find(']') {
            Some(end) if host_port.starts_with('[') => &host_port[end + 1..],
            _ => host_port,
        };
        after_host
            .rfind(':')
            .map(|i| &after_host[i + 1..])
            .filter(|p| !p.is_empty())
    }
}

/// Compare two URIs on scheme, user-info, host, port and path.
///
/// The query component is excluded. Opaque URIs compare only their
/// scheme-specific part.
pub fn equal_ignoring_query(actual: &str, expected: &str) -> bool {
    let a = UriParts::parse(actual);
    let e = UriParts::parse(expected);
    if a.is_opaque() {
        return e.is_opaque() && a.scheme_specific_part() == e.scheme_specific_part();
    }
    !e.is_opaque()
        && a.scheme == e.scheme
        && a.user_info() == e.user_info()
        && a.host() == e.host()
        && a.port() == e.port()
        && a.path == e.path
}

/// Raw (undecoded) query component, if the URI has one.
pub fn raw_query(uri: &str) -> Option<&str> {
    let parts = UriParts::parse(uri);
    if parts.is_opaque() {
        return None;
    }
    parts.query
}

/// Decoded query parameters, ordered by first occurrence of each name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    entries: Vec<(String, Vec<Option<String>>)>,
}

impl QueryParams {
    /// Split a raw query string.
    ///
    /// Tokens are separated by `&` and split once on their first `=`. A
    /// token without `=` is a key with a `None` value. Keys and values are
    /// trimmed; nothing is percent-decoded and no token is dropped.
    pub fn parse(query: &str) -> Self {
        let mut params = QueryParams::default();
        for token in query.split('&') {
            match token.split_once('=') {
                Some((key, value)) => params.append(key.trim(), Some(value.trim().to_string())),
                None => params.append(token.trim(), None),
            }
        }
        params
    }

    pub fn from_uri(uri: &str) -> Self {
        raw_query(uri).map(Self::parse).unwrap_or_default()
    }

    fn append(&mut self, key: &str, value: Option<String>) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key.to_string(), vec![value])),
        }
    }

    pub fn get(&self, name: &str) -> Option<&[Option<String>]> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == name)
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Option<String>])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}
