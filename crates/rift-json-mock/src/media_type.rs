//! Media type parsing and compatibility.
//!
//! Parsing is delegated to `mime`. Compatibility follows the usual HTTP
//! content-negotiation rule: type and subtype must be equal, except that a
//! `*` on either side matches anything, and a `*+suffix` subtype matches any
//! subtype carrying that suffix (or equal to it). Parameters such as
//! `charset` are ignored.

use std::fmt;
use std::str::FromStr;

use mime::Mime;

use crate::error::{MockError, Result};

/// A parsed `type/subtype` media type with optional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType(Mime);

impl MediaType {
    pub const APPLICATION_JSON: MediaType = MediaType(mime::APPLICATION_JSON);
    pub const TEXT_PLAIN: MediaType = MediaType(mime::TEXT_PLAIN);
    pub const ALL: MediaType = MediaType(mime::STAR_STAR);

    /// Parse a media type. Whitespace around `;` separators is allowed.
    pub fn parse(value: &str) -> Result<Self> {
        value
            .split(';')
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(";")
            .parse::<Mime>()
            .map(MediaType)
            .map_err(|_| MockError::parse(format!("Invalid media type: {value}")))
    }

    pub fn type_(&self) -> &str {
        self.0.type_().as_str()
    }

    /// Subtype including any `+suffix`.
    pub fn subtype(&self) -> String {
        match self.0.suffix() {
            Some(suffix) => format!("{}+{}", self.0.subtype(), suffix),
            None => self.0.subtype().to_string(),
        }
    }

    pub fn suffix(&self) -> Option<&str> {
        self.0.suffix().map(|s| s.as_str())
    }

    /// `type/subtype` without parameters.
    pub fn essence(&self) -> &str {
        self.0.essence_str()
    }

    pub fn is_wildcard_type(&self) -> bool {
        self.0.type_() == mime::STAR
    }

    /// `*` or `*+suffix`.
    pub fn is_wildcard_subtype(&self) -> bool {
        self.0.subtype() == mime::STAR
    }

    /// Type and subtype are equal; parameters are ignored.
    pub fn equals_type_and_subtype(&self, other: &MediaType) -> bool {
        self.essence().eq_ignore_ascii_case(other.essence())
    }

    pub fn is_compatible_with(&self, other: &MediaType) -> bool {
        if self.is_wildcard_type() || other.is_wildcard_type() {
            return true;
        }
        if !self.type_().eq_ignore_ascii_case(other.type_()) {
            return false;
        }

        let this_subtype = self.subtype();
        let other_subtype = other.subtype();
        if this_subtype.eq_ignore_ascii_case(&other_subtype) {
            return true;
        }
        if !self.is_wildcard_subtype() && !other.is_wildcard_subtype() {
            return false;
        }
        if this_subtype == "*" || other_subtype == "*" {
            return true;
        }

        let this_suffix = self.suffix();
        let other_suffix = other.suffix();
        if self.is_wildcard_subtype() {
            if let Some(suffix) = this_suffix {
                return suffix.eq_ignore_ascii_case(&other_subtype) || this_suffix == other_suffix;
            }
        }
        if other.is_wildcard_subtype() {
            if let Some(suffix) = other_suffix {
                return suffix.eq_ignore_ascii_case(&this_subtype) || this_suffix == other_suffix;
            }
        }
        false
    }
}

impl FromStr for MediaType {
    type Err = MockError;

    fn from_str(s: &str) -> Result<Self> {
        MediaType::parse(s)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl AsRef<str> for MediaType {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}
