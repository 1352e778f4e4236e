//! Reusable predicates for `*_matching` checks.

use uuid::Uuid;

use crate::media_type::MediaType;

/// Canonical hyphenated UUID (`8-4-4-4-12` hex digits), any case.
pub fn is_valid_uuid(value: &str) -> bool {
    value.len() == 36 && Uuid::try_parse(value).is_ok()
}

/// `actual` parses as a media type with the same type and subtype as `expected`.
///
/// Parameters are ignored; unparseable input never matches.
pub fn media_type_matches(actual: &str, expected: &MediaType) -> bool {
    MediaType::parse(actual)
        .map(|mt| mt.equals_type_and_subtype(expected))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_uuid() {
        assert!(is_valid_uuid("49c998d4-10da-11ed-886d-0fd84b46e61e"));
        assert!(is_valid_uuid("49C998D4-10DA-11ED-886D-0FD84B46E61E"));
        assert!(is_valid_uuid(&Uuid::new_v4().to_string()));
    }

    #[test]
    fn test_invalid_uuid() {
        assert!(!is_valid_uuid(""));
        assert!(!is_valid_uuid("49c998d410da11ed886d0fd84b46e61e"));
        assert!(!is_valid_uuid("{49c998d4-10da-11ed-886d-0fd84b46e61e}"));
        assert!(!is_valid_uuid("49c998d4-10da-11ed-886d-0fd84b46e61g"));
        assert!(!is_valid_uuid("49c998d4-10da-11ed-886d0-fd84b46e61e"));
    }

    #[test]
    fn test_media_type_matches() {
        assert!(media_type_matches(
            "application/json;charset=UTF-8",
            &MediaType::APPLICATION_JSON
        ));
        assert!(!media_type_matches("text/plain", &MediaType::APPLICATION_JSON));
        assert!(!media_type_matches("*/*", &MediaType::APPLICATION_JSON));
        assert!(!media_type_matches("nonsense", &MediaType::APPLICATION_JSON));
    }
}
