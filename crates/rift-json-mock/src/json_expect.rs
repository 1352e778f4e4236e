//! Declarative assertions over a JSON document.
//!
//! Expectations are declared against a node and evaluated immediately; the
//! first mismatch is reported as `MockError::Json` carrying the JSON Pointer
//! of the offending node (the root is reported as `/`). Expected values are
//! compared by their plain serde form, so types such as dates and UUIDs match
//! their JSON representation and explicit nulls are kept. Member order is
//! ignored.
//!
//! ```
//! use rift_json_mock::{expect_json, JsonConfig};
//!
//! let body = r#"{"name":"Mary","tags":["a","b"]}"#;
//! expect_json(body, &JsonConfig::default(), |json| {
//!     json.property("name", "Mary")?;
//!     json.array("tags", |tags| {
//!         tags.count(2)?;
//!         tags.item(0, "a")
//!     })
//! })
//! .unwrap();
//! ```

use serde::Serialize;
use serde_json::Value;

use crate::config::JsonConfig;
use crate::error::{MockError, Result};

/// Parse `text` and run `tests` against the root node.
pub fn expect_json<F>(text: &str, config: &JsonConfig, tests: F) -> Result<()>
where
    F: FnOnce(&JsonExpect<'_>) -> Result<()>,
{
    let root = config.parse_value(text)?;
    tests(&JsonExpect::new(&root, config))
}

/// Assertion context positioned at one node of a JSON document.
#[derive(Debug, Clone)]
pub struct JsonExpect<'a> {
    node: &'a Value,
    pointer: String,
    config: &'a JsonConfig,
}

impl<'a> JsonExpect<'a> {
    pub fn new(node: &'a Value, config: &'a JsonConfig) -> Self {
        JsonExpect {
            node,
            pointer: String::new(),
            config,
        }
    }

    pub fn config(&self) -> &'a JsonConfig {
        self.config
    }

    pub fn node(&self) -> &'a Value {
        self.node
    }

    pub fn pointer(&self) -> &str {
        &self.pointer
    }

    fn child(&self, node: &'a Value, pointer: String) -> JsonExpect<'a> {
        JsonExpect {
            node,
            pointer,
            config: self.config,
        }
    }

    fn member_pointer(&self, name: &str) -> String {
        format!(
            "{}/{}",
            self.pointer,
            name.replace('~', "~0").replace('/', "~1")
        )
    }

    fn as_object(&self) -> Result<&'a serde_json::Map<String, Value>> {
        match self.node {
            Value::Object(map) => Ok(map),
            other => Err(type_mismatch(&self.pointer, "object", other)),
        }
    }

    fn as_array(&self) -> Result<&'a Vec<Value>> {
        match self.node {
            Value::Array(items) => Ok(items),
            other => Err(type_mismatch(&self.pointer, "array", other)),
        }
    }

    fn member(&self, name: &str) -> Result<JsonExpect<'a>> {
        let map = self.as_object()?;
        let pointer = self.member_pointer(name);
        match map.get(name) {
            Some(value) => Ok(self.child(value, pointer)),
            None => Err(failure(&pointer, "JSON property missing")),
        }
    }

    fn element(&self, index: usize) -> Result<JsonExpect<'a>> {
        let items = self.as_array()?;
        let pointer = format!("{}/{}", self.pointer, index);
        match items.get(index) {
            Some(value) => Ok(self.child(value, pointer)),
            None => Err(failure(&pointer, "JSON array item missing")),
        }
    }

    /// The current node equals `expected`.
    pub fn value<T: Serialize + ?Sized>(&self, expected: &T) -> Result<()> {
        let expected = serde_json::to_value(expected)?;
        if &expected == self.node {
            Ok(())
        } else {
            Err(failure(
                &self.pointer,
                format!(
                    "JSON value doesn't match - expected {}, was {}",
                    expected, self.node
                ),
            ))
        }
    }

    /// The current node satisfies `test`.
    pub fn matching(&self, test: impl FnOnce(&Value) -> bool) -> Result<()> {
        if test(self.node) {
            Ok(())
        } else {
            Err(failure(
                &self.pointer,
                format!("JSON value doesn't match - was {}", self.node),
            ))
        }
    }

    pub fn property<T: Serialize + ?Sized>(&self, name: &str, expected: &T) -> Result<()> {
        self.member(name)?.value(expected)
    }

    pub fn property_matching(&self, name: &str, test: impl FnOnce(&Value) -> bool) -> Result<()> {
        self.member(name)?.matching(test)
    }

    pub fn property_absent(&self, name: &str) -> Result<()> {
        if self.as_object()?.contains_key(name) {
            return Err(failure(
                &self.member_pointer(name),
                "JSON property expected not to be present",
            ));
        }
        Ok(())
    }

    /// Run nested expectations on an object-valued property.
    pub fn object<F>(&self, name: &str, nested: F) -> Result<()>
    where
        F: FnOnce(&JsonExpect<'_>) -> Result<()>,
    {
        let member = self.member(name)?;
        member.as_object()?;
        nested(&member)
    }

    /// Run nested expectations on an array-valued property.
    pub fn array<F>(&self, name: &str, nested: F) -> Result<()>
    where
        F: FnOnce(&JsonExpect<'_>) -> Result<()>,
    {
        let member = self.member(name)?;
        member.as_array()?;
        nested(&member)
    }

    pub fn item<T: Serialize + ?Sized>(&self, index: usize, expected: &T) -> Result<()> {
        self.element(index)?.value(expected)
    }

    pub fn item_object<F>(&self, index: usize, nested: F) -> Result<()>
    where
        F: FnOnce(&JsonExpect<'_>) -> Result<()>,
    {
        let element = self.element(index)?;
        element.as_object()?;
        nested(&element)
    }

    /// Number of array items or object members.
    pub fn count(&self, expected: usize) -> Result<()> {
        let actual = match self.node {
            Value::Array(items) => items.len(),
            Value::Object(map) => map.len(),
            other => return Err(type_mismatch(&self.pointer, "array", other)),
        };
        if actual == expected {
            Ok(())
        } else {
            Err(failure(
                &self.pointer,
                format!("JSON count doesn't match - expected {expected}, was {actual}"),
            ))
        }
    }
}

fn failure(pointer: &str, message: impl Into<String>) -> MockError {
    let path = if pointer.is_empty() { "/" } else { pointer };
    MockError::json(path, message)
}

fn type_mismatch(pointer: &str, expected: &str, actual: &Value) -> MockError {
    failure(
        pointer,
        format!(
            "JSON type doesn't match - expected {expected}, was {}",
            type_name(actual)
        ),
    )
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    const DOC: &str = r#"{"id":"49c998d4-10da-11ed-886d-0fd84b46e61e","name":"Maria","items":[{"n":1},{"n":2}],"a/b":true,"meta":{"ok":null}}"#;

    fn check<F>(tests: F) -> Result<()>
    where
        F: FnOnce(&JsonExpect<'_>) -> Result<()>,
    {
        expect_json(DOC, &JsonConfig::default(), tests)
    }

    #[test]
    fn test_property_match() {
        check(|json| {
            json.property("name", "Maria")?;
            json.property("a/b", &true)
        })
        .unwrap();
    }

    #[test]
    fn test_property_mismatch_message() {
        let err = check(|json| json.property("name", "Mary")).unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"/name: JSON value doesn't match - expected "Mary", was "Maria""#
        );
    }

    #[test]
    fn test_missing_and_absent() {
        let err = check(|json| json.property("nope", &1)).unwrap_err();
        assert_eq!(err.to_string(), "/nope: JSON property missing");

        check(|json| json.property_absent("nope")).unwrap();
        let err = check(|json| json.property_absent("a/b")).unwrap_err();
        assert_eq!(
            err,
            MockError::json("/a~1b", "JSON property expected not to be present")
        );
    }

    #[test]
    fn test_nested_object_and_array() {
        check(|json| {
            json.array("items", |items| {
                items.count(2)?;
                items.item_object(1, |item| item.property("n", &2))
            })?;
            json.object("meta", |meta| meta.property("ok", &serde_json::Value::Null))
        })
        .unwrap();

        let err = check(|json| json.array("items", |items| items.item_object(0, |i| i.property("n", &5))))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "/items/0/n: JSON value doesn't match - expected 5, was 1"
        );
    }

    #[test]
    fn test_type_mismatch() {
        let err = check(|json| json.object("items", |_| Ok(()))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "/items: JSON type doesn't match - expected object, was array"
        );

        let err = expect_json("[1]", &JsonConfig::default(), |json| json.property("x", &1))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "/: JSON type doesn't match - expected object, was array"
        );
    }

    #[test]
    fn test_matching_predicate() {
        check(|json| json.property_matching("name", |v| v.as_str() == Some("Maria"))).unwrap();
        let err = check(|json| json.property_matching("name", |v| v.is_number())).unwrap_err();
        assert_eq!(err.to_string(), r#"/name: JSON value doesn't match - was "Maria""#);
    }

    #[test]
    fn test_explicit_null_members() {
        let body = r#"{"a":1,"b":null}"#;
        expect_json(body, &JsonConfig::default(), |json| {
            json.value(&serde_json::json!({"b": null, "a": 1}))?;
            json.property("b", &serde_json::Value::Null)
        })
        .unwrap();

        let err = expect_json(body, &JsonConfig::default(), |json| {
            json.value(&serde_json::json!({"a": 1}))
        })
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"/: JSON value doesn't match - expected {"a":1}, was {"a":1,"b":null}"#
        );
    }

    #[test]
    fn test_item_out_of_range() {
        let err = check(|json| json.array("items", |items| items.item(5, &1))).unwrap_err();
        assert_eq!(err.to_string(), "/items/5: JSON array item missing");
    }

    #[test]
    fn test_malformed_document() {
        let err = expect_json("{", &JsonConfig::default(), |_| Ok(())).unwrap_err();
        assert!(matches!(err, MockError::Parse(_)));
    }

    #[derive(Serialize)]
    struct Payload {
        id: String,
        name: String,
        count: u32,
        tags: Vec<String>,
    }

    #[test]
    fn test_round_trip_with_codec() {
        let config = JsonConfig::default();
        let payload = Payload {
            id: "33e6435c-fd05-11ec-9c79-f751c695d36e".to_string(),
            name: "Zebra".to_string(),
            count: 3,
            tags: vec!["x".to_string()],
        };
        let text = config.stringify(&payload).unwrap();
        expect_json(&text, &config, |json| {
            json.property("id", &payload.id)?;
            json.property("name", &payload.name)?;
            json.property("count", &payload.count)?;
            json.property("tags", &payload.tags)?;
            json.value(&payload)
        })
        .unwrap();
    }
}
