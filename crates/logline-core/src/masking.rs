//! Redaction of sensitive values before they reach a log line
//!
//! Three independent mechanisms:
//! - field names: any JSON object key matching a configured name (case
//!   insensitive) has its value replaced, wherever it is nested
//! - header names: same rule over a flat header map
//! - patterns: regex substitution over free text (card numbers, emails)
//!
//! Masking is advisory. Input that cannot be parsed is passed through
//! unchanged rather than failing the log call.

use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

/// Default placeholder for masked values
pub const DEFAULT_MASK_VALUE: &str = "***MASKED***";

static CARD_REGEX: OnceLock<Regex> = OnceLock::new();
static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();

fn card_regex() -> &'static Regex {
    CARD_REGEX.get_or_init(|| {
        Regex::new(r"\b(\d{4})[- ]?(\d{4})[- ]?(\d{4})[- ]?(\d{4})\b").unwrap()
    })
}

fn email_regex() -> &'static Regex {
    // The leading group stops a masked domain from being read as a new local part.
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"(^|[^@a-zA-Z0-9._%+-])([a-zA-Z0-9._%+-]+)@([a-zA-Z0-9.-]+\.[a-zA-Z]{2,})")
            .unwrap()
    })
}

/// Case-insensitive set of names to mask
#[derive(Clone, Debug, Default)]
pub struct NameSet {
    names: HashSet<String>,
}

impl NameSet {
    /// Build a set from configured names
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Whether `name` matches any entry, ignoring case
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&name.to_lowercase())
    }

    /// Whether the set has no entries
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A regex substitution applied to free text
#[derive(Clone, Debug)]
pub struct MaskPattern {
    regex: Regex,
    replacement: String,
}

impl MaskPattern {
    /// Create a pattern from a compiled regex and its replacement
    ///
    /// The replacement may reference capture groups (`$1`).
    pub fn new(regex: Regex, replacement: impl Into<String>) -> Self {
        Self {
            regex,
            replacement: replacement.into(),
        }
    }

    /// Payment-card-like 16 digit runs; keeps the first and last group
    pub fn credit_card() -> Self {
        Self::new(card_regex().clone(), "$1-****-****-$4")
    }

    /// Email addresses; keeps the domain
    pub fn email() -> Self {
        Self::new(email_regex().clone(), "${1}***@$3")
    }

    /// The built-in pattern set
    pub fn defaults() -> Vec<Self> {
        vec![Self::credit_card(), Self::email()]
    }

    /// Apply this pattern to `text`
    pub fn apply(&self, text: &str) -> String {
        self.regex
            .replace_all(text, self.replacement.as_str())
            .into_owned()
    }

    /// Whether `text` contains a match
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Replace the value of every key in `field_names` within `value`
///
/// Returns a masked copy; see [`mask_fields_in_place`].
pub fn mask_fields<S: AsRef<str>>(value: &Value, field_names: &[S], mask_value: &str) -> Value {
    let mut masked = value.clone();
    mask_fields_in_place(&mut masked, &NameSet::new(field_names), mask_value);
    masked
}

/// Recursively mask matching keys of objects, descending into arrays
///
/// A matching key has its value replaced whatever its type, and its subtree
/// is not visited further. Everything else keeps its shape.
pub fn mask_fields_in_place(value: &mut Value, fields: &NameSet, mask_value: &str) {
    if fields.is_empty() {
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if fields.contains(key) {
                    *child = Value::String(mask_value.to_string());
                } else {
                    mask_fields_in_place(child, fields, mask_value);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                mask_fields_in_place(item, fields, mask_value);
            }
        }
        _ => {}
    }
}

/// Mask fields inside a JSON document held as text
///
/// Blank or non-JSON input is returned as-is.
pub fn mask_json_str<S: AsRef<str>>(json: &str, field_names: &[S], mask_value: &str) -> String {
    if json.trim().is_empty() {
        return json.to_string();
    }
    match serde_json::from_str::<Value>(json) {
        Ok(mut value) => {
            mask_fields_in_place(&mut value, &NameSet::new(field_names), mask_value);
            serde_json::to_string(&value).unwrap_or_else(|_| json.to_string())
        }
        Err(_) => json.to_string(),
    }
}

/// Mask header values whose names are listed in `header_names`
pub fn mask_headers<S: AsRef<str>>(
    headers: &BTreeMap<String, String>,
    header_names: &[S],
    mask_value: &str,
) -> BTreeMap<String, String> {
    let names = NameSet::new(header_names);
    headers
        .iter()
        .map(|(name, value)| {
            let value = if names.contains(name) {
                mask_value.to_string()
            } else {
                value.clone()
            };
            (name.clone(), value)
        })
        .collect()
}

/// Regex substitution over free text
///
/// `None` input stays `None`. Returns an error only when `pattern` does not
/// compile.
pub fn mask_pattern(
    input: Option<&str>,
    pattern: &str,
    replacement: &str,
) -> Result<Option<String>, regex::Error> {
    let regex = Regex::new(pattern)?;
    Ok(input.map(|text| regex.replace_all(text, replacement).into_owned()))
}

/// Mask 16 digit card numbers, keeping the first and last four digits
pub fn mask_credit_card(input: &str) -> String {
    MaskPattern::credit_card().apply(input)
}

/// Mask the local part of email addresses
pub fn mask_email(input: &str) -> String {
    MaskPattern::email().apply(input)
}

/// Pre-built masking rules shared by every logger of a configuration
#[derive(Clone, Debug)]
pub struct MaskingEngine {
    fields: NameSet,
    headers: NameSet,
    mask_value: String,
    patterns: Vec<MaskPattern>,
}

impl Default for MaskingEngine {
    fn default() -> Self {
        Self::new(
            Vec::<String>::new(),
            Vec::<String>::new(),
            DEFAULT_MASK_VALUE,
            MaskPattern::defaults(),
        )
    }
}

impl MaskingEngine {
    /// Create an engine from field names, header names, placeholder and patterns
    pub fn new<F, H, S, T>(
        fields: F,
        headers: H,
        mask_value: impl Into<String>,
        patterns: Vec<MaskPattern>,
    ) -> Self
    where
        F: IntoIterator<Item = S>,
        S: AsRef<str>,
        H: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self {
            fields: NameSet::new(fields),
            headers: NameSet::new(headers),
            mask_value: mask_value.into(),
            patterns,
        }
    }

    /// The placeholder written in place of masked values
    pub fn mask_value(&self) -> &str {
        &self.mask_value
    }

    /// Whether `name` is a masked body field
    pub fn is_masked_field(&self, name: &str) -> bool {
        self.fields.contains(name)
    }

    /// Whether `name` is a masked header
    pub fn is_masked_header(&self, name: &str) -> bool {
        self.headers.contains(name)
    }

    /// Mask a structured payload; `None` stays `None`
    pub fn mask_value_tree(&self, value: Option<Value>) -> Option<Value> {
        value.map(|mut v| {
            mask_fields_in_place(&mut v, &self.fields, &self.mask_value);
            self.mask_string_leaves(&mut v);
            v
        })
    }

    /// Mask a header map in place
    pub fn mask_header_map(&self, headers: &mut BTreeMap<String, String>) {
        for (name, value) in headers.iter_mut() {
            if self.headers.contains(name) {
                *value = self.mask_value.clone();
            }
        }
    }

    /// Apply every pattern to free text
    pub fn mask_text(&self, text: &str) -> String {
        self.patterns
            .iter()
            .fold(text.to_string(), |acc, pattern| pattern.apply(&acc))
    }

    /// Mask a body held as text
    ///
    /// JSON bodies are masked by field name and have their string leaves run
    /// through the patterns; anything else only gets the patterns.
    pub fn mask_body_text(&self, body: &str) -> MaskedBody {
        match serde_json::from_str::<Value>(body) {
            Ok(value) if value.is_object() || value.is_array() => {
                match self.mask_value_tree(Some(value)) {
                    Some(masked) => MaskedBody::Json(masked),
                    None => MaskedBody::Text(self.mask_text(body)),
                }
            }
            _ => MaskedBody::Text(self.mask_text(body)),
        }
    }

    fn mask_string_leaves(&self, value: &mut Value) {
        if self.patterns.is_empty() {
            return;
        }
        match value {
            Value::String(s) => {
                if self.patterns.iter().any(|p| p.is_match(s)) {
                    *s = self.mask_text(s);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.mask_string_leaves(item);
                }
            }
            Value::Object(map) => {
                for (_, child) in map.iter_mut() {
                    self.mask_string_leaves(child);
                }
            }
            _ => {}
        }
    }
}

/// Result of masking a textual body
#[derive(Clone, Debug, PartialEq)]
pub enum MaskedBody {
    /// The body parsed as a JSON object or array
    Json(Value),
    /// The body is kept as text
    Text(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_masks_json_fields() {
        let json = r#"{"username": "john", "password": "secret123", "email": "john@example.com"}"#;
        let masked = mask_json_str(json, &["password"], "***");

        assert!(masked.contains(r#""password":"***""#));
        assert!(masked.contains(r#""username":"john""#));
    }

    #[test]
    fn test_masks_nested_fields() {
        let value = json!({
            "user": {
                "name": "john",
                "credentials": { "password": "secret123" }
            }
        });
        let masked = mask_fields(&value, &["password"], "***");

        assert_eq!(masked["user"]["credentials"]["password"], "***");
        assert_eq!(masked["user"]["name"], "john");
    }

    #[test]
    fn test_masks_inside_arrays() {
        let value = json!({
            "items": [{"token": "a"}, {"token": "b", "id": 2}, 7]
        });
        let masked = mask_fields(&value, &["token"], "***");

        assert_eq!(masked["items"][0]["token"], "***");
        assert_eq!(masked["items"][1]["token"], "***");
        assert_eq!(masked["items"][1]["id"], 2);
        assert_eq!(masked["items"][2], 7);
    }

    #[test]
    fn test_masks_non_string_values() {
        let value = json!({"ssn": 123456789, "secret": {"nested": true}});
        let masked = mask_fields(&value, &["ssn", "secret"], "***");

        assert_eq!(masked["ssn"], "***");
        assert_eq!(masked["secret"], "***");
    }

    #[test]
    fn test_is_case_insensitive() {
        let json = r#"{"PASSWORD": "secret1", "Password": "secret2", "password": "secret3"}"#;
        let masked = mask_json_str(json, &["password"], "***");

        assert!(masked.contains(r#""PASSWORD":"***""#));
        assert!(masked.contains(r#""Password":"***""#));
        assert!(masked.contains(r#""password":"***""#));
    }

    #[test]
    fn test_handles_blank_and_invalid_input() {
        assert_eq!(mask_json_str("", &["password"], "***"), "");
        assert_eq!(mask_json_str("not json", &["password"], "***"), "not json");
    }

    #[test]
    fn test_null_and_empty_rules_are_no_ops() {
        assert_eq!(mask_fields(&Value::Null, &["password"], "***"), Value::Null);

        let value = json!({"password": "x"});
        let none: [&str; 0] = [];
        assert_eq!(mask_fields(&value, &none, "***"), value);

        let engine = MaskingEngine::default();
        assert_eq!(engine.mask_value_tree(None), None);
    }

    #[test]
    fn test_mask_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), "Bearer xyz".to_string());
        headers.insert("content-type".to_string(), "application/json".to_string());

        let masked = mask_headers(&headers, &["authorization"], DEFAULT_MASK_VALUE);
        assert_eq!(masked["Authorization"], DEFAULT_MASK_VALUE);
        assert_eq!(masked["content-type"], "application/json");
    }

    #[test]
    fn test_masks_credit_card() {
        assert_eq!(
            mask_credit_card("Card: 1234-5678-9012-3456"),
            "Card: 1234-****-****-3456"
        );
        assert_eq!(
            mask_credit_card("Card: 1234567890123456"),
            "Card: 1234-****-****-3456"
        );
    }

    #[test]
    fn test_masks_email() {
        assert_eq!(
            mask_email("Contact: john.doe@example.com"),
            "Contact: ***@example.com"
        );
    }

    #[test]
    fn test_chained_addresses_mask_once() {
        let once = mask_email("a@b.cd@e.fg");
        assert_eq!(once, "***@b.cd@e.fg");
        assert_eq!(mask_email(&once), once);
        assert_eq!(mask_email("x@y.io, z@w.io"), "***@y.io, ***@w.io");
    }

    #[test]
    fn test_mask_pattern() {
        let out = mask_pattern(Some("order 42 of 99"), r"\d+", "#").unwrap();
        assert_eq!(out.as_deref(), Some("order # of #"));
        assert_eq!(mask_pattern(None, r"\d+", "#").unwrap(), None);
        assert!(mask_pattern(Some("x"), "(", "#").is_err());
    }

    #[test]
    fn test_engine_masks_body_text() {
        let engine = MaskingEngine::new(
            ["password"],
            ["authorization"],
            DEFAULT_MASK_VALUE,
            MaskPattern::defaults(),
        );

        let body = engine.mask_body_text(r#"{"password":"p","contact":"a@b.io"}"#);
        assert_eq!(
            body,
            MaskedBody::Json(json!({"password": DEFAULT_MASK_VALUE, "contact": "***@b.io"}))
        );

        let body = engine.mask_body_text("card 1234 5678 9012 3456");
        assert_eq!(body, MaskedBody::Text("card 1234-****-****-3456".to_string()));

        // Scalars are not treated as structured payloads
        let body = engine.mask_body_text("42");
        assert_eq!(body, MaskedBody::Text("42".to_string()));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn json_strategy() -> impl Strategy<Value = Value> {
            let leaf = prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i64>().prop_map(|n| json!(n)),
                "[a-z0-9@. -]{0,12}".prop_map(Value::String),
            ];
            leaf.prop_recursive(4, 32, 6, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..5).prop_map(Value::Array),
                    prop::collection::btree_map(
                        prop_oneof![
                            Just("password".to_string()),
                            Just("PASSWORD".to_string()),
                            Just("Token".to_string()),
                            "[a-z]{1,6}",
                        ],
                        inner,
                        0..5
                    )
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
                ]
            })
        }

        fn same_shape(a: &Value, b: &Value, fields: &NameSet) -> bool {
            match (a, b) {
                (Value::Object(x), Value::Object(y)) => {
                    x.len() == y.len()
                        && x.iter().all(|(k, v)| match y.get(k) {
                            Some(w) if fields.contains(k) => w.is_string(),
                            Some(w) => same_shape(v, w, fields),
                            None => false,
                        })
                }
                (Value::Array(x), Value::Array(y)) => {
                    x.len() == y.len()
                        && x.iter().zip(y).all(|(v, w)| same_shape(v, w, fields))
                }
                (x, y) => x == y,
            }
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(200))]

            #[test]
            fn prop_masking_is_idempotent(value in json_strategy()) {
                let engine = MaskingEngine::new(
                    ["password", "token"],
                    ["authorization"],
                    DEFAULT_MASK_VALUE,
                    MaskPattern::defaults(),
                );
                let once = engine.mask_value_tree(Some(value)).unwrap();
                let twice = engine.mask_value_tree(Some(once.clone())).unwrap();
                prop_assert_eq!(once, twice);
            }

            #[test]
            fn prop_masking_preserves_structure(value in json_strategy()) {
                let fields = NameSet::new(["password", "token"]);
                let mut masked = value.clone();
                mask_fields_in_place(&mut masked, &fields, DEFAULT_MASK_VALUE);
                prop_assert!(same_shape(&value, &masked, &fields));
            }

            #[test]
            fn prop_case_variants_are_masked(upper in prop::collection::vec(any::<bool>(), 8)) {
                let name: String = "password"
                    .chars()
                    .zip(upper)
                    .map(|(c, up)| if up { c.to_ascii_uppercase() } else { c })
                    .collect();
                let mut map = serde_json::Map::new();
                map.insert(name.clone(), json!("hunter2"));
                let masked = mask_fields(&Value::Object(map), &["password"], "***");
                prop_assert_eq!(&masked[name.as_str()], "***");
            }

            #[test]
            fn prop_pattern_masking_is_idempotent(text in "[a-z0-9@. -]{0,24}") {
                let engine = MaskingEngine::default();
                let once = engine.mask_text(&text);
                prop_assert_eq!(engine.mask_text(&once), once);
            }
        }
    }
}
