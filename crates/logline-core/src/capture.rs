//! Bounded capture of HTTP headers and bodies
//!
//! Captured data is masked first and truncated second, so a secret near the
//! end of a long body never survives because truncation broke the JSON it
//! lived in.

use crate::masking::{MaskedBody, MaskingEngine};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Marker appended to a truncated body
pub const TRUNCATION_MARKER: &str = "... [TRUNCATED]";

/// Default maximum captured body size, in characters
pub const DEFAULT_MAX_BODY_SIZE: usize = 10_240;

/// Captured body content
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CapturedBody {
    /// A JSON object or array that fit within the size limit
    Json(Value),
    /// Any other body, or a JSON body that had to be truncated
    Text(String),
}

/// Decode `bytes` as UTF-8 and bound the result to `max_chars` characters
///
/// Invalid sequences are replaced rather than rejected. Returns `None` for an
/// empty body.
pub fn capture_text(bytes: &[u8], max_chars: usize) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    Some(truncate(&text, max_chars))
}

/// Truncate `text` to exactly `max_chars` characters plus the marker
///
/// Text that already fits is returned unchanged.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + TRUNCATION_MARKER.len());
            out.push_str(&text[..cut]);
            out.push_str(TRUNCATION_MARKER);
            out
        }
        None => text.to_string(),
    }
}

/// Decode, mask and bound a raw body
///
/// A JSON object or array body is masked by field name and kept structured as
/// long as its re-serialized form fits in `max_chars`; otherwise the masked
/// text is truncated. Empty bodies yield `None`.
pub fn capture_body(bytes: &[u8], max_chars: usize, masking: &MaskingEngine) -> Option<CapturedBody> {
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    if text.trim().is_empty() {
        return None;
    }
    let body = match masking.mask_body_text(&text) {
        MaskedBody::Json(value) => {
            let rendered = value.to_string();
            if rendered.chars().count() <= max_chars {
                CapturedBody::Json(value)
            } else {
                CapturedBody::Text(truncate(&rendered, max_chars))
            }
        }
        MaskedBody::Text(masked) => CapturedBody::Text(truncate(&masked, max_chars)),
    };
    Some(body)
}

/// Flatten header pairs into a map, joining repeated names with `", "`
pub fn capture_headers<'a, I>(headers: I, masking: &MaskingEngine) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        map.entry(name.to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    masking.mask_header_map(&mut map);
    map
}

/// Captured request data, rendered as `request_body`
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RequestInfo {
    /// Request headers, masked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    /// Decoded query string parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_params: Option<BTreeMap<String, String>>,
    /// Request body, masked and truncated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<CapturedBody>,
    /// Content-Type header value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Body length in bytes as received
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
}

impl RequestInfo {
    /// Create a new builder
    pub fn builder() -> RequestInfoBuilder {
        RequestInfoBuilder::default()
    }

    /// Whether nothing was captured
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Builder for RequestInfo
#[derive(Default)]
pub struct RequestInfoBuilder {
    info: RequestInfo,
}

impl RequestInfoBuilder {
    /// Set the captured headers
    pub fn headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.info.headers = Some(headers);
        self
    }

    /// Parse and set query parameters from a raw query string
    pub fn query(mut self, query: &str) -> Self {
        let params = parse_query(query);
        if !params.is_empty() {
            self.info.query_params = Some(params);
        }
        self
    }

    /// Set the captured body, ignoring `None`
    pub fn body(mut self, body: Option<CapturedBody>) -> Self {
        if let Some(body) = body {
            self.info.body = Some(body);
        }
        self
    }

    /// Set the content type
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.info.content_type = Some(content_type.into());
        self
    }

    /// Set the content length; zero is left out
    pub fn content_length(mut self, length: u64) -> Self {
        if length > 0 {
            self.info.content_length = Some(length);
        }
        self
    }

    /// Freeze the captured data
    pub fn build(self) -> RequestInfo {
        self.info
    }
}

/// Captured response data, rendered as `response_body`
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ResponseInfo {
    /// Response headers, masked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    /// Response body, masked and truncated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<CapturedBody>,
    /// Content-Type header value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Body length in bytes as sent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
}

impl ResponseInfo {
    /// Create a new builder
    pub fn builder() -> ResponseInfoBuilder {
        ResponseInfoBuilder::default()
    }

    /// Whether nothing was captured
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Builder for ResponseInfo
#[derive(Default)]
pub struct ResponseInfoBuilder {
    info: ResponseInfo,
}

impl ResponseInfoBuilder {
    /// Set the captured headers
    pub fn headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.info.headers = Some(headers);
        self
    }

    /// Set the captured body, ignoring `None`
    pub fn body(mut self, body: Option<CapturedBody>) -> Self {
        if let Some(body) = body {
            self.info.body = Some(body);
        }
        self
    }

    /// Set the content type
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.info.content_type = Some(content_type.into());
        self
    }

    /// Set the content length; zero is left out
    pub fn content_length(mut self, length: u64) -> Self {
        if length > 0 {
            self.info.content_length = Some(length);
        }
        self
    }

    /// Freeze the captured data
    pub fn build(self) -> ResponseInfo {
        self.info
    }
}

fn parse_query(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::masking::{MaskPattern, DEFAULT_MASK_VALUE};
    use serde_json::json;

    fn engine() -> MaskingEngine {
        MaskingEngine::new(
            ["password"],
            ["authorization"],
            DEFAULT_MASK_VALUE,
            MaskPattern::defaults(),
        )
    }

    #[test]
    fn test_empty_body_is_absent() {
        assert_eq!(capture_text(b"", 10), None);
        assert_eq!(capture_body(b"", 10, &engine()), None);
        assert_eq!(capture_body(b"   ", 10, &engine()), None);
    }

    #[test]
    fn test_truncates_exactly_at_limit() {
        assert_eq!(truncate("abcdef", 4), format!("abcd{}", TRUNCATION_MARKER));
        assert_eq!(truncate("abcd", 4), "abcd");
        assert_eq!(truncate("", 4), "");
    }

    #[test]
    fn test_truncation_counts_characters() {
        let text = "ééééé";
        assert_eq!(truncate(text, 3), format!("ééé{}", TRUNCATION_MARKER));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let captured = capture_text(&[0x66, 0x6f, 0xff, 0x6f], 100).unwrap();
        assert_eq!(captured, "fo\u{fffd}o");
    }

    #[test]
    fn test_json_body_stays_structured_and_masked() {
        let body = capture_body(br#"{"user":"a","password":"p"}"#, 1024, &engine()).unwrap();
        assert_eq!(
            body,
            CapturedBody::Json(json!({"user": "a", "password": DEFAULT_MASK_VALUE}))
        );
    }

    #[test]
    fn test_oversized_json_is_masked_before_truncation() {
        let raw = format!(r#"{{"pad":"{}","password":"hunter2"}}"#, "x".repeat(64));
        let body = capture_body(raw.as_bytes(), 40, &engine()).unwrap();
        match body {
            CapturedBody::Text(text) => {
                assert!(text.ends_with(TRUNCATION_MARKER));
                assert!(!text.contains("hunter2"));
            }
            other => panic!("expected text body, got {:?}", other),
        }
    }

    #[test]
    fn test_headers_are_joined_and_masked() {
        let headers = capture_headers(
            [
                ("Authorization", "Bearer xyz"),
                ("Accept", "text/html"),
                ("Accept", "application/json"),
            ],
            &engine(),
        );
        assert_eq!(headers["Authorization"], DEFAULT_MASK_VALUE);
        assert_eq!(headers["Accept"], "text/html, application/json");
    }

    #[test]
    fn test_empty_info_serializes_to_empty_object() {
        let info = RequestInfo::builder().content_length(0).build();
        assert!(info.is_empty());
        assert_eq!(serde_json::to_value(&info).unwrap(), json!({}));
    }

    #[test]
    fn test_request_info_builder() {
        let info = RequestInfo::builder()
            .query("id=7&flag")
            .content_type("application/json")
            .content_length(12)
            .body(Some(CapturedBody::Text("hello".into())))
            .build();

        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["query_params"]["id"], "7");
        assert_eq!(value["query_params"]["flag"], "");
        assert_eq!(value["content_length"], 12);
        assert_eq!(value["body"], "hello");
    }

    #[test]
    fn test_builders_ignore_missing_body() {
        let request = RequestInfo::builder()
            .body(Some(CapturedBody::Text("kept".into())))
            .body(None)
            .build();
        assert_eq!(request.body, Some(CapturedBody::Text("kept".into())));

        let response = ResponseInfo::builder().body(None).build();
        assert!(response.is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(200))]

            #[test]
            fn prop_truncation_bounds(text in ".{0,64}", max in 1usize..48) {
                let out = truncate(&text, max);
                let len = text.chars().count();
                if len <= max {
                    prop_assert_eq!(out, text);
                } else {
                    prop_assert!(out.ends_with(TRUNCATION_MARKER));
                    let kept = out.chars().count() - TRUNCATION_MARKER.chars().count();
                    prop_assert_eq!(kept, max);
                    prop_assert!(text.starts_with(&out[..out.len() - TRUNCATION_MARKER.len()]));
                }
            }
        }
    }
}
