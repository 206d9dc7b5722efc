//! The canonical log record
//!
//! [`LogEntry`] is shared by application events and request records. Its
//! fields are declared in the order they appear in the rendered JSON line, so
//! the serialized key order is fixed by this file.

use crate::capture::{RequestInfo, ResponseInfo};
use crate::correlation::{CorrelationContext, CorrelationId};
use crate::level::{Level, LogType};
use chrono::{DateTime, Local, TimeZone};
use serde::ser::{Error as _, SerializeMap};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::backtrace::Backtrace;
use std::error::Error as StdError;

/// Schema version rendered in `@version`
pub const SCHEMA_VERSION: &str = "1";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

/// Format a point in time the way `@timestamp` renders it
pub fn format_timestamp<Tz>(time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Name of the execution unit currently running
///
/// Unnamed threads render as their numeric id.
pub fn current_thread_name() -> String {
    let thread = std::thread::current();
    match thread.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", thread.id()),
    }
}

/// A single structured log record
#[derive(Clone, Debug, Serialize)]
pub struct LogEntry {
    /// Emission time, millisecond precision with numeric offset
    #[serde(rename = "@timestamp")]
    pub timestamp: String,
    /// Schema version
    #[serde(rename = "@version")]
    pub version: &'static str,
    /// Application name
    pub application: String,
    /// Human readable message
    pub message: String,
    /// Name of the logger that produced the record
    pub logger_name: String,
    /// Execution unit that produced the record
    pub thread_name: String,
    /// Severity
    pub level: Level,
    /// Numeric severity weight
    pub level_value: u32,
    /// Record category
    #[serde(rename = "type")]
    pub log_type: LogType,
    /// Correlation ID active at emission
    pub correlation_id: String,
    /// HTTP method
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Request URI including the query string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// HTTP status code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Exchange duration in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Peer address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_address: Option<String>,
    /// User-Agent header value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Captured request data, `{}` when nothing was captured
    pub request_body: RequestInfo,
    /// Captured response data, `{}` when nothing was captured
    pub response_body: ResponseInfo,
    /// Error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// Additional structured fields
    #[serde(skip_serializing_if = "Extra::is_empty")]
    pub extra: Extra,
}

impl LogEntry {
    /// Create an application record stamped with the current time, thread and
    /// correlation ID
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self::stamped(level, message, CorrelationContext::current())
    }

    /// Like [`LogEntry::new`], but never binds an ID to the current thread
    ///
    /// Uses the bound ID if there is one, otherwise a one-off ID for this
    /// record alone.
    pub fn observed(level: Level, message: impl Into<String>) -> Self {
        let id = CorrelationContext::get().unwrap_or_else(CorrelationId::generate);
        Self::stamped(level, message, id)
    }

    fn stamped(level: Level, message: impl Into<String>, correlation: CorrelationId) -> Self {
        Self {
            timestamp: format_timestamp(&Local::now()),
            version: SCHEMA_VERSION,
            application: String::new(),
            message: message.into(),
            logger_name: String::new(),
            thread_name: current_thread_name(),
            level,
            level_value: level.weight(),
            log_type: LogType::Application,
            correlation_id: correlation.into_string(),
            method: None,
            uri: None,
            status_code: None,
            duration_ms: None,
            remote_address: None,
            user_agent: None,
            request_body: RequestInfo::default(),
            response_body: ResponseInfo::default(),
            error: None,
            extra: Extra::default(),
        }
    }

    /// Set the level, keeping `level_value` in step
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self.level_value = level.weight();
        self
    }

    /// Set the record type
    pub fn log_type(mut self, log_type: LogType) -> Self {
        self.log_type = log_type;
        self
    }

    /// Set the application name
    pub fn application(mut self, application: impl Into<String>) -> Self {
        self.application = application.into();
        self
    }

    /// Set the logger name
    pub fn logger_name(mut self, name: impl Into<String>) -> Self {
        self.logger_name = name.into();
        self
    }

    /// Override the emission timestamp
    pub fn timestamp<Tz>(mut self, time: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        self.timestamp = format_timestamp(time);
        self
    }

    /// Override the correlation ID
    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }

    /// Set HTTP method
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Set URI
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set status code
    pub fn status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Set duration in milliseconds
    pub fn duration_ms(mut self, duration: u64) -> Self {
        self.duration_ms = Some(duration);
        self
    }

    /// Set the peer address, ignoring `None`
    pub fn remote_address(mut self, address: Option<impl Into<String>>) -> Self {
        if let Some(address) = address {
            self.remote_address = Some(address.into());
        }
        self
    }

    /// Set the user agent, ignoring `None`
    pub fn user_agent(mut self, agent: Option<impl Into<String>>) -> Self {
        if let Some(agent) = agent {
            self.user_agent = Some(agent.into());
        }
        self
    }

    /// Attach captured request data
    pub fn request_body(mut self, info: RequestInfo) -> Self {
        self.request_body = info;
        self
    }

    /// Attach captured response data
    pub fn response_body(mut self, info: ResponseInfo) -> Self {
        self.response_body = info;
        self
    }

    /// Attach error details
    pub fn error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }

    /// Replace the extra fields
    pub fn extra(mut self, extra: Extra) -> Self {
        self.extra = extra;
        self
    }

    /// Add one extra field
    pub fn field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.extra.insert(key, value);
        self
    }
}

/// Details of an error attached to a record
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorInfo {
    /// Type name of the error
    pub class: String,
    /// Display rendering of the error
    pub message: String,
    /// Stack frames, innermost first, bounded by the configured depth
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stack_trace: Vec<String>,
    /// Innermost cause as `Type: message`, when the error has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
}

impl ErrorInfo {
    /// Describe `error`, naming it after its static type
    ///
    /// With `max_depth` of zero no stack is captured.
    pub fn new<E>(error: &E, max_depth: usize) -> Self
    where
        E: StdError + 'static,
    {
        let mut info = Self::from_dyn(error, max_depth);
        info.class = short_type_name(std::any::type_name::<E>());
        info
    }

    /// Describe a type-erased error
    ///
    /// The class is derived from the error's `Debug` rendering.
    pub fn from_dyn(error: &(dyn StdError + 'static), max_depth: usize) -> Self {
        Self {
            class: dyn_class(error),
            message: error.to_string(),
            stack_trace: capture_frames(max_depth),
            root_cause: root_cause(error).map(|cause| format!("{}: {}", dyn_class(cause), cause)),
        }
    }

    /// Build an error block from parts, without a stack
    pub fn from_parts(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
            stack_trace: Vec::new(),
            root_cause: None,
        }
    }
}

const MAX_CAUSE_CHAIN: usize = 64;

/// Follow `source()` to the innermost cause
///
/// Returns `None` when the error has no source. A chain that loops back on
/// itself stops at the last error before the repeat; chains longer than
/// 64 links stop there.
pub fn root_cause<'a>(error: &'a (dyn StdError + 'static)) -> Option<&'a (dyn StdError + 'static)> {
    // Compared as wide pointers: a wrapper and its first field share an address.
    let mut chain: Vec<&(dyn StdError + 'static)> = vec![error];
    let mut current = error;
    while let Some(next) = current.source() {
        if chain.len() > MAX_CAUSE_CHAIN || chain.iter().any(|seen| std::ptr::eq(*seen, next)) {
            break;
        }
        chain.push(next);
        current = next;
    }
    (chain.len() > 1).then_some(current)
}

fn capture_frames(max_depth: usize) -> Vec<String> {
    if max_depth == 0 {
        return Vec::new();
    }
    let rendered = Backtrace::force_capture().to_string();
    rendered
        .lines()
        .filter_map(|line| {
            let (index, symbol) = line.trim().split_once(": ")?;
            index.parse::<usize>().ok()?;
            Some(symbol.to_string())
        })
        .skip_while(|symbol| is_internal_frame(symbol))
        .take(max_depth)
        .collect()
}

fn is_internal_frame(symbol: &str) -> bool {
    symbol.starts_with("std::backtrace")
        || symbol.starts_with("logline_core::entry")
        || symbol.starts_with("<logline_core::entry")
}

/// `my_app::Timeout` becomes `Timeout`; a bare `Error` keeps its module,
/// so `std::io::error::Error` becomes `io::Error`
fn short_type_name(full: &str) -> String {
    let path = full.split('<').next().unwrap_or(full);
    let mut segments = path.rsplit("::");
    let name = segments.next().unwrap_or(path);
    if name != "Error" {
        return name.to_string();
    }
    match segments.find(|segment| *segment != "error") {
        Some(module) => format!("{}::{}", module, name),
        None => name.to_string(),
    }
}

fn dyn_class(error: &(dyn StdError + 'static)) -> String {
    if error.is::<std::io::Error>() {
        "io::Error".to_string()
    } else if error.is::<serde_json::Error>() {
        "serde_json::Error".to_string()
    } else {
        debug_label(error)
    }
}

fn debug_label(error: &dyn StdError) -> String {
    let debug = format!("{:?}", error);
    let end = debug
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == ':'))
        .unwrap_or(debug.len());
    match &debug[..end] {
        "" => "Error".to_string(),
        label => label.to_string(),
    }
}

/// Ordered extra fields
///
/// Insertion order is kept; inserting an existing key replaces its value in
/// place. A value that could not be converted to JSON is remembered and makes
/// serialization of the whole record fail.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Extra {
    entries: Vec<(String, ExtraValue)>,
}

#[derive(Clone, Debug, PartialEq)]
enum ExtraValue {
    Json(Value),
    Unserializable(String),
}

impl Extra {
    /// Create an empty set of fields
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` under `key`
    pub fn insert(&mut self, key: impl Into<String>, value: impl Serialize) {
        let value = match serde_json::to_value(value) {
            Ok(json) => ExtraValue::Json(json),
            Err(err) => ExtraValue::Unserializable(err.to_string()),
        };
        self.insert_value(key.into(), value);
    }

    /// Insert an already converted JSON value
    pub fn insert_json(&mut self, key: impl Into<String>, value: Value) {
        self.insert_value(key.into(), ExtraValue::Json(value));
    }

    fn insert_value(&mut self, key: String, value: ExtraValue) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Look up a converted value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find_map(|(k, v)| match v {
            ExtraValue::Json(json) if k == key => Some(json),
            _ => None,
        })
    }

    /// Whether there are no fields
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether any field failed to convert to JSON
    pub fn has_unserializable(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, v)| matches!(v, ExtraValue::Unserializable(_)))
    }
}

impl Serialize for Extra {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            match value {
                ExtraValue::Json(json) => map.serialize_entry(key, json)?,
                ExtraValue::Unserializable(reason) => {
                    return Err(S::Error::custom(format!(
                        "extra field `{}` is not serializable: {}",
                        key, reason
                    )))
                }
            }
        }
        map.end()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Extra {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut extra = Extra::new();
        for (k, v) in iter {
            extra.insert_json(k, v);
        }
        extra
    }
}
