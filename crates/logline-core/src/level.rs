//! Log levels and record types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a log record
///
/// Ordered from least to most severe; the numeric weights follow the
/// Logback convention so downstream processors can filter on `level_value`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    /// Finest-grained diagnostics
    Trace,
    /// Debugging detail
    Debug,
    /// Normal operation
    Info,
    /// Something unexpected that did not fail the operation
    Warn,
    /// A failed operation
    Error,
}

impl Level {
    /// Upper-case name as rendered in the `level` field
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }

    /// Numeric weight rendered in the `level_value` field
    pub fn weight(&self) -> u32 {
        match self {
            Level::Trace => 5_000,
            Level::Debug => 10_000,
            Level::Info => 20_000,
            Level::Warn => 30_000,
            Level::Error => 40_000,
        }
    }

    /// Level for a completed HTTP exchange with the given status
    ///
    /// Below 400 is INFO, 400–499 is WARN, 500 and above is ERROR.
    pub fn for_status(status: u16) -> Self {
        if status >= 500 {
            Level::Error
        } else if status >= 400 {
            Level::Warn
        } else {
            Level::Info
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Level::Trace),
            "DEBUG" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "WARN" | "WARNING" => Ok(Level::Warn),
            "ERROR" => Ok(Level::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

impl From<Level> for tracing::Level {
    fn from(level: Level) -> Self {
        match level {
            Level::Trace => tracing::Level::TRACE,
            Level::Debug => tracing::Level::DEBUG,
            Level::Info => tracing::Level::INFO,
            Level::Warn => tracing::Level::WARN,
            Level::Error => tracing::Level::ERROR,
        }
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            _ => Level::Error,
        }
    }
}

/// Category of a log record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    /// HTTP request/response records, inbound or outbound
    Request,
    /// General application events
    Application,
}

impl LogType {
    /// Value rendered in the `type` field
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Request => "request",
            LogType::Application => "application",
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
