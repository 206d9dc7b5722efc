//! Rendering log entries as JSON lines

use crate::entry::{ErrorInfo, Extra, LogEntry};
use crate::error::EncodeError;
use crate::level::Level;
use serde_json::json;

/// Renders a [`LogEntry`] as one newline-terminated JSON document
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonEncoder;

/// Outcome of [`JsonEncoder::encode_or_fallback`]
#[derive(Debug)]
pub struct Encoded {
    /// The line to write, newline-terminated
    pub line: String,
    /// Level the line should be written at
    pub level: Level,
    /// Set when the entry could not be encoded and `line` is the fallback
    pub failure: Option<EncodeError>,
}

impl JsonEncoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self
    }

    /// Encode `entry` as UTF-8 bytes
    pub fn encode(&self, entry: &LogEntry) -> Result<Vec<u8>, EncodeError> {
        let mut bytes = serde_json::to_vec(entry)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Encode `entry` as a string
    pub fn encode_to_string(&self, entry: &LogEntry) -> Result<String, EncodeError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        Ok(line)
    }

    /// Encode `entry`, substituting a diagnostic record if that fails
    ///
    /// The fallback keeps the envelope of the original entry, drops `extra`,
    /// and carries an `error` block describing the failure at ERROR level.
    pub fn encode_or_fallback(&self, entry: &LogEntry) -> Encoded {
        match self.encode_to_string(entry) {
            Ok(line) => Encoded {
                line,
                level: entry.level,
                failure: None,
            },
            Err(failure) => {
                tracing::debug!(error = %failure, logger = %entry.logger_name, "log entry fell back to diagnostic record");
                Encoded {
                    line: self.fallback_line(entry, &failure),
                    level: Level::Error,
                    failure: Some(failure),
                }
            }
        }
    }

    fn fallback_line(&self, entry: &LogEntry, failure: &EncodeError) -> String {
        let fallback = entry
            .clone()
            .level(Level::Error)
            .extra(Extra::new())
            .error(ErrorInfo::from_parts("EncodeError", failure.to_string()));

        match self.encode_to_string(&fallback) {
            Ok(line) => line,
            Err(_) => {
                let mut line = json!({
                    "@timestamp": fallback.timestamp,
                    "@version": fallback.version,
                    "message": "failed to serialize log entry",
                    "level": Level::Error.as_str(),
                    "level_value": Level::Error.weight(),
                })
                .to_string();
                line.push('\n');
                line
            }
        }
    }
}
