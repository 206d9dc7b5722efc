//! Destinations for rendered log lines

use crate::error::SinkError;
use crate::level::Level;
use serde_json::Value;
use std::error::Error as StdError;
use std::io::Write;
use std::sync::Mutex;

/// Target of every rendered log line
///
/// This is the only egress of the logging pipeline. Implementations must be
/// cheap to call from any thread.
pub trait LogSink: Send + Sync {
    /// Write one newline-terminated JSON line
    ///
    /// `error` is set when the line is a diagnostic record standing in for an
    /// entry that could not be encoded.
    fn write(
        &self,
        level: Level,
        line: &str,
        error: Option<&(dyn StdError + 'static)>,
    ) -> Result<(), SinkError>;

    /// Whether a record at `level` would be kept
    ///
    /// Checked before a record is built.
    fn enabled(&self, level: Level) -> bool {
        let _ = level;
        true
    }
}

/// Target used by [`TracingSink`] for its events
pub const LOG_TARGET: &str = "logline";

/// Sink that forwards each line as a `tracing` event
///
/// The event's message is the rendered JSON line. Pair it with
/// [`JsonLineLayer`](crate::subscriber::JsonLineLayer) to get the lines on
/// stdout unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl TracingSink {
    /// Create a new sink
    pub fn new() -> Self {
        Self
    }
}

macro_rules! emit_at {
    ($macro:ident, $line:expr, $error:expr) => {
        match $error {
            Some(err) => tracing::$macro!(target: "logline", encode_error = %err, "{}", $line),
            None => tracing::$macro!(target: "logline", "{}", $line),
        }
    };
}

impl LogSink for TracingSink {
    fn write(
        &self,
        level: Level,
        line: &str,
        error: Option<&(dyn StdError + 'static)>,
    ) -> Result<(), SinkError> {
        let line = line.trim_end_matches('\n');
        match level {
            Level::Trace => emit_at!(trace, line, error),
            Level::Debug => emit_at!(debug, line, error),
            Level::Info => emit_at!(info, line, error),
            Level::Warn => emit_at!(warn, line, error),
            Level::Error => emit_at!(error, line, error),
        }
        Ok(())
    }

    fn enabled(&self, level: Level) -> bool {
        match level {
            Level::Trace => tracing::enabled!(target: "logline", tracing::Level::TRACE),
            Level::Debug => tracing::enabled!(target: "logline", tracing::Level::DEBUG),
            Level::Info => tracing::enabled!(target: "logline", tracing::Level::INFO),
            Level::Warn => tracing::enabled!(target: "logline", tracing::Level::WARN),
            Level::Error => tracing::enabled!(target: "logline", tracing::Level::ERROR),
        }
    }
}

/// Sink that writes lines to any [`Write`] implementation
///
/// Lines are written whole under a lock and flushed after each write.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: Mutex<W>,
    min_level: Level,
}

impl<W: Write + Send> WriterSink<W> {
    /// Wrap `writer`, accepting every level
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            min_level: Level::Trace,
        }
    }

    /// Drop records below `level`
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    /// Recover the writer
    pub fn into_inner(self) -> Result<W, SinkError> {
        self.writer.into_inner().map_err(|_| SinkError::Poisoned)
    }
}

impl WriterSink<std::io::Stdout> {
    /// Sink writing to standard output
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> LogSink for WriterSink<W> {
    fn write(
        &self,
        _level: Level,
        line: &str,
        _error: Option<&(dyn StdError + 'static)>,
    ) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().map_err(|_| SinkError::Poisoned)?;
        writer.write_all(line.as_bytes())?;
        if !line.ends_with('\n') {
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }
}

/// A line captured by [`MemorySink`]
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedLine {
    /// Level the line was written at
    pub level: Level,
    /// The line without its trailing newline
    pub line: String,
    /// Display rendering of the attached error
    pub error: Option<String>,
}

/// Sink that keeps every line in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<CapturedLine>>,
    min_level: Option<Level>,
}

impl MemorySink {
    /// Create an empty sink accepting every level
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop records below `level`
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = Some(level);
        self
    }

    /// Every captured line, oldest first
    pub fn lines(&self) -> Vec<CapturedLine> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Every captured line parsed as JSON; unparsable lines are skipped
    pub fn entries(&self) -> Vec<Value> {
        self.lines()
            .iter()
            .filter_map(|captured| serde_json::from_str(&captured.line).ok())
            .collect()
    }

    /// Number of captured lines
    pub fn len(&self) -> usize {
        self.lines.lock().map(|lines| lines.len()).unwrap_or(0)
    }

    /// Whether nothing was captured
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard captured lines
    pub fn clear(&self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
    }
}

impl LogSink for MemorySink {
    fn write(
        &self,
        level: Level,
        line: &str,
        error: Option<&(dyn StdError + 'static)>,
    ) -> Result<(), SinkError> {
        let mut lines = self.lines.lock().map_err(|_| SinkError::Poisoned)?;
        lines.push(CapturedLine {
            level,
            line: line.trim_end_matches('\n').to_string(),
            error: error.map(|e| e.to_string()),
        });
        Ok(())
    }

    fn enabled(&self, level: Level) -> bool {
        self.min_level.map_or(true, |min| level >= min)
    }
}
