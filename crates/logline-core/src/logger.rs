//! The AppLogger facade
//!
//! An [`AppLogger`] turns application events and HTTP exchanges into
//! [`LogEntry`] records, runs them through the [`JsonEncoder`] and hands the
//! resulting line to its [`LogSink`]. Every call is gated by the global
//! switch, the category switch and the sink's level check, in that order,
//! before anything is built.

use crate::capture::{RequestInfo, ResponseInfo};
use crate::config::{LoggingConfiguration, UrlFilter};
use crate::encoder::JsonEncoder;
use crate::entry::{ErrorInfo, Extra, LogEntry};
use crate::error::{ConfigError, Result};
use crate::level::{Level, LogType};
use crate::masking::MaskingEngine;
use crate::sink::LogSink;
use serde::Serialize;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Shared, immutable state behind every logger of one factory
pub(crate) struct Pipeline {
    application: String,
    config: Arc<LoggingConfiguration>,
    masking: MaskingEngine,
    urls: UrlFilter,
    sink: Arc<dyn LogSink>,
    encoder: JsonEncoder,
}

impl Pipeline {
    pub(crate) fn new(
        application: impl Into<String>,
        config: Arc<LoggingConfiguration>,
        sink: Arc<dyn LogSink>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let urls = config.request.url_filter()?;
        Ok(Self {
            application: application.into(),
            masking: config.masking_engine(),
            config,
            urls,
            sink,
            encoder: JsonEncoder::new(),
        })
    }

    pub(crate) fn application(&self) -> &str {
        &self.application
    }
}

/// Structured logger bound to a name and a shared pipeline
///
/// Cheap to clone. Obtain one from an
/// [`AppLoggerFactory`](crate::factory::AppLoggerFactory), or through
/// [`AppLogger::new`] / [`AppLogger::for_type`] to use the process-wide
/// defaults.
#[derive(Clone)]
pub struct AppLogger {
    name: Arc<str>,
    pipeline: Arc<Pipeline>,
}

impl fmt::Debug for AppLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppLogger")
            .field("name", &self.name)
            .field("application", &self.pipeline.application)
            .finish()
    }
}

impl AppLogger {
    pub(crate) fn from_pipeline(name: impl Into<Arc<str>>, pipeline: Arc<Pipeline>) -> Self {
        Self {
            name: name.into(),
            pipeline,
        }
    }

    /// Logger named `name` using the process-wide defaults
    pub fn new(name: impl Into<String>) -> Self {
        crate::defaults::factory().get_logger(name)
    }

    /// Logger named after the type `T` using the process-wide defaults
    pub fn for_type<T: ?Sized>() -> Self {
        Self::new(std::any::type_name::<T>())
    }

    /// Logger name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Application name stamped on every record
    pub fn application(&self) -> &str {
        &self.pipeline.application
    }

    /// The configuration this logger follows
    pub fn config(&self) -> &LoggingConfiguration {
        &self.pipeline.config
    }

    /// The masking rules this logger applies
    pub fn masking(&self) -> &MaskingEngine {
        &self.pipeline.masking
    }

    /// Whether request records are produced for `path`
    pub fn should_log_path(&self, path: &str) -> bool {
        self.pipeline.urls.should_log(path)
    }

    /// Whether application records at `level` are emitted
    pub fn is_enabled(&self, level: Level) -> bool {
        let config = &self.pipeline.config;
        config.enabled && config.application.enabled && self.pipeline.sink.enabled(level)
    }

    /// Whether request records at `level` are emitted
    pub fn is_request_logging_enabled(&self, level: Level) -> bool {
        let config = &self.pipeline.config;
        config.enabled && config.request.enabled && self.pipeline.sink.enabled(level)
    }

    /// Log a message at TRACE
    pub fn trace(&self, message: impl Into<String>) -> Result<()> {
        self.event(Level::Trace, message).emit()
    }

    /// Log a message at DEBUG
    pub fn debug(&self, message: impl Into<String>) -> Result<()> {
        self.event(Level::Debug, message).emit()
    }

    /// Log a message at INFO
    pub fn info(&self, message: impl Into<String>) -> Result<()> {
        self.event(Level::Info, message).emit()
    }

    /// Log a message at WARN
    pub fn warn(&self, message: impl Into<String>) -> Result<()> {
        self.event(Level::Warn, message).emit()
    }

    /// Log a message at ERROR
    pub fn error(&self, message: impl Into<String>) -> Result<()> {
        self.event(Level::Error, message).emit()
    }

    /// Start an application event with extra fields or an error
    ///
    /// ```rust
    /// use logline_core::{AppLogger, Level};
    ///
    /// let logger = AppLogger::new("orders");
    /// logger
    ///     .event(Level::Info, "order placed")
    ///     .field("order_id", 42)
    ///     .emit()
    ///     .ok();
    /// ```
    pub fn event(&self, level: Level, message: impl Into<String>) -> EventBuilder<'_> {
        let enabled = self.is_enabled(level);
        EventBuilder {
            logger: self,
            level,
            message: if enabled { message.into() } else { String::new() },
            enabled,
            extra: Extra::new(),
            error: None,
        }
    }

    /// Log an inbound request as it arrives, at INFO
    pub fn log_incoming_request(
        &self,
        method: &str,
        uri: &str,
        request: RequestInfo,
        remote_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<()> {
        if !self.is_request_logging_enabled(Level::Info) {
            return Ok(());
        }
        let entry = self
            .request_entry(Level::Info, "Incoming request", method, uri)
            .remote_address(remote_address)
            .user_agent(user_agent)
            .request_body(request);
        self.write(entry)
    }

    /// Log the response to an inbound request, at a level derived from `status`
    pub fn log_incoming_response(
        &self,
        method: &str,
        uri: &str,
        status: u16,
        duration_ms: u64,
        response: ResponseInfo,
    ) -> Result<()> {
        self.log_response(
            "Incoming response",
            method,
            uri,
            status,
            duration_ms,
            response,
            Extra::new(),
            None,
        )
    }

    /// Log a call to a downstream service as it is dispatched, at INFO
    pub fn log_outgoing_request(&self, method: &str, uri: &str, request: RequestInfo) -> Result<()> {
        if !self.is_request_logging_enabled(Level::Info) {
            return Ok(());
        }
        let entry = self
            .request_entry(Level::Info, "Outgoing request", method, uri)
            .request_body(request)
            .field("direction", "outgoing");
        self.write(entry)
    }

    /// Log the response of a downstream service, at a level derived from `status`
    pub fn log_outgoing_response(
        &self,
        method: &str,
        uri: &str,
        status: u16,
        duration_ms: u64,
        response: ResponseInfo,
    ) -> Result<()> {
        self.log_response(
            "Outgoing response",
            method,
            uri,
            status,
            duration_ms,
            response,
            outgoing_extra(None),
            None,
        )
    }

    /// Log a downstream call that failed before a response arrived
    ///
    /// Emitted at ERROR with status `0` and the dispatch error attached.
    pub fn log_outgoing_failure(
        &self,
        method: &str,
        uri: &str,
        duration_ms: u64,
        error: &(dyn StdError + 'static),
    ) -> Result<()> {
        if !self.is_request_logging_enabled(Level::Error) {
            return Ok(());
        }
        let entry = self
            .request_entry(Level::Error, "Outgoing request failed", method, uri)
            .status(0)
            .duration_ms(duration_ms)
            .error(ErrorInfo::from_dyn(error, self.pipeline.config.stack_depth()))
            .extra(outgoing_extra(Some("dispatch_error")));
        self.write(entry)
    }

    /// Log an inbound exchange abandoned before the handler finished
    ///
    /// Emitted at WARN with status `499`.
    pub fn log_incoming_cancelled(&self, method: &str, uri: &str, duration_ms: u64) -> Result<()> {
        let mut extra = Extra::new();
        extra.insert("outcome", "cancelled");
        self.log_response(
            "Incoming response",
            method,
            uri,
            499,
            duration_ms,
            ResponseInfo::default(),
            extra,
            None,
        )
    }

    /// Log an inbound exchange whose handler failed, at ERROR with status `500`
    pub fn log_incoming_failure(
        &self,
        method: &str,
        uri: &str,
        duration_ms: u64,
        error: &(dyn StdError + 'static),
    ) -> Result<()> {
        self.log_response(
            "Incoming response",
            method,
            uri,
            500,
            duration_ms,
            ResponseInfo::default(),
            Extra::new(),
            Some(error),
        )
    }

    /// Log a complete exchange as one record, at a level derived from `status`
    #[allow(clippy::too_many_arguments)]
    pub fn log_request(
        &self,
        message: impl Into<String>,
        method: &str,
        uri: &str,
        status: u16,
        duration_ms: u64,
        request: RequestInfo,
        response: ResponseInfo,
    ) -> Result<()> {
        let level = Level::for_status(status);
        if !self.is_request_logging_enabled(level) {
            return Ok(());
        }
        let entry = self
            .request_entry(level, message, method, uri)
            .status(status)
            .duration_ms(duration_ms)
            .request_body(request)
            .response_body(response);
        self.write(entry)
    }

    #[allow(clippy::too_many_arguments)]
    fn log_response(
        &self,
        message: &str,
        method: &str,
        uri: &str,
        status: u16,
        duration_ms: u64,
        response: ResponseInfo,
        extra: Extra,
        error: Option<&(dyn StdError + 'static)>,
    ) -> Result<()> {
        let level = Level::for_status(status);
        if !self.is_request_logging_enabled(level) {
            return Ok(());
        }
        let mut entry = self
            .request_entry(level, message, method, uri)
            .status(status)
            .duration_ms(duration_ms)
            .response_body(response)
            .extra(extra);
        if let Some(error) = error {
            entry = entry.error(ErrorInfo::from_dyn(error, self.pipeline.config.stack_depth()));
        }
        self.write(entry)
    }

    fn base_entry(&self, level: Level, message: impl Into<String>) -> LogEntry {
        LogEntry::new(level, message)
            .application(self.pipeline.application.clone())
            .logger_name(self.name.to_string())
    }

    fn request_entry(
        &self,
        level: Level,
        message: impl Into<String>,
        method: &str,
        uri: &str,
    ) -> LogEntry {
        self.base_entry(level, message)
            .log_type(LogType::Request)
            .method(method)
            .uri(uri)
    }

    fn write(&self, entry: LogEntry) -> Result<()> {
        let encoded = self.pipeline.encoder.encode_or_fallback(&entry);
        let failure = encoded
            .failure
            .as_ref()
            .map(|e| e as &(dyn StdError + 'static));
        self.pipeline.sink.write(encoded.level, &encoded.line, failure)
    }
}

fn outgoing_extra(outcome: Option<&str>) -> Extra {
    let mut extra = Extra::new();
    extra.insert("direction", "outgoing");
    if let Some(outcome) = outcome {
        extra.insert("outcome", outcome);
    }
    extra
}

/// Application event under construction
///
/// Created by [`AppLogger::event`]; nothing is written until
/// [`emit`](EventBuilder::emit). When the event is disabled every method is a
/// no-op.
#[must_use = "events are only written by `emit`"]
pub struct EventBuilder<'a> {
    logger: &'a AppLogger,
    level: Level,
    message: String,
    enabled: bool,
    extra: Extra,
    error: Option<ErrorInfo>,
}

impl<'a> EventBuilder<'a> {
    /// Add one extra field
    pub fn field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if self.enabled {
            self.extra.insert(key, value);
        }
        self
    }

    /// Add several extra fields
    pub fn fields<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        if self.enabled {
            for (key, value) in fields {
                self.extra.insert(key, value);
            }
        }
        self
    }

    /// Attach an error, named after its type
    pub fn error<E>(mut self, error: &E) -> Self
    where
        E: StdError + 'static,
    {
        if self.enabled {
            self.error = Some(ErrorInfo::new(error, self.logger.config().stack_depth()));
        }
        self
    }

    /// Attach a type-erased error
    pub fn error_dyn(mut self, error: &(dyn StdError + 'static)) -> Self {
        if self.enabled {
            self.error = Some(ErrorInfo::from_dyn(error, self.logger.config().stack_depth()));
        }
        self
    }

    /// Build the record and write it
    pub fn emit(self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut entry = self
            .logger
            .base_entry(self.level, self.message)
            .extra(self.extra);
        if let Some(error) = self.error {
            entry = entry.error(error);
        }
        self.logger.write(entry)
    }
}
