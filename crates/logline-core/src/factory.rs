//! Named logger cache

use crate::config::LoggingConfiguration;
use crate::error::ConfigError;
use crate::logger::{AppLogger, Pipeline};
use crate::sink::{LogSink, TracingSink};
use dashmap::DashMap;
use std::sync::Arc;

/// Hands out one [`AppLogger`] per name, all sharing one configuration and sink
///
/// The application name stamped on records is the configuration's
/// `applicationName` when that is set and non-blank, otherwise the name the
/// factory was created with.
pub struct AppLoggerFactory {
    pipeline: Arc<Pipeline>,
    loggers: DashMap<String, AppLogger>,
}

impl std::fmt::Debug for AppLoggerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppLoggerFactory")
            .field("application_name", &self.application_name())
            .field("loggers", &self.loggers.len())
            .finish()
    }
}

impl AppLoggerFactory {
    /// Create a factory writing through a [`TracingSink`]
    pub fn new(
        application_name: impl Into<String>,
        config: LoggingConfiguration,
    ) -> Result<Self, ConfigError> {
        Self::with_sink(application_name, Arc::new(config), Arc::new(TracingSink::new()))
    }

    /// Create a factory writing to `sink`
    ///
    /// Fails if the configuration does not validate.
    pub fn with_sink(
        application_name: impl Into<String>,
        config: Arc<LoggingConfiguration>,
        sink: Arc<dyn LogSink>,
    ) -> Result<Self, ConfigError> {
        let fallback = application_name.into();
        let application = config
            .configured_application_name()
            .map(str::to_string)
            .unwrap_or(fallback);
        let pipeline = Pipeline::new(application, config, sink)?;
        Ok(Self {
            pipeline: Arc::new(pipeline),
            loggers: DashMap::new(),
        })
    }

    /// The application name stamped on every record
    pub fn application_name(&self) -> &str {
        self.pipeline.application()
    }

    /// Logger named `name`, created on first use
    pub fn get_logger(&self, name: impl Into<String>) -> AppLogger {
        let name = name.into();
        if let Some(logger) = self.loggers.get(&name) {
            return logger.value().clone();
        }
        self.loggers
            .entry(name.clone())
            .or_insert_with(|| AppLogger::from_pipeline(name, self.pipeline.clone()))
            .value()
            .clone()
    }

    /// Logger named after the type `T`
    pub fn logger_for<T: ?Sized>(&self) -> AppLogger {
        self.get_logger(std::any::type_name::<T>())
    }

    /// Number of distinct loggers created so far
    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    /// Whether no logger was created yet
    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }
}
