//! # logline-core
//!
//! Core engine of logline: structured JSON log records for service
//! applications, tied together by a per-request correlation ID.
//!
//! This crate contains everything that does not depend on an HTTP stack:
//!
//! - [`correlation`] - the correlation ID slot and the future wrapper that
//!   carries it across await points
//! - [`masking`] - field, header and pattern based redaction
//! - [`capture`] - bounded capture of headers and bodies
//! - [`entry`] and [`encoder`] - the log record and its JSON line rendering
//! - [`logger`] and [`factory`] - the [`AppLogger`] facade and its cache
//! - [`config`] - the startup configuration
//! - [`sink`] and [`subscriber`] - where lines go, and `tracing` integration
//!
//! ## Features
//!
//! - `env` (default) - `LoggingConfiguration::from_env` with `.env` support
//!
//! ## Example
//!
//! ```rust
//! use logline_core::{AppLoggerFactory, Level, LoggingConfiguration, MemorySink};
//! use std::sync::Arc;
//!
//! let sink = Arc::new(MemorySink::new());
//! let factory = AppLoggerFactory::with_sink(
//!     "orders",
//!     Arc::new(LoggingConfiguration::default()),
//!     sink.clone(),
//! )
//! .unwrap();
//!
//! let logger = factory.get_logger("orders::checkout");
//! logger
//!     .event(Level::Info, "order placed")
//!     .field("order_id", 42)
//!     .emit()
//!     .unwrap();
//!
//! assert_eq!(sink.entries()[0]["extra"]["order_id"], 42);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod capture;
pub mod config;
pub mod correlation;
pub mod defaults;
pub mod encoder;
pub mod entry;
pub mod error;
pub mod factory;
pub mod level;
pub mod logger;
pub mod masking;
pub mod sink;
pub mod subscriber;

pub use capture::{CapturedBody, RequestInfo, ResponseInfo};
pub use config::{
    ApplicationLoggingConfig, LoggingConfiguration, LoggingConfigurationBuilder,
    RequestLoggingConfig, UrlFilter,
};
pub use correlation::{
    CorrelationContext, CorrelationFutureExt, CorrelationId, WithCorrelation,
    CORRELATION_ID_HEADER,
};
pub use encoder::JsonEncoder;
pub use entry::{ErrorInfo, Extra, LogEntry};
pub use error::{ConfigError, DefaultsError, EncodeError, SinkError};
pub use factory::AppLoggerFactory;
pub use level::{Level, LogType};
pub use logger::{AppLogger, EventBuilder};
pub use masking::MaskingEngine;
pub use sink::{LogSink, MemorySink, TracingSink, WriterSink};
pub use subscriber::{init, JsonLineLayer, Profile};
