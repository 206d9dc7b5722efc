//! # logline
//!
//! Structured JSON logging for service applications.
//!
//! Every record is one JSON document per line with a fixed key order, and
//! every record written while a request is being handled carries that
//! request's correlation ID. Inbound exchanges are logged with masked headers
//! and bodies, and the ID is propagated to downstream calls.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use logline::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     logline::init(Profile::Json);
//!
//!     let config = LoggingConfiguration::from_env()?;
//!     let factory = AppLoggerFactory::new("orders", config)?;
//!     let inbound = RequestLoggingLayer::new(factory.get_logger("orders::http"));
//!
//!     let logger = factory.get_logger("orders::startup");
//!     logger.event(Level::Info, "listening").field("port", 8080).emit()?;
//!     // wrap your service with `inbound`
//!     Ok(())
//! }
//! ```
//!
//! ## Optional Features
//!
//! - `http` (default) - [`RequestLoggingLayer`] and [`ClientLoggingLayer`]
//! - `env` (default) - `LoggingConfiguration::from_env` with `.env` support

// Re-export core functionality
pub use logline_core::*;

// Re-export HTTP adapters (feature-gated)
#[cfg(feature = "http")]
pub use logline_http::{inbound, outbound};
#[cfg(feature = "http")]
pub use logline_http::{
    BoxError, BoxedNext, ClientLoggingLayer, ClientLoggingService, RequestLoggingLayer,
    RequestLoggingService,
};

// Re-exports for user convenience
pub use serde_json;
pub use tracing;

/// Prelude module - import everything you need with `use logline::prelude::*`
pub mod prelude {
    pub use logline_core::{
        // Facade
        AppLogger,
        AppLoggerFactory,
        // Configuration
        LoggingConfiguration,
        LoggingConfigurationBuilder,
        // Correlation
        CorrelationContext,
        CorrelationFutureExt,
        CorrelationId,
        CORRELATION_ID_HEADER,
        // Records
        Level,
        LogType,
        RequestInfo,
        ResponseInfo,
        // Output
        LogSink,
        MemorySink,
        Profile,
        TracingSink,
    };

    #[cfg(feature = "http")]
    pub use logline_http::{ClientLoggingLayer, RequestLoggingLayer};

    pub use serde_json::json;
}
