//! # logline-http
//!
//! HTTP adapters for logline, built on the `http` types and `tower` layers.
//!
//! - [`RequestLoggingLayer`] binds a correlation ID to each inbound exchange,
//!   echoes it as `X-Correlation-ID` and logs the request and its response
//! - [`ClientLoggingLayer`] propagates the current ID to downstream calls and
//!   logs them as outgoing exchanges
//!
//! Bodies are buffered as [`bytes::Bytes`].
//!
//! ```rust,no_run
//! use logline_core::{AppLoggerFactory, LoggingConfiguration};
//! use logline_http::RequestLoggingLayer;
//! use tower::Layer;
//!
//! let factory = AppLoggerFactory::new("orders", LoggingConfiguration::production()).unwrap();
//! let layer = RequestLoggingLayer::new(factory.get_logger("orders::http"));
//! let service = layer.layer(tower::service_fn(|req: http::Request<bytes::Bytes>| async move {
//!     Ok::<_, std::convert::Infallible>(http::Response::new(req.into_body()))
//! }));
//! # let _ = service;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod capture;
pub mod inbound;
pub mod outbound;

/// Error type of the wrapped services
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use inbound::{BoxedNext, RequestLoggingLayer, RequestLoggingService};
pub use outbound::{ClientLoggingLayer, ClientLoggingService};
