//! Outbound client logging
//!
//! [`ClientLoggingLayer`] wraps an HTTP client service. Every call gets the
//! current correlation ID as `X-Correlation-ID`, whether or not request
//! logging is enabled, and is logged as an outgoing request/response pair.
//! A call that fails without a response is logged at ERROR with status `0`,
//! and the error is handed back to the caller unchanged.

use crate::capture;
use crate::BoxError;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{Request, Response};
use logline_core::{AppLogger, CorrelationContext, CorrelationFutureExt};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::time::Instant;
use tower_service::Service;

/// Correlation propagation and logging for calls to downstream services
#[derive(Clone, Debug)]
pub struct ClientLoggingLayer {
    logger: AppLogger,
}

impl ClientLoggingLayer {
    /// Log through `logger`, following its configuration
    pub fn new(logger: AppLogger) -> Self {
        Self { logger }
    }
}

impl<S> tower::Layer<S> for ClientLoggingLayer {
    type Service = ClientLoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ClientLoggingService {
            inner,
            logger: self.logger.clone(),
        }
    }
}

/// Service produced by [`ClientLoggingLayer`]
#[derive(Clone, Debug)]
pub struct ClientLoggingService<S> {
    inner: S,
    logger: AppLogger,
}

impl<S> Service<Request<Bytes>> for ClientLoggingService<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>>,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
{
    type Response = Response<Bytes>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, mut req: Request<Bytes>) -> Self::Future {
        let id = CorrelationContext::current();
        if let Ok(value) = HeaderValue::from_str(id.as_str()) {
            req.headers_mut()
                .insert(HeaderName::from_static("x-correlation-id"), value);
        }

        let logger = self.logger.clone();
        let method = req.method().to_string();
        let uri = req.uri().to_string();
        if let Some(info) = capture::logged_request(&logger, &req, false) {
            if let Err(err) = logger.log_outgoing_request(&method, &uri, info) {
                tracing::warn!(error = %err, "failed to log outgoing request");
            }
        }

        let started = Instant::now();
        let fut = self.inner.call(req);

        Box::pin(
            async move {
                let result = fut.await;
                let elapsed = started.elapsed().as_millis() as u64;
                match result {
                    Ok(response) => {
                        if let Some(info) = capture::logged_response(&logger, &response) {
                            let status = response.status().as_u16();
                            if let Err(err) =
                                logger.log_outgoing_response(&method, &uri, status, elapsed, info)
                            {
                                tracing::warn!(error = %err, "failed to log outgoing response");
                            }
                        }
                        Ok(response)
                    }
                    Err(error) => {
                        let error: BoxError = error.into();
                        if let Err(err) =
                            logger.log_outgoing_failure(&method, &uri, elapsed, &*error)
                        {
                            tracing::warn!(error = %err, "failed to log outgoing failure");
                        }
                        Err(error)
                    }
                }
            }
            .with_correlation(id),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logline_core::{AppLoggerFactory, CorrelationId, Level, LoggingConfiguration, MemorySink};
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::{Layer, ServiceExt};

    fn layer_with(config: LoggingConfiguration) -> (ClientLoggingLayer, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let factory = AppLoggerFactory::with_sink("orders", Arc::new(config), sink.clone()).unwrap();
        (ClientLoggingLayer::new(factory.get_logger("client")), sink)
    }

    fn echo_header(req: Request<Bytes>) -> Response<Bytes> {
        let mut res = Response::new(Bytes::from_static(br#"{"stock":3}"#));
        if let Some(value) = req.headers().get("x-correlation-id") {
            res.headers_mut().insert("x-echo", value.clone());
        }
        res
    }

    #[tokio::test]
    async fn test_propagates_current_id_and_logs_pair() {
        let (layer, sink) = layer_with(LoggingConfiguration::default());
        let client = layer.layer(tower::service_fn(|req: Request<Bytes>| async move {
            Ok::<_, Infallible>(echo_header(req))
        }));

        let _scope = CorrelationContext::scope(CorrelationId::parse("order-42").unwrap());
        let req = Request::builder()
            .uri("http://inventory.internal/api/stock?sku=9")
            .header("authorization", "Bearer inner")
            .body(Bytes::new())
            .unwrap();
        let response = client.oneshot(req).await.unwrap();
        assert_eq!(response.headers()["x-echo"], "order-42");

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["message"], "Outgoing request");
        assert_eq!(entries[0]["uri"], "http://inventory.internal/api/stock?sku=9");
        assert_eq!(entries[0]["extra"]["direction"], "outgoing");
        assert_eq!(entries[0]["request_body"]["headers"]["Authorization"], "***MASKED***");
        assert_eq!(entries[0]["request_body"]["headers"]["X-Correlation-Id"], "order-42");
        assert_eq!(entries[1]["message"], "Outgoing response");
        assert_eq!(entries[1]["status_code"], 200);
        assert_eq!(entries[1]["response_body"]["body"]["stock"], 3);
        assert!(entries.iter().all(|e| e["correlation_id"] == "order-42"));
    }

    #[tokio::test]
    async fn test_header_injected_when_logging_disabled() {
        let (layer, sink) = layer_with(LoggingConfiguration::disabled());
        let client = layer.layer(tower::service_fn(|req: Request<Bytes>| async move {
            Ok::<_, Infallible>(echo_header(req))
        }));

        let _scope = CorrelationContext::scope(CorrelationId::parse("quiet").unwrap());
        let response = client
            .oneshot(Request::builder().uri("/ping").body(Bytes::new()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.headers()["x-echo"], "quiet");
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_success_below_sink_level_writes_nothing() {
        let sink = Arc::new(MemorySink::new().with_min_level(Level::Error));
        let factory = AppLoggerFactory::with_sink(
            "orders",
            Arc::new(LoggingConfiguration::default()),
            sink.clone(),
        )
        .unwrap();
        let client = ClientLoggingLayer::new(factory.get_logger("client")).layer(
            tower::service_fn(|req: Request<Bytes>| async move {
                Ok::<_, Infallible>(echo_header(req))
            }),
        );

        client
            .oneshot(Request::builder().uri("/ok").body(Bytes::new()).unwrap())
            .await
            .unwrap();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_logged_and_returned() {
        let (layer, sink) = layer_with(LoggingConfiguration::default());
        let client = layer.layer(tower::service_fn(|_req: Request<Bytes>| async {
            Err::<Response<Bytes>, _>(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))
        }));

        let err = client
            .oneshot(Request::builder().uri("http://down/api").body(Bytes::new()).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "connection refused");

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1]["message"], "Outgoing request failed");
        assert_eq!(entries[1]["level"], "ERROR");
        assert_eq!(entries[1]["status_code"], 0);
        assert_eq!(entries[1]["extra"]["outcome"], "dispatch_error");
        assert_eq!(entries[1]["error"]["message"], "connection refused");
    }

    #[tokio::test(start_paused = true)]
    async fn test_downstream_status_sets_level_and_duration() {
        let (layer, sink) = layer_with(LoggingConfiguration::default());
        let client = layer.layer(tower::service_fn(|_req: Request<Bytes>| async {
            tokio::time::sleep(Duration::from_millis(80)).await;
            let mut res = Response::new(Bytes::new());
            *res.status_mut() = http::StatusCode::NOT_FOUND;
            Ok::<_, Infallible>(res)
        }));

        client
            .oneshot(Request::builder().uri("/missing").body(Bytes::new()).unwrap())
            .await
            .unwrap();

        let response = &sink.entries()[1];
        assert_eq!(response["level"], "WARN");
        assert_eq!(response["status_code"], 404);
        assert_eq!(response["duration_ms"], 80);
    }
}
