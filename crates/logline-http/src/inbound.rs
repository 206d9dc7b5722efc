//! Inbound request logging
//!
//! [`RequestLoggingLayer`] wraps a request handler. For each exchange it:
//!
//! 1. takes the `X-Correlation-ID` header, or generates an ID, and binds it
//!    for the whole handler run
//! 2. logs the incoming request, unless the path is excluded
//! 3. runs the handler
//! 4. sets `X-Correlation-ID` on the response, excluded paths included
//! 5. logs the response with its status and duration
//!
//! If the exchange is dropped before the handler finishes, a response record
//! with status 499 is still written. Logging failures are reported through
//! `tracing` and never change the response.

use crate::capture;
use crate::BoxError;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{Request, Response, StatusCode};
use logline_core::{
    AppLogger, CorrelationContext, CorrelationFutureExt, CorrelationId, CORRELATION_ID_HEADER,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::time::Instant;
use tower_service::Service;

/// A boxed handler continuation
pub type BoxedNext = Arc<
    dyn Fn(Request<Bytes>) -> Pin<Box<dyn Future<Output = Response<Bytes>> + Send + 'static>>
        + Send
        + Sync,
>;

/// Request/response logging for inbound exchanges
#[derive(Clone, Debug)]
pub struct RequestLoggingLayer {
    logger: AppLogger,
}

impl RequestLoggingLayer {
    /// Log through `logger`, following its configuration
    pub fn new(logger: AppLogger) -> Self {
        Self { logger }
    }

    /// The logger records are written through
    pub fn logger(&self) -> &AppLogger {
        &self.logger
    }

    /// Run one exchange through `next`
    pub fn handle(
        &self,
        req: Request<Bytes>,
        next: BoxedNext,
    ) -> Pin<Box<dyn Future<Output = Response<Bytes>> + Send + 'static>> {
        let fut = run_exchange(self.logger.clone(), req, move |req| async move {
            Ok::<_, BoxError>(next(req).await)
        });
        Box::pin(async move {
            match fut.await {
                Ok(response) => response,
                Err(_) => internal_error(),
            }
        })
    }
}

impl<S> tower::Layer<S> for RequestLoggingLayer {
    type Service = RequestLoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggingService {
            inner,
            logger: self.logger.clone(),
        }
    }
}

/// Service produced by [`RequestLoggingLayer`]
#[derive(Clone, Debug)]
pub struct RequestLoggingService<S> {
    inner: S,
    logger: AppLogger,
}

impl<S> Service<Request<Bytes>> for RequestLoggingService<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
{
    type Response = Response<Bytes>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<Bytes>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(run_exchange(self.logger.clone(), req, move |req| {
            let fut = inner.call(req);
            async move { fut.await.map_err(Into::into) }
        }))
    }
}

fn internal_error() -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

fn correlation_header() -> HeaderName {
    HeaderName::from_static("x-correlation-id")
}

fn run_exchange<F, Fut>(
    logger: AppLogger,
    mut req: Request<Bytes>,
    next: F,
) -> impl Future<Output = Result<Response<Bytes>, BoxError>> + Send + 'static
where
    F: FnOnce(Request<Bytes>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Response<Bytes>, BoxError>> + Send + 'static,
{
    let incoming = req
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok());
    let id = CorrelationId::parse_or_generate(incoming);
    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        req.headers_mut().insert(correlation_header(), value);
    }

    let method = req.method().to_string();
    let target = capture::request_target(&req);
    let should_log = logger.should_log_path(req.uri().path());
    let carried = id.clone();

    async move {
        let started = Instant::now();
        let mut pending = None;

        if should_log {
            if let Some(info) = capture::logged_request(&logger, &req, true) {
                let remote = capture::remote_address(&req);
                let agent = capture::user_agent(&req);
                if let Err(err) = logger.log_incoming_request(
                    &method,
                    &target,
                    info,
                    remote.as_deref(),
                    agent.as_deref(),
                ) {
                    tracing::warn!(error = %err, "failed to log incoming request");
                }
            }
            pending = Some(PendingResponse {
                logger: logger.clone(),
                method: method.clone(),
                target: target.clone(),
                started,
                correlation: carried,
                armed: true,
            });
        }

        let result = next(req).await;
        let elapsed = started.elapsed().as_millis() as u64;

        // The handler may have re-bound the ID.
        let current = CorrelationContext::current();

        match result {
            Ok(mut response) => {
                if let Ok(value) = HeaderValue::from_str(current.as_str()) {
                    response.headers_mut().insert(correlation_header(), value);
                }
                if let Some(pending) = pending.take() {
                    pending.disarm();
                    if let Some(info) = capture::logged_response(&logger, &response) {
                        let status = response.status().as_u16();
                        if let Err(err) =
                            logger.log_incoming_response(&method, &target, status, elapsed, info)
                        {
                            tracing::warn!(error = %err, "failed to log incoming response");
                        }
                    }
                }
                Ok(response)
            }
            Err(error) => {
                if let Some(pending) = pending.take() {
                    pending.disarm();
                    if let Err(err) =
                        logger.log_incoming_failure(&method, &target, elapsed, &*error)
                    {
                        tracing::warn!(error = %err, "failed to log incoming failure");
                    }
                }
                Err(error)
            }
        }
    }
    .with_correlation(id)
}

/// Writes the 499 record if dropped while still armed
struct PendingResponse {
    logger: AppLogger,
    method: String,
    target: String,
    started: Instant,
    correlation: CorrelationId,
    armed: bool,
}

impl PendingResponse {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let _scope = CorrelationContext::scope(self.correlation.clone());
        let elapsed = self.started.elapsed().as_millis() as u64;
        if let Err(err) = self
            .logger
            .log_incoming_cancelled(&self.method, &self.target, elapsed)
        {
            tracing::warn!(error = %err, "failed to log cancelled request");
        }
    }
}
