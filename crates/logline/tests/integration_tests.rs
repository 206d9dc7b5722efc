//! Integration tests for logline
//!
//! These tests drive whole exchanges through the tower layers and check the
//! JSON lines that come out the other end.

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use logline::prelude::*;
use logline::BoxError;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::{Layer, ServiceExt};

fn factory_with(config: LoggingConfiguration) -> (AppLoggerFactory, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let factory = AppLoggerFactory::with_sink("orders", Arc::new(config), sink.clone()).unwrap();
    (factory, sink)
}

// ============================================================================
// Inbound exchanges
// ============================================================================

mod inbound_tests {
    use super::*;

    #[tokio::test]
    async fn test_masked_request_with_matching_ids() {
        let (factory, sink) = factory_with(LoggingConfiguration::default());
        let service = RequestLoggingLayer::new(factory.get_logger("orders::http")).layer(
            tower::service_fn(|_req: Request<Bytes>| async {
                Ok::<_, BoxError>(Response::new(Bytes::from_static(b"ok")))
            }),
        );

        let req = Request::builder()
            .method("GET")
            .uri("/api/orders?id=7")
            .header("Authorization", "Bearer xyz")
            .body(Bytes::new())
            .unwrap();
        let response = service.oneshot(req).await.unwrap();
        let id = response.headers()[CORRELATION_ID_HEADER].to_str().unwrap().to_string();

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);

        let request = &entries[0];
        assert_eq!(request["type"], "request");
        assert_eq!(request["method"], "GET");
        assert_eq!(request["uri"], "/api/orders?id=7");
        assert_eq!(request["request_body"]["headers"]["Authorization"], "***MASKED***");
        assert_eq!(request["request_body"]["query_params"]["id"], "7");
        assert_eq!(request["application"], "orders");

        assert_eq!(entries[1]["status_code"], 200);
        assert_eq!(entries[0]["correlation_id"], Value::String(id.clone()));
        assert_eq!(entries[1]["correlation_id"], Value::String(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_server_error_logged_at_error() {
        let (factory, sink) = factory_with(LoggingConfiguration::default());
        let service = RequestLoggingLayer::new(factory.get_logger("orders::http")).layer(
            tower::service_fn(|_req: Request<Bytes>| async {
                tokio::time::sleep(Duration::from_millis(120)).await;
                let mut res = Response::new(Bytes::new());
                *res.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
                Ok::<_, BoxError>(res)
            }),
        );

        let req = Request::builder().uri("/api/slow").body(Bytes::new()).unwrap();
        service.oneshot(req).await.unwrap();

        let response = &sink.entries()[1];
        assert_eq!(response["level"], "ERROR");
        assert_eq!(response["level_value"], 40000);
        assert_eq!(response["status_code"], 503);
        assert_eq!(response["duration_ms"], 120);
    }

    #[tokio::test]
    async fn test_health_probe_not_logged_but_correlated() {
        let (factory, sink) = factory_with(LoggingConfiguration::default());
        let service = RequestLoggingLayer::new(factory.get_logger("orders::http")).layer(
            tower::service_fn(|_req: Request<Bytes>| async {
                Ok::<_, BoxError>(Response::new(Bytes::new()))
            }),
        );

        let req = Request::builder().uri("/health/live").body(Bytes::new()).unwrap();
        let response = service.oneshot(req).await.unwrap();

        assert!(response.headers().contains_key(CORRELATION_ID_HEADER));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_application_records_share_the_request_id() {
        let (factory, sink) = factory_with(LoggingConfiguration::default());
        let app_logger = factory.get_logger("orders::service");
        let service = RequestLoggingLayer::new(factory.get_logger("orders::http")).layer(
            tower::service_fn(move |_req: Request<Bytes>| {
                let app_logger = app_logger.clone();
                async move {
                    let logged = app_logger
                        .event(Level::Info, "order placed")
                        .field("order_id", 7)
                        .emit();
                    match logged {
                        Ok(()) => Ok::<_, BoxError>(Response::new(Bytes::new())),
                        Err(err) => Err(Box::new(err) as BoxError),
                    }
                }
            }),
        );

        let req = Request::builder()
            .uri("/api/orders")
            .header("x-correlation-id", "req-77")
            .body(Bytes::new())
            .unwrap();
        service.oneshot(req).await.unwrap();

        let entries = sink.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1]["type"], "application");
        assert_eq!(entries[1]["logger_name"], "orders::service");
        assert_eq!(entries[1]["extra"]["order_id"], 7);
        assert!(entries.iter().all(|e| e["correlation_id"] == "req-77"));
    }
}

// ============================================================================
// Outbound propagation
// ============================================================================

mod outbound_tests {
    use super::*;

    #[tokio::test]
    async fn test_downstream_call_carries_inbound_id() {
        let (factory, sink) = factory_with(LoggingConfiguration::default());

        let client = ClientLoggingLayer::new(factory.get_logger("orders::client")).layer(
            tower::service_fn(|req: Request<Bytes>| async move {
                let seen = req.headers()["x-correlation-id"].clone();
                let mut res = Response::new(Bytes::from_static(br#"{"reserved":true}"#));
                res.headers_mut().insert("x-seen", seen);
                Ok::<_, BoxError>(res)
            }),
        );

        let service = RequestLoggingLayer::new(factory.get_logger("orders::http")).layer(
            tower::service_fn(move |_req: Request<Bytes>| {
                let client = client.clone();
                async move {
                    let downstream = Request::builder()
                        .method("POST")
                        .uri("http://inventory.internal/api/reserve")
                        .body(Bytes::from_static(br#"{"sku":"A-1","token":"t0"}"#))
                        .unwrap();
                    let call: std::pin::Pin<
                        Box<dyn std::future::Future<Output = Result<Response<Bytes>, BoxError>> + Send>,
                    > = Box::pin(client.oneshot(downstream));
                    let reply = match call.await {
                        Ok(reply) => reply,
                        Err(err) => return Err::<Response<Bytes>, BoxError>(err),
                    };
                    let mut res = Response::new(Bytes::new());
                    res.headers_mut()
                        .insert("x-downstream-saw", reply.headers()["x-seen"].clone());
                    Ok::<_, BoxError>(res)
                }
            }),
        );

        let req = Request::builder()
            .uri("/api/checkout")
            .header("x-correlation-id", "chk-1")
            .body(Bytes::new())
            .unwrap();
        let response = service.oneshot(req).await.unwrap();
        assert_eq!(response.headers()["x-downstream-saw"], "chk-1");

        let entries = sink.entries();
        let messages: Vec<&str> = entries.iter().map(|e| e["message"].as_str().unwrap()).collect();
        assert_eq!(
            messages,
            [
                "Incoming request",
                "Outgoing request",
                "Outgoing response",
                "Incoming response"
            ]
        );
        assert_eq!(entries[1]["request_body"]["body"]["token"], "***MASKED***");
        assert_eq!(entries[1]["request_body"]["body"]["sku"], "A-1");
        assert_eq!(entries[2]["extra"]["direction"], "outgoing");
        assert!(entries.iter().all(|e| e["correlation_id"] == "chk-1"));
    }
}

// ============================================================================
// Line schema and configuration
// ============================================================================

mod schema_tests {
    use super::*;

    #[tokio::test]
    async fn test_top_level_key_order() {
        let (factory, sink) = factory_with(LoggingConfiguration::default());
        let service = RequestLoggingLayer::new(factory.get_logger("orders::http")).layer(
            tower::service_fn(|_req: Request<Bytes>| async {
                Ok::<_, BoxError>(Response::new(Bytes::new()))
            }),
        );
        let req = Request::builder()
            .method("POST")
            .uri("/api/orders")
            .header("user-agent", "curl/8.0")
            .body(Bytes::new())
            .unwrap();
        service.oneshot(req).await.unwrap();

        let line = &sink.lines()[1].line;
        let keys = [
            "@timestamp",
            "@version",
            "application",
            "message",
            "logger_name",
            "thread_name",
            "level",
            "level_value",
            "type",
            "correlation_id",
            "method",
            "uri",
            "status_code",
            "duration_ms",
            "request_body",
            "response_body",
        ];
        let positions: Vec<usize> = keys
            .iter()
            .map(|key| {
                line.find(&format!("\"{}\":", key))
                    .unwrap_or_else(|| panic!("missing key {key} in {line}"))
            })
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{line}");

        let request_line = &sink.lines()[0].line;
        assert!(request_line.contains("\"user_agent\":\"curl/8.0\""));
    }

    #[tokio::test]
    async fn test_json_configuration_drives_masking_and_filters() {
        let config = LoggingConfiguration::from_json_str(
            r#"{
                "applicationName": "billing",
                "request": { "excludePatterns": ["/internal/**"] },
                "maskedFields": ["iban"],
                "maskValue": "[hidden]"
            }"#,
        )
        .unwrap();
        let (factory, sink) = factory_with(config);
        let service = RequestLoggingLayer::new(factory.get_logger("billing::http")).layer(
            tower::service_fn(|req: Request<Bytes>| async move {
                Ok::<_, BoxError>(Response::new(req.into_body()))
            }),
        );

        let internal = Request::builder().uri("/internal/metrics").body(Bytes::new()).unwrap();
        service.clone().oneshot(internal).await.unwrap();
        assert!(sink.is_empty());

        let req = Request::builder()
            .method("POST")
            .uri("/api/payout")
            .body(Bytes::from_static(br#"{"iban":"DE89370400440532013000","amount":10}"#))
            .unwrap();
        service.oneshot(req).await.unwrap();

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["application"], "billing");
        assert_eq!(entries[0]["request_body"]["body"]["iban"], "[hidden]");
        assert_eq!(entries[0]["request_body"]["body"]["amount"], 10);
    }
}
