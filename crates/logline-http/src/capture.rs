//! Capture of `http` messages into logline's request and response records

use bytes::Bytes;
use http::header::{CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, Request, Response};
use logline_core::capture::{capture_body, capture_headers};
use logline_core::{AppLogger, Level, RequestInfo, ResponseInfo};
use std::borrow::Cow;
use std::net::SocketAddr;

/// Headers in `map` as masked name/value pairs
pub(crate) fn headers(logger: &AppLogger, map: &HeaderMap) -> std::collections::BTreeMap<String, String> {
    let pairs: Vec<(&str, Cow<'_, str>)> = map
        .iter()
        .map(|(name, value)| (name.as_str(), String::from_utf8_lossy(value.as_bytes())))
        .collect();
    let canonical: Vec<(String, &str)> = pairs
        .iter()
        .map(|(name, value)| (canonical_name(name), value.as_ref()))
        .collect();
    capture_headers(
        canonical.iter().map(|(name, value)| (name.as_str(), *value)),
        logger.masking(),
    )
}

/// `content-type` becomes `Content-Type`
fn canonical_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn content_type(map: &HeaderMap) -> Option<String> {
    map.get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Capture an inbound or outbound request according to the logger's settings
pub(crate) fn request_info(logger: &AppLogger, req: &Request<Bytes>, with_query: bool) -> RequestInfo {
    let settings = &logger.config().request;
    let mut builder = RequestInfo::builder();
    if settings.log_headers {
        builder = builder.headers(headers(logger, req.headers()));
    }
    if with_query {
        if let Some(query) = req.uri().query() {
            builder = builder.query(query);
        }
    }
    if settings.log_body {
        builder = builder
            .body(capture_body(req.body(), settings.max_body_size, logger.masking()))
            .content_length(req.body().len() as u64);
    }
    if let Some(content_type) = content_type(req.headers()) {
        builder = builder.content_type(content_type);
    }
    builder.build()
}

/// Capture a response according to the logger's settings
pub(crate) fn response_info(logger: &AppLogger, res: &Response<Bytes>) -> ResponseInfo {
    let settings = &logger.config().request;
    let mut builder = ResponseInfo::builder();
    if settings.log_headers {
        builder = builder.headers(headers(logger, res.headers()));
    }
    if settings.log_response_body {
        builder = builder
            .body(capture_body(res.body(), settings.max_body_size, logger.masking()))
            .content_length(res.body().len() as u64);
    }
    if let Some(content_type) = content_type(res.headers()) {
        builder = builder.content_type(content_type);
    }
    builder.build()
}

/// Capture a request only if its INFO record would be written
pub(crate) fn logged_request(
    logger: &AppLogger,
    req: &Request<Bytes>,
    with_query: bool,
) -> Option<RequestInfo> {
    logger
        .is_request_logging_enabled(Level::Info)
        .then(|| request_info(logger, req, with_query))
}

/// Capture a response only if its record, at the level its status maps to,
/// would be written
pub(crate) fn logged_response(logger: &AppLogger, res: &Response<Bytes>) -> Option<ResponseInfo> {
    logger
        .is_request_logging_enabled(Level::for_status(res.status().as_u16()))
        .then(|| response_info(logger, res))
}

/// Path and query of the request target, as sent by the client
pub(crate) fn request_target<B>(req: &Request<B>) -> String {
    req.uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string())
}

/// Client address from proxy headers, falling back to the socket peer
pub(crate) fn remote_address<B>(req: &Request<B>) -> Option<String> {
    req.headers()
        .get("x-forwarded-for")
        .or_else(|| req.headers().get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            req.extensions()
                .get::<SocketAddr>()
                .map(|addr| addr.ip().to_string())
        })
}

pub(crate) fn user_agent<B>(req: &Request<B>) -> Option<String> {
    req.headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}
