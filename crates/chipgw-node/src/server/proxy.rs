//! Proxy endpoint

use axum::{
    extract::{rejection::PathRejection, Path, State},
    http::{header, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use chipgw_coap::{BridgeError, HttpEquivalentResponse, OutboundRequest};
use std::sync::Arc;
use tracing::{info, warn};

use crate::AppState;

/// Body of every failed request
pub const ERROR_BODY: &str = "There was an error";

/// Methods advertised to browsers on successful responses
pub const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE";

/// Content type of non-CBOR responses
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

/// Forward a request to the device named by the first path segment
pub async fn forward(
    State(state): State<Arc<AppState>>,
    method: Method,
    path: Result<Path<(String, String)>, PathRejection>,
) -> Response {
    match path {
        Ok(Path((target, path))) => proxy(&state, method, target, path).await,
        Err(rejection) => rejected(rejection),
    }
}

/// Forward a request for the device's root resource, `/{target}/`
pub async fn forward_root(
    State(state): State<Arc<AppState>>,
    method: Method,
    path: Result<Path<String>, PathRejection>,
) -> Response {
    match path {
        Ok(Path(target)) => proxy(&state, method, target, "/".to_string()).await,
        Err(rejection) => rejected(rejection),
    }
}

async fn proxy(state: &AppState, method: Method, target: String, path: String) -> Response {
    info!(target_address = %target, path = %path, method = %method, "Proxying request");

    let request = match OutboundRequest::with_method_name(target, path, method.as_str()) {
        Ok(request) => request,
        Err(e) => return failure(e),
    };

    match state.bridge.translate(request).await {
        Ok(response) => success(response),
        Err(e) => failure(e),
    }
}

fn rejected(rejection: PathRejection) -> Response {
    warn!(error_code = "ROUTING", "Unusable request path: {}", rejection);
    error_response()
}

/// Requests matching no route
pub async fn unmatched(method: Method, uri: Uri) -> Response {
    warn!(error_code = "ROUTING", method = %method, uri = %uri, "No route for request");
    error_response()
}

fn success(response: HttpEquivalentResponse) -> Response {
    let Ok(status) = StatusCode::from_u16(response.status) else {
        warn!(status = response.status, "Remapped status is not a valid HTTP status");
        return error_response();
    };
    let content_type = response.content_type.unwrap_or(DEFAULT_CONTENT_TYPE);

    (
        status,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
            (
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(ALLOWED_METHODS),
            ),
        ],
        response.body,
    )
        .into_response()
}

fn failure(error: BridgeError) -> Response {
    match error.response() {
        Some(device) => warn!(
            error_code = error.error_code(),
            code = %device.code,
            content_format = %device.content_format,
            payload = %device.payload.to_json(),
            "Device returned an error status"
        ),
        None => warn!(error_code = error.error_code(), "Request failed: {}", error),
    }
    error_response()
}

fn error_response() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, ERROR_BODY).into_response()
}
