//! Integration tests for the gateway HTTP frontend

mod device_udp;
mod proxy_routes;

use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chipgw_coap::test_utils::MockTransport;
use chipgw_coap::{CoapBridge, CoapConfig};
use chipgw_node::{create_router, AppState};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

/// Router backed by a mock device transport
pub fn app_with(transport: Arc<MockTransport>) -> Router {
    let bridge = CoapBridge::new(transport, CoapConfig::default());
    create_router(Arc::new(AppState::new(bridge)))
}

pub async fn body_string(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Send one request and collect status, headers and body
pub async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, HeaderMap, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(String::new())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    (status, headers, body_string(response).await)
}
