//! End-to-end tests through a loopback UDP device

use axum::http::{header, StatusCode};
use chipgw_coap::test_utils::{response_to, spawn_udp_device};
use chipgw_coap::{CoapBridge, CoapConfigBuilder, Code, ContentFormat, MessageType};
use chipgw_node::server::proxy::ERROR_BODY;
use chipgw_node::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::send;

fn udp_app() -> axum::Router {
    let config = CoapConfigBuilder::new()
        .ack_timeout(Duration::from_millis(50))
        .exchange_timeout(Duration::from_secs(2))
        .build();
    create_router(Arc::new(AppState::new(CoapBridge::udp(config))))
}

#[tokio::test]
async fn test_proxy_to_udp_device() {
    let addr = spawn_udp_device(|request| {
        if request.message_type == MessageType::Acknowledgement {
            return Vec::new();
        }
        // {"ok": true}
        let payload = vec![0xA1, 0x62, b'o', b'k', 0xF5];
        vec![response_to(request, Code::CONTENT, Some(ContentFormat::Cbor), payload)]
    })
    .await
    .unwrap();

    let uri = format!("/{}/info", addr);
    let (status, headers, body) = send(udp_app(), "GET", &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({"ok": true}));
}

#[tokio::test]
async fn test_device_reset_is_500() {
    let addr = spawn_udp_device(|request| {
        vec![chipgw_coap::Message::new(
            MessageType::Reset,
            Code::EMPTY,
            request.message_id,
            Default::default(),
        )]
    })
    .await
    .unwrap();

    let uri = format!("/{}/info", addr);
    let (status, _, body) = send(udp_app(), "POST", &uri).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, ERROR_BODY);
}

#[tokio::test]
async fn test_large_device_response_is_not_truncated() {
    let addr = spawn_udp_device(|request| {
        if request.message_type == MessageType::Acknowledgement {
            return Vec::new();
        }
        vec![response_to(
            request,
            Code::CONTENT,
            Some(ContentFormat::TextPlain),
            vec![b'a'; 2000],
        )]
    })
    .await
    .unwrap();

    let uri = format!("/{}/big", addr);
    let (status, _, body) = send(udp_app(), "GET", &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.len(), 2002);
}
