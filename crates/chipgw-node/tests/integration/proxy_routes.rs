//! Proxy route tests against a mock device transport

use axum::http::{header, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chipgw_coap::test_utils::{response_to, MockTransport};
use chipgw_coap::{Code, ContentFormat};
use chipgw_node::server::proxy::{ALLOWED_METHODS, DEFAULT_CONTENT_TYPE, ERROR_BODY};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use super::{app_with, send};

// {"x": 1}
const CBOR_MAP: [u8; 4] = [0xA1, 0x61, 0x78, 0x01];

fn cbor_device(payload: Vec<u8>) -> Arc<MockTransport> {
    Arc::new(MockTransport::replying(
        Code::CONTENT,
        Some(ContentFormat::Cbor),
        payload,
    ))
}

#[tokio::test]
async fn test_cbor_response_becomes_json() {
    let app = app_with(cbor_device(CBOR_MAP.to_vec()));
    let (status, headers, body) = send(app, "GET", "/10.0.0.7/info").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], ALLOWED_METHODS);
    assert_eq!(body, r#"{"x":1}"#);
}

#[tokio::test]
async fn test_text_response_is_json_string() {
    let device = Arc::new(MockTransport::replying(
        Code::CONTENT,
        Some(ContentFormat::TextPlain),
        b"hello".to_vec(),
    ));
    let (status, headers, body) = send(app_with(device), "GET", "/10.0.0.7/hello").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], DEFAULT_CONTENT_TYPE);
    assert_eq!(body, r#""hello""#);
}

#[tokio::test]
async fn test_success_statuses_are_remapped() {
    let cases = [
        (Code::CONTENT, StatusCode::OK),
        (Code::VALID, StatusCode::NO_CONTENT),
        (Code::CHANGED, StatusCode::NO_CONTENT),
        (Code::CREATED, StatusCode::CREATED),
        (Code::DELETED, StatusCode::ACCEPTED),
    ];

    for (code, expected) in cases {
        let device = Arc::new(MockTransport::replying(code, None, Vec::new()));
        let (status, headers, _) = send(app_with(device), "PUT", "/10.0.0.7/fs/a.lua").await;
        assert_eq!(status, expected, "device code {}", code);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}

#[tokio::test]
async fn test_error_status_becomes_generic_500() {
    for code in [Code::NOT_FOUND, Code::BAD_OPTION, Code::INTERNAL_SERVER_ERROR] {
        let device = Arc::new(MockTransport::replying(
            code,
            Some(ContentFormat::TextPlain),
            b"nope".to_vec(),
        ));
        let (status, headers, body) = send(app_with(device), "GET", "/10.0.0.7/info").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, ERROR_BODY);
        assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }
}

#[tokio::test]
async fn test_malformed_cbor_is_500() {
    // Map announcing one entry with nothing after it
    let app = app_with(cbor_device(vec![0xA1]));
    let (status, _, body) = send(app, "GET", "/10.0.0.7/info").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, ERROR_BODY);
}

#[tokio::test]
async fn test_byte_strings_render_as_base64() {
    // {"data": h'010203ff'}
    let payload = vec![0xA1, 0x64, b'd', b'a', b't', b'a', 0x44, 0x01, 0x02, 0x03, 0xFF];
    let (status, _, body) = send(app_with(cbor_device(payload)), "GET", "/10.0.0.7/blob").await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    let encoded = json["data"].as_str().unwrap();
    assert_eq!(STANDARD.decode(encoded).unwrap(), vec![0x01, 0x02, 0x03, 0xFF]);
}

#[tokio::test]
async fn test_one_exchange_per_request() {
    let device = cbor_device(CBOR_MAP.to_vec());
    let app = app_with(device.clone());

    let (status, _, _) = send(app, "PUT", "/10.0.0.7/fs/init.lua").await;
    assert_eq!(status, StatusCode::OK);

    let requests = device.requests();
    assert_eq!(requests.len(), 1);
    let (endpoint, message) = &requests[0];
    assert_eq!(endpoint.to_string(), "10.0.0.7:5683");
    assert_eq!(message.code, Code::PUT);
    assert_eq!(message.path(), "/fs/init.lua");
}

#[tokio::test]
async fn test_ipv6_target() {
    let device = cbor_device(CBOR_MAP.to_vec());
    let app = app_with(device.clone());

    let (status, _, _) = send(app, "DELETE", "/fdbf:1afc:5480:1::964d/fs/old.lua").await;
    assert_eq!(status, StatusCode::OK);

    let (endpoint, message) = &device.requests()[0];
    assert_eq!(endpoint.to_string(), "[fdbf:1afc:5480:1::964d]:5683");
    assert_eq!(message.code, Code::DELETE);
}

#[tokio::test]
async fn test_empty_path_targets_device_root() {
    let device = cbor_device(CBOR_MAP.to_vec());
    let (status, _, body) = send(app_with(device.clone()), "GET", "/10.0.0.7/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"x":1}"#);

    let requests = device.requests();
    assert_eq!(requests.len(), 1);
    let (endpoint, message) = &requests[0];
    assert_eq!(endpoint.to_string(), "10.0.0.7:5683");
    assert_eq!(message.code, Code::GET);
    assert_eq!(message.path(), "/");
    assert!(message.option_values(chipgw_coap::message::option::URI_PATH).next().is_none());
}

#[tokio::test]
async fn test_unsupported_method_is_500() {
    let device = cbor_device(CBOR_MAP.to_vec());
    let (status, _, body) = send(app_with(device.clone()), "OPTIONS", "/10.0.0.7/info").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, ERROR_BODY);
    assert_eq!(device.request_count(), 0);
}

#[tokio::test]
async fn test_unmatched_paths_are_500() {
    let device = cbor_device(CBOR_MAP.to_vec());

    for uri in ["/", "/10.0.0.7"] {
        let (status, _, body) = send(app_with(device.clone()), "GET", uri).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "uri {}", uri);
        assert_eq!(body, ERROR_BODY);
    }
    assert_eq!(device.request_count(), 0);
}

#[tokio::test]
async fn test_health_check() {
    let device = cbor_device(CBOR_MAP.to_vec());
    let (status, _, body) = send(app_with(device.clone()), "GET", "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
    assert_eq!(device.request_count(), 0);
}

#[tokio::test]
async fn test_concurrent_requests_are_independent() {
    let slow: SocketAddr = "10.0.0.8:5683".parse().unwrap();
    let device = Arc::new(
        MockTransport::new(move |endpoint, request| {
            if endpoint == slow {
                Ok(response_to(request, Code::NOT_FOUND, None, Vec::new()))
            } else {
                Ok(response_to(
                    request,
                    Code::CONTENT,
                    Some(ContentFormat::Cbor),
                    CBOR_MAP.to_vec(),
                ))
            }
        })
        .with_delay(slow, Duration::from_millis(100)),
    );
    let app = app_with(device.clone());

    let (failed, ok) = tokio::join!(
        send(app.clone(), "GET", "/10.0.0.8/info"),
        send(app, "GET", "/10.0.0.7/info"),
    );

    assert_eq!(failed.0, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(ok.0, StatusCode::OK);
    assert_eq!(serde_json::from_str::<Value>(&ok.2).unwrap(), json!({"x": 1}));
    assert_eq!(device.request_count(), 2);
}
