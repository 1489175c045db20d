use std::{collections::BTreeMap, sync::Arc};

use serde_json::json;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    task::JoinHandle,
};

use portal_core::api::{
    ApiClient, ApiErrorKind,
    transport::ReqwestTransport,
    types::ApiConfig,
};

/// Serves one canned HTTP/1.1 response and hands back the raw request head.
async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local listener");
    let address = listener.local_addr().expect("local address");

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept connection");
        let mut received = Vec::new();
        let mut buffer = [0_u8; 4096];
        loop {
            let read = socket.read(&mut buffer).await.expect("read request");
            if read == 0 {
                break;
            }
            received.extend_from_slice(&buffer[..read]);
            if received.windows(4).any(|window| window == b"\r\n\r\n") {
                break;
            }
        }

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        socket
            .write_all(response.as_bytes())
            .await
            .expect("write response");
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&received).to_string()
    });

    (format!("http://{}", address), handle)
}

fn client_for(base_url: String) -> ApiClient {
    let transport = ReqwestTransport::new().expect("reqwest client builds");
    ApiClient::with_transport(
        ApiConfig {
            base_url,
            ..ApiConfig::default()
        },
        Arc::new(transport),
    )
}

#[tokio::test]
async fn given_local_server_when_getting_json_then_body_is_parsed_and_headers_sent() {
    let (base_url, server) = serve_once("200 OK", r#"{"points":120}"#).await;
    let client = client_for(base_url);

    let mut filters = BTreeMap::new();
    filters.insert("period".to_string(), "month".to_string());
    let body = client
        .get_json("/api/rewards/points", filters)
        .await
        .expect("get should succeed");

    assert_eq!(body, json!({"points": 120}));
    let head = server.await.expect("server task").to_ascii_lowercase();
    assert!(head.starts_with("get /api/rewards/points?period=month http/1.1"));
    assert!(head.contains("accept: application/json"));
    assert!(head.contains("x-request-id: "));
    assert!(!head.contains("authorization:"));
}

#[tokio::test]
async fn given_local_server_error_when_getting_json_then_http_error_is_mapped() {
    let (base_url, server) = serve_once("503 Service Unavailable", r#"{"error":"maintenance"}"#).await;
    let client = client_for(base_url);

    let err = client
        .get_json("/api/dashboard", BTreeMap::new())
        .await
        .expect_err("503 must fail");
    server.await.expect("server task");

    assert_eq!(err.kind, ApiErrorKind::Http);
    assert_eq!(err.status, Some(503));
    assert!(err.message.contains("maintenance"));
}

#[tokio::test]
async fn given_closed_port_when_getting_json_then_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local listener");
    let address = listener.local_addr().expect("local address");
    drop(listener);

    let client = client_for(format!("http://{}", address));
    let err = client
        .get_json("/api/dashboard", BTreeMap::new())
        .await
        .expect_err("nothing is listening");

    assert_eq!(err.kind, ApiErrorKind::Transport);
}
