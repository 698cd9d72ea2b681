// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Registry client over the real HTTP transport, against a one-shot
// loopback master.

use roschaos::{ChaosError, HttpTransport, RegistryClient, Session};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

fn response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

fn status_triple(code: i32, value: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?><methodResponse><params><param><value><array><data>\
         <value><i4>{}</i4></value><value><string>status</string></value>{}\
         </data></array></value></param></params></methodResponse>",
        code, value
    )
}

/// Serve one request with `reply`, returning the raw request text.
async fn serve_once(reply: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let uri = format!("http://{}/", listener.local_addr().expect("addr"));

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        while !String::from_utf8_lossy(&request).contains("</methodCall>") {
            let n = stream.read(&mut buf).await.expect("read");
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        stream.write_all(reply.as_bytes()).await.expect("write");
        stream.shutdown().await.ok();
        String::from_utf8_lossy(&request).into_owned()
    });

    (uri, handle)
}

#[tokio::test]
async fn test_lookup_node_over_http() {
    let body = status_triple(1, "<value><string>http://talker:4000/</string></value>");
    let (uri, server) = serve_once(response(&body)).await;

    let registry = RegistryClient::new(Arc::new(HttpTransport::new()));
    let session = Session::new(uri).with_timeout(Duration::from_secs(5));
    let address = registry
        .lookup_node(&session, "/talker")
        .await
        .expect("lookup");
    assert_eq!(address, "http://talker:4000/");

    let request = server.await.expect("server");
    assert!(request.starts_with("POST / HTTP/1.1"));
    assert!(request.contains("<methodName>lookupNode</methodName>"));
    assert!(request.contains("<string>/roschaos</string>"));
    assert!(request.contains("<string>/talker</string>"));
}

#[tokio::test]
async fn test_unknown_node_over_http() {
    let body = status_triple(-1, "<value><i4>0</i4></value>");
    let (uri, server) = serve_once(response(&body)).await;

    let registry = RegistryClient::new(Arc::new(HttpTransport::new()));
    let session = Session::new(uri).with_timeout(Duration::from_secs(5));
    let err = registry
        .lookup_node(&session, "/ghost")
        .await
        .expect_err("unknown");
    assert!(matches!(err, ChaosError::AddressNotFound { ref name } if name == "/ghost"));
    server.await.expect("server");
}

#[tokio::test]
async fn test_silent_master_is_no_reply() {
    // Accepts the connection but never answers.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let uri = format!("http://{}/", listener.local_addr().expect("addr"));
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(stream);
    });

    let registry = RegistryClient::new(Arc::new(HttpTransport::new()));
    let session = Session::new(uri).with_timeout(Duration::from_millis(100));
    let err = registry
        .system_state(&session)
        .await
        .expect_err("timeout");
    assert!(matches!(err, ChaosError::NoReply { .. }));
    server.abort();
}
