// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Remote call transports.
//!
//! Two mechanisms reach the graph:
//! - **XML-RPC over HTTP** for the registry (master) API and each node's
//!   slave API
//! - **TCPROS service calls** for node-local services such as the logger
//!   services
//!
//! Both go through the [`Transport`] trait so the clients above can be
//! exercised against a recording transport in tests.

pub mod tcpros;
pub mod xmlrpc;

pub use tcpros::ServiceRequest;
pub use xmlrpc::{Value, XmlRpcReply};

use crate::error::{ChaosError, Result};
use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;

/// Outbound call mechanism.
pub trait Transport: Send + Sync {
    /// Invoke `method` on the XML-RPC server at `uri`.
    fn xmlrpc_call<'a>(
        &'a self,
        uri: &'a str,
        method: &'a str,
        params: Vec<Value>,
    ) -> BoxFuture<'a, Result<XmlRpcReply>>;

    /// Invoke a node-local service at a `rosrpc://host:port` address.
    fn service_call<'a>(
        &'a self,
        service_uri: &'a str,
        request: ServiceRequest,
    ) -> BoxFuture<'a, Result<Vec<u8>>>;
}

/// Production transport: `reqwest` for XML-RPC, raw TCP for services.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    async fn post(&self, uri: &str, method: &str, params: Vec<Value>) -> Result<XmlRpcReply> {
        let body = xmlrpc::encode_call(method, &params);
        tracing::trace!(uri, method, "XML-RPC call");

        let response = self
            .client
            .post(uri)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .await
            .map_err(|e| classify(uri, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChaosError::protocol(
                method,
                i32::from(status.as_u16()),
                format!("HTTP {} from {}", status, uri),
            ));
        }

        let text = response.text().await.map_err(|e| classify(uri, e))?;
        xmlrpc::decode_response(&text)
    }

    async fn call_service(&self, service_uri: &str, request: ServiceRequest) -> Result<Vec<u8>> {
        let addr = tcpros::parse_rosrpc_uri(service_uri)?;
        tracing::trace!(service = %request.service, %addr, "Service call");

        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| ChaosError::communication(service_uri, e))?;
        tcpros::call(&mut stream, &request).await
    }
}

impl Transport for HttpTransport {
    fn xmlrpc_call<'a>(
        &'a self,
        uri: &'a str,
        method: &'a str,
        params: Vec<Value>,
    ) -> BoxFuture<'a, Result<XmlRpcReply>> {
        Box::pin(self.post(uri, method, params))
    }

    fn service_call<'a>(
        &'a self,
        service_uri: &'a str,
        request: ServiceRequest,
    ) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(self.call_service(service_uri, request))
    }
}

/// Connect failures never reached the peer; everything else did.
fn classify(uri: &str, err: reqwest::Error) -> ChaosError {
    if err.is_connect() || err.is_builder() {
        ChaosError::communication(uri, err)
    } else {
        tracing::debug!(uri, error = %err, "Request sent but no reply");
        ChaosError::no_reply(uri)
    }
}

/// Bound `call` by `timeout`; an elapsed deadline reads as no reply from `target`.
pub async fn with_timeout<T, F>(timeout: Duration, target: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::debug!(peer = target, ?timeout, "Call timed out");
            Err(ChaosError::no_reply(target))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_elapsed() {
        let result: Result<()> = with_timeout(Duration::from_millis(10), "/slow", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ChaosError::NoReply { ref target }) if target == "/slow"));
    }

    #[tokio::test]
    async fn test_with_timeout_passthrough() {
        let result = with_timeout(Duration::from_secs(1), "/fast", async { Ok(7) }).await;
        assert_eq!(result.expect("value"), 7);
    }

    #[tokio::test]
    async fn test_connect_refused_is_communication() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let transport = HttpTransport::new();
        let uri = format!("http://127.0.0.1:{}/", port);
        let err = transport
            .xmlrpc_call(&uri, "getSystemState", vec!["/roschaos".into()])
            .await
            .expect_err("refused");
        assert!(matches!(err, ChaosError::Communication { .. }));
    }
}
