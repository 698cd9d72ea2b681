// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Peer (node slave API) client.
//!
//! `getMasterUri` and `shutdown` are direct XML-RPC calls on the node's
//! own endpoint. Logger control goes through the node's logger services
//! instead, resolved through the registry like any other service.

use crate::error::{ChaosError, Result};
use crate::logger::{
    GetLoggers, LoggerLevel, LoggerRecord, LoggerService, ServiceSchema, SetLoggerLevel,
};
use crate::registry::{RegistryClient, SystemState};
use crate::rpc::{self, xmlrpc, Transport, XmlRpcReply};
use crate::session::Session;
use std::sync::Arc;

/// `(topic, type)` pairs reported by a node.
pub type TopicPairs = Vec<(String, String)>;

/// Optional peer capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability<T> {
    Supported(T),
    /// The peer does not implement the call.
    Unsupported,
}

impl<T> Capability<T> {
    /// Convert to a result, naming the missing operation on `target`.
    pub fn supported(self, target: &str, operation: &str) -> Result<T> {
        match self {
            Self::Supported(value) => Ok(value),
            Self::Unsupported => Err(ChaosError::unsupported(target, operation)),
        }
    }
}

#[derive(Clone)]
pub struct PeerClient {
    transport: Arc<dyn Transport>,
    registry: RegistryClient,
}

impl PeerClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            registry: RegistryClient::new(transport.clone()),
            transport,
        }
    }

    /// `getMasterUri(caller_id)` on the node at `node_api`.
    ///
    /// A fault reply means the node does not implement the call.
    pub async fn get_master_uri(
        &self,
        session: &Session,
        node_api: &str,
    ) -> Result<Capability<String>> {
        let reply = rpc::with_timeout(
            session.timeout(),
            node_api,
            self.transport
                .xmlrpc_call(node_api, "getMasterUri", vec![session.caller_id().into()]),
        )
        .await?;

        if let XmlRpcReply::Fault { code, ref message } = reply {
            tracing::debug!(node_api, code, %message, "getMasterUri not implemented");
            return Ok(Capability::Unsupported);
        }
        let uri = xmlrpc::ros_status("getMasterUri", reply)?.into_string("getMasterUri")?;
        Ok(Capability::Supported(uri))
    }

    /// `getPublications(caller_id)`: `(topic, type)` pairs the node publishes.
    pub async fn get_publications(
        &self,
        session: &Session,
        node_api: &str,
    ) -> Result<Capability<TopicPairs>> {
        self.topic_pairs(session, node_api, "getPublications").await
    }

    /// `getSubscriptions(caller_id)`: `(topic, type)` pairs the node subscribes to.
    pub async fn get_subscriptions(
        &self,
        session: &Session,
        node_api: &str,
    ) -> Result<Capability<TopicPairs>> {
        self.topic_pairs(session, node_api, "getSubscriptions").await
    }

    async fn topic_pairs(
        &self,
        session: &Session,
        node_api: &str,
        method: &str,
    ) -> Result<Capability<TopicPairs>> {
        let reply = rpc::with_timeout(
            session.timeout(),
            node_api,
            self.transport
                .xmlrpc_call(node_api, method, vec![session.caller_id().into()]),
        )
        .await?;

        if let XmlRpcReply::Fault { .. } = reply {
            return Ok(Capability::Unsupported);
        }
        let pairs = xmlrpc::ros_status(method, reply)?.into_pair_list(method)?;
        Ok(Capability::Supported(pairs))
    }

    /// `shutdown(caller_id, reason)` on the node at `node_api`.
    ///
    /// Nodes may exit before replying, so a missing reply counts as done.
    pub async fn shutdown(&self, session: &Session, node_api: &str, reason: &str) -> Result<()> {
        let call = rpc::with_timeout(
            session.timeout(),
            node_api,
            self.transport.xmlrpc_call(
                node_api,
                "shutdown",
                vec![session.caller_id().into(), reason.into()],
            ),
        )
        .await;

        match call {
            Ok(reply) => xmlrpc::ros_status("shutdown", reply).map(drop),
            Err(ChaosError::NoReply { .. }) => {
                tracing::debug!(node_api, "No reply to shutdown, assuming terminated");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Logger services of `node`, if it provides both of them.
    pub fn discover_logger_service(state: &SystemState, node: &str) -> Option<LoggerService> {
        let service = LoggerService::for_node(node);
        let (mut get, mut set) = (false, false);
        for name in state.services_of(node) {
            get |= name == service.get_loggers;
            set |= name == service.set_logger_level;
        }
        (get && set).then_some(service)
    }

    /// Loggers currently configured in the node.
    pub async fn list_loggers(
        &self,
        session: &Session,
        service: &LoggerService,
    ) -> Result<Vec<LoggerRecord>> {
        self.call_service(session, &service.get_loggers, &GetLoggers)
            .await
    }

    pub async fn set_logger_level(
        &self,
        session: &Session,
        service: &LoggerService,
        logger: &str,
        level: LoggerLevel,
    ) -> Result<()> {
        let request = SetLoggerLevel {
            logger: logger.to_string(),
            level,
        };
        self.call_service(session, &service.set_logger_level, &request)
            .await
    }

    /// Resolve `service` through the registry and call it with `schema`.
    async fn call_service<S: ServiceSchema>(
        &self,
        session: &Session,
        service: &str,
        schema: &S,
    ) -> Result<S::Response> {
        let service_uri = self.registry.lookup_service(session, service).await?;
        let request = schema.request(session.caller_id(), service);
        let body = rpc::with_timeout(
            session.timeout(),
            &service_uri,
            self.transport.service_call(&service_uri, request),
        )
        .await?;
        S::decode_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(services: Vec<(&str, Vec<&str>)>) -> SystemState {
        SystemState {
            services: services
                .into_iter()
                .map(|(name, nodes)| {
                    (name.to_string(), nodes.into_iter().map(String::from).collect())
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_discover_logger_service() {
        let state = state(vec![
            ("/cam/get_loggers", vec!["/cam"]),
            ("/cam/set_logger_level", vec!["/cam"]),
            ("/lidar/get_loggers", vec!["/lidar"]),
        ]);
        let service = PeerClient::discover_logger_service(&state, "/cam").expect("cam");
        assert_eq!(service.set_logger_level, "/cam/set_logger_level");

        // Only one of the two services.
        assert!(PeerClient::discover_logger_service(&state, "/lidar").is_none());
        assert!(PeerClient::discover_logger_service(&state, "/ghost").is_none());
    }

    #[test]
    fn test_discover_requires_ownership() {
        // Name matches but another node provides it.
        let state = state(vec![
            ("/cam/get_loggers", vec!["/impostor"]),
            ("/cam/set_logger_level", vec!["/impostor"]),
        ]);
        assert!(PeerClient::discover_logger_service(&state, "/cam").is_none());
    }

    #[test]
    fn test_capability_supported() {
        let cap = Capability::Supported("http://m:11311/".to_string());
        assert_eq!(cap.supported("/a", "getMasterUri").expect("uri"), "http://m:11311/");
        let err = Capability::<String>::Unsupported
            .supported("/a", "getMasterUri")
            .expect_err("unsupported");
        assert!(matches!(err, ChaosError::Unsupported { .. }));
    }
}
