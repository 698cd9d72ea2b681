// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registry (master) client.
//!
//! Typed wrapper over the master XML-RPC API. Method names and positional
//! argument order follow the master API exactly. Mutations are issued with
//! the owning node's name as caller id, so the master treats them as coming
//! from that node.

use crate::error::{ChaosError, Result};
use crate::pool::{run_batch, BatchReport, Target};
use crate::rpc::{self, xmlrpc, Transport, Value};
use crate::session::Session;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Status code the master returns for unknown nodes and services.
const CODE_ERROR: i32 = -1;

/// A node together with its resolved XML-RPC address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: String,
    pub providers: BTreeSet<String>,
}

/// `getSystemState` snapshot: `(entity, [node])` lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemState {
    pub publishers: Vec<(String, Vec<String>)>,
    pub subscribers: Vec<(String, Vec<String>)>,
    pub services: Vec<(String, Vec<String>)>,
}

impl SystemState {
    /// Every node that publishes, subscribes or provides a service, sorted.
    pub fn node_names(&self) -> Vec<String> {
        let names: BTreeSet<&String> = self
            .publishers
            .iter()
            .chain(&self.subscribers)
            .chain(&self.services)
            .flat_map(|(_, nodes)| nodes)
            .collect();
        names.into_iter().cloned().collect()
    }

    pub fn services(&self) -> Vec<ServiceRecord> {
        self.services
            .iter()
            .map(|(name, nodes)| ServiceRecord {
                name: name.clone(),
                providers: nodes.iter().cloned().collect(),
            })
            .collect()
    }

    /// Every publication, subscription and service `nodes` hold.
    pub fn registrations_of(&self, nodes: &[NodeRecord]) -> Vec<Registration> {
        let mut plan = Vec::new();
        for node in nodes {
            for (topic, members) in &self.publishers {
                if members.contains(&node.name) {
                    plan.push(Registration::Publisher {
                        topic: topic.clone(),
                        node: node.name.clone(),
                        node_api: node.address.clone(),
                    });
                }
            }
            for (topic, members) in &self.subscribers {
                if members.contains(&node.name) {
                    plan.push(Registration::Subscriber {
                        topic: topic.clone(),
                        node: node.name.clone(),
                        node_api: node.address.clone(),
                    });
                }
            }
            for service in self.services_of(&node.name) {
                plan.push(Registration::Service {
                    service: service.to_string(),
                    node: node.name.clone(),
                });
            }
        }
        plan
    }

    /// Services provided by `node`.
    pub fn services_of<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.services
            .iter()
            .filter(move |(_, nodes)| nodes.iter().any(|n| n == node))
            .map(|(name, _)| name.as_str())
    }
}

/// One registration the master holds on behalf of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Publisher { topic: String, node: String, node_api: String },
    Subscriber { topic: String, node: String, node_api: String },
    Service { service: String, node: String },
}

impl Registration {
    pub fn target(&self) -> Target {
        match self {
            Self::Publisher { topic, node, .. } => {
                Target::new("unregister-publisher", topic).on_node(node)
            }
            Self::Subscriber { topic, node, .. } => {
                Target::new("unregister-subscriber", topic).on_node(node)
            }
            Self::Service { service, node } => {
                Target::new("unregister-service", service).on_node(node)
            }
        }
    }
}

/// Client for the registry API.
#[derive(Clone)]
pub struct RegistryClient {
    transport: Arc<dyn Transport>,
}

impl RegistryClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Issue `method` against the session's registry and unpack the status triple.
    async fn call(&self, session: &Session, method: &str, params: Vec<Value>) -> Result<Value> {
        let uri = session.registry_uri();
        let reply = rpc::with_timeout(
            session.timeout(),
            uri,
            self.transport.xmlrpc_call(uri, method, params),
        )
        .await?;
        xmlrpc::ros_status(method, reply)
    }

    /// `getSystemState(caller_id)`.
    pub async fn system_state(&self, session: &Session) -> Result<SystemState> {
        let value = self
            .call(session, "getSystemState", vec![session.caller_id().into()])
            .await?;
        let mut lists = value.into_array("getSystemState")?.into_iter();
        let mut next = || {
            lists
                .next()
                .ok_or_else(|| ChaosError::Decode("getSystemState: missing list".into()))
                .and_then(|v| v.into_membership_list("getSystemState"))
        };
        Ok(SystemState {
            publishers: next()?,
            subscribers: next()?,
            services: next()?,
        })
    }

    /// Names of every node in the graph, sorted.
    pub async fn list_nodes(&self, session: &Session) -> Result<Vec<String>> {
        Ok(self.system_state(session).await?.node_names())
    }

    /// `lookupNode(caller_id, node)`.
    ///
    /// Unknown nodes fail with [`ChaosError::AddressNotFound`].
    pub async fn lookup_node(&self, session: &Session, node: &str) -> Result<String> {
        match self
            .call(
                session,
                "lookupNode",
                vec![session.caller_id().into(), node.into()],
            )
            .await
        {
            Ok(value) => value.into_string("lookupNode"),
            Err(ChaosError::RegistryProtocol { code, .. }) if code == CODE_ERROR => {
                Err(ChaosError::AddressNotFound {
                    name: node.to_string(),
                })
            }
            Err(err) => Err(err),
        }
    }

    /// `lookupService(caller_id, service)`, returning a `rosrpc://` address.
    pub async fn lookup_service(&self, session: &Session, service: &str) -> Result<String> {
        match self
            .call(
                session,
                "lookupService",
                vec![session.caller_id().into(), service.into()],
            )
            .await
        {
            Ok(value) => value.into_string("lookupService"),
            Err(ChaosError::RegistryProtocol { code, .. }) if code == CODE_ERROR => {
                Err(ChaosError::AddressNotFound {
                    name: service.to_string(),
                })
            }
            Err(err) => Err(err),
        }
    }

    /// `getTopicTypes(caller_id)`: `(topic, type)` pairs.
    pub async fn topic_types(&self, session: &Session) -> Result<Vec<(String, String)>> {
        self.call(session, "getTopicTypes", vec![session.caller_id().into()])
            .await?
            .into_pair_list("getTopicTypes")
    }

    /// `getParamNames(caller_id)`, sorted.
    pub async fn param_names(&self, session: &Session) -> Result<Vec<String>> {
        let mut keys = self
            .call(session, "getParamNames", vec![session.caller_id().into()])
            .await?
            .into_string_list("getParamNames")?;
        keys.sort();
        Ok(keys)
    }

    /// `unregisterPublisher(node, topic, node_api)`.
    pub async fn unregister_publisher(
        &self,
        session: &Session,
        node: &str,
        topic: &str,
        node_api: &str,
    ) -> Result<()> {
        self.call(
            session,
            "unregisterPublisher",
            vec![node.into(), topic.into(), node_api.into()],
        )
        .await
        .map(drop)
    }

    /// `unregisterSubscriber(node, topic, node_api)`.
    pub async fn unregister_subscriber(
        &self,
        session: &Session,
        node: &str,
        topic: &str,
        node_api: &str,
    ) -> Result<()> {
        self.call(
            session,
            "unregisterSubscriber",
            vec![node.into(), topic.into(), node_api.into()],
        )
        .await
        .map(drop)
    }

    /// `unregisterService(node, service, service_api)`.
    pub async fn unregister_service(
        &self,
        session: &Session,
        node: &str,
        service: &str,
        service_api: &str,
    ) -> Result<()> {
        self.call(
            session,
            "unregisterService",
            vec![node.into(), service.into(), service_api.into()],
        )
        .await
        .map(drop)
    }

    /// `unsubscribeParam(node, node_api, key)`.
    ///
    /// The master answers success whether or not `node` was subscribed,
    /// so repeating the call is harmless.
    pub async fn unsubscribe_param(
        &self,
        session: &Session,
        node: &str,
        node_api: &str,
        key: &str,
    ) -> Result<()> {
        self.call(
            session,
            "unsubscribeParam",
            vec![node.into(), node_api.into(), key.into()],
        )
        .await
        .map(drop)
    }

    /// Remove one registration. Service registrations look up the current
    /// service address first; a service that is no longer registered counts
    /// as removed.
    pub async fn unregister(&self, session: &Session, registration: &Registration) -> Result<()> {
        match registration {
            Registration::Publisher {
                topic,
                node,
                node_api,
            } => {
                self.unregister_publisher(session, node, topic, node_api)
                    .await
            }
            Registration::Subscriber {
                topic,
                node,
                node_api,
            } => {
                self.unregister_subscriber(session, node, topic, node_api)
                    .await
            }
            Registration::Service { service, node } => {
                let service_api = match self.lookup_service(session, service).await {
                    Ok(api) => api,
                    Err(ChaosError::AddressNotFound { .. }) => {
                        tracing::debug!(%service, %node, "Service already gone");
                        return Ok(());
                    }
                    Err(err) => return Err(err),
                };
                self.unregister_service(session, node, service, &service_api)
                    .await
            }
        }
    }

    /// Resolve node addresses concurrently.
    ///
    /// Nodes the registry has no address for are left out; any other
    /// lookup error is returned.
    pub async fn resolve_addresses(
        &self,
        session: &Session,
        names: impl IntoIterator<Item = String>,
    ) -> Result<BTreeMap<String, String>> {
        let lookups = stream::iter(names)
            .map(|name| async move {
                let address = self.lookup_node(session, &name).await;
                (name, address)
            })
            .buffered(session.concurrency())
            .collect::<Vec<_>>()
            .await;

        let mut addresses = BTreeMap::new();
        for (name, address) in lookups {
            match address {
                Ok(address) => {
                    addresses.insert(name, address);
                }
                Err(ChaosError::AddressNotFound { .. }) => {
                    tracing::debug!(node = %name, "No address, excluded");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(addresses)
    }

    /// Remove every registration `nodes` hold in `state` as one batch.
    pub async fn cleanup_blacklist(
        &self,
        session: &Session,
        state: &SystemState,
        nodes: &[NodeRecord],
    ) -> BatchReport {
        let plan = state.registrations_of(nodes);
        tracing::info!(
            nodes = nodes.len(),
            registrations = plan.len(),
            "Cleaning up blacklisted nodes"
        );
        self.unregister_all(session, plan).await
    }

    /// Remove every registration of every node not in `whitelist`.
    pub async fn cleanup_whitelist(
        &self,
        session: &Session,
        whitelist: &[String],
    ) -> Result<BatchReport> {
        let state = self.system_state(session).await?;
        let blacklist = state
            .node_names()
            .into_iter()
            .filter(|n| !whitelist.contains(n));
        let nodes: Vec<NodeRecord> = self
            .resolve_addresses(session, blacklist)
            .await?
            .into_iter()
            .map(|(name, address)| NodeRecord { name, address })
            .collect();
        Ok(self.cleanup_blacklist(session, &state, &nodes).await)
    }

    /// Empty whitelist: drop every registration in the graph.
    pub async fn drop_all_whitelist(&self, session: &Session) -> Result<BatchReport> {
        self.cleanup_whitelist(session, &[]).await
    }

    /// Execute a registration plan through the worker pool.
    pub async fn unregister_all(&self, session: &Session, plan: Vec<Registration>) -> BatchReport {
        if session.is_dry_run() {
            return BatchReport::planned(plan.iter().map(Registration::target));
        }
        run_batch(session, plan, Registration::target, |registration| async move {
            self.unregister(session, &registration).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SystemState {
        SystemState {
            publishers: vec![
                ("/scan".into(), vec!["/a".into()]),
                ("/rosout".into(), vec!["/a".into(), "/b".into()]),
            ],
            subscribers: vec![
                ("/scan".into(), vec!["/c".into()]),
                ("/cmd_vel".into(), vec!["/b".into()]),
            ],
            services: vec![
                ("/a/get_loggers".into(), vec!["/a".into()]),
                ("/a/set_logger_level".into(), vec!["/a".into()]),
                ("/d/reset".into(), vec!["/d".into()]),
            ],
        }
    }

    #[test]
    fn test_node_names_sorted_unique() {
        assert_eq!(state().node_names(), vec!["/a", "/b", "/c", "/d"]);
    }

    #[test]
    fn test_registrations_of() {
        let nodes = [NodeRecord {
            name: "/a".into(),
            address: "http://a:1/".into(),
        }];
        let plan = state().registrations_of(&nodes);
        let targets: Vec<String> = plan.iter().map(|r| r.target().to_string()).collect();
        assert_eq!(
            targets,
            vec![
                "unregister-publisher /scan [/a]",
                "unregister-publisher /rosout [/a]",
                "unregister-service /a/get_loggers [/a]",
                "unregister-service /a/set_logger_level [/a]",
            ]
        );
        assert!(plan.iter().all(|r| match r {
            Registration::Publisher { node_api, .. } => node_api == "http://a:1/",
            _ => true,
        }));
        assert!(state().registrations_of(&[]).is_empty());
    }

    #[test]
    fn test_services_of() {
        let state = state();
        let services: Vec<&str> = state.services_of("/a").collect();
        assert_eq!(services, vec!["/a/get_loggers", "/a/set_logger_level"]);
        assert_eq!(state.services_of("/b").count(), 0);
    }

    #[test]
    fn test_registration_target() {
        let registration = Registration::Service {
            service: "/d/reset".into(),
            node: "/d".into(),
        };
        assert_eq!(
            registration.target().to_string(),
            "unregister-service /d/reset [/d]"
        );
    }
}
