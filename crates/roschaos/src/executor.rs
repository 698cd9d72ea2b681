// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mutation executor.
//!
//! Every action runs in two phases. Selection enumerates the registry and
//! applies the match specs; a failure there aborts the action before any
//! mutation is issued. Execution then mutates each selected target through
//! the worker pool and records one outcome per target, so a failing target
//! never stops the others.

use crate::error::{ChaosError, Result};
use crate::logger::{LoggerLevel, LoggerService};
use crate::peer::{Capability, PeerClient};
use crate::pool::{run_batch, BatchReport, Outcome, Target, TargetReport};
use crate::registry::{NodeRecord, Registration, RegistryClient, SystemState};
use crate::rpc::Transport;
use crate::selector::{Attribute, MatchSpec};
use crate::session::Session;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Reason sent along with `shutdown`.
const SHUTDOWN_REASON: &str = "roschaos";

/// Side of a topic registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TopicRole {
    Publisher,
    Subscriber,
}

/// Topic registrations to remove. At least one role must be set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopicRoles {
    pub publishers: bool,
    pub subscribers: bool,
}

impl TopicRoles {
    pub fn is_empty(&self) -> bool {
        !self.publishers && !self.subscribers
    }

    fn selected(self) -> impl Iterator<Item = TopicRole> {
        [
            (self.publishers, TopicRole::Publisher),
            (self.subscribers, TopicRole::Subscriber),
        ]
        .into_iter()
        .filter_map(|(on, role)| on.then_some(role))
    }
}

/// Topic types per `(role, node)`, as reported by the node itself.
///
/// When a node cannot report them the registry's types for the topic
/// name are used instead.
struct TypeIndex {
    registry: Vec<(String, String)>,
    nodes: HashMap<(TopicRole, String), Vec<(String, String)>>,
}

impl TypeIndex {
    fn types_of<'a>(&'a self, role: TopicRole, node: &str, topic: &str) -> Vec<&'a str> {
        let reported = self
            .nodes
            .get(&(role, node.to_string()))
            .filter(|pairs| pairs.iter().any(|(t, _)| t == topic));
        reported
            .unwrap_or(&self.registry)
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, type_name)| type_name.as_str())
            .collect()
    }
}

/// Runs chaos actions against one graph.
#[derive(Clone)]
pub struct Executor {
    registry: RegistryClient,
    peer: PeerClient,
}

impl Executor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            registry: RegistryClient::new(transport.clone()),
            peer: PeerClient::new(transport),
        }
    }

    pub fn registry(&self) -> &RegistryClient {
        &self.registry
    }

    pub fn peer(&self) -> &PeerClient {
        &self.peer
    }

    /// Nodes in `state` whose name and address pass `spec`.
    pub async fn select_nodes(
        &self,
        session: &Session,
        state: &SystemState,
        spec: &MatchSpec,
    ) -> Result<Vec<NodeRecord>> {
        let candidates = state
            .node_names()
            .into_iter()
            .filter(|name| spec.accepts(Attribute::Name, name));
        let addresses = self.registry.resolve_addresses(session, candidates).await?;

        let nodes: Vec<NodeRecord> = addresses
            .into_iter()
            .filter(|(name, address)| {
                spec.matches(&[
                    (Attribute::Name, name.as_str()),
                    (Attribute::Uri, address.as_str()),
                ])
            })
            .map(|(name, address)| NodeRecord { name, address })
            .collect();
        tracing::debug!(selected = nodes.len(), filter = %spec, "Nodes selected");
        Ok(nodes)
    }

    /// Drop every registration of every node.
    pub async fn unregister_all_nodes(&self, session: &Session) -> Result<BatchReport> {
        self.registry.drop_all_whitelist(session).await
    }

    /// Drop every registration of the selected nodes in one blacklist pass.
    ///
    /// Selection and the registration plan share one registry snapshot.
    pub async fn unregister_nodes(
        &self,
        session: &Session,
        spec: &MatchSpec,
    ) -> Result<BatchReport> {
        let state = self.registry.system_state(session).await?;
        let nodes = self.select_nodes(session, &state, spec).await?;
        Ok(self.registry.cleanup_blacklist(session, &state, &nodes).await)
    }

    /// Unregister each (service, provider) pair whose service name passes `spec`.
    pub async fn unregister_services(
        &self,
        session: &Session,
        spec: &MatchSpec,
    ) -> Result<BatchReport> {
        let state = self.registry.system_state(session).await?;
        let plan: Vec<Registration> = state
            .services()
            .into_iter()
            .filter(|service| spec.accepts(Attribute::Name, &service.name))
            .flat_map(|service| {
                let name = service.name;
                service.providers.into_iter().map(move |node| Registration::Service {
                    service: name.clone(),
                    node,
                })
            })
            .collect();
        Ok(self.registry.unregister_all(session, plan).await)
    }

    /// Unregister topic publishers and/or subscribers by topic name and type.
    ///
    /// Each role only ever produces its own unregister call.
    pub async fn unregister_topics(
        &self,
        session: &Session,
        spec: &MatchSpec,
        roles: TopicRoles,
    ) -> Result<BatchReport> {
        if roles.is_empty() {
            return Err(ChaosError::Usage(
                "No --publishers or --subscribers filter provided".into(),
            ));
        }

        let state = self.registry.system_state(session).await?;
        let mut candidates = Vec::new();
        for role in roles.selected() {
            let members = match role {
                TopicRole::Publisher => &state.publishers,
                TopicRole::Subscriber => &state.subscribers,
            };
            for (topic, nodes) in members {
                if !spec.accepts(Attribute::Name, topic) {
                    continue;
                }
                for node in nodes {
                    candidates.push((role, topic.as_str(), node.as_str()));
                }
            }
        }

        let names: BTreeSet<String> = candidates.iter().map(|(_, _, n)| n.to_string()).collect();
        let addresses = self.registry.resolve_addresses(session, names).await?;

        let types = if spec.constrains(Attribute::Type) {
            Some(self.index_types(session, &candidates, &addresses).await?)
        } else {
            None
        };

        let mut plan = Vec::new();
        for (role, topic, node) in candidates {
            let Some(node_api) = addresses.get(node) else {
                continue;
            };
            if let Some(ref types) = types {
                let advertised = types.types_of(role, node, topic);
                if !spec.accepts_any(Attribute::Type, advertised) {
                    continue;
                }
            }
            let (topic, node, node_api) = (topic.to_string(), node.to_string(), node_api.clone());
            plan.push(match role {
                TopicRole::Publisher => Registration::Publisher {
                    topic,
                    node,
                    node_api,
                },
                TopicRole::Subscriber => Registration::Subscriber {
                    topic,
                    node,
                    node_api,
                },
            });
        }

        Ok(self.registry.unregister_all(session, plan).await)
    }

    /// Ask each candidate node which types it uses, per role.
    async fn index_types(
        &self,
        session: &Session,
        candidates: &[(TopicRole, &str, &str)],
        addresses: &BTreeMap<String, String>,
    ) -> Result<TypeIndex> {
        let registry = self.registry.topic_types(session).await?;

        let keys: BTreeSet<(TopicRole, &str)> = candidates
            .iter()
            .filter(|(_, _, node)| addresses.contains_key(*node))
            .map(|(role, _, node)| (*role, *node))
            .collect();

        let nodes = stream::iter(keys)
            .map(|(role, node)| async move {
                let node_api = addresses.get(node).map(String::as_str).unwrap_or_default();
                let reported = match role {
                    TopicRole::Publisher => self.peer.get_publications(session, node_api).await,
                    TopicRole::Subscriber => self.peer.get_subscriptions(session, node_api).await,
                };
                match reported {
                    Ok(Capability::Supported(pairs)) => Some(((role, node.to_string()), pairs)),
                    Ok(Capability::Unsupported) => None,
                    Err(err) => {
                        tracing::debug!(
                            %node,
                            error = %err,
                            "Topic types unavailable, using registry"
                        );
                        None
                    }
                }
            })
            .buffered(session.concurrency())
            .filter_map(|entry| async move { entry })
            .collect::<HashMap<_, _>>()
            .await;

        Ok(TypeIndex { registry, nodes })
    }

    /// Send `shutdown` to every selected node.
    pub async fn shutdown_nodes(&self, session: &Session, spec: &MatchSpec) -> Result<BatchReport> {
        let state = self.registry.system_state(session).await?;
        let nodes = self.select_nodes(session, &state, spec).await?;

        let describe = |node: &NodeRecord| Target::new("shutdown", node.name.as_str());
        if session.is_dry_run() {
            return Ok(BatchReport::planned(nodes.iter().map(describe)));
        }
        Ok(run_batch(session, nodes, describe, |node| async move {
            self.peer
                .shutdown(session, &node.address, SHUTDOWN_REASON)
                .await
        })
        .await)
    }

    /// Set `level` on every logger passing `loggers` in every selected node
    /// that provides the logger services.
    pub async fn set_logger_levels(
        &self,
        session: &Session,
        nodes: &MatchSpec,
        loggers: &MatchSpec,
        level: LoggerLevel,
    ) -> Result<BatchReport> {
        let state = self.registry.system_state(session).await?;
        let services: Vec<LoggerService> = self
            .select_nodes(session, &state, nodes)
            .await?
            .iter()
            .filter_map(|node| PeerClient::discover_logger_service(&state, &node.name))
            .collect();
        tracing::debug!(nodes = services.len(), "Nodes with logger services");

        let listed = stream::iter(services)
            .map(|service| async move {
                let records = self.peer.list_loggers(session, &service).await;
                (service, records)
            })
            .buffered(session.concurrency())
            .collect::<Vec<_>>()
            .await;

        let mut report = BatchReport::default();
        let mut targets = Vec::new();
        for (service, listed) in listed {
            match listed {
                Ok(records) => targets.extend(
                    records
                        .into_iter()
                        .filter(|record| loggers.accepts(Attribute::Logger, &record.name))
                        .map(|record| (service.clone(), record.name)),
                ),
                Err(err) => {
                    tracing::warn!(node = %service.node, error = %err, "Cannot list loggers");
                    report.reports.push(TargetReport {
                        target: Target::new("get-loggers", service.node.as_str()),
                        outcome: Outcome::Failed(err),
                    });
                }
            }
        }

        let describe = |(service, logger): &(LoggerService, String)| {
            Target::new("set-logger-level", logger.as_str()).on_node(service.node.as_str())
        };
        let batch = if session.is_dry_run() {
            BatchReport::planned(targets.iter().map(describe))
        } else {
            run_batch(session, targets, describe, |(service, logger)| async move {
                self.peer
                    .set_logger_level(session, &service, &logger, level)
                    .await
            })
            .await
        };
        report.extend(batch);
        Ok(report)
    }

    /// Unsubscribe every selected node from every parameter key passing `keys`.
    pub async fn unsubscribe_params(
        &self,
        session: &Session,
        nodes: &MatchSpec,
        keys: &MatchSpec,
    ) -> Result<BatchReport> {
        let blacklist: Vec<String> = self
            .registry
            .param_names(session)
            .await?
            .into_iter()
            .filter(|key| keys.accepts(Attribute::Key, key))
            .collect();
        if blacklist.is_empty() {
            tracing::info!(filter = %keys, "No parameter key matched");
            return Ok(BatchReport::default());
        }

        let state = self.registry.system_state(session).await?;
        let nodes = self.select_nodes(session, &state, nodes).await?;
        let targets: Vec<(NodeRecord, String)> = nodes
            .iter()
            .flat_map(|node| blacklist.iter().map(move |key| (node.clone(), key.clone())))
            .collect();
        tracing::info!(
            nodes = nodes.len(),
            keys = blacklist.len(),
            "Unsubscribing parameters"
        );

        let describe = |(node, key): &(NodeRecord, String)| {
            Target::new("unsubscribe-param", key.as_str()).on_node(node.name.as_str())
        };
        if session.is_dry_run() {
            return Ok(BatchReport::planned(targets.iter().map(describe)));
        }
        Ok(run_batch(session, targets, describe, |(node, key)| async move {
            self.registry
                .unsubscribe_param(session, &node.name, &node.address, &key)
                .await
        })
        .await)
    }

    /// Ask the node at `node_api` which registry it uses and redirect the
    /// session there.
    pub async fn backtrace_master(
        &self,
        session: &mut Session,
        node_api: &str,
    ) -> Result<Capability<String>> {
        let registry = self.peer.get_master_uri(session, node_api).await?;
        if let Capability::Supported(ref uri) = registry {
            session.redirect(uri.as_str())?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn test_roles_selected() {
        let both = TopicRoles {
            publishers: true,
            subscribers: true,
        };
        assert_eq!(
            both.selected().collect::<Vec<_>>(),
            vec![TopicRole::Publisher, TopicRole::Subscriber]
        );
        let subs = TopicRoles {
            subscribers: true,
            ..Default::default()
        };
        assert_eq!(subs.selected().collect::<Vec<_>>(), vec![TopicRole::Subscriber]);
        assert!(TopicRoles::default().is_empty());
    }

    #[test]
    fn test_type_index_prefers_node_report() {
        let mut nodes = HashMap::new();
        nodes.insert(
            (TopicRole::Publisher, "/b".to_string()),
            pairs(&[("/scan", "PointCloud")]),
        );
        let index = TypeIndex {
            registry: pairs(&[("/scan", "LaserScan")]),
            nodes,
        };

        assert_eq!(index.types_of(TopicRole::Publisher, "/b", "/scan"), vec!["PointCloud"]);
        // No report from /a: registry types.
        assert_eq!(index.types_of(TopicRole::Publisher, "/a", "/scan"), vec!["LaserScan"]);
        // Report exists but does not mention the topic.
        assert!(index.types_of(TopicRole::Subscriber, "/b", "/odom").is_empty());
    }
}
