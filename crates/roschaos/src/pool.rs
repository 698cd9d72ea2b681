// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded worker pool and per-target outcomes.
//!
//! Mutations against independent targets run concurrently, at most
//! `Session::concurrency` at a time. A failing or hung target only affects
//! its own report entry. Once the session is stopped, targets that have not
//! started yet are reported as skipped.

use crate::error::{ChaosError, Result};
use crate::session::Session;
use futures::stream::{self, StreamExt};
use serde::{Serialize, Serializer};
use std::fmt;
use std::future::Future;

/// Identity of one mutation target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    /// Mutation being applied (`unregister-publisher`, `shutdown`, ...).
    pub action: &'static str,
    /// Entity the mutation applies to (topic, service, key, logger, node).
    pub entity: String,
    /// Node on whose behalf the mutation is issued, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}

impl Target {
    pub fn new(action: &'static str, entity: impl Into<String>) -> Self {
        Self {
            action,
            entity: entity.into(),
            node: None,
        }
    }

    pub fn on_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node {
            Some(ref node) if *node != self.entity => {
                write!(f, "{} {} [{}]", self.action, self.entity, node)
            }
            _ => write!(f, "{} {}", self.action, self.entity),
        }
    }
}

/// Result of mutating one target.
#[derive(Debug, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    Applied,
    /// Peer lacks the capability; not an error.
    Unsupported(String),
    Failed(#[serde(serialize_with = "serialize_display")] ChaosError),
    /// Selected but not mutated (dry run).
    Planned,
    /// Not started because the run was interrupted.
    Skipped,
}

fn serialize_display<S: Serializer>(
    err: &ChaosError,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.collect_str(err)
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Unsupported(_) => "unsupported",
            Self::Failed(_) => "failed",
            Self::Planned => "planned",
            Self::Skipped => "skipped",
        }
    }

    fn from_result(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::Applied,
            Err(ChaosError::Unsupported { operation, .. }) => Self::Unsupported(operation),
            Err(err) => Self::Failed(err),
        }
    }
}

/// Outcome for one target.
#[derive(Debug, Serialize)]
pub struct TargetReport {
    pub target: Target,
    pub outcome: Outcome,
}

/// Outcomes for every target of one action, in selection order.
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub reports: Vec<TargetReport>,
}

impl BatchReport {
    /// Report every target as planned without touching it.
    pub fn planned(targets: impl IntoIterator<Item = Target>) -> Self {
        Self {
            reports: targets
                .into_iter()
                .map(|target| TargetReport {
                    target,
                    outcome: Outcome::Planned,
                })
                .collect(),
        }
    }

    pub fn total(&self) -> usize {
        self.reports.len()
    }

    pub fn count(&self, label: &str) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome.label() == label)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_failure()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.reports.iter().any(|r| r.outcome.is_failure())
    }

    /// Append another batch (e.g. the subscriber pass after the publisher pass).
    pub fn extend(&mut self, other: BatchReport) {
        self.reports.extend(other.reports);
    }

    /// Collapse into an error when any target failed.
    pub fn check(&self) -> Result<()> {
        if self.has_failures() {
            Err(ChaosError::PartialFailure {
                failed: self.failed(),
                total: self.total(),
            })
        } else {
            Ok(())
        }
    }
}

/// Run `op` for every item, bounded by the session's concurrency.
///
/// `describe` names each item for its report entry. `op` errors are
/// recorded per target and never abort the batch.
pub async fn run_batch<T, D, F, Fut>(
    session: &Session,
    items: Vec<T>,
    describe: D,
    op: F,
) -> BatchReport
where
    D: Fn(&T) -> Target,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let stop = session.stop_handle();
    let reports = stream::iter(items)
        .map(|item| {
            let target = describe(&item);
            // Evaluated when the pool pulls the item, i.e. right before it starts.
            let call = (!stop.is_stopped()).then(|| op(item));
            async move {
                let outcome = match call {
                    Some(call) => Outcome::from_result(call.await),
                    None => Outcome::Skipped,
                };
                match outcome {
                    Outcome::Applied => tracing::info!(entity = %target, "Applied"),
                    Outcome::Failed(ref err) => {
                        tracing::warn!(entity = %target, error = %err, "Failed")
                    }
                    Outcome::Unsupported(ref operation) => {
                        tracing::debug!(entity = %target, %operation, "Peer excluded: unsupported")
                    }
                    Outcome::Planned => tracing::debug!(entity = %target, "Planned"),
                    Outcome::Skipped => tracing::debug!(entity = %target, "Skipped"),
                }
                TargetReport { target, outcome }
            }
        })
        .buffered(session.concurrency())
        .collect::<Vec<_>>()
        .await;

    BatchReport { reports }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn session(concurrency: usize) -> Session {
        Session::new("http://localhost:11311/").with_concurrency(concurrency)
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let report = run_batch(
            &session(4),
            vec![1, 2, 3, 4, 5],
            |i| Target::new("shutdown", format!("/n{}", i)),
            |i| async move {
                if i == 3 {
                    Err(ChaosError::communication("/n3", "refused"))
                } else {
                    Ok(())
                }
            },
        )
        .await;

        assert_eq!(report.total(), 5);
        assert_eq!(report.count("applied"), 4);
        assert_eq!(report.failed(), 1);
        assert!(report.reports[2].outcome.is_failure());
        assert!(matches!(
            report.check(),
            Err(ChaosError::PartialFailure {
                failed: 1,
                total: 5
            })
        ));
    }

    #[tokio::test]
    async fn test_unsupported_is_not_failure() {
        let report = run_batch(
            &session(2),
            vec!["/a", "/b"],
            |n| Target::new("backtrace", *n),
            |n| async move {
                if n == "/b" {
                    Err(ChaosError::unsupported(n, "getMasterUri"))
                } else {
                    Ok(())
                }
            },
        )
        .await;
        assert!(!report.has_failures());
        assert_eq!(report.count("unsupported"), 1);
        assert!(report.check().is_ok());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let report = run_batch(
            &session(2),
            (0..8).collect::<Vec<i32>>(),
            |i| Target::new("shutdown", i.to_string()),
            |_| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        )
        .await;

        assert_eq!(report.count("applied"), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_stop_skips_unstarted_targets() {
        let session = session(1);
        let stop = session.stop_handle();

        let report = run_batch(
            &session,
            vec![0, 1, 2],
            |i| Target::new("unsubscribe-param", i.to_string()),
            |i| {
                let stop = stop.clone();
                async move {
                    if i == 0 {
                        stop.stop();
                    }
                    Ok(())
                }
            },
        )
        .await;

        assert_eq!(report.reports[0].outcome.label(), "applied");
        assert_eq!(report.count("skipped"), 2);
    }

    #[test]
    fn test_planned_report() {
        let report = BatchReport::planned(vec![
            Target::new("shutdown", "/a"),
            Target::new("shutdown", "/b"),
        ]);
        assert_eq!(report.count("planned"), 2);
        assert_eq!(report.count("skipped"), 0);
        assert!(report.check().is_ok());
    }

    #[test]
    fn test_report_json() {
        let report = BatchReport {
            reports: vec![TargetReport {
                target: Target::new("unregister-service", "/add").on_node("/server"),
                outcome: Outcome::Failed(ChaosError::no_reply("http://server:1/")),
            }],
        };
        let json = serde_json::to_value(&report).expect("json");
        assert_eq!(json["reports"][0]["outcome"]["status"], "failed");
        assert_eq!(
            json["reports"][0]["outcome"]["detail"],
            "No reply from http://server:1/"
        );
        assert_eq!(json["reports"][0]["target"]["node"], "/server");
    }

    #[test]
    fn test_target_display() {
        let target = Target::new("unregister-publisher", "/scan").on_node("/a");
        assert_eq!(target.to_string(), "unregister-publisher /scan [/a]");
        let target = Target::new("shutdown", "/a").on_node("/a");
        assert_eq!(target.to_string(), "shutdown /a");
    }
}
