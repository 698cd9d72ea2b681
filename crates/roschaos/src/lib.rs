// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! roschaos - chaos toolkit for ROS graphs
//!
//! Selects nodes, topics, services, parameters and loggers by pattern and
//! disrupts them through the master and node APIs.
//!
//! # Features
//!
//! - **Master**: Remove node, service and topic registrations
//! - **Slave**: Shut nodes down, change logger levels, discover which master
//!   a node reports to
//! - **Param server**: Unsubscribe nodes from parameter updates
//!
//! # Quick Start
//!
//! ```bash
//! # Unregister every publisher on camera topics
//! roschaos master unregister topic --topic_name /camera --publishers
//!
//! # Shut down one node
//! roschaos slave shutdown node --node_name '^/talker$'
//!
//! # Silence a node's loggers
//! roschaos slave service logger --node_name /lidar --logger_name ros --logger_level fatal
//!
//! # Preview without mutating anything
//! roschaos --dry-run param server unsubscribe --node_name / --param_key /robot
//! ```
//!
//! # Selection
//!
//! Patterns are regular expressions matched from the start of the value,
//! so `/camera` and `^/camera` select the same entities. Every configured
//! pattern must match; an omitted one matches anything.
//!
//! # Library use
//!
//! ```no_run
//! use roschaos::{Executor, HttpTransport, MatchSpec, Session};
//! use std::sync::Arc;
//!
//! # async fn run() -> roschaos::Result<()> {
//! let session = Session::new("http://localhost:11311/");
//! let executor = Executor::new(Arc::new(HttpTransport::new()));
//! let report = executor
//!     .shutdown_nodes(&session, &MatchSpec::nodes(Some("^/talker$"), None)?)
//!     .await?;
//! report.check()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod logger;
pub mod peer;
pub mod pool;
pub mod registry;
pub mod rpc;
pub mod selector;
pub mod session;

pub use config::{ChaosConfig, ConfigError};
pub use error::{ChaosError, Result};
pub use executor::{Executor, TopicRole, TopicRoles};
pub use logger::{LoggerLevel, LoggerRecord, LoggerService};
pub use peer::{Capability, PeerClient, TopicPairs};
pub use pool::{BatchReport, Outcome, Target, TargetReport};
pub use registry::{NodeRecord, Registration, RegistryClient, SystemState};
pub use rpc::{HttpTransport, Transport};
pub use selector::{Attribute, MatchSpec};
pub use session::{Session, StopHandle};
