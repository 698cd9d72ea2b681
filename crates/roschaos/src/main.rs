// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! roschaos CLI
//!
//! Command-line chaos toolkit for ROS graphs.
//!
//! # Usage
//!
//! ```bash
//! # Remove every registration of the camera nodes
//! roschaos master unregister node --node_name /camera
//!
//! # Remove all registrations in the graph
//! roschaos master unregister node --all
//!
//! # Unregister LaserScan publishers
//! roschaos master unregister topic --topic_type '^sensor_msgs/LaserScan$' --publishers
//!
//! # Ask a node which master it uses
//! roschaos slave backtrace master --uri http://robot:41234/
//!
//! # Machine-readable report
//! roschaos --format json slave shutdown node --node_uri http://robot2
//! ```

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use roschaos::config::MASTER_URI_ENV;
use roschaos::{
    BatchReport, ChaosConfig, ChaosError, Executor, HttpTransport, LoggerLevel, MatchSpec,
    Outcome, Result, Session, TopicRoles,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Chaos toolkit for ROS graphs
#[derive(Parser, Debug)]
#[command(name = "roschaos")]
#[command(about = "roschaos - select and disrupt ROS master, node and parameter registrations")]
#[command(version)]
struct Args {
    /// Master XML-RPC address (overrides config file and ROS_MASTER_URI)
    #[arg(long, global = true)]
    master_uri: Option<String>,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Per-call timeout (seconds)
    #[arg(long, global = true)]
    timeout: Option<f64>,

    /// Maximum number of calls in flight
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Select and report targets without mutating anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Master API toolkit
    Master {
        #[command(subcommand)]
        command: MasterCommand,
    },

    /// Slave API toolkit
    Slave {
        #[command(subcommand)]
        command: SlaveCommand,
    },

    /// Param API toolkit
    Param {
        #[command(subcommand)]
        command: ParamCommand,
    },

    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "roschaos.toml")]
        output: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum MasterCommand {
    /// Remove registrations
    Unregister {
        #[command(subcommand)]
        target: Option<UnregisterTarget>,
    },
}

#[derive(Subcommand, Debug)]
enum UnregisterTarget {
    /// Remove node registrations
    Node {
        #[command(flatten)]
        nodes: NodeFilter,

        /// All nodes
        #[arg(long)]
        all: bool,
    },

    /// Remove service registrations
    Service {
        /// Service name expression
        #[arg(long = "service_name")]
        service_name: Option<String>,
    },

    /// Remove topic registrations
    Topic {
        /// Topic name expression
        #[arg(long = "topic_name")]
        topic_name: Option<String>,

        /// Topic type expression
        #[arg(long = "topic_type")]
        topic_type: Option<String>,

        /// Unregister publishers
        #[arg(long)]
        publishers: bool,

        /// Unregister subscribers
        #[arg(long)]
        subscribers: bool,
    },
}

#[derive(Subcommand, Debug)]
enum SlaveCommand {
    /// Backtrace info from the slave API
    Backtrace {
        #[command(subcommand)]
        target: Option<BacktraceTarget>,
    },

    /// Node-local services
    Service {
        #[command(subcommand)]
        target: Option<ServiceTarget>,
    },

    /// Stop processes
    Shutdown {
        #[command(subcommand)]
        target: Option<ShutdownTarget>,
    },
}

#[derive(Subcommand, Debug)]
enum BacktraceTarget {
    /// Ask a node which master it reports to
    Master {
        /// Node XML-RPC address
        #[arg(long)]
        uri: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ServiceTarget {
    /// Set logger levels
    Logger {
        #[command(flatten)]
        nodes: NodeFilter,

        /// Logger name expression
        #[arg(long = "logger_name")]
        logger_name: String,

        /// Logger level to set (debug, info, warn, error, fatal)
        #[arg(long = "logger_level")]
        logger_level: LoggerLevel,
    },
}

#[derive(Subcommand, Debug)]
enum ShutdownTarget {
    /// Shut nodes down
    Node {
        #[command(flatten)]
        nodes: NodeFilter,
    },
}

#[derive(Subcommand, Debug)]
enum ParamCommand {
    /// Parameter server API
    Server {
        #[command(subcommand)]
        target: Option<ServerTarget>,
    },
}

#[derive(Subcommand, Debug)]
enum ServerTarget {
    /// Unsubscribe nodes from parameter updates
    Unsubscribe {
        #[command(flatten)]
        nodes: NodeFilter,

        /// Parameter key expression
        #[arg(long = "param_key")]
        param_key: String,
    },
}

#[derive(ClapArgs, Debug)]
struct NodeFilter {
    /// Node name expression
    #[arg(long = "node_name")]
    node_name: Option<String>,

    /// Node URI expression
    #[arg(long = "node_uri")]
    node_uri: Option<String>,
}

impl NodeFilter {
    fn is_empty(&self) -> bool {
        self.node_name.is_none() && self.node_uri.is_none()
    }

    /// Compile, requiring at least one of the two patterns.
    fn required(&self) -> Result<MatchSpec> {
        if self.is_empty() {
            return Err(ChaosError::Usage(
                "Either --node_name or --node_uri is required".into(),
            ));
        }
        MatchSpec::nodes(self.node_name.as_deref(), self.node_uri.as_deref())
    }
}

/// A validated request, ready to run. Building one never touches the network.
#[derive(Debug)]
enum Action {
    UnregisterAllNodes,
    UnregisterNodes(MatchSpec),
    UnregisterServices(MatchSpec),
    UnregisterTopics(MatchSpec, TopicRoles),
    BacktraceMaster(String),
    SetLoggerLevels {
        nodes: MatchSpec,
        loggers: MatchSpec,
        level: LoggerLevel,
    },
    ShutdownNodes(MatchSpec),
    UnsubscribeParams {
        nodes: MatchSpec,
        keys: MatchSpec,
    },
}

fn no_action() -> ChaosError {
    ChaosError::Usage("No action requested".into())
}

impl Action {
    fn from_command(command: Commands) -> Result<Self> {
        match command {
            Commands::Master {
                command: MasterCommand::Unregister { target },
            } => match target.ok_or_else(no_action)? {
                UnregisterTarget::Node { all: true, .. } => Ok(Self::UnregisterAllNodes),
                UnregisterTarget::Node { nodes, .. } => {
                    if nodes.is_empty() {
                        return Err(no_action());
                    }
                    Ok(Self::UnregisterNodes(MatchSpec::nodes(
                        nodes.node_name.as_deref(),
                        nodes.node_uri.as_deref(),
                    )?))
                }
                UnregisterTarget::Service { service_name } => Ok(Self::UnregisterServices(
                    MatchSpec::services(service_name.as_deref())?,
                )),
                UnregisterTarget::Topic {
                    topic_name,
                    topic_type,
                    publishers,
                    subscribers,
                } => {
                    let roles = TopicRoles {
                        publishers,
                        subscribers,
                    };
                    if roles.is_empty() {
                        return Err(ChaosError::Usage(
                            "No --publishers or --subscribers filter provided".into(),
                        ));
                    }
                    let spec = MatchSpec::topics(topic_name.as_deref(), topic_type.as_deref())?;
                    Ok(Self::UnregisterTopics(spec, roles))
                }
            },
            Commands::Slave { command } => match command {
                SlaveCommand::Backtrace { target } => match target {
                    Some(BacktraceTarget::Master { uri: Some(uri) }) => {
                        roschaos::config::validate_uri(&uri)
                            .map_err(|e| ChaosError::Usage(e.to_string()))?;
                        Ok(Self::BacktraceMaster(uri))
                    }
                    _ => Err(no_action()),
                },
                SlaveCommand::Service { target } => match target.ok_or_else(no_action)? {
                    ServiceTarget::Logger {
                        nodes,
                        logger_name,
                        logger_level,
                    } => Ok(Self::SetLoggerLevels {
                        nodes: nodes.required()?,
                        loggers: MatchSpec::loggers(Some(&logger_name))?,
                        level: logger_level,
                    }),
                },
                SlaveCommand::Shutdown { target } => match target.ok_or_else(no_action)? {
                    ShutdownTarget::Node { nodes } => Ok(Self::ShutdownNodes(nodes.required()?)),
                },
            },
            Commands::Param {
                command: ParamCommand::Server { target },
            } => match target.ok_or_else(no_action)? {
                ServerTarget::Unsubscribe { nodes, param_key } => Ok(Self::UnsubscribeParams {
                    nodes: nodes.required()?,
                    keys: MatchSpec::params(Some(&param_key))?,
                }),
            },
            Commands::GenConfig { .. } => Err(no_action()),
        }
    }

    async fn execute(
        self,
        executor: &Executor,
        session: &mut Session,
        format: OutputFormat,
    ) -> Result<()> {
        let report = match self {
            Self::UnregisterAllNodes => executor.unregister_all_nodes(session).await?,
            Self::UnregisterNodes(spec) => executor.unregister_nodes(session, &spec).await?,
            Self::UnregisterServices(spec) => executor.unregister_services(session, &spec).await?,
            Self::UnregisterTopics(spec, roles) => {
                executor.unregister_topics(session, &spec, roles).await?
            }
            Self::BacktraceMaster(node_api) => {
                let master_uri = executor
                    .backtrace_master(session, &node_api)
                    .await?
                    .supported(&node_api, "getMasterUri")?;
                print_master_uri(&node_api, &master_uri, format);
                return Ok(());
            }
            Self::SetLoggerLevels {
                nodes,
                loggers,
                level,
            } => {
                executor
                    .set_logger_levels(session, &nodes, &loggers, level)
                    .await?
            }
            Self::ShutdownNodes(spec) => executor.shutdown_nodes(session, &spec).await?,
            Self::UnsubscribeParams { nodes, keys } => {
                executor.unsubscribe_params(session, &nodes, &keys).await?
            }
        };

        print_report(&report, format)?;
        if session.is_stopped() {
            return Err(ChaosError::Interrupted);
        }
        report.check()
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let code = match run(args).await {
        Ok(()) => 0,
        Err(err) => {
            if !err.is_silent() {
                eprintln!("{} {}", "Error:".red().bold(), err.diagnostic());
            }
            err.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(args: Args) -> Result<()> {
    let Args {
        master_uri,
        config,
        timeout,
        concurrency,
        log_level,
        dry_run,
        format,
        command,
    } = args;

    if let Commands::GenConfig { ref output } = command {
        return cmd_gen_config(output);
    }

    // Everything below the network boundary is validated first.
    let action = Action::from_command(command)?;

    let mut config = match config {
        Some(ref path) => ChaosConfig::from_file(path)?,
        None => ChaosConfig::default(),
    };
    if let Some(timeout) = timeout {
        config.timeout_secs = timeout;
    }
    if let Some(concurrency) = concurrency {
        config.concurrency = concurrency;
    }
    if let Some(level) = log_level {
        config.log_level = level;
    }
    config.validate()?;

    // Initialize logging
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let registry_uri = match master_uri {
        Some(uri) => uri,
        None => config.resolve_registry_uri(std::env::var(MASTER_URI_ENV).ok()),
    };
    let mut session = Session::from_config(&config, registry_uri)?.with_dry_run(dry_run);
    tracing::debug!(registry = %session.registry_uri(), ?action, "Starting");

    let stop = session.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, waiting for in-flight calls");
            stop.stop();
        }
    });

    let executor = Executor::new(Arc::new(HttpTransport::new()));
    action.execute(&executor, &mut session, format).await
}

fn cmd_gen_config(output: &Path) -> Result<()> {
    let content = ChaosConfig::example().to_toml()?;
    std::fs::write(output, content).map_err(roschaos::ConfigError::from)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn print_master_uri(node_api: &str, master_uri: &str, format: OutputFormat) {
    match format {
        OutputFormat::Text => println!("ROS_MASTER_URI={}", master_uri),
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "node": node_api, "master_uri": master_uri })
        ),
    }
}

fn print_report(report: &BatchReport, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        let json = serde_json::to_string_pretty(report)
            .map_err(|e| ChaosError::Decode(e.to_string()))?;
        println!("{}", json);
        return Ok(());
    }

    for entry in &report.reports {
        let label = format!("{:<11}", entry.outcome.label());
        match entry.outcome {
            Outcome::Applied => println!("  {} {}", label.green(), entry.target),
            Outcome::Planned => println!("  {} {}", label.cyan(), entry.target),
            Outcome::Skipped => println!("  {} {}", label.dimmed(), entry.target),
            Outcome::Unsupported(ref operation) => {
                println!("  {} {} ({})", label.yellow(), entry.target, operation)
            }
            Outcome::Failed(ref err) => {
                println!("  {} {}: {}", label.red().bold(), entry.target, err)
            }
        }
    }

    if report.total() == 0 {
        println!("{}", "Nothing selected".dimmed());
        return Ok(());
    }
    let failed = report.failed();
    let summary = format!(
        "{} targets: {} applied, {} planned, {} unsupported, {} skipped, {} failed",
        report.total(),
        report.count("applied"),
        report.count("planned"),
        report.count("unsupported"),
        report.count("skipped"),
        failed
    );
    if failed > 0 {
        println!("{}", summary.red());
    } else {
        println!("{}", summary.green());
    }
    Ok(())
}
