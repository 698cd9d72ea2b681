// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-invocation call context.
//!
//! Every registry and peer call receives the session explicitly. The active
//! registry address lives here and only here; remote master discovery
//! redirects the session instead of touching the process environment.

use crate::config::{validate_uri, ChaosConfig};
use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Call context for one toolkit invocation.
#[derive(Debug, Clone)]
pub struct Session {
    registry_uri: String,
    caller_id: String,
    timeout: Duration,
    concurrency: usize,
    dry_run: bool,
    stop: StopHandle,
}

impl Session {
    /// Create a session against `registry_uri` with default settings.
    pub fn new(registry_uri: impl Into<String>) -> Self {
        let defaults = ChaosConfig::default();
        let timeout = defaults.timeout();
        Self {
            registry_uri: registry_uri.into(),
            caller_id: defaults.caller_id,
            timeout,
            concurrency: defaults.concurrency,
            dry_run: false,
            stop: StopHandle::new(),
        }
    }

    /// Build a session from validated configuration.
    pub fn from_config(config: &ChaosConfig, registry_uri: impl Into<String>) -> Result<Self> {
        config.validate()?;
        let registry_uri = registry_uri.into();
        validate_uri(&registry_uri)?;
        Ok(Self {
            registry_uri,
            caller_id: config.caller_id.clone(),
            timeout: config.timeout(),
            concurrency: config.concurrency,
            dry_run: false,
            stop: StopHandle::new(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Select targets and report them without mutating anything.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Active registry address.
    pub fn registry_uri(&self) -> &str {
        &self.registry_uri
    }

    /// Identity used for calls not scoped to a target node.
    pub fn caller_id(&self) -> &str {
        &self.caller_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Point subsequent registry calls at `registry_uri`.
    pub fn redirect(&mut self, registry_uri: impl Into<String>) -> Result<()> {
        let registry_uri = registry_uri.into();
        validate_uri(&registry_uri)?;
        tracing::info!(from = %self.registry_uri, to = %registry_uri, "Registry redirected");
        self.registry_uri = registry_uri;
        Ok(())
    }

    /// Handle used to stop issuing new calls.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }
}

/// Handle to interrupt a running action.
///
/// Calls already in flight are left to complete or time out.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop issuing new calls.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_redirect() {
        let mut session = Session::new("http://localhost:11311/");
        session.redirect("http://rogue:11311/").expect("redirect");
        assert_eq!(session.registry_uri(), "http://rogue:11311/");

        assert!(session.redirect("rogue:11311").is_err());
        assert_eq!(session.registry_uri(), "http://rogue:11311/");
    }

    #[test]
    fn test_stop_handle_shared() {
        let session = Session::new("http://localhost:11311/");
        let handle = session.stop_handle();
        assert!(!session.is_stopped());
        handle.stop();
        assert!(session.is_stopped());
    }

    #[test]
    fn test_from_config() {
        let config = ChaosConfig {
            concurrency: 3,
            timeout_secs: 0.5,
            ..Default::default()
        };
        let session = Session::from_config(&config, "http://robot:11311/").expect("session");
        assert_eq!(session.concurrency(), 3);
        assert_eq!(session.timeout(), Duration::from_millis(500));
        assert_eq!(session.caller_id(), "/roschaos");

        assert!(Session::from_config(&config, "robot").is_err());
    }

    #[test]
    fn test_new_uses_defaults() {
        let session = Session::new("http://localhost:11311/");
        assert_eq!(session.caller_id(), "/roschaos");
        assert_eq!(session.timeout(), Duration::from_secs(3));
        assert!(!session.is_dry_run());
    }

    #[test]
    fn test_from_config_rejects_huge_timeout() {
        let config = ChaosConfig {
            timeout_secs: 1e30,
            ..Default::default()
        };
        assert!(Session::from_config(&config, "http://robot:11311/").is_err());
    }
}
