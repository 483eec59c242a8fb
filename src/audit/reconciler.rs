//! Scope reconciliation on the target
//!
//! A created scope is only usable once the target lists it, so creation is
//! followed by polling the scope listing until it shows up or time runs out.

use anyhow::{bail, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::AuditSettings;
use crate::remote::TargetApi;

pub const DEFAULT_SCOPE_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct ScopeReconciler<'a> {
    target: &'a dyn TargetApi,
    timeout: Duration,
    poll_interval: Duration,
}

impl<'a> ScopeReconciler<'a> {
    pub fn new(target: &'a dyn TargetApi, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            target,
            timeout,
            poll_interval,
        }
    }

    pub fn from_settings(target: &'a dyn TargetApi, settings: &AuditSettings) -> Self {
        Self::new(target, settings.scope_timeout, settings.scope_poll_interval)
    }

    /// Number of listing checks that fit in the timeout, at least one
    fn max_polls(&self) -> u64 {
        let interval = self.poll_interval.as_millis().max(1);
        let polls = self.timeout.as_millis().div_ceil(interval);
        u64::try_from(polls).unwrap_or(u64::MAX).max(1)
    }

    fn timeout_millis(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    pub async fn create(&self, scope: &str) -> Result<bool> {
        self.target.create_scope(scope).await
    }

    pub async fn is_present(&self, scope: &str) -> Result<bool> {
        let scopes = self.target.list_scopes().await?;
        Ok(scopes.iter().any(|s| s == scope))
    }

    /// `false` when the scope never appeared within the timeout
    pub async fn wait_until_present(&self, scope: &str) -> Result<bool> {
        let polls = self.max_polls();
        for attempt in 1..=polls {
            if self.is_present(scope).await? {
                debug!(scope, attempt, "scope visible on target");
                return Ok(true);
            }
            if attempt < polls {
                sleep(self.poll_interval).await;
            }
        }
        warn!(
            scope,
            timeout_ms = self.timeout_millis(),
            "scope did not appear on target"
        );
        Ok(false)
    }

    /// Create `scope` and wait for it; any failure is fatal for the caller
    pub async fn reconcile(&self, scope: &str) -> Result<()> {
        info!(scope, "Creating scope");
        if !self.create(scope).await? {
            bail!("Unable to create scope: {}, the target rejected the request", scope);
        }
        if !self.wait_until_present(scope).await? {
            bail!(
                "Unable to create scope: {}, it was not visible on the target after {:?}",
                scope,
                self.timeout
            );
        }
        info!(scope, "Scope created");
        Ok(())
    }

    /// Entries of `scopes` the target does not declare, in input order
    pub async fn missing_scopes(&self, scopes: &[String]) -> Result<Vec<String>> {
        let declared = self.target.list_scopes().await?;
        Ok(scopes
            .iter()
            .filter(|s| !declared.contains(s))
            .cloned()
            .collect())
    }
}
