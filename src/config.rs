/*
 * Created on Tue Jul 28 2026
 *
 * This file is a part of pathspace
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # Registry-level configuration
//!
//! The original source kept `Opts`-style process-wide mutable globals for
//! the logger, the deadlock detector and the prune interval (spec.md §9).
//! Here they're collected into one explicit, immutable-once-built record
//! that's threaded through `new_registry`/`new_namespace` instead.

use core::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::access::AccessDecisionHook;
use crate::error::{Error, PathResult};
use crate::logging::{FacadeLogger, Logger};
use crate::metrics::{NamespaceMetrics, NoopMetrics};

/// how long a node may sit untouched before the pruning engine reclaims it
pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// reserved for the out-of-scope clustering module (spec.md §6)
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterOptions {
    pub gossip: bool,
    pub raft: bool,
}

#[derive(Clone)]
pub struct RegistryOptions {
    pub(crate) trace_mutex_events: bool,
    pub(crate) break_deadlock: bool,
    pub(crate) enable_acls: bool,
    pub(crate) enable_pruning: bool,
    pub(crate) prune_interval: Duration,
    pub(crate) logger: Arc<dyn Logger>,
    pub(crate) metrics: Arc<dyn NamespaceMetrics>,
    pub(crate) access_decision: Option<AccessDecisionHook>,
    pub(crate) cluster: ClusterOptions,
}

impl fmt::Debug for RegistryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryOptions")
            .field("trace_mutex_events", &self.trace_mutex_events)
            .field("break_deadlock", &self.break_deadlock)
            .field("enable_acls", &self.enable_acls)
            .field("enable_pruning", &self.enable_pruning)
            .field("prune_interval", &self.prune_interval)
            .field("cluster", &self.cluster)
            .finish_non_exhaustive()
    }
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            trace_mutex_events: false,
            break_deadlock: false,
            enable_acls: false,
            enable_pruning: false,
            prune_interval: DEFAULT_PRUNE_INTERVAL,
            logger: Arc::new(FacadeLogger),
            metrics: Arc::new(NoopMetrics),
            access_decision: None,
            cluster: ClusterOptions::default(),
        }
    }
}

impl RegistryOptions {
    pub fn builder() -> RegistryOptionsBuilder {
        RegistryOptionsBuilder::default()
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    pub fn metrics(&self) -> &Arc<dyn NamespaceMetrics> {
        &self.metrics
    }

    pub fn access_decision(&self) -> Option<&AccessDecisionHook> {
        self.access_decision.as_ref()
    }

    pub fn trace_mutex_events(&self) -> bool {
        self.trace_mutex_events
    }

    pub fn break_deadlock(&self) -> bool {
        self.break_deadlock
    }

    pub fn enable_acls(&self) -> bool {
        self.enable_acls
    }

    pub fn enable_pruning(&self) -> bool {
        self.enable_pruning
    }

    pub fn prune_interval(&self) -> Duration {
        self.prune_interval
    }
}

#[derive(Default)]
pub struct RegistryOptionsBuilder {
    inner: RegistryOptionsInner,
}

/// plain-data staging area so the builder can detect an explicitly-passed
/// null logger before `build()` without fighting `Arc<dyn Logger>`'s lack
/// of a meaningful "unset" state
#[derive(Default)]
struct RegistryOptionsInner {
    trace_mutex_events: bool,
    break_deadlock: bool,
    enable_acls: bool,
    enable_pruning: bool,
    prune_interval: Option<Duration>,
    logger: Option<Arc<dyn Logger>>,
    metrics: Option<Arc<dyn NamespaceMetrics>>,
    access_decision: Option<AccessDecisionHook>,
    cluster: ClusterOptions,
}

impl RegistryOptionsBuilder {
    pub fn trace_mutex_events(mut self, on: bool) -> Self {
        self.inner.trace_mutex_events = on;
        self
    }

    pub fn break_deadlock(mut self, on: bool) -> Self {
        self.inner.break_deadlock = on;
        self
    }

    pub fn enable_acls(mut self, on: bool) -> Self {
        self.inner.enable_acls = on;
        self
    }

    pub fn enable_pruning(mut self, on: bool) -> Self {
        self.inner.enable_pruning = on;
        self
    }

    pub fn prune_interval(mut self, interval: Duration) -> Self {
        self.inner.prune_interval = Some(interval);
        self
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.inner.logger = Some(logger);
        self
    }

    /// same as [`Self::logger`] but takes an `Option`, for callers wiring a
    /// logger in from somewhere that may hand back nothing; surfaces
    /// `ConfigError` immediately instead of silently falling back to the
    /// default (mirrors `original_source/manageropts.go`'s `WithLogger`
    /// guarding against a nil logger).
    pub fn try_logger(mut self, logger: Option<Arc<dyn Logger>>) -> PathResult<Self> {
        self.inner.logger = Some(require_logger(logger)?);
        Ok(self)
    }

    pub fn metrics(mut self, metrics: Arc<dyn NamespaceMetrics>) -> Self {
        self.inner.metrics = Some(metrics);
        self
    }

    pub fn access_decision(mut self, hook: AccessDecisionHook) -> Self {
        self.inner.access_decision = Some(hook);
        self
    }

    pub fn gossip(mut self, on: bool) -> Self {
        self.inner.cluster.gossip = on;
        self
    }

    pub fn raft(mut self, on: bool) -> Self {
        self.inner.cluster.raft = on;
        self
    }

    pub fn build(self) -> PathResult<RegistryOptions> {
        let defaults = RegistryOptions::default();
        Ok(RegistryOptions {
            trace_mutex_events: self.inner.trace_mutex_events,
            break_deadlock: self.inner.break_deadlock,
            enable_acls: self.inner.enable_acls,
            enable_pruning: self.inner.enable_pruning,
            prune_interval: self.inner.prune_interval.unwrap_or(defaults.prune_interval),
            logger: self.inner.logger.unwrap_or(defaults.logger),
            metrics: self.inner.metrics.unwrap_or(defaults.metrics),
            access_decision: self.inner.access_decision,
            cluster: self.inner.cluster,
        })
    }
}

/// replaces a namespace's active logger; rejected if the namespace would be
/// left without one (mirrors `manageropts.go`'s `WithLogger` guarding
/// against a nil logger with a `ConfigError`)
pub fn require_logger(logger: Option<Arc<dyn Logger>>) -> PathResult<Arc<dyn Logger>> {
    logger.ok_or_else(|| Error::ConfigError("no logger passed to with_logger".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_enable_nothing() {
        let opts = RegistryOptions::default();
        assert!(!opts.enable_pruning());
        assert!(!opts.break_deadlock());
        assert!(!opts.enable_acls());
        assert_eq!(opts.prune_interval(), DEFAULT_PRUNE_INTERVAL);
    }

    #[test]
    fn builder_applies_overrides() {
        let opts = RegistryOptions::builder()
            .enable_pruning(true)
            .prune_interval(Duration::from_secs(5))
            .break_deadlock(true)
            .build()
            .unwrap();
        assert!(opts.enable_pruning());
        assert!(opts.break_deadlock());
        assert_eq!(opts.prune_interval(), Duration::from_secs(5));
    }

    #[test]
    fn try_logger_rejects_none() {
        let err = RegistryOptions::builder().try_logger(None).unwrap_err();
        assert_eq!(err, Error::ConfigError("no logger passed to with_logger".into()));
    }

    #[test]
    fn try_logger_accepts_some() {
        let built = RegistryOptions::builder()
            .try_logger(Some(Arc::new(FacadeLogger)))
            .unwrap()
            .build();
        assert!(built.is_ok());
    }
}
