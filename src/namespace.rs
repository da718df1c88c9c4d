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

//! # Namespace (C6)
//!
//! A root node plus a name: path registration/lookup/creation and the
//! pruning driver described in spec.md §4.6/§4.7. Grounded on
//! `original_source/pathspace.go`'s `PathSpace` (the `Register`/`Fetch`/
//! `FetchOrCreate` trio) and `original_source/prune.go`'s ticker loop,
//! reworked around a `tokio::time::interval` with `MissedTickBehavior::Delay`
//! so a slow prune pass coalesces subsequent ticks instead of bursting
//! (spec.md §4.7 "at most one prune pass runs at a time per namespace").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::access::AccessContext;
use crate::config::RegistryOptions;
use crate::error::{Error, PathResult};
use crate::event::Actor;
use crate::logging::Logger;
use crate::metrics::NamespaceMetrics;
use crate::mutex::deadlock;
use crate::node::PathNode;
use crate::path::{Segment, SegmentPath, ROOT_SENTINEL};

/// a named tree of path nodes rooted at an internal sentinel (spec.md §4.6)
pub struct Namespace {
    name: String,
    root: Arc<PathNode>,
    options: RegistryOptions,
    poisoned: AtomicBool,
}

impl Namespace {
    /// builds a namespace with default `RegistryOptions`; convenient for
    /// tests and callers that don't need the registry's builder surface
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_options(name, RegistryOptions::default())
    }

    pub fn with_options(name: impl Into<String>, options: RegistryOptions) -> Arc<Self> {
        if options.trace_mutex_events() {
            deadlock::set_trace_enabled(true);
        }

        let root_segment = Segment::new(ROOT_SENTINEL).unwrap_or_else(|_| {
            crate::error::fatal("root sentinel segment failed validation")
        });
        let root = PathNode::new_root(
            root_segment,
            options.metrics().clone(),
            options.logger().clone(),
            options.enable_acls(),
            options.access_decision().cloned(),
        );

        let ns = Arc::new(Self {
            name: name.into(),
            root,
            options,
            poisoned: AtomicBool::new(false),
        });

        if ns.options.enable_pruning() {
            ns.spawn_prune_ticker();
        }

        ns
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Arc<PathNode> {
        &self.root
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        self.options.logger()
    }

    pub fn metrics(&self) -> &Arc<dyn NamespaceMetrics> {
        self.options.metrics()
    }

    /// boolean health probe (spec.md §6 "Health surface"), backed by the
    /// poison flag set when this namespace hit an unrecoverable failure
    pub fn healthy(&self) -> bool {
        !self.poisoned.load(Ordering::Acquire)
    }

    pub(crate) fn poison(&self) {
        self.poisoned.store(true, Ordering::Release);
        self.options.logger().error(&format!(
            "namespace {:?} poisoned by an unrecoverable failure",
            self.name
        ));
    }

    /// invokes the configured access-control hook, if `enable_acls` is set
    /// and a hook was supplied; the return value is advisory only — the
    /// core never enforces policy on its own (spec.md §1, SPEC_FULL §6
    /// "Access-control hook surface"). Callers that care about the
    /// decision are expected to act on a `false` result themselves before
    /// invoking `lock`/`claim`/`set_value`.
    pub fn check_access(&self, ctx: &AccessContext, action: &str) -> bool {
        if !self.options.enable_acls() {
            return true;
        }
        match self.options.access_decision() {
            Some(hook) => hook.approve(ctx, action),
            None => true,
        }
    }

    fn check_healthy(&self) -> PathResult<()> {
        if self.healthy() {
            Ok(())
        } else {
            Err(Error::Poisoned)
        }
    }

    /// walks or creates each segment of `abs_path` using `Node::add`
    /// (spec.md §4.6 "`register(absolute_path)` walks or creates each
    /// segment")
    pub async fn register(&self, abs_path: &str) -> PathResult<Arc<PathNode>> {
        self.check_healthy()?;
        let path = SegmentPath::parse_absolute(abs_path)?;
        let mut cur = self.root.clone();
        for seg in path.segments() {
            cur = cur.add(seg.as_str())?;
        }
        Ok(cur)
    }

    /// returns the exact tail node iff its full materialized path equals
    /// the query (spec.md §4.6)
    pub async fn fetch(&self, abs_path: &str) -> PathResult<Arc<PathNode>> {
        self.check_healthy()?;
        let path = SegmentPath::parse_absolute(abs_path)?;
        let mut cur = self.root.clone();
        for seg in path.segments() {
            cur = cur.fetch_subpath(seg.as_str())?;
        }
        if cur.absolute_path() == path {
            Ok(cur)
        } else {
            Err(Error::PathNotFound)
        }
    }

    /// the compound of `fetch` and `register` (spec.md §4.6)
    pub async fn fetch_or_create(&self, abs_path: &str) -> PathResult<Arc<PathNode>> {
        match self.fetch(abs_path).await {
            Ok(n) => Ok(n),
            Err(Error::PathNotFound) => self.register(abs_path).await,
            Err(e) => Err(e),
        }
    }

    /// every terminal absolute path reachable by depth-first traversal
    /// (spec.md §4.6)
    pub async fn all_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        Self::collect_paths(&self.root, &mut out);
        out
    }

    fn collect_paths(node: &Arc<PathNode>, out: &mut Vec<String>) {
        let children = node.snapshot_children();
        if children.is_empty() && node.parent().is_some() {
            out.push(node.absolute_path_string());
            return;
        }
        for child in children {
            Self::collect_paths(&child, out);
        }
    }

    /// installs a prune tracker on `node` with the given idle ttl (spec.md
    /// §4.7); the namespace-level ticker sweeps every node carrying one
    pub fn enable_pruning_on(&self, node: &Arc<PathNode>, idle_ttl: Duration) {
        node.enable_pruning(idle_ttl);
    }

    fn spawn_prune_ticker(self: &Arc<Self>) {
        let ns = self.clone();
        let interval_dur = ns.options.prune_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval_dur);
            // a slow pass should delay the next tick rather than fire a
            // burst of catch-up ticks (spec.md §4.7 "coalesce")
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                ns.root.prune_pass();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_is_reentrant() {
        let ns = Namespace::new("test");
        let a = ns.register("/a/b/c").await.unwrap();
        let b = ns.register("/a/b/c").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn fetch_or_create_then_delete_is_not_found() {
        let ns = Namespace::new("test");
        let node = ns.fetch_or_create("/x/y").await.unwrap();
        node.delete(false, Actor::anonymous());
        let err = ns.fetch("/x/y").await.unwrap_err();
        assert_eq!(err, Error::PathNotFound);
    }

    #[tokio::test]
    async fn all_paths_lists_every_leaf() {
        let ns = Namespace::new("test");
        ns.register("/a/b").await.unwrap();
        ns.register("/a/c").await.unwrap();
        let mut paths = ns.all_paths().await;
        paths.sort();
        assert_eq!(paths, vec!["/a/b".to_string(), "/a/c".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn pruning_removes_idle_subtree() {
        let options = RegistryOptions::builder()
            .enable_pruning(true)
            .prune_interval(Duration::from_secs(1))
            .build()
            .unwrap();
        let ns = Namespace::with_options("test", options);
        let node = ns.register("/a/b").await.unwrap();
        ns.enable_pruning_on(&node, Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        // give the spawned ticker task a chance to run after the clock jump
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }

        assert_eq!(ns.fetch("/a/b").await.unwrap_err(), Error::PathNotFound);
    }

    #[tokio::test]
    async fn fresh_namespace_is_healthy() {
        let ns = Namespace::new("test");
        assert!(ns.healthy());
        ns.poison();
        assert!(!ns.healthy());
    }

    #[tokio::test]
    async fn poisoned_namespace_rejects_operations() {
        let ns = Namespace::new("test");
        ns.register("/a").await.unwrap();
        ns.poison();
        assert_eq!(ns.register("/b").await.unwrap_err(), Error::Poisoned);
        assert_eq!(ns.fetch("/a").await.unwrap_err(), Error::Poisoned);
    }

    #[test]
    fn access_check_passes_through_when_acls_disabled() {
        let ns = Namespace::new("test");
        let ctx = AccessContext::new("alice", crate::access::Role::new("admin"));
        assert!(ns.check_access(&ctx, "lock"));
    }

    #[test]
    fn access_check_consults_hook_when_acls_enabled() {
        use crate::access::{AccessContext, AccessDecision};
        struct DenyAll;
        impl AccessDecision for DenyAll {
            fn approve(&self, _ctx: &AccessContext, _action: &str) -> bool {
                false
            }
        }

        let options = RegistryOptions::builder()
            .enable_acls(true)
            .access_decision(Arc::new(DenyAll))
            .build()
            .unwrap();
        let ns = Namespace::with_options("test", options);
        let ctx = AccessContext::new("mallory", crate::access::Role::new("guest"));
        assert!(!ns.check_access(&ctx, "lock"));
    }
}
