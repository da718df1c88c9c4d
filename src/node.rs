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

//! # Path node (C5)
//!
//! A single tree node: owns its lock, its optional semaphore pool, its
//! multiplexer, its children, and the per-node event pump task described in
//! spec.md §4.5. Grounded on `original_source/pathelement.go`'s
//! `PathElement` (the `subevents`/`selfnotify`/`parentnotify` channel trio
//! and `watchChildren`'s select loop), reworked around bounded
//! `tokio::sync::mpsc` channels and a `tokio::task` pump per node rather
//! than bare goroutines.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::mutex::TrackedMutex;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

use crate::access::{AccessContext, AccessDecisionHook};
use crate::error::{Error, PathResult};
use crate::event::{Actor, ChangeKind, ElementChange, ElementValue};
use crate::lock::ResourceLock;
use crate::logging::Logger;
use crate::metrics::NamespaceMetrics;
use crate::path::{Segment, SegmentPath};
use crate::semaphore::SemaphorePool;
use crate::watch::{EventMultiplexer, Subscription};

const NODE_CHANNEL_BUFFER: usize = 64;

/// idle-pruning bookkeeping installed by `enable_pruning` (spec.md §4.7)
pub(crate) struct PruneInfo {
    pub idle_ttl: Duration,
    pub retain_data: bool,
    pub last_self_touch: Instant,
    pub last_child_touch: Instant,
}

pub struct PathNode {
    segment: Segment,
    parent: Option<Weak<PathNode>>,
    children: TrackedMutex<HashMap<String, Arc<PathNode>>>,
    value: TrackedMutex<Option<ElementValue>>,
    lock: ResourceLock,
    pool: TrackedMutex<Option<Arc<SemaphorePool>>>,
    multiplexer: EventMultiplexer,
    prune_info: TrackedMutex<Option<PruneInfo>>,
    shutdown: Arc<Notify>,
    self_tx: mpsc::Sender<ElementChange>,
    /// the sender half handed out to children so they can forward events
    /// upward into this node's own `child_events` receiver
    child_tx_for_children: mpsc::Sender<ElementChange>,
    parent_child_tx: Option<mpsc::Sender<ElementChange>>,
    metrics: Arc<dyn NamespaceMetrics>,
    logger: Arc<dyn Logger>,
    enable_acls: bool,
    access_decision: Option<AccessDecisionHook>,
}

impl PathNode {
    /// constructs the root node of a namespace; `self_tx`'s counterpart
    /// pump drains upward events into nothing, matching spec.md §4.5 "The
    /// root node has a dedicated drainer that discards upward events"
    pub(crate) fn new_root(
        root_segment: Segment,
        metrics: Arc<dyn NamespaceMetrics>,
        logger: Arc<dyn Logger>,
        enable_acls: bool,
        access_decision: Option<AccessDecisionHook>,
    ) -> Arc<Self> {
        Self::new_internal(
            root_segment,
            None,
            None,
            metrics,
            logger,
            enable_acls,
            access_decision,
        )
    }

    /// computes what `self.absolute_path_string()` will return once the
    /// node under construction is built, without needing `self` to exist
    /// yet: the root's path is empty (formats as `"/"`), every other node's
    /// path is its parent's absolute path plus its own segment.
    fn absolute_path_of(parent: &Option<Weak<PathNode>>, segment: &Segment) -> String {
        match parent {
            None => SegmentPath::empty().format_absolute(),
            Some(weak) => {
                let parent_node = weak
                    .upgrade()
                    .unwrap_or_else(|| crate::error::fatal("parent dropped during child construction"));
                let mut path = parent_node.absolute_path();
                path.push(segment.clone());
                path.format_absolute()
            }
        }
    }

    fn new_internal(
        segment: Segment,
        parent: Option<Weak<PathNode>>,
        parent_child_tx: Option<mpsc::Sender<ElementChange>>,
        metrics: Arc<dyn NamespaceMetrics>,
        logger: Arc<dyn Logger>,
        enable_acls: bool,
        access_decision: Option<AccessDecisionHook>,
    ) -> Arc<Self> {
        let (self_tx, self_rx) = mpsc::channel(NODE_CHANNEL_BUFFER);
        let (child_tx, child_rx) = mpsc::channel(NODE_CHANNEL_BUFFER);
        let shutdown = Arc::new(Notify::new());

        // the multiplexer's non-recursive filter compares against the
        // node's full absolute path (watch.rs "event.origin != owner"), so
        // owner_path must be the full path, not the bare segment
        let path_hint = Self::absolute_path_of(&parent, &segment);
        let node = Arc::new(Self {
            segment,
            parent,
            children: TrackedMutex::new("node.children", HashMap::new()),
            value: TrackedMutex::new("node.value", None),
            lock: ResourceLock::new(),
            pool: TrackedMutex::new("node.pool", None),
            multiplexer: EventMultiplexer::with_metrics(path_hint, metrics.clone()),
            prune_info: TrackedMutex::new("node.prune_info", None),
            shutdown: shutdown.clone(),
            self_tx,
            child_tx_for_children: child_tx,
            parent_child_tx,
            metrics,
            logger,
            enable_acls,
            access_decision,
        });

        let pump_node = node.clone();
        tokio::spawn(Self::run_pump(pump_node, self_rx, child_rx, shutdown));

        node
    }

    /// Drains `self_events`/`child_events` and republishes to the node's own
    /// multiplexer (spec.md §4.5). `self_rx`/`child_rx` are checked ahead of
    /// `shutdown` in the `biased` select below so a terminal `Pruned`/
    /// `Deleted` change already queued by [`Self::delete`] is always
    /// delivered before the pump exits — termination is driven by observing
    /// that change go by, not by racing it against the shutdown signal.
    /// `shutdown` remains only as the fallback used when the self channel is
    /// saturated and the terminal change couldn't be queued at all.
    async fn run_pump(
        node: Arc<PathNode>,
        mut self_rx: mpsc::Receiver<ElementChange>,
        mut child_rx: mpsc::Receiver<ElementChange>,
        shutdown: Arc<Notify>,
    ) {
        loop {
            let change = tokio::select! {
                biased;
                Some(c) = self_rx.recv() => c,
                Some(c) = child_rx.recv() => c,
                _ = shutdown.notified() => break,
                else => break,
            };

            let is_self_terminal = Arc::ptr_eq(&change.origin, &node)
                && matches!(change.kind, ChangeKind::Pruned | ChangeKind::Deleted);

            if let Some(parent_tx) = &node.parent_child_tx {
                let _ = parent_tx.send(change.clone()).await;
            }

            {
                let mut info = node.prune_info.lock();
                if let Some(info) = info.as_mut() {
                    if Arc::ptr_eq(&change.origin, &node) {
                        info.last_self_touch = Instant::now();
                    } else {
                        info.last_child_touch = Instant::now();
                    }
                }
            }

            node.multiplexer.broadcast(change);

            if is_self_terminal {
                break;
            }
        }

        node.logger.debug(&format!(
            "{} event pump exiting",
            node.absolute_path_string()
        ));
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn parent(self: &Arc<Self>) -> Option<Arc<Self>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// the chain of ancestors from the immediate parent up to (and
    /// including) the root
    pub fn parent_chain(self: &Arc<Self>) -> Vec<Arc<Self>> {
        let mut chain = Vec::new();
        let mut cur = self.parent();
        while let Some(p) = cur {
            chain.push(p.clone());
            cur = p.parent();
        }
        chain
    }

    pub fn absolute_path(self: &Arc<Self>) -> SegmentPath {
        let mut segs: Vec<Segment> = self
            .parent_chain()
            .into_iter()
            .rev()
            .filter(|n| n.parent.is_some())
            .map(|n| n.segment.clone())
            .collect();
        if self.parent.is_some() {
            segs.push(self.segment.clone());
        }
        let mut path = SegmentPath::empty();
        for s in segs {
            path.push(s);
        }
        path
    }

    pub(crate) fn absolute_path_string(self: &Arc<Self>) -> String {
        self.absolute_path().format_absolute()
    }

    pub fn resource_lock(&self) -> &ResourceLock {
        &self.lock
    }

    pub(crate) fn notify_locked(self: &Arc<Self>, actor: Actor) {
        self.emit_self(ChangeKind::Locked, actor);
    }

    pub(crate) fn notify_unlocked(self: &Arc<Self>) {
        self.emit_self(ChangeKind::Unlocked, self.last_actor());
    }

    pub(crate) fn notify_released(self: &Arc<Self>, _weight: u64, actor: Actor) {
        self.emit_self(ChangeKind::Released, actor);
        self.metrics.on_unlock(&self.absolute_path_string());
    }

    fn last_actor(&self) -> Actor {
        self.value
            .lock()
            .as_ref()
            .map(|v| v.actor.clone())
            .unwrap_or_else(Actor::anonymous)
    }

    /// the actor tag to stamp on an emitted event when an [`AccessContext`]
    /// was supplied for the call (spec.md §9 "Actor"; SPEC_FULL.md §6
    /// "Access-control hook surface" — the core forwards `ctx` to the
    /// emitted event's `actor` field), falling back to the node's
    /// last-set-value actor when no context was given
    pub(crate) fn actor_or_default(&self, ctx: Option<&AccessContext>) -> Actor {
        match ctx {
            Some(c) => Actor::new(c.identity.clone()),
            None => self.last_actor(),
        }
    }

    /// invokes the configured, advisory-only access-decision hook for
    /// `action` (SPEC_FULL.md §6 "Access-control hook surface"); the core
    /// never blocks the call on the result, it only logs a warning so the
    /// decision is visible — enforcement, if any, is the caller's own
    /// responsibility
    pub(crate) fn check_access(self: &Arc<Self>, ctx: Option<&AccessContext>, action: &str) {
        if !self.enable_acls {
            return;
        }
        if let (Some(hook), Some(ctx)) = (self.access_decision.as_ref(), ctx) {
            if !hook.approve(ctx, action) {
                self.logger.warn(&format!(
                    "{}: access hook denied {action} (advisory only, not enforced)",
                    self.absolute_path_string()
                ));
            }
        }
    }

    /// queues `change` directly on the node's own self channel, in the
    /// calling thread, rather than handing it to a freshly spawned task:
    /// two calls made back-to-back (e.g. `notify_locked` then
    /// `notify_unlocked`) must reach the pump in call order (spec.md §5),
    /// which a pair of independently-scheduled spawned tasks cannot
    /// guarantee on the crate's `rt-multi-thread` runtime. Mirrors
    /// `original_source/channels.go`'s synchronous `t.Broadcast <- msg`
    /// used from a node's own serial call path, as opposed to
    /// `BroadcastAsync`'s detached goroutine.
    fn emit_self(self: &Arc<Self>, kind: ChangeKind, actor: Actor) {
        if kind == ChangeKind::Locked {
            self.metrics.on_lock(&self.absolute_path_string());
        }
        let change = ElementChange::new(self.clone(), kind, actor);
        if self.self_tx.try_send(change).is_err() {
            self.logger.warn(&format!(
                "{}: self channel saturated, event dropped",
                self.absolute_path_string()
            ));
        }
    }

    pub(crate) fn metrics_on_claim(self: &Arc<Self>, weight: u64) {
        self.metrics.on_claim(&self.absolute_path_string(), weight);
    }

    pub(crate) fn metrics_on_claim_release(self: &Arc<Self>, weight: u64) {
        self.metrics
            .on_claim_release(&self.absolute_path_string(), weight);
    }

    /// validates `seg`, then returns the existing child of that name or
    /// constructs a new one (re-entrant: spec.md §4.5 "if the segment
    /// already exists, return the existing child")
    pub fn add(self: &Arc<Self>, seg: &str) -> PathResult<Arc<Self>> {
        Segment::validate_str(seg)?;
        let mut children = self.children.lock();
        if let Some(existing) = children.get(seg) {
            return Ok(existing.clone());
        }

        let segment = Segment::new(seg)?;
        let parent_weak = Arc::downgrade(self);
        let child = Self::new_internal(
            segment,
            Some(parent_weak),
            Some(self.self_tx_for_children()),
            self.metrics.clone(),
            self.logger.clone(),
            self.enable_acls,
            self.access_decision.clone(),
        );

        {
            let mut pinfo = self.prune_info.lock();
            if let Some(parent_info) = pinfo.take() {
                let child_info = PruneInfo {
                    idle_ttl: parent_info.idle_ttl,
                    retain_data: false,
                    last_self_touch: Instant::now(),
                    last_child_touch: Instant::now(),
                };
                *child.prune_info.lock() = Some(child_info);
                *pinfo = Some(parent_info);
            }
        }

        children.insert(seg.to_owned(), child.clone());
        drop(children);

        self.emit_self(ChangeKind::Added, Actor::anonymous());
        Ok(child)
    }

    /// the sender a new child uses to forward events up into this node's
    /// own `child_events` receiver, drained by this node's pump
    fn self_tx_for_children(&self) -> mpsc::Sender<ElementChange> {
        self.child_tx_for_children.clone()
    }

    pub fn append_relative(self: &Arc<Self>, rel: &str) -> PathResult<Arc<Self>> {
        let path = SegmentPath::parse_relative(rel)?;
        let mut cur = self.clone();
        for seg in path.segments() {
            cur = cur.add(seg.as_str())?;
        }
        Ok(cur)
    }

    /// returns the existing descendant at `rel`, or `PathNotFound`; no side
    /// effects
    pub fn fetch_subpath(self: &Arc<Self>, rel: &str) -> PathResult<Arc<Self>> {
        let path = SegmentPath::parse_relative(rel)?;
        let mut cur = self.clone();
        for seg in path.segments() {
            let next = cur.children.lock().get(seg.as_str()).cloned();
            match next {
                Some(n) => cur = n,
                None => return Err(Error::PathNotFound),
            }
        }
        Ok(cur)
    }

    /// walks as far as children exist, returning the last matched node
    /// (spec.md §4.5 "used for prefix queries")
    pub fn fetch_closest(self: &Arc<Self>, rel: &str) -> PathResult<Arc<Self>> {
        let path = SegmentPath::parse_relative(rel)?;
        let mut cur = self.clone();
        for seg in path.segments() {
            let next = cur.children.lock().get(seg.as_str()).cloned();
            match next {
                Some(n) => cur = n,
                None => break,
            }
        }
        Ok(cur)
    }

    pub fn subpath(self: &Arc<Self>) -> Segment {
        self.segment.clone()
    }

    pub fn snapshot_children(&self) -> Vec<Arc<PathNode>> {
        self.children.lock().values().cloned().collect()
    }

    pub fn get_value(&self) -> Option<ElementValue> {
        self.value.lock().clone()
    }

    /// `ctx`, when given, is forwarded to the configured access-decision
    /// hook (SPEC_FULL.md §6 "Access-control hook surface"); it never
    /// gates the write itself
    pub fn set_value(
        self: &Arc<Self>,
        value: ElementValue,
        kind: ChangeKind,
        actor: Actor,
        ctx: Option<&AccessContext>,
    ) {
        self.check_access(ctx, "set_value");
        *self.value.lock() = Some(value);
        self.emit_self(kind, actor);
    }

    pub fn install_pool(self: &Arc<Self>, pool: Arc<SemaphorePool>) {
        *self.pool.lock() = Some(pool);
    }

    pub fn pool(&self) -> Option<Arc<SemaphorePool>> {
        self.pool.lock().clone()
    }

    /// installs a pool on this node, optionally propagating a shared
    /// reference to descendants that have none (or are being purged),
    /// per spec.md §4.3
    pub fn create_pool(
        self: &Arc<Self>,
        max_weight: u64,
        propagate: bool,
        purge_existing: bool,
    ) -> Arc<SemaphorePool> {
        let pool = SemaphorePool::new(self.clone(), max_weight);
        self.install_pool(pool.clone());
        if propagate {
            self.propagate_pool(&pool, purge_existing);
        }
        pool
    }

    fn propagate_pool(self: &Arc<Self>, pool: &Arc<SemaphorePool>, purge_existing: bool) {
        for child in self.snapshot_children() {
            let should_install = purge_existing || child.pool().is_none();
            if should_install {
                child.install_pool(pool.clone());
            }
            child.propagate_pool(pool, purge_existing);
        }
    }

    pub fn enable_pruning(self: &Arc<Self>, idle_ttl: Duration) {
        *self.prune_info.lock() = Some(PruneInfo {
            idle_ttl,
            retain_data: false,
            last_self_touch: Instant::now(),
            last_child_touch: Instant::now(),
        });
    }

    pub fn prevent_pruning(&self) {
        if let Some(info) = self.prune_info.lock().as_mut() {
            info.retain_data = true;
        }
    }

    pub(crate) fn is_prunable_now(&self) -> bool {
        let info = self.prune_info.lock();
        match info.as_ref() {
            None => false,
            Some(info) => {
                !info.retain_data
                    && info.last_child_touch.elapsed() >= info.idle_ttl
                    && info.last_self_touch.elapsed() >= info.idle_ttl
            }
        }
    }

    /// depth-first idle sweep driven by the namespace's prune ticker
    /// (spec.md §4.7). Snapshots children under the mutation guard before
    /// recursing so the guard is never held across a deep descent, then
    /// deletes each child whose prune tracker reports idle.
    pub(crate) fn prune_pass(self: &Arc<Self>) {
        for child in self.snapshot_children() {
            child.prune_pass();
            if child.is_prunable_now() {
                self.logger.debug(&format!(
                    "pruning idle subtree at {}",
                    child.absolute_path_string()
                ));
                child.delete(true, Actor::anonymous());
            }
        }
    }

    pub fn subscribe(&self, recursive: bool) -> Subscription {
        self.multiplexer.register(recursive)
    }

    pub fn unsubscribe(&self, sub: &Subscription) {
        self.multiplexer.unregister(sub);
    }

    /// recursively deletes this node's subtree: releases locks, detaches
    /// from the parent, then queues exactly one terminal `Pruned`/`Deleted`
    /// change so the node's own pump forwards it upward and republishes it
    /// to the multiplexer before exiting (spec.md §3 lifecycle, §4.5 "emit a
    /// final `Pruned` event ... then exit the pump"). Subscribers therefore
    /// always observe the terminal event before their sink is closed by the
    /// multiplexer shutting down behind it.
    pub fn delete(self: &Arc<Self>, via_prune: bool, actor: Actor) {
        let children = self.snapshot_children();
        for child in children {
            child.delete(via_prune, actor.clone());
        }

        if self.lock.is_held() {
            self.lock.unlock(None);
        }

        let kind = if via_prune {
            ChangeKind::Pruned
        } else {
            ChangeKind::Deleted
        };
        if via_prune {
            self.metrics.on_prune(&self.absolute_path_string());
        }

        if let Some(parent) = self.parent() {
            parent
                .children
                .lock()
                .remove(self.segment.as_str());
        }

        let change = ElementChange::new(self.clone(), kind, actor);
        if self.self_tx.try_send(change).is_err() {
            self.logger.warn(&format!(
                "{}: terminal event dropped, self channel saturated; forcing pump shutdown",
                self.absolute_path_string()
            ));
            self.shutdown.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Namespace;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn explicit_delete_emits_deleted_before_sink_closes() {
        let ns = Namespace::new("test");
        let node = ns.register("/a/b").await.unwrap();
        let mut sub = node.subscribe(false);
        let mut events = sub.events();

        node.delete(false, Actor::anonymous());

        let first = tokio::time::timeout(Duration::from_millis(500), events.next())
            .await
            .expect("terminal event should arrive")
            .expect("sink should yield the terminal event, not an immediate close");
        assert_eq!(first.kind, ChangeKind::Deleted);
    }

    #[tokio::test]
    async fn prune_driven_delete_emits_pruned_not_deleted() {
        let ns = Namespace::new("test");
        let node = ns.register("/a/b").await.unwrap();
        let mut sub = node.subscribe(false);
        let mut events = sub.events();

        node.delete(true, Actor::anonymous());

        let first = tokio::time::timeout(Duration::from_millis(500), events.next())
            .await
            .expect("terminal event should arrive")
            .expect("sink should yield the terminal event");
        assert_eq!(first.kind, ChangeKind::Pruned);
    }

    #[tokio::test]
    async fn recursive_subscriber_on_ancestor_sees_descendant_terminal_event() {
        let ns = Namespace::new("test");
        ns.register("/a/b/c").await.unwrap();
        let a = ns.fetch("/a").await.unwrap();
        let c = ns.fetch("/a/b/c").await.unwrap();

        let mut sub = a.subscribe(true);
        let mut events = sub.events();

        c.delete(false, Actor::anonymous());

        let mut saw_deleted_at_c = false;
        for _ in 0..8 {
            match tokio::time::timeout(Duration::from_millis(200), events.next()).await {
                Ok(Some(ev)) if ev.kind == ChangeKind::Deleted && Arc::ptr_eq(&ev.origin, &c) => {
                    saw_deleted_at_c = true;
                    break;
                }
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
        assert!(saw_deleted_at_c, "ancestor's recursive subscriber should see the descendant's Deleted event");
    }
}
