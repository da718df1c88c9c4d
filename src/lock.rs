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

//! # Resource lock
//!
//! A writer-exclusive lock attached to every [`crate::node::PathNode`]. The
//! exclusion primitive itself is a `tokio::sync::Mutex` so waiting on it is
//! a suspension point rather than a spin (spec.md §5); a small
//! `parking_lot`-guarded status record tracks `held`/`recursive`/the
//! holder's role for diagnostics and for `unlock()`'s idempotency check.
//!
//! `lock_subtree`/`unlock_subtree` fan out depth-first, locking/unlocking
//! every descendant concurrently and joining before returning, mirroring
//! `asyncRecursiveLockSelfAndSubs`/`asyncRecursiveUnLockSelfAndSubs` in the
//! original source's `locking.go`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as StdMutex;
use tokio::sync::{Mutex as AsyncMutex, Notify, OwnedMutexGuard};
use tokio::time::Instant;

use crate::access::{AccessContext, Role};
use crate::error::PathResult;
use crate::mutex::TrackedMutex;
use crate::node::PathNode;

#[derive(Debug, Default, Clone)]
struct LockStatus {
    held: bool,
    recursive: bool,
    holder_role: Option<Role>,
}

/// the per-node writer-exclusive lock described in spec.md §4.2
pub struct ResourceLock {
    writer: Arc<AsyncMutex<()>>,
    status: TrackedMutex<LockStatus>,
}

impl Default for ResourceLock {
    fn default() -> Self {
        Self {
            writer: Arc::new(AsyncMutex::new(())),
            status: TrackedMutex::new("lock.status", LockStatus::default()),
        }
    }
}

impl ResourceLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        self.status.lock().held
    }

    pub fn holder_role(&self) -> Option<Role> {
        self.status.lock().holder_role.clone()
    }

    /// blocks until the writer exclusion is held
    pub(crate) async fn lock(&self, recursive: bool, role: Option<Role>) -> OwnedMutexGuard<()> {
        let guard = self.writer.clone().lock_owned().await;
        let mut st = self.status.lock();
        st.held = true;
        st.recursive = recursive;
        st.holder_role = role;
        guard
    }

    /// releases the writer exclusion; a no-op (with a logged warning) if
    /// the guard has already been consumed by a prior unlock
    pub(crate) fn unlock(&self, guard: Option<OwnedMutexGuard<()>>) {
        let mut st = self.status.lock();
        if guard.is_none() {
            log::warn!("ignoring call to unlock an already-unlocked resource lock");
            return;
        }
        st.held = false;
        st.recursive = false;
        st.holder_role = None;
        // guard drops here, releasing the writer mutex
    }
}

/// the live guard returned while a node (and, for `lock_subtree`, its
/// descendants) are held; dropping it without calling `unlock`/
/// `unlock_subtree` silently leaves the lock held — callers are expected
/// to route releases through `Lock::unlock`/`unlock_subtree`.
pub struct LockGuard {
    node: Arc<PathNode>,
    recursive: bool,
    inner: Option<OwnedMutexGuard<()>>,
}

impl LockGuard {
    pub(crate) fn new(node: Arc<PathNode>, recursive: bool, inner: OwnedMutexGuard<()>) -> Self {
        Self {
            node,
            recursive,
            inner: Some(inner),
        }
    }

    pub fn node(&self) -> &Arc<PathNode> {
        &self.node
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }
}

/// locks `node`'s own resource lock and emits the `Locked` event described
/// in spec.md §4.2. `ctx`, when given, is forwarded to the configured
/// access-decision hook and stamped as the emitted event's actor
/// (SPEC_FULL.md §6 "Access-control hook surface").
pub async fn lock_self(node: Arc<PathNode>, ctx: Option<AccessContext>) -> LockGuard {
    node.check_access(ctx.as_ref(), "lock");
    let role = ctx.as_ref().map(|c| c.role.clone());
    let guard = node.resource_lock().lock(false, role).await;
    let actor = node.actor_or_default(ctx.as_ref());
    node.notify_locked(actor);
    LockGuard::new(node, false, guard)
}

pub fn unlock_self(mut guard: LockGuard) {
    let inner = guard.inner.take();
    guard.node.resource_lock().unlock(inner);
    guard.node.notify_unlocked();
}

/// recursively locks `node` and every descendant depth-first, joining all
/// child tasks before returning (spec.md §4.2 "parallel depth-first")
pub fn lock_subtree(
    node: Arc<PathNode>,
    ctx: Option<AccessContext>,
) -> Pin<Box<dyn Future<Output = Vec<LockGuard>> + Send>> {
    Box::pin(async move {
        node.check_access(ctx.as_ref(), "lock_subtree");
        let role = ctx.as_ref().map(|c| c.role.clone());
        let self_guard_inner = node.resource_lock().lock(true, role).await;
        let children = node.snapshot_children();

        let mut handles = Vec::with_capacity(children.len());
        for child in children {
            let child_ctx = ctx.clone();
            handles.push(tokio::spawn(lock_subtree(child, child_ctx)));
        }

        let mut guards = vec![LockGuard::new(node.clone(), true, self_guard_inner)];
        for handle in handles {
            if let Ok(mut sub_guards) = handle.await {
                guards.append(&mut sub_guards);
            }
        }

        let actor = node.actor_or_default(ctx.as_ref());
        node.notify_locked(actor);
        guards
    })
}

/// unlocks every guard produced by [`lock_subtree`]; order does not matter
/// since each guard targets a distinct node. Every released node emits its
/// own `Unlocked` event, mirroring `unlock_self` — spec.md §4.2's lock state
/// machine requires a transition out of `Held` to emit `Unlocked` regardless
/// of whether the lock was taken via `lock_self` or `lock_subtree`.
pub fn unlock_subtree(guards: Vec<LockGuard>) {
    for mut guard in guards {
        let inner = guard.inner.take();
        guard.node.resource_lock().unlock(inner);
        guard.node.notify_unlocked();
    }
}

/// a composable cancellation/deadline handle returned by `lock_with_lease`
/// (spec.md §9 "Context-object lease"), analogous to `LeaseContext` in
/// `original_source/lease.go`
pub struct Lease {
    deadline: Instant,
    done: Arc<Notify>,
    cancelled: Arc<StdMutex<bool>>,
    node: Arc<PathNode>,
    recursive: bool,
}

impl Lease {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// resolves once the lease has ended, whether by ttl, explicit cancel,
    /// or parent cancellation
    pub async fn done(&self) {
        if *self.cancelled.lock() {
            return;
        }
        self.done.notified().await;
    }

    pub fn is_done(&self) -> bool {
        *self.cancelled.lock()
    }

    pub fn node(&self) -> &Arc<PathNode> {
        &self.node
    }
}

/// a cancel handle returned alongside a [`Lease`]; calling it releases the
/// underlying lock immediately, same as ttl expiry
#[derive(Clone)]
pub struct LeaseCancel {
    cancelled: Arc<StdMutex<bool>>,
    done: Arc<Notify>,
}

impl LeaseCancel {
    pub fn cancel(&self) {
        let mut c = self.cancelled.lock();
        if !*c {
            *c = true;
            self.done.notify_waiters();
        }
    }
}

/// acquires `node`'s lock (or subtree lock, if `recursive`) and arms an
/// auto-release on the first of: `ttl` elapsing, `parent_done` resolving,
/// or the returned [`LeaseCancel`] being invoked
pub async fn lock_with_lease(
    node: Arc<PathNode>,
    ttl: Duration,
    recursive: bool,
    ctx: Option<AccessContext>,
    parent_done: Option<Pin<Box<dyn Future<Output = ()> + Send>>>,
) -> PathResult<(Lease, LeaseCancel)> {
    let guards: LeaseGuards = if recursive {
        LeaseGuards::Subtree(lock_subtree(node.clone(), ctx).await)
    } else {
        LeaseGuards::Single(lock_self(node.clone(), ctx).await)
    };

    let deadline = Instant::now() + ttl;
    let done = Arc::new(Notify::new());
    let cancelled = Arc::new(StdMutex::new(false));

    let lease = Lease {
        deadline,
        done: done.clone(),
        cancelled: cancelled.clone(),
        node: node.clone(),
        recursive,
    };
    let cancel = LeaseCancel {
        cancelled: cancelled.clone(),
        done: done.clone(),
    };

    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {}
            _ = async {
                // check-then-wait, same idiom as the semaphore pool's claim
                // loop: `cancel()` may have already flipped the flag and
                // fired `notify_waiters()` before this task got scheduled,
                // in which case a bare `.notified().await` here would never
                // see that notification and would block until the ttl
                loop {
                    if *cancelled.lock() {
                        return;
                    }
                    done.notified().await;
                }
            } => {}
            _ = async {
                match parent_done {
                    Some(fut) => fut.await,
                    None => std::future::pending().await,
                }
            } => {}
        }

        let mut c = cancelled.lock();
        let already_cancelled_by_user = *c;
        *c = true;
        drop(c);

        match guards {
            LeaseGuards::Single(g) => unlock_self(g),
            LeaseGuards::Subtree(g) => unlock_subtree(g),
        }

        if !already_cancelled_by_user {
            done.notify_waiters();
        }
    });

    Ok((lease, cancel))
}

enum LeaseGuards {
    Single(LockGuard),
    Subtree(Vec<LockGuard>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Namespace;
    use std::time::Duration as StdDuration;

    #[tokio::test(start_paused = true)]
    async fn lease_expires_after_ttl() {
        let ns = Namespace::new("test");
        let node = ns.register("/testelement").await.unwrap();

        let (lease, _cancel) = lock_with_lease(node.clone(), StdDuration::from_secs(1), false, None, None)
            .await
            .unwrap();
        assert!(node.resource_lock().is_held());

        tokio::time::advance(StdDuration::from_secs(1)).await;
        lease.done().await;

        assert!(!node.resource_lock().is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_cancel_fires_before_ttl() {
        let ns = Namespace::new("test");
        let node = ns.register("/testelement").await.unwrap();

        let (lease, cancel) = lock_with_lease(node.clone(), StdDuration::from_secs(5), false, None, None)
            .await
            .unwrap();

        tokio::time::advance(StdDuration::from_secs(1)).await;
        cancel.cancel();
        lease.done().await;

        assert!(!node.resource_lock().is_held());
    }
}
