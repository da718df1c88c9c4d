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

//! # Tracked mutexes
//!
//! In several scenarios we want our own plain `parking_lot::Mutex` instead
//! of something more sophisticated, but we still want the cross-cutting
//! deadlock monitor described in spec.md §5 to see every acquisition. A
//! [`TrackedMutex`] is a thin wrapper that reports itself to the process
//! global [`deadlock::report_acquire`]/[`deadlock::report_release`] hooks
//! around every lock. This is scoped to the synchronous guards used for
//! node bookkeeping (children maps, subscriber maps, pool counters) — the
//! async writer-exclusive `ResourceLock` in [`crate::lock`] is an
//! intentional suspension point, not a candidate for this monitor.

pub mod deadlock;

use core::ops::{Deref, DerefMut};
use deadlock::LockTag;
use parking_lot::{Mutex, MutexGuard};

pub struct TrackedMutex<T> {
    inner: Mutex<T>,
    tag: LockTag,
}

impl<T> TrackedMutex<T> {
    pub fn new(tag: LockTag, value: T) -> Self {
        Self {
            inner: Mutex::new(value),
            tag,
        }
    }

    /// blocks until the mutex is free; reports the acquisition site to the
    /// deadlock monitor first so a same-task recursive acquisition can be
    /// flagged before actually deadlocking on `parking_lot`'s mutex
    pub fn lock(&self) -> TrackedGuard<'_, T> {
        let addr = self as *const _ as usize;
        deadlock::report_acquire(addr, self.tag);
        TrackedGuard {
            addr,
            guard: self.inner.lock(),
        }
    }
}

/// a `parking_lot::MutexGuard` that reports its release to the deadlock
/// monitor when dropped, wherever in the call stack that happens
pub struct TrackedGuard<'a, T> {
    addr: usize,
    guard: MutexGuard<'a, T>,
}

impl<T> Deref for TrackedGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for TrackedGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for TrackedGuard<'_, T> {
    fn drop(&mut self) {
        deadlock::report_release(self.addr);
    }
}
