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

//! # Deadlock monitor
//!
//! A process-global, best-effort advisory monitor. It flags two
//! conditions (spec.md §5):
//!
//! 1. recursive acquisition of the same [`TrackedMutex`] by the same
//!    thread (a non-reentrant writer lock locked twice);
//! 2. inconsistent lock ordering: thread A locks X then Y while thread B
//!    has previously locked Y then X.
//!
//! Detection never blocks an acquisition on its own — it only records and,
//! if a registry was built with `break_deadlock`, invokes that registry's
//! callback. Held-lock tracking is per-thread, which is exact for the
//! synchronous guards `TrackedMutex` is used for (they are never held
//! across an `.await`).

use parking_lot::Mutex as StdMutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::thread::{self, ThreadId};

/// toggled by `RegistryOptions::trace_mutex_events` (spec.md §6); when set,
/// every tracked acquisition is logged at debug level in addition to the
/// normal deadlock checks
static TRACE_ENABLED: AtomicBool = AtomicBool::new(false);

pub fn set_trace_enabled(enabled: bool) {
    TRACE_ENABLED.store(enabled, Ordering::Relaxed);
}

/// a short static tag identifying what a `TrackedMutex` is guarding, used
/// only for diagnostics (e.g. `"node.children"`, `"pool.counters"`)
pub type LockTag = &'static str;

#[derive(Clone, Copy)]
struct HeldLock {
    thread: ThreadId,
    tag: LockTag,
}

#[derive(Default)]
struct LockOrderState {
    /// locks currently held, keyed by the `TrackedMutex`'s address
    held: HashMap<usize, HeldLock>,
    /// locks held per-thread right now, in acquisition order
    held_by_thread: HashMap<ThreadId, Vec<usize>>,
    /// `(before, after)` pairs observed within a single thread
    order: HashMap<(usize, usize), ()>,
}

const MAX_ORDER_TABLE: usize = 1 << 16;

fn state() -> &'static StdMutex<LockOrderState> {
    static STATE: OnceLock<StdMutex<LockOrderState>> = OnceLock::new();
    STATE.get_or_init(|| StdMutex::new(LockOrderState::default()))
}

/// set once, process-wide, by the first registry built with
/// `break_deadlock(true)`; invoked (not blocking) whenever a potential
/// deadlock is flagged
static ON_POTENTIAL_DEADLOCK: OnceLock<Box<dyn Fn(&str) + Send + Sync>> = OnceLock::new();

pub fn install_break_deadlock_hook(hook: Box<dyn Fn(&str) + Send + Sync>) {
    let _ = ON_POTENTIAL_DEADLOCK.set(hook);
}

fn flag(msg: String) {
    log::warn!("potential deadlock: {msg}");
    if let Some(hook) = ON_POTENTIAL_DEADLOCK.get() {
        hook(&msg);
    }
}

pub fn report_acquire(addr: usize, tag: LockTag) {
    let me = thread::current().id();
    if TRACE_ENABLED.load(Ordering::Relaxed) {
        log::debug!("acquire {addr:?} tag={tag:?} thread={me:?}");
    }
    let mut st = state().lock();

    if let Some(prev) = st.held.get(&addr) {
        if prev.thread == me {
            flag(format!(
                "recursive acquisition of {:?} (tag {tag:?}) by the same thread",
                addr
            ));
        }
    }

    let already_held = st
        .held_by_thread
        .get(&me)
        .cloned()
        .unwrap_or_default();
    for &before in &already_held {
        if st.order.contains_key(&(addr, before)) {
            flag(format!(
                "inconsistent lock ordering: {addr:?} was previously locked after {before:?} on another thread, but is now locked before it here"
            ));
        }
        st.order.insert((before, addr), ());
        if st.order.len() >= MAX_ORDER_TABLE {
            st.order.clear();
        }
    }

    st.held.insert(
        addr,
        HeldLock {
            thread: me,
            tag,
        },
    );
    st.held_by_thread.entry(me).or_default().push(addr);
}

pub fn report_release(addr: usize) {
    let me = thread::current().id();
    let mut st = state().lock();
    st.held.remove(&addr);
    if let Some(v) = st.held_by_thread.get_mut(&me) {
        v.retain(|a| *a != addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutex::TrackedMutex;

    #[test]
    fn sequential_lock_unlock_does_not_flag() {
        let m = TrackedMutex::new("test.basic", 0u32);
        {
            let mut g = m.lock();
            *g += 1;
        }
        {
            let g = m.lock();
            assert_eq!(*g, 1);
        }
    }

    #[test]
    fn release_clears_per_thread_bookkeeping() {
        let m = TrackedMutex::new("test.release", ());
        let addr = &m as *const _ as usize;
        drop(m.lock());
        let st = state().lock();
        assert!(!st.held.contains_key(&addr));
    }
}
