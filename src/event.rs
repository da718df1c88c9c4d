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

//! # Events
//!
//! `ElementChange` is the internal notification passed between a node's own
//! pump and its parent's child channel. `WatchEvent` is what subscribers
//! actually see, minted by the multiplexer from an `ElementChange` plus a
//! wall-clock timestamp.

use bytes::Bytes;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::node::PathNode;

/// process-wide monotonic event id source (spec.md I6)
static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_event_id() -> u64 {
    NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed)
}

/// the opaque identity/role tag threaded through from the caller to the
/// emitted event; the core never interprets it (spec.md §9 "Actor")
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actor(pub Bytes);

impl Actor {
    pub fn new(tag: impl Into<Bytes>) -> Self {
        Self(tag.into())
    }

    pub fn anonymous() -> Self {
        Self(Bytes::new())
    }
}

/// the opaque payload attached to a node (spec.md §9 "Dynamic opaque `ElementValue`")
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementValue {
    pub data: Bytes,
    pub actor: Actor,
}

impl ElementValue {
    pub fn new(data: impl Into<Bytes>, actor: Actor) -> Self {
        Self {
            data: data.into(),
            actor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Edited,
    Locked,
    Unlocked,
    Released,
    Pruned,
    Deleted,
    Unknown,
}

/// an internal change notification, bounced upward through the tree before
/// being turned into a `WatchEvent` at each level's multiplexer
#[derive(Debug, Clone)]
pub struct ElementChange {
    pub id: u64,
    pub origin: Arc<PathNode>,
    pub kind: ChangeKind,
    pub actor: Actor,
}

impl ElementChange {
    pub fn new(origin: Arc<PathNode>, kind: ChangeKind, actor: Actor) -> Self {
        Self {
            id: next_event_id(),
            origin,
            kind,
            actor,
        }
    }
}

/// the event delivered to subscribers through an `EventMultiplexer`
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub id: u64,
    pub origin: Arc<PathNode>,
    pub timestamp: SystemTime,
    pub kind: ChangeKind,
    pub actor: Actor,
    pub note: String,
}

impl WatchEvent {
    pub(crate) fn from_change(change: &ElementChange) -> Self {
        Self {
            id: change.id,
            origin: change.origin.clone(),
            timestamp: SystemTime::now(),
            kind: change.kind,
            actor: change.actor.clone(),
            note: crate::watch::change_kind_note(change.kind).to_owned(),
        }
    }
}
