/*
 * Created on Tue Jul 28 2026
 *
 * This file is a part of pathspace
 * pathspace is an in-memory, hierarchical coordination namespace built for
 * low-latency, ephemeral coordination among cooperating processes inside a
 * single address space.
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

//! # pathspace
//!
//! An in-memory, hierarchical coordination namespace: path-structured
//! identifiers (`/a/b/c`) mapped to coordination primitives — exclusive
//! leases, weighted semaphore pools — plus a recursive watch fabric. See
//! each module's doc comment for the component of the design it covers.
//!
//! There is deliberately no durable storage, no cross-process
//! replication, and no CLI or config-file surface here: those are the
//! external collaborators of the registry that embeds this crate.

pub mod access;
pub mod config;
pub mod error;
pub mod event;
pub mod lock;
pub mod logging;
pub mod metrics;
mod mutex;
pub mod namespace;
pub mod node;
pub mod path;
pub mod registry;
pub mod semaphore;
pub mod watch;

pub use config::{ClusterOptions, RegistryOptions, RegistryOptionsBuilder};
pub use error::{Error, PathResult};
pub use event::{Actor, ChangeKind, ElementChange, ElementValue, WatchEvent};
pub use lock::{Lease, LeaseCancel, LockGuard};
pub use namespace::Namespace;
pub use node::PathNode;
pub use path::{AbsolutePath, RelativePath, Segment, SegmentPath};
pub use registry::{new_registry, NamespaceRegistry};
pub use semaphore::{Claim, SemaphorePool};
pub use watch::Subscription;
