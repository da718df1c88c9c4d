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

//! # Errors
//!
//! A single error enum for every fallible operation in the crate. Input,
//! cancellation and usage errors are returned to the caller; programming
//! errors abort the process (see `crate::error::fatal`).

use core::fmt;

pub type PathResult<T> = Result<T, Error>;

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Error {
    /// a path segment failed `Segment::validate`
    InvalidSegment(String),
    /// `Namespace::fetch`/`Node::fetch_subpath` found no matching node
    PathNotFound,
    /// attempted to create something that is already present
    AlreadyExists,
    /// a semaphore claim requested more weight than the pool's maximum
    CapacityExceeded,
    /// a lock or semaphore wait was cancelled before it could proceed
    Timeout,
    /// `Claim::release` called twice on the same claim
    AlreadyReleased,
    /// a `RegistryOptions` value was invalid (e.g. a null logger)
    ConfigError(String),
    /// the registry or namespace has been poisoned by an unrecoverable failure
    Poisoned,
    /// a non-reentrant lock acquisition was refused because the deadlock
    /// monitor flagged it (only surfaced when `break_deadlock` is enabled)
    Deadlock,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSegment(s) => write!(f, "invalid path segment: {s:?}"),
            Self::PathNotFound => write!(f, "no such path"),
            Self::AlreadyExists => write!(f, "already exists"),
            Self::CapacityExceeded => write!(f, "requested weight exceeds pool capacity"),
            Self::Timeout => write!(f, "timed out waiting"),
            Self::AlreadyReleased => write!(f, "claim was already released"),
            Self::ConfigError(msg) => write!(f, "configuration error: {msg}"),
            Self::Poisoned => write!(f, "namespace is poisoned"),
            Self::Deadlock => write!(f, "refusing lock acquisition: deadlock detected"),
        }
    }
}

impl std::error::Error for Error {}

/// Raised when an invariant documented in the data model is violated: a nil
/// origin on an event, or constructing a node with no segment. These are
/// programming errors, not recoverable input errors, so they abort the
/// process rather than returning a `Result`.
#[cold]
#[inline(never)]
pub fn fatal(msg: &str) -> ! {
    log::error!("programming error: {msg}");
    panic!("pathspace: programming error: {msg}");
}
