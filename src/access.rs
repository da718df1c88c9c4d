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

//! # Access control hooks
//!
//! The core never enforces policy (spec.md §1: "the access-control hooks
//! ... are external collaborators"). This module only carries the identity
//! an operation was performed as, and an optional decision callback invoked
//! when `RegistryOptions::enable_acls` is set; the caller's own role/ACL
//! engine owns the actual decision.

use bytes::Bytes;
use std::sync::Arc;

/// an application-supplied role performing a lock/claim/set_value call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Role {
    pub name: Bytes,
}

impl Role {
    pub fn new(name: impl Into<Bytes>) -> Self {
        Self { name: name.into() }
    }
}

/// the identity + role attempting an action, forwarded opaquely to the
/// emitted event's `actor` field
#[derive(Debug, Clone, Default)]
pub struct AccessContext {
    pub identity: Bytes,
    pub role: Role,
}

impl AccessContext {
    pub fn new(identity: impl Into<Bytes>, role: Role) -> Self {
        Self {
            identity: identity.into(),
            role,
        }
    }
}

/// invoked (when `enable_acls` is set) before an action is allowed to
/// proceed; the core takes no action on its own if this is absent, which
/// is equivalent to allowing everything
pub trait AccessDecision: Send + Sync {
    fn approve(&self, ctx: &AccessContext, action: &str) -> bool;
}

pub type AccessDecisionHook = Arc<dyn AccessDecision>;
