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

//! # Namespace registry
//!
//! spec.md §1 calls the top-level registry an external collaborator, but
//! §6 still lists its four operations as part of the library surface, so
//! it ships here as a thin, uncontested layer over a
//! `parking_lot::RwLock<HashMap<String, Arc<Namespace>>>` — grounded on
//! `original_source/manager.go`'s `Manager` map of named `PathSpace`s, with
//! the clustering (`gossip`/`raft`) fields it carried left as reserved,
//! unimplemented `ClusterOptions` per spec.md §1 ("out of scope ... any
//! cluster-replication transport").

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::RegistryOptions;
use crate::error::{Error, PathResult};
use crate::namespace::Namespace;

pub struct NamespaceRegistry {
    namespaces: RwLock<HashMap<String, Arc<Namespace>>>,
    options: RegistryOptions,
    poisoned: AtomicBool,
}

/// builds a registry with the given options (spec.md §6 `new_registry()`)
pub fn new_registry(options: RegistryOptions) -> Arc<NamespaceRegistry> {
    if options.break_deadlock() {
        crate::mutex::deadlock::install_break_deadlock_hook(Box::new(|msg| {
            log::error!("deadlock monitor: {msg}");
        }));
    }
    Arc::new(NamespaceRegistry {
        namespaces: RwLock::new(HashMap::new()),
        options,
        poisoned: AtomicBool::new(false),
    })
}

impl NamespaceRegistry {
    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    /// constructs a namespace using this registry's options and registers
    /// it in one step; the common path for callers that don't need to
    /// build a `Namespace` independently first
    pub fn new_namespace(&self, name: impl Into<String>) -> PathResult<Arc<Namespace>> {
        let name = name.into();
        let ns = Namespace::with_options(name.clone(), self.options.clone());
        self.register_namespace(name, ns.clone())?;
        Ok(ns)
    }

    pub fn register_namespace(&self, name: impl Into<String>, ns: Arc<Namespace>) -> PathResult<()> {
        let name = name.into();
        let mut map = self.namespaces.write();
        if map.contains_key(&name) {
            return Err(Error::AlreadyExists);
        }
        map.insert(name, ns);
        Ok(())
    }

    pub fn unregister_namespace(&self, name: &str) -> PathResult<()> {
        let mut map = self.namespaces.write();
        map.remove(name).map(|_| ()).ok_or(Error::PathNotFound)
    }

    pub fn fetch_namespace(&self, name: &str) -> PathResult<Arc<Namespace>> {
        self.namespaces
            .read()
            .get(name)
            .cloned()
            .ok_or(Error::PathNotFound)
    }

    /// boolean health probe for the whole registry (spec.md §6): unhealthy
    /// if the registry itself was poisoned, or if any registered namespace
    /// reports itself unhealthy
    pub fn healthy(&self) -> bool {
        if self.poisoned.load(Ordering::Acquire) {
            return false;
        }
        self.namespaces.read().values().all(|ns| ns.healthy())
    }

    pub(crate) fn poison(&self) {
        self.poisoned.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_fetch_unregister_round_trip() {
        let registry = new_registry(RegistryOptions::default());
        let ns = registry.new_namespace("orders").unwrap();
        assert!(Arc::ptr_eq(&registry.fetch_namespace("orders").unwrap(), &ns));

        registry.unregister_namespace("orders").unwrap();
        assert_eq!(
            registry.fetch_namespace("orders").unwrap_err(),
            Error::PathNotFound
        );
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = new_registry(RegistryOptions::default());
        registry.new_namespace("dup").unwrap();
        let second = Namespace::new("dup");
        assert_eq!(
            registry.register_namespace("dup", second).unwrap_err(),
            Error::AlreadyExists
        );
    }

    #[test]
    fn fresh_registry_is_healthy() {
        let registry = new_registry(RegistryOptions::default());
        registry.new_namespace("a").unwrap();
        assert!(registry.healthy());
        registry.poison();
        assert!(!registry.healthy());
    }
}
