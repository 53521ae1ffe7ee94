// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Registry mapping server-assigned registration IDs to subscription handles.
//!
//! Mutated concurrently by registration completions, revocation frames, and bulk
//! re-registration after a welcome. Built on `DashMap` so each operation is atomic per key
//! without a registry-wide lock.
//!
//! A revocation frame can overtake the `register` response for the same ID. Such early
//! revocations are remembered in a small bounded set, and installing an ID found there
//! is refused. One mutex covers the lookup-or-remember step and the install step so the
//! two cannot interleave.
//!
//! # Invariants
//!
//! - A handle holding a registration ID is present under that ID.
//! - A handle that lost its registration ID is not present under any ID.
//! - Registration IDs are unique; installing an ID already present replaces the previous
//!   handle, which the caller revokes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;

use super::{cache::MessageIdCache, subscription::SubscriptionHandle};

/// Number of early revocations remembered.
pub const EARLY_REVOCATION_CAPACITY: usize = 64;

/// Result of [`SubscriptionRegistry::install`].
#[derive(Debug)]
pub enum InstallOutcome {
    /// Installed; `displaced` is the other handle which held the ID, if any.
    Installed {
        displaced: Option<Arc<SubscriptionHandle>>,
    },
    /// The remote revoked the ID before it was installed.
    RevokedEarly,
}

/// Thread-safe mapping from registration ID to [`SubscriptionHandle`].
#[derive(Debug)]
pub struct SubscriptionRegistry {
    handles: DashMap<String, Arc<SubscriptionHandle>>,
    early_revocations: Mutex<MessageIdCache>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self {
            handles: DashMap::new(),
            early_revocations: Mutex::new(MessageIdCache::new(EARLY_REVOCATION_CAPACITY)),
        }
    }
}

impl SubscriptionRegistry {
    /// Creates a new empty [`SubscriptionRegistry`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_revocations(&self) -> MutexGuard<'_, MessageIdCache> {
        self.early_revocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs `handle` under `registration_id` unless the remote already revoked it.
    pub fn install(
        &self,
        registration_id: &str,
        handle: &Arc<SubscriptionHandle>,
    ) -> InstallOutcome {
        let mut revocations = self.lock_revocations();
        if revocations.remove(registration_id) {
            return InstallOutcome::RevokedEarly;
        }

        let displaced = self
            .insert(registration_id, Arc::clone(handle))
            .filter(|previous| !Arc::ptr_eq(previous, handle));
        InstallOutcome::Installed { displaced }
    }

    /// Removes the handle for a remotely revoked `registration_id`.
    ///
    /// If no handle is installed yet the ID is remembered, and a later
    /// [`SubscriptionRegistry::install`] of it is refused.
    pub fn revoke_remote(&self, registration_id: &str) -> Option<Arc<SubscriptionHandle>> {
        let mut revocations = self.lock_revocations();
        let removed = self.remove(registration_id);
        if removed.is_none() {
            revocations.insert(registration_id);
        }
        removed
    }

    /// Installs `handle` under `registration_id`, returning the handle it replaced.
    pub fn insert(
        &self,
        registration_id: &str,
        handle: Arc<SubscriptionHandle>,
    ) -> Option<Arc<SubscriptionHandle>> {
        self.handles.insert(registration_id.to_string(), handle)
    }

    /// Returns the handle registered under `registration_id`.
    #[must_use]
    pub fn get(&self, registration_id: &str) -> Option<Arc<SubscriptionHandle>> {
        self.handles
            .get(registration_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Removes and returns the handle registered under `registration_id`.
    pub fn remove(&self, registration_id: &str) -> Option<Arc<SubscriptionHandle>> {
        self.handles
            .remove(registration_id)
            .map(|(_, handle)| handle)
    }

    /// Removes the entry for `registration_id` only if it maps to `handle`.
    pub fn remove_if_same(&self, registration_id: &str, handle: &Arc<SubscriptionHandle>) -> bool {
        self.handles
            .remove_if(registration_id, |_, current| Arc::ptr_eq(current, handle))
            .is_some()
    }

    #[must_use]
    pub fn contains(&self, registration_id: &str) -> bool {
        self.handles.contains_key(registration_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Returns all registration IDs currently installed.
    #[must_use]
    pub fn registration_ids(&self) -> Vec<String> {
        self.handles.iter().map(|entry| entry.key().clone()).collect()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::thread;

    use rstest::rstest;

    use super::*;
    use crate::websocket::subscription::SubscriptionSpec;

    fn handle() -> Arc<SubscriptionHandle> {
        Arc::new(SubscriptionHandle::new(
            SubscriptionSpec::new("channel.ban", "1"),
            Box::new(|_| true),
        ))
    }

    #[rstest]
    fn test_insert_get_remove() {
        let registry = SubscriptionRegistry::new();
        let handle = handle();

        assert!(registry.insert("a", Arc::clone(&handle)).is_none());
        assert!(Arc::ptr_eq(&registry.get("a").unwrap(), &handle));
        assert_eq!(registry.registration_ids(), vec!["a".to_string()]);

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert!(registry.is_empty());
    }

    #[rstest]
    fn test_insert_returns_replaced_handle() {
        let registry = SubscriptionRegistry::new();
        let first = handle();
        let second = handle();

        registry.insert("a", Arc::clone(&first));
        let replaced = registry.insert("a", Arc::clone(&second)).unwrap();

        assert!(Arc::ptr_eq(&replaced, &first));
        assert_eq!(registry.len(), 1);
    }

    #[rstest]
    fn test_remove_if_same_ignores_other_owner() {
        let registry = SubscriptionRegistry::new();
        let owner = handle();
        let other = handle();
        registry.insert("a", Arc::clone(&owner));

        assert!(!registry.remove_if_same("a", &other));
        assert!(registry.contains("a"));

        assert!(registry.remove_if_same("a", &owner));
        assert!(!registry.contains("a"));
        assert!(registry.is_empty());
    }

    #[rstest]
    fn test_install_reports_displaced_handle() {
        let registry = SubscriptionRegistry::new();
        let first = handle();
        let second = handle();

        assert!(matches!(
            registry.install("a", &first),
            InstallOutcome::Installed { displaced: None }
        ));
        assert!(matches!(
            registry.install("a", &first),
            InstallOutcome::Installed { displaced: None }
        ));

        match registry.install("a", &second) {
            InstallOutcome::Installed {
                displaced: Some(previous),
            } => assert!(Arc::ptr_eq(&previous, &first)),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[rstest]
    fn test_revocation_before_install_refuses_id_once() {
        let registry = SubscriptionRegistry::new();
        let owner = handle();

        assert!(registry.revoke_remote("a").is_none());

        assert!(matches!(
            registry.install("a", &owner),
            InstallOutcome::RevokedEarly
        ));
        assert!(registry.is_empty());

        // Remembered for a single install only
        assert!(matches!(
            registry.install("a", &owner),
            InstallOutcome::Installed { .. }
        ));
    }

    #[rstest]
    fn test_revocation_after_install_removes_handle() {
        let registry = SubscriptionRegistry::new();
        let owner = handle();
        registry.install("a", &owner);

        let removed = registry.revoke_remote("a").unwrap();

        assert!(Arc::ptr_eq(&removed, &owner));
        assert!(registry.is_empty());
        assert!(matches!(
            registry.install("a", &owner),
            InstallOutcome::Installed { .. }
        ));
    }

    #[rstest]
    fn test_concurrent_insert_and_remove_lose_nothing() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..200 {
                        let id = format!("{worker}-{i}");
                        registry.insert(&id, handle());
                        if i % 2 == 0 {
                            registry.remove(&id);
                        }
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(registry.len(), 8 * 100);
    }
}
