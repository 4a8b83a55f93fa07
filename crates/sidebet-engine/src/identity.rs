//! Identity Resolver: maps external user handles to ledger addresses.
//!
//! A mapping is created once and never reassigned or deleted. A new address
//! is backed by a fresh secp256k1 key held in [`LocalKeys`], which a
//! JSON-RPC transport sharing the same keystore signs with.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use parking_lot::RwLock;
use sidebet_ledger::LocalKeys;
use sidebet_types::{Address, Result, SidebetError, UserHandle};

pub trait IdentityResolver: Send + Sync {
    /// Address for `handle`, creating one on first use.
    fn resolve(&self, handle: &UserHandle) -> Result<Address>;

    /// Address for `handle`, if one exists.
    fn lookup(&self, handle: &UserHandle) -> Option<Address>;

    /// Bind `handle` to a wallet the user already controls.
    ///
    /// # Errors
    /// `IdentityConflict` if the handle is already mapped to another address.
    fn associate(&self, handle: &UserHandle, address: Address) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryIdentities {
    map: RwLock<HashMap<UserHandle, Address>>,
    keys: Arc<LocalKeys>,
}

impl InMemoryIdentities {
    /// Identities with a private keystore.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Identities whose new keys land in `keys`.
    #[must_use]
    pub fn with_keys(keys: Arc<LocalKeys>) -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            keys,
        }
    }

    pub fn keys(&self) -> &Arc<LocalKeys> {
        &self.keys
    }

    /// Every mapping, for persisting the identity book.
    #[must_use]
    pub fn entries(&self) -> Vec<(UserHandle, Address)> {
        self.map
            .read()
            .iter()
            .map(|(handle, address)| (handle.clone(), *address))
            .collect()
    }
}

impl IdentityResolver for InMemoryIdentities {
    fn resolve(&self, handle: &UserHandle) -> Result<Address> {
        if let Some(address) = self.lookup(handle) {
            return Ok(address);
        }
        let mut map = self.map.write();
        // a racing resolve may have won between the read and write locks
        let address = *map.entry(handle.clone()).or_insert_with(|| {
            let address = self.keys.generate();
            tracing::info!(%handle, %address, "Identity created");
            address
        });
        Ok(address)
    }

    fn lookup(&self, handle: &UserHandle) -> Option<Address> {
        self.map.read().get(handle).copied()
    }

    fn associate(&self, handle: &UserHandle, address: Address) -> Result<()> {
        if address.is_zero() {
            return Err(SidebetError::validation("cannot associate the zero address"));
        }
        match self.map.write().entry(handle.clone()) {
            Entry::Occupied(slot) if *slot.get() == address => Ok(()),
            Entry::Occupied(slot) => Err(SidebetError::IdentityConflict {
                handle: handle.clone(),
                existing: *slot.get(),
            }),
            Entry::Vacant(slot) => {
                tracing::info!(%handle, %address, "Identity associated");
                slot.insert(address);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn resolve_is_stable() {
        let ids = InMemoryIdentities::new();
        let alice = UserHandle::from("alice");
        let first = ids.resolve(&alice).unwrap();
        assert_eq!(ids.resolve(&alice).unwrap(), first);
        assert_eq!(ids.lookup(&alice), Some(first));
        assert!(!first.is_zero());
    }

    #[test]
    fn resolved_addresses_are_key_backed() {
        let keys = Arc::new(LocalKeys::new());
        let ids = InMemoryIdentities::with_keys(Arc::clone(&keys));
        let alice = ids.resolve(&UserHandle::from("alice")).unwrap();
        assert!(keys.holds(&alice));
        let secret = keys.export(&alice).unwrap();
        assert_eq!(LocalKeys::new().import(&secret).unwrap(), alice);

        // an associated wallet is the user's own; no key is minted for it
        let wallet = Address::from_low_u8(7);
        ids.associate(&UserHandle::from("bob"), wallet).unwrap();
        assert!(!keys.holds(&wallet));
        assert_eq!(keys.len(), 1);
        assert_eq!(ids.entries().len(), 2);
    }

    #[test]
    fn distinct_handles_get_distinct_addresses() {
        let ids = InMemoryIdentities::new();
        let a = ids.resolve(&UserHandle::from(1_i64)).unwrap();
        let b = ids.resolve(&UserHandle::from(2_i64)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn lookup_does_not_create() {
        let ids = InMemoryIdentities::new();
        assert_eq!(ids.lookup(&UserHandle::from("ghost")), None);
        assert_eq!(ids.lookup(&UserHandle::from("ghost")), None);
    }

    #[test]
    fn associate_then_resolve() {
        let ids = InMemoryIdentities::new();
        let bob = UserHandle::from("bob");
        let wallet = Address::from_low_u8(7);
        ids.associate(&bob, wallet).unwrap();
        // idempotent for the same address
        ids.associate(&bob, wallet).unwrap();
        assert_eq!(ids.resolve(&bob).unwrap(), wallet);
    }

    #[test]
    fn associate_conflict() {
        let ids = InMemoryIdentities::new();
        let bob = UserHandle::from("bob");
        let existing = ids.resolve(&bob).unwrap();
        let err = ids.associate(&bob, Address::from_low_u8(7)).unwrap_err();
        assert!(
            matches!(err, SidebetError::IdentityConflict { existing: e, .. } if e == existing),
            "{err:?}"
        );
        assert_eq!(ids.lookup(&bob), Some(existing));
    }

    #[test]
    fn concurrent_resolve_agrees() {
        let ids = Arc::new(InMemoryIdentities::new());
        let handle = UserHandle::from("carol");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                let handle = handle.clone();
                std::thread::spawn(move || ids.resolve(&handle).unwrap())
            })
            .collect();
        let seen: Vec<Address> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(seen.windows(2).all(|w| w[0] == w[1]));
    }
}
