//! Per-vault tick leases.
//!
//! At most one worker may process a vault's tick at a time. A lease
//! records the holder and an expiry; acquisition is try-once (a held
//! lease means the caller skips the vault this cycle, it never blocks).
//! The expiry exists so a crashed holder cannot wedge a vault forever:
//! an expired lease is reclaimable by the next acquirer.
//!
//! Releases go through an RAII guard, so a tick that errors or is
//! cancelled mid-flight still frees its lease on drop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::warn;
use uuid::Uuid;
use vaultfall_types::VaultId;

#[derive(Debug, Clone, Copy)]
struct Lease {
    owner: Uuid,
    expires_at: DateTime<Utc>,
}

/// Table of per-vault tick leases.
///
/// Cheap to clone; all clones share the same underlying table.
#[derive(Debug, Clone, Default)]
pub struct LeaseTable {
    leases: Arc<Mutex<HashMap<VaultId, Lease>>>,
}

impl LeaseTable {
    /// Create an empty lease table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to acquire the lease for a vault. Returns `None` without
    /// blocking if a live lease is held by someone else. An expired lease
    /// is reclaimed.
    pub fn try_acquire(&self, vault_id: VaultId, ttl_seconds: u64) -> Option<LeaseGuard> {
        let now = Utc::now();
        let owner = Uuid::new_v4();
        let ttl = Duration::seconds(i64::try_from(ttl_seconds).unwrap_or(i64::MAX));

        let Ok(mut leases) = self.leases.lock() else {
            warn!(vault_id = %vault_id, "Lease table mutex poisoned, refusing lease");
            return None;
        };

        if let Some(existing) = leases.get(&vault_id) {
            if existing.expires_at > now {
                return None;
            }
            warn!(
                vault_id = %vault_id,
                expired_at = %existing.expires_at,
                "Reclaiming expired tick lease"
            );
        }

        leases.insert(
            vault_id,
            Lease {
                owner,
                expires_at: now + ttl,
            },
        );

        Some(LeaseGuard {
            table: self.clone(),
            vault_id,
            owner,
        })
    }

    /// Whether a live lease is currently held for the vault.
    pub fn is_held(&self, vault_id: VaultId) -> bool {
        let now = Utc::now();
        self.leases
            .lock()
            .map(|leases| {
                leases
                    .get(&vault_id)
                    .is_some_and(|lease| lease.expires_at > now)
            })
            .unwrap_or(false)
    }

    fn release(&self, vault_id: VaultId, owner: Uuid) {
        if let Ok(mut leases) = self.leases.lock() {
            // Only the current owner may release. A reclaimer that took
            // over an expired lease is not evicted by the stale guard.
            if leases.get(&vault_id).is_some_and(|l| l.owner == owner) {
                leases.remove(&vault_id);
            }
        }
    }
}

/// RAII handle for a held tick lease. Dropping it releases the lease.
#[derive(Debug)]
pub struct LeaseGuard {
    table: LeaseTable,
    vault_id: VaultId,
    owner: Uuid,
}

impl LeaseGuard {
    /// The vault this lease covers.
    pub const fn vault_id(&self) -> VaultId {
        self.vault_id
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.table.release(self.vault_id, self.owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_contend() {
        let table = LeaseTable::new();
        let vault_id = VaultId::new();

        let guard = table.try_acquire(vault_id, 120);
        assert!(guard.is_some());
        assert!(table.is_held(vault_id));

        // Second acquisition fails without blocking.
        assert!(table.try_acquire(vault_id, 120).is_none());
    }

    #[test]
    fn drop_releases() {
        let table = LeaseTable::new();
        let vault_id = VaultId::new();

        let guard = table.try_acquire(vault_id, 120);
        drop(guard);

        assert!(!table.is_held(vault_id));
        assert!(table.try_acquire(vault_id, 120).is_some());
    }

    #[test]
    fn expired_lease_is_reclaimable() {
        let table = LeaseTable::new();
        let vault_id = VaultId::new();

        // Zero TTL: the lease expires immediately.
        let stale = table.try_acquire(vault_id, 0);
        assert!(stale.is_some());

        let fresh = table.try_acquire(vault_id, 120);
        assert!(fresh.is_some());

        // The stale guard dropping must not evict the reclaimer's lease.
        drop(stale);
        assert!(table.is_held(vault_id));
    }

    #[test]
    fn leases_are_per_vault() {
        let table = LeaseTable::new();
        let a = VaultId::new();
        let b = VaultId::new();

        let _guard_a = table.try_acquire(a, 120);
        assert!(table.try_acquire(b, 120).is_some());
    }
}
