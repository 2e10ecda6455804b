//! Loyalty threshold accounting.
//!
//! A listener who streams enough from one creator earns a one-time loyalty
//! grant: a reward name suitable for an external name registry. Everything
//! here is recomputed from the append-only stream history, so the numbers
//! are always reconcilable against settled sessions; there is no separate
//! running counter to drift.
//!
//! Grant creation is idempotent: the proposed name is a deterministic
//! function of the pair, and a duplicate insert is treated as success, so
//! re-running an eligibility check after a partial failure can never mint
//! a second, different reward.

use alloy_primitives::{Address, Keccak256};
use tracing::debug;

use cadence_api::{LedgerError, LedgerStore};
use cadence_primitives::{LoyaltyGrant, unix_now};

/// Cumulative credits this listener has paid this creator, summed over
/// the stream history log.
pub fn total_consumed<L: LedgerStore>(ledger: &L, listener: Address, creator: Address) -> u64 {
    ledger
        .history_for_pair(listener, creator)
        .iter()
        .map(|e| e.credits_paid)
        .sum()
}

/// Whether a consumption total earns a grant.
pub fn is_eligible(total: u64, threshold: u64) -> bool {
    total >= threshold
}

/// Deterministic reward name for a pair:
/// `fan-` plus the first six bytes of `keccak256(listener || creator)`.
///
/// Same pair, same name, always - retries of a failed grant can never
/// propose a different name.
pub fn grant_name(listener: Address, creator: Address) -> String {
    let mut hasher = Keccak256::new();
    hasher.update(listener);
    hasher.update(creator);
    let digest = hasher.finalize();
    format!("fan-{}", hex::encode(&digest[..6]))
}

/// Recompute the pair's total and grant at most once if it crosses the
/// threshold.
///
/// Returns the grant (fresh or pre-existing) when the pair is eligible,
/// `None` below the threshold.
pub fn check_and_grant<L: LedgerStore>(
    ledger: &L,
    listener: Address,
    creator: Address,
    threshold: u64,
) -> Result<Option<LoyaltyGrant>, LedgerError> {
    let total = total_consumed(ledger, listener, creator);
    if !is_eligible(total, threshold) {
        return Ok(None);
    }

    let grant = LoyaltyGrant {
        listener_id: listener,
        creator_id: creator,
        name: grant_name(listener, creator),
        total_at_grant: total,
        granted_at: unix_now(),
    };

    if ledger.insert_grant(grant.clone())? {
        debug!(%listener, %creator, total, name = %grant.name, "loyalty grant created");
        Ok(Some(grant))
    } else {
        // Already granted earlier; a duplicate attempt is a success.
        Ok(ledger.grant_for_pair(listener, creator))
    }
}
