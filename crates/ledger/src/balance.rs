//! Per-account balance state.
//!
//! A balance is a single atomic counter. The debit path is a
//! compare-exchange loop, so checking for sufficient funds and taking them
//! is one step; two ticks racing for the last credit can never both win.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic credit balance for one account.
pub struct BalanceState {
    credits: AtomicU64,
}

impl BalanceState {
    /// Create a balance holding `initial` credits.
    pub fn new(initial: u64) -> Self {
        Self {
            credits: AtomicU64::new(initial),
        }
    }

    /// Current balance.
    pub fn get(&self) -> u64 {
        self.credits.load(Ordering::Relaxed)
    }

    /// Add credits, returning the new balance.
    pub fn deposit(&self, amount: u64) -> u64 {
        self.credits.fetch_add(amount, Ordering::Relaxed) + amount
    }

    /// Take credits if and only if the full amount is covered.
    ///
    /// Returns the new balance, or `None` (leaving the balance untouched)
    /// if the debit would have gone negative.
    pub fn try_debit(&self, amount: u64) -> Option<u64> {
        let mut current = self.credits.load(Ordering::Relaxed);
        loop {
            if current < amount {
                return None;
            }
            match self.credits.compare_exchange_weak(
                current,
                current - amount,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(current - amount),
                Err(actual) => current = actual,
            }
        }
    }
}
