//! Payment claim table: makes reconciliation idempotent.
//!
//! A claim is keyed by (deal, amount) and stays exclusive for a short TTL.
//! A second reconciliation pass (or a webhook racing a poll) that presents
//! the same payment inside the TTL sees the claim and backs off.
//!
//! The table carries its own lock, separate from the repository lock, so
//! check-and-write is atomic even when the surrounding deal update fails.
//! It is bounded: when full, the oldest claim is evicted.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Duration, Utc};
use escrowdesk_types::{DealId, EscrowError, Result};
use rust_decimal::Decimal;

type ClaimKey = (DealId, Decimal);

#[derive(Debug)]
struct ClaimTable {
    /// Claim time per key.
    claims: HashMap<ClaimKey, DateTime<Utc>>,
    /// Insertion order for eviction (front = oldest).
    order: VecDeque<ClaimKey>,
}

/// Short-lived exclusivity markers for observed payments.
#[derive(Debug)]
pub struct PaymentClaims {
    inner: Mutex<ClaimTable>,
    ttl: Duration,
    max_size: usize,
}

impl PaymentClaims {
    /// Create a claim table with the given TTL and capacity.
    ///
    /// # Panics
    /// Panics if `max_size` is zero.
    #[must_use]
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        assert!(max_size > 0, "PaymentClaims max_size must be > 0");
        Self {
            inner: Mutex::new(ClaimTable {
                claims: HashMap::new(),
                order: VecDeque::new(),
            }),
            ttl,
            max_size,
        }
    }

    fn table(&self) -> MutexGuard<'_, ClaimTable> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically claim (deal, amount) at `now`.
    ///
    /// # Errors
    /// Returns [`EscrowError::PaymentAlreadyClaimed`] if a claim for the same
    /// key was taken less than one TTL ago.
    pub fn try_claim(&self, deal_id: DealId, amount: Decimal, now: DateTime<Utc>) -> Result<()> {
        let key = (deal_id, amount.normalize());
        let mut table = self.table();

        if table
            .claims
            .get(&key)
            .is_some_and(|&claimed_at| now - claimed_at < self.ttl)
        {
            return Err(EscrowError::PaymentAlreadyClaimed { deal_id, amount });
        }

        // Stale claim for the same key: drop its queue slot before re-inserting.
        if table.claims.remove(&key).is_some() {
            table.order.retain(|k| k != &key);
        }

        if table.claims.len() >= self.max_size {
            if let Some(oldest) = table.order.pop_front() {
                table.claims.remove(&oldest);
            }
        }

        table.claims.insert(key, now);
        table.order.push_back(key);
        tracing::debug!(deal_id = %deal_id, amount = %amount, "payment claimed");
        Ok(())
    }

    /// Is there a live claim for (deal, amount) at `now`?
    #[cfg(test)]
    fn is_claimed(&self, deal_id: DealId, amount: Decimal, now: DateTime<Utc>) -> bool {
        self.table()
            .claims
            .get(&(deal_id, amount.normalize()))
            .is_some_and(|&at| now - at < self.ttl)
    }

    /// Drop claims older than the TTL. Returns how many were dropped.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.ttl;
        let mut table = self.table();
        let before = table.claims.len();
        table.claims.retain(|_, at| now - *at < ttl);
        let ClaimTable { claims, order } = &mut *table;
        order.retain(|k| claims.contains_key(k));
        before - claims.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table().claims.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table().claims.is_empty()
    }
}
