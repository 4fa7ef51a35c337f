//! Admission gate between transactions and maintenance
//!
//! Two lock-free fields implement the exclusion protocol:
//! - `maintenance_owner`: 0 when free, otherwise the id of the worker holding
//!   the exclusive maintenance lock. Claimed by compare-and-swap.
//! - `pending_transactions`: number of transaction slots currently held.
//!
//! A transaction is admitted only while no maintenance owner is set; a
//! maintenance owner proceeds only once the count drains to zero.
//!
//! # Memory Ordering
//!
//! Both sides publish first and check second, all with `SeqCst`:
//!
//! ```text
//! begin_transaction:  pending += 1   then  load owner   (owner != 0 => pending -= 1, refuse)
//! claim_maintenance:  CAS owner 0->id then  load pending (wait until 0)
//! ```
//!
//! Under a single total order at least one side observes the other, so a
//! transaction and a maintenance reload never both proceed. A refused
//! transaction can briefly raise the count, which only delays the drain.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, warn};

/// Sentinel for "no maintenance owner"
pub const NO_OWNER: u64 = 0;

const MIN_BACKOFF: Duration = Duration::from_millis(1);
const MAX_BACKOFF: Duration = Duration::from_millis(16);

/// Counting semaphore for transactions with a maintenance "pause admission" gate
#[derive(Debug, Default)]
pub struct AdmissionGate {
    maintenance_owner: AtomicU64,
    pending_transactions: AtomicI64,
}

impl AdmissionGate {
    /// Gate with no owner and no pending transactions
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a transaction slot unless maintenance is active
    ///
    /// # Errors
    ///
    /// Returns the current maintenance owner if admission is paused.
    pub fn begin_transaction(&self) -> Result<(), u64> {
        self.pending_transactions.fetch_add(1, Ordering::SeqCst);
        let owner = self.maintenance_owner.load(Ordering::SeqCst);
        if owner != NO_OWNER {
            self.pending_transactions.fetch_sub(1, Ordering::SeqCst);
            return Err(owner);
        }
        Ok(())
    }

    /// Give back a transaction slot
    ///
    /// The count never goes below zero, not even transiently: an unmatched
    /// release leaves it untouched and is logged.
    pub fn end_transaction(&self) {
        let released = self.pending_transactions.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |pending| (pending > 0).then(|| pending - 1),
        );
        if let Err(previous) = released {
            error!(target: "strata::shard", previous, "Transaction released without a matching begin");
        }
    }

    /// Claim the maintenance lock for `worker`
    ///
    /// Never blocks.
    ///
    /// # Errors
    ///
    /// Returns the current owner if the lock is taken.
    pub fn claim_maintenance(&self, worker: u64) -> Result<(), u64> {
        debug_assert_ne!(worker, NO_OWNER, "worker ids start at 1");
        self.maintenance_owner
            .compare_exchange(NO_OWNER, worker, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
    }

    /// Release the maintenance lock if `worker` holds it
    ///
    /// Returns `false` (and leaves the owner untouched) otherwise.
    pub fn release_maintenance(&self, worker: u64) -> bool {
        match self.maintenance_owner.compare_exchange(
            worker,
            NO_OWNER,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => true,
            Err(owner) => {
                warn!(target: "strata::shard", worker, owner, "Maintenance release by non-owner ignored");
                false
            }
        }
    }

    /// Current maintenance owner, `NO_OWNER` if free
    pub fn maintenance_owner(&self) -> u64 {
        self.maintenance_owner.load(Ordering::SeqCst)
    }

    /// Transactions currently holding a slot
    pub fn pending_transactions(&self) -> i64 {
        self.pending_transactions.load(Ordering::SeqCst)
    }

    /// Wait until no transaction holds a slot
    ///
    /// Polls with exponential backoff from 1ms up to 16ms. No fairness.
    ///
    /// # Returns
    /// * `true` if the count reached zero within `timeout`
    /// * `false` if the deadline passed with transactions still pending
    pub fn wait_for_quiescence(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        let mut backoff = MIN_BACKOFF;

        while self.pending_transactions.load(Ordering::SeqCst) > 0 {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return false;
            }
            std::thread::sleep(backoff.min(timeout - elapsed));
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
        true
    }
}
