//! Concurrency gate — caps how many chunk lineages run at once.
//!
//! Backed by a fair (FIFO) semaphore, so waiters are admitted in the order
//! they asked. A permit is held for a lineage's whole life, backoff sleeps
//! included, so "in flight or waiting to retry" never exceeds the limit.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::BulkError;

/// The gate was closed while a lineage waited for admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("concurrency gate closed")]
pub struct GateClosed;

/// Shared admission window. Cloning shares the same permits.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl ConcurrencyGate {
    /// Create a gate admitting at most `limit` concurrent lineages.
    pub fn new(limit: usize) -> Result<Self, BulkError> {
        if limit == 0 || limit > Semaphore::MAX_PERMITS {
            return Err(BulkError::invalid(format!(
                "concurrency limit must be between 1 and {}, got {limit}",
                Semaphore::MAX_PERMITS
            )));
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        })
    }

    /// Wait for a free slot. The slot is released when the permit drops.
    pub async fn acquire(&self) -> Result<GatePermit, GateClosed> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GateClosed)?;
        Ok(GatePermit { _permit: permit })
    }

    /// Stop admitting: pending and future `acquire` calls fail.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.limit.saturating_sub(self.available())
    }
}

/// An admitted slot.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}
