//! Application layer: orchestrates the domain rules against the ports.
//!
//! Services own no state beyond their port handles. Read-check-write
//! sequences end in a compare-and-set store write; when a concurrent writer
//! wins, the sequence is replayed from a fresh read a bounded number of times.

pub mod bookings;
pub mod marketplace;
pub mod payments;
pub mod seed;

use crate::error::{MarketError, Result};
use std::future::Future;
use tracing::debug;

const MAX_ATTEMPTS: u32 = 3;

pub(crate) async fn retry_on_conflict<T, F, Fut>(mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Err(MarketError::Conflict(reason)) if attempt < MAX_ATTEMPTS => {
                debug!(attempt, %reason, "retrying after concurrent update");
                attempt += 1;
            }
            outcome => return outcome,
        }
    }
}
