//! Per-mentor serialisation of booking writes.
//!
//! Every check-then-write on a mentor's bookings holds that mentor's lock so
//! two requests cannot both pass the conflict check.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Table of async mutexes keyed by mentor id
#[derive(Debug, Default)]
pub struct MentorLocks {
    locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl MentorLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lock of `mentor_id`
    pub async fn lock(&self, mentor_id: i64) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            locks
                .entry(mentor_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }

    /// Drop entries nobody holds or waits on; returns how many were removed
    pub fn cleanup(&self) -> usize {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = locks.len();
        // The table's own Arc is the only reference when the lock is idle
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
