//! Bounded, age-evicted record of recently seen command ids

use std::collections::HashMap;

use uuid::Uuid;

/// Why an id could not be recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayError {
    /// Seen before and still inside the window
    Duplicate,
    /// Every slot holds a live entry
    Full,
}

/// Remembers each id until its envelope can no longer pass the freshness
/// check, so an evicted id can never be replayed successfully.
#[derive(Debug)]
pub struct ReplayCache {
    /// command_id -> epoch ms after which the envelope is stale anyway
    seen: HashMap<Uuid, i64>,
    capacity: usize,
    window_ms: i64,
}

impl ReplayCache {
    pub fn new(capacity: usize, window_ms: i64) -> Self {
        Self {
            seen: HashMap::with_capacity(capacity.min(1024)),
            capacity,
            window_ms,
        }
    }

    /// Record `command_id`, failing if it is already present.
    ///
    /// When the cache is full of live entries the id is refused rather than
    /// evicting a live one.
    pub fn check_and_insert(
        &mut self,
        command_id: Uuid,
        issued_at_ms: i64,
        now_ms: i64,
    ) -> Result<(), ReplayError> {
        self.evict_expired(now_ms);

        if self.seen.contains_key(&command_id) {
            return Err(ReplayError::Duplicate);
        }
        if self.seen.len() >= self.capacity {
            return Err(ReplayError::Full);
        }

        let expires_at = issued_at_ms.saturating_add(self.window_ms).max(now_ms);
        self.seen.insert(command_id, expires_at);
        Ok(())
    }

    /// Drop entries whose envelopes would now fail freshness
    pub fn evict_expired(&mut self, now_ms: i64) {
        self.seen.retain(|_, expires_at| *expires_at >= now_ms);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
