//! Duplicate-signal cooldown

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Suppresses structurally identical signals seen within `window`.
///
/// Lookup and insert happen under the same lock. Expired entries are pruned on
/// every call, so the map only ever holds keys from the current window.
#[derive(Debug)]
pub struct DuplicateGuard {
    window: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl DuplicateGuard {
    /// A zero `window` disables suppression
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns `true` if `key` is fresh (and records it), `false` if it is a
    /// duplicate inside the window
    pub fn check_and_record(&self, key: &str) -> bool {
        self.check_and_record_at(key, Instant::now())
    }

    pub fn check_and_record_at(&self, key: &str, now: Instant) -> bool {
        if self.window.is_zero() {
            return true;
        }

        let mut seen = self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        seen.retain(|_, last| now.saturating_duration_since(*last) < self.window);

        if seen.contains_key(key) {
            return false;
        }
        seen.insert(key.to_string(), now);
        true
    }

    pub fn tracked(&self) -> usize {
        self.seen
            .lock()
            .map(|seen| seen.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }
}
