//! Generation-stamped registry enforcing at most one live timer per session.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Tracks which countdown task, if any, is the current one for each session.
///
/// A timer task holds the generation it was started with and re-checks
/// [`is_current`](Self::is_current) inside the session's store entry lock
/// before every mutation. Cancellation is therefore just removing or
/// replacing the registry entry: a superseded task can never decrement the
/// session again, even if it is mid-tick when the cancellation happens.
#[derive(Default)]
pub struct TimerRegistry {
    current: DashMap<String, u64>,
    sequence: AtomicU64,
}

impl TimerRegistry {
    /// Build an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the timer slot for `session_id`, superseding any previous timer,
    /// and return the fresh generation the new task must carry.
    pub fn begin(&self, session_id: &str) -> u64 {
        let generation = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        self.current.insert(session_id.to_string(), generation);
        generation
    }

    /// Cancel the session's timer, if one is running. Returns whether a timer
    /// was actually cancelled.
    pub fn cancel(&self, session_id: &str) -> bool {
        self.current.remove(session_id).is_some()
    }

    /// Whether `generation` is still the session's live timer.
    pub fn is_current(&self, session_id: &str, generation: u64) -> bool {
        self.current
            .get(session_id)
            .is_some_and(|entry| *entry.value() == generation)
    }

    /// Release the slot when a task ends naturally. Only removes the entry if
    /// it still belongs to `generation`, so a finished stale task cannot
    /// cancel its successor.
    pub fn finish(&self, session_id: &str, generation: u64) {
        self.current
            .remove_if(session_id, |_, current| *current == generation);
    }

    /// Whether any timer is live for `session_id`.
    pub fn is_running(&self, session_id: &str) -> bool {
        self.current.contains_key(session_id)
    }

    /// Number of sessions with a live timer.
    pub fn active_count(&self) -> usize {
        self.current.len()
    }
}
