//! Short-term per-session conversation history.

use std::collections::VecDeque;

use buddy_common::HistoryTurn;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::trace;

/// Bounded ring buffer of turns per `(user_id, session_id)`.
///
/// Oldest turns are evicted first once `capacity` is reached. Process-local
/// only; restarts start every session empty.
pub struct SessionHistory {
    capacity: usize,
    sessions: DashMap<(String, String), Mutex<VecDeque<HistoryTurn>>>,
}

impl SessionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            sessions: DashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&self, user_id: &str, session_id: &str, turn: HistoryTurn) {
        let entry = self
            .sessions
            .entry((user_id.to_string(), session_id.to_string()))
            .or_insert_with(|| Mutex::new(VecDeque::with_capacity(self.capacity)));

        let mut buffer = entry.lock();
        buffer.push_back(turn);
        while buffer.len() > self.capacity {
            if let Some(evicted) = buffer.pop_front() {
                trace!(user_id, session_id, role = ?evicted.role, "Evicted history turn");
            }
        }
    }

    /// Up to `n` most recent turns, oldest first.
    pub fn recent(&self, user_id: &str, session_id: &str, n: usize) -> Vec<HistoryTurn> {
        self.sessions
            .get(&(user_id.to_string(), session_id.to_string()))
            .map(|entry| {
                let buffer = entry.lock();
                let skip = buffer.len().saturating_sub(n);
                buffer.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self, user_id: &str, session_id: &str) -> usize {
        self.sessions
            .get(&(user_id.to_string(), session_id.to_string()))
            .map(|entry| entry.lock().len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, user_id: &str, session_id: &str) -> bool {
        self.len(user_id, session_id) == 0
    }

    pub fn clear(&self, user_id: &str, session_id: &str) {
        self.sessions
            .remove(&(user_id.to_string(), session_id.to_string()));
    }
}
