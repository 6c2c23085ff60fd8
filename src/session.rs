//! Bounded per-session conversation memory.
//!
//! Each session is a ring buffer of recent turns with a last-access clock.
//! There is no background reaper: expiry is checked lazily on every access,
//! which keeps the structure a plain map behind one lock.

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::config::SessionConfig;
use crate::models::SessionTurn;

/// Longest excerpt of a turn included in the conversation-context block.
const CONTEXT_EXCERPT_CHARS: usize = 200;

struct Session {
    turns: VecDeque<SessionTurn>,
    last_access: Instant,
}

pub struct SessionMemory {
    inner: RwLock<HashMap<String, Session>>,
    capacity: usize,
    idle_timeout: Duration,
}

impl SessionMemory {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            capacity: config.capacity,
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
        }
    }

    /// Append a turn, evicting the oldest once past capacity. Creates the
    /// session if absent; resets its idle clock either way.
    pub fn add_turn(&self, session_id: &str, role: &str, content: &str) {
        let mut sessions = self.inner.write();
        Self::purge_expired(&mut sessions, self.idle_timeout);

        let session = sessions.entry(session_id.to_string()).or_insert_with(|| Session {
            turns: VecDeque::with_capacity(self.capacity),
            last_access: Instant::now(),
        });

        session.turns.push_back(SessionTurn {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
            metadata: None,
        });
        while session.turns.len() > self.capacity {
            session.turns.pop_front();
        }
        session.last_access = Instant::now();
    }

    /// The last `n` turns formatted as a conversation-context block, oldest
    /// first, each excerpted to 200 characters. Returns `None` for unknown
    /// or expired sessions.
    pub fn recent_context(&self, session_id: &str, n: usize) -> Option<String> {
        let mut sessions = self.inner.write();
        Self::purge_expired(&mut sessions, self.idle_timeout);

        let session = sessions.get_mut(session_id)?;
        session.last_access = Instant::now();

        if session.turns.is_empty() {
            return None;
        }

        let start = session.turns.len().saturating_sub(n);
        let lines: Vec<String> = session
            .turns
            .iter()
            .skip(start)
            .map(|turn| {
                let label = if turn.role == "user" { "Student" } else { "You" };
                let excerpt: String = turn.content.chars().take(CONTEXT_EXCERPT_CHARS).collect();
                format!("{label}: {excerpt}")
            })
            .collect();

        Some(lines.join("\n"))
    }

    /// Drop a session outright. Idempotent.
    pub fn clear(&self, session_id: &str) -> bool {
        self.inner.write().remove(session_id).is_some()
    }

    pub fn session_count(&self) -> usize {
        let mut sessions = self.inner.write();
        Self::purge_expired(&mut sessions, self.idle_timeout);
        sessions.len()
    }

    fn purge_expired(sessions: &mut HashMap<String, Session>, idle_timeout: Duration) {
        sessions.retain(|_, s| s.last_access.elapsed() < idle_timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(capacity: usize, idle_secs: u64) -> SessionMemory {
        SessionMemory::new(&SessionConfig {
            capacity,
            idle_timeout_secs: idle_secs,
        })
    }

    #[test]
    fn test_capacity_evicts_oldest_turns() {
        let mem = memory(10, 3600);
        for i in 0..15 {
            mem.add_turn("s1", "user", &format!("message {i}"));
        }

        let context = mem.recent_context("s1", 100).unwrap();
        assert!(!context.contains("message 4"));
        assert!(context.contains("message 5"));
        assert!(context.contains("message 14"));
        assert_eq!(context.lines().count(), 10);
    }

    #[test]
    fn test_recent_context_labels_and_order() {
        let mem = memory(10, 3600);
        mem.add_turn("s1", "user", "what is recursion?");
        mem.add_turn("s1", "assistant", "a function calling itself");

        let context = mem.recent_context("s1", 10).unwrap();
        let lines: Vec<&str> = context.lines().collect();
        assert_eq!(lines[0], "Student: what is recursion?");
        assert_eq!(lines[1], "You: a function calling itself");
    }

    #[test]
    fn test_recent_context_excerpts_long_turns() {
        let mem = memory(10, 3600);
        mem.add_turn("s1", "user", &"x".repeat(500));

        let context = mem.recent_context("s1", 10).unwrap();
        // "Student: " + 200 chars
        assert_eq!(context.chars().count(), 9 + 200);
    }

    #[test]
    fn test_unknown_session_yields_none() {
        let mem = memory(10, 3600);
        assert!(mem.recent_context("nope", 5).is_none());
    }

    #[test]
    fn test_idle_sessions_are_purged() {
        let mem = memory(10, 0); // everything expires immediately
        mem.add_turn("s1", "user", "hello");
        std::thread::sleep(Duration::from_millis(5));
        assert!(mem.recent_context("s1", 5).is_none());
        assert_eq!(mem.session_count(), 0);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mem = memory(10, 3600);
        mem.add_turn("s1", "user", "hello");
        assert!(mem.clear("s1"));
        assert!(!mem.clear("s1"));
    }

    #[test]
    fn test_sessions_are_isolated() {
        let mem = memory(10, 3600);
        mem.add_turn("a", "user", "alpha question");
        mem.add_turn("b", "user", "beta question");

        let a = mem.recent_context("a", 10).unwrap();
        assert!(a.contains("alpha"));
        assert!(!a.contains("beta"));
    }
}
