//! Per-session conversation history.
//!
//! Each session holds the pinned system prompt followed by its turns. After
//! every recorded reply a session is trimmed to the system prompt plus the
//! most recent `history_limit - 1` turns. Sessions live in an LRU map, so
//! at most `max_sessions` conversations are retained.

use lru::LruCache;
use std::num::NonZeroUsize;
use tokio::sync::Mutex;

use crate::model::ChatTurn;

pub const DEFAULT_SESSION: &str = "default";

/// Turn counts that trigger a catalog context refresh.
pub const REFRESH_INTERVAL: usize = 5;

#[derive(Debug, Clone)]
pub struct Conversation {
    turns: Vec<ChatTurn>,
}

impl Conversation {
    pub fn new(system_prompt: &str) -> Self {
        Self {
            turns: vec![ChatTurn::system(system_prompt)],
        }
    }

    /// True until the first exchange has been seeded.
    pub fn is_fresh(&self) -> bool {
        self.turns.len() == 1
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn needs_refresh(&self) -> bool {
        self.turns.len() % REFRESH_INTERVAL == 0
    }

    /// Keep the leading system prompt and the last `limit - 1` turns.
    pub fn trim(&mut self, limit: usize) {
        if self.turns.len() <= limit || limit == 0 {
            return;
        }
        let keep_from = self.turns.len() - (limit - 1);
        self.turns.drain(1..keep_from);
    }
}

pub struct ConversationStore {
    sessions: Mutex<LruCache<String, Conversation>>,
    history_limit: usize,
    system_prompt: String,
}

impl ConversationStore {
    pub fn new(max_sessions: usize, history_limit: usize, system_prompt: impl Into<String>) -> Self {
        let capacity = NonZeroUsize::new(max_sessions).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: Mutex::new(LruCache::new(capacity)),
            history_limit,
            system_prompt: system_prompt.into(),
        }
    }

    fn session_key(session: Option<&str>) -> String {
        session
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SESSION)
            .to_string()
    }

    /// Apply `update` to the session's conversation (creating it if
    /// needed) and return a snapshot of the resulting turns.
    pub async fn update<F>(&self, session: Option<&str>, update: F) -> Vec<ChatTurn>
    where
        F: FnOnce(&mut Conversation),
    {
        let key = Self::session_key(session);
        let mut sessions = self.sessions.lock().await;
        let conversation = sessions.get_or_insert_mut(key, || Conversation::new(&self.system_prompt));
        update(conversation);
        conversation.turns().to_vec()
    }

    /// Append the assistant's reply and trim the session.
    pub async fn record_reply(&self, session: Option<&str>, text: &str) {
        let key = Self::session_key(session);
        let mut sessions = self.sessions.lock().await;
        let conversation = sessions.get_or_insert_mut(key, || Conversation::new(&self.system_prompt));
        conversation.push(ChatTurn::model(text));
        conversation.trim(self.history_limit);
    }

    pub async fn turn_count(&self, session: Option<&str>) -> usize {
        let key = Self::session_key(session);
        self.sessions
            .lock()
            .await
            .peek(&key)
            .map(Conversation::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    #[test]
    fn test_trim_keeps_system_prompt() {
        let mut conv = Conversation::new("sys");
        for i in 0..30 {
            conv.push(ChatTurn::user(format!("q{}", i)));
        }
        conv.trim(20);
        assert_eq!(conv.len(), 20);
        assert_eq!(conv.turns()[0].text, "sys");
        assert_eq!(conv.turns()[1].text, "q11");
        assert_eq!(conv.turns()[19].text, "q29");
        assert_eq!(conv.turns()[0].role, Role::System);
    }

    #[test]
    fn test_refresh_cadence() {
        let mut conv = Conversation::new("sys");
        assert!(conv.is_fresh());
        for _ in 0..4 {
            conv.push(ChatTurn::user("x"));
        }
        assert!(conv.needs_refresh());
        assert!(!conv.is_fresh());
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = ConversationStore::new(8, 20, "sys");
        store
            .update(Some("a"), |c| c.push(ChatTurn::user("halo")))
            .await;
        store.record_reply(Some("a"), "hai").await;
        let b = store.update(Some("b"), |_| {}).await;
        assert_eq!(b.len(), 1);
        assert_eq!(store.turn_count(Some("a")).await, 3);
        assert_eq!(store.turn_count(None).await, 0);
    }

    #[tokio::test]
    async fn test_session_capacity() {
        let store = ConversationStore::new(2, 20, "sys");
        for s in ["a", "b", "c"] {
            store.update(Some(s), |_| {}).await;
        }
        assert_eq!(store.turn_count(Some("a")).await, 0);
        assert_eq!(store.turn_count(Some("b")).await, 1);
        assert_eq!(store.turn_count(Some("c")).await, 1);
    }

    #[tokio::test]
    async fn test_record_reply_trims() {
        let store = ConversationStore::new(4, 5, "sys");
        for i in 0..6 {
            store
                .update(None, |c| c.push(ChatTurn::user(format!("q{}", i))))
                .await;
            store.record_reply(None, "a").await;
        }
        assert_eq!(store.turn_count(None).await, 5);
    }
}
