use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Local time the message was stored; display only.
    pub sent_at: DateTime<Local>,
}

impl ChatMessage {
    pub fn new(role: Role, content: &str) -> ChatMessage {
        ChatMessage {
            role,
            content: content.to_string(),
            sent_at: Local::now(),
        }
    }

    pub fn user(content: &str) -> ChatMessage {
        ChatMessage::new(Role::User, content)
    }

    pub fn assistant(content: &str) -> ChatMessage {
        ChatMessage::new(Role::Assistant, content)
    }
}

/// Chat histories keyed by conversation context (a portfolio name).
///
/// Histories only ever grow; nothing is removed for the lifetime of the
/// session that owns the store.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    chats: HashMap<String, Vec<ChatMessage>>,
}

impl ConversationStore {
    pub fn new() -> ConversationStore {
        ConversationStore::default()
    }

    pub fn get(&self, context: &str) -> &[ChatMessage] {
        self.chats.get(context).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn append(&mut self, context: &str, message: ChatMessage) {
        self.chats
            .entry(context.to_string())
            .or_default()
            .push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_unknown_context_is_empty() {
        let store = ConversationStore::new();
        assert!(store.get("Nope").is_empty());
    }

    #[test]
    fn test_append_is_monotonic() {
        let mut store = ConversationStore::new();
        store.append("A", ChatMessage::user("first"));
        store.append("A", ChatMessage::assistant("first reply"));
        let before: Vec<ChatMessage> = store.get("A").to_vec();

        store.append("A", ChatMessage::user("second"));
        store.append("A", ChatMessage::assistant("second reply"));

        let history = store.get("A");
        assert_eq!(history.len(), 4);
        assert_eq!(&history[..2], before.as_slice());
        assert_eq!(history[2].role, Role::User);
        assert_eq!(history[2].content, "second");
        assert_eq!(history[3].role, Role::Assistant);
        assert_eq!(history[3].content, "second reply");
    }

    #[test]
    fn test_contexts_are_independent() {
        let mut store = ConversationStore::new();
        store.append("A", ChatMessage::user("hello A"));
        store.append("B", ChatMessage::user("hello B"));

        assert_eq!(store.get("A").len(), 1);
        assert_eq!(store.get("B")[0].content, "hello B");
    }
}
