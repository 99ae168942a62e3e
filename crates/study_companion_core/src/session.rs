//! crates/study_companion_core/src/session.rs
//!
//! The in-memory transcript of the active chat.

use uuid::Uuid;

use crate::domain::Message;

/// An append-only transcript plus the single "awaiting response" flag.
///
/// A session is never merged with another one: selecting a different chat builds
/// a fresh session from that chat's history. Each load gets its own
/// `instance_id` so late results can tell whether they still belong here.
#[derive(Debug)]
pub struct ChatSession {
    chat_id: String,
    instance_id: Uuid,
    messages: Vec<Message>,
    awaiting_response: bool,
}

impl ChatSession {
    pub fn new(chat_id: impl Into<String>, history: Vec<Message>) -> Self {
        Self {
            chat_id: chat_id.into(),
            instance_id: Uuid::new_v4(),
            messages: history,
            awaiting_response: false,
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages in display order, without the empty AI entries.
    pub fn visible_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.is_renderable())
    }

    /// Adds a message to the end of the transcript and returns the stored entry.
    pub fn append(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    pub fn set_awaiting_response(&mut self, awaiting: bool) {
        self.awaiting_response = awaiting;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;

    #[test]
    fn append_preserves_insertion_order() {
        let mut session = ChatSession::new("new", Vec::new());
        session.append(Message::user("first"));
        session.append(Message::ai("second"));
        session.append(Message::user("third"));

        let contents: Vec<_> = session
            .messages()
            .iter()
            .map(|m| m.content.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(contents, ["first", "second", "third"]);
    }

    #[test]
    fn empty_ai_messages_are_logged_but_hidden() {
        let mut session = ChatSession::new("1", vec![Message::user("hi")]);
        session.append(Message::ai(""));
        session.append(Message::ai("hello"));

        assert_eq!(session.messages().len(), 3);
        let visible: Vec<_> = session.visible_messages().collect();
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[1].role, Role::Ai);
    }

    #[test]
    fn each_load_gets_a_new_instance() {
        let first = ChatSession::new("1", Vec::new());
        let second = ChatSession::new("1", Vec::new());
        assert_ne!(first.instance_id(), second.instance_id());
        assert!(!first.is_awaiting_response());
    }
}
