//! services/api/src/adapters/history.rs
//!
//! An in-memory implementation of the `ChatHistoryService` port. Nothing is
//! written back: a chat always reloads the history it was seeded with.

use async_trait::async_trait;
use std::collections::HashMap;
use study_companion_core::{
    domain::{ChatSummary, Message},
    ports::{ChatHistoryService, PortResult},
};

#[derive(Clone, Default)]
pub struct InMemoryHistoryAdapter {
    summaries: Vec<ChatSummary>,
    transcripts: HashMap<String, Vec<Message>>,
}

impl InMemoryHistoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a chat, keeping the order in which chats are added.
    pub fn with_chat(
        mut self,
        id: impl Into<String>,
        title: impl Into<String>,
        messages: Vec<Message>,
    ) -> Self {
        let id = id.into();
        self.summaries.retain(|s| s.id != id);
        self.summaries.push(ChatSummary {
            id: id.clone(),
            title: title.into(),
        });
        self.transcripts.insert(id, messages);
        self
    }

    /// The demo chats a fresh install starts with.
    pub fn with_sample_chats() -> Self {
        Self::new()
            .with_chat(
                "1",
                "Photosynthesis Explained",
                vec![
                    Message::user("Can you explain photosynthesis?").with_id("1"),
                    Message::ai("Of course! Photosynthesis is the process used by plants, algae, and certain bacteria to harness energy from sunlight and turn it into chemical energy.").with_id("2"),
                ],
            )
            .with_chat(
                "2",
                "History of Roman Empire",
                vec![
                    Message::user("Tell me about the Roman Empire.").with_id("1"),
                    Message::ai("The Roman Empire was one of the most influential civilizations in world history, which began in the city of Rome in 753 BC.").with_id("2"),
                ],
            )
            .with_chat("3", "What is a black hole?", Vec::new())
            .with_chat("4", "Quantum Computing Basics", Vec::new())
    }
}

#[async_trait]
impl ChatHistoryService for InMemoryHistoryAdapter {
    async fn list_chats(&self) -> PortResult<Vec<ChatSummary>> {
        Ok(self.summaries.clone())
    }

    async fn load_history(&self, chat_id: &str) -> PortResult<Vec<Message>> {
        Ok(self.transcripts.get(chat_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sample_chats_are_listed_in_order() {
        let history = InMemoryHistoryAdapter::with_sample_chats();
        let ids: Vec<_> = history
            .list_chats()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, ["1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn unknown_and_new_chats_load_empty() {
        let history = InMemoryHistoryAdapter::with_sample_chats();
        assert!(history.load_history("new").await.unwrap().is_empty());
        assert!(history.load_history("missing").await.unwrap().is_empty());
        assert_eq!(history.load_history("2").await.unwrap().len(), 2);
    }
}
