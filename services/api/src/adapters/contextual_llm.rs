//! services/api/src/adapters/contextual_llm.rs
//!
//! This module contains the adapter for the contextual tutoring LLM, which
//! tailors answers to the student's engagement level and past interactions.
//! It implements the `ContextualResponseService` port from the `core` crate.

const SYSTEM_INSTRUCTIONS: &str = r#"You are an AI assistant for students. Your job is to provide contextual responses to student queries, including textual explanations, charts, and visual aids when appropriate.

Provide a response that is tailored to the context of the query. If the student has requested visual aids, include them in the response as image URLs or short chart descriptions.
If the student's engagement level is low, suggest an intervention to improve their engagement.
Consider the past interaction history to provide a personalized response.
Make sure that the response answers the query properly. Ensure the response is appropriate for the students.

Reply with a single JSON object and nothing else:
{ "response": "<markdown answer>", "visualAids": ["<visual aid>", ...] or null, "suggestedIntervention": "<text>" or null }"#;

use crate::adapters::llm::{complete_json, text_part};
use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use serde::Deserialize;
use study_companion_core::{
    domain::{ContextualAnswer, ContextualQuery},
    ports::{ContextualResponseService, PortError, PortResult},
};

/// An adapter that implements `ContextualResponseService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiContextualAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiContextualAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContextualReply {
    response: String,
    #[serde(default)]
    visual_aids: Option<Vec<String>>,
    #[serde(default)]
    suggested_intervention: Option<String>,
}

impl ContextualReply {
    fn to_domain(self) -> ContextualAnswer {
        ContextualAnswer {
            response: self.response,
            visual_aids: self.visual_aids.filter(|aids| !aids.is_empty()),
            suggested_intervention: self
                .suggested_intervention
                .filter(|s| !s.trim().is_empty()),
        }
    }
}

/// Renders the student's query and its context as the user turn.
fn render_user_input(query: &ContextualQuery) -> String {
    let mut input = format!(
        "The student has asked the following query:\nQuery: {}\nQuery Type: {}\n\nThe student has requested visual aids: {}\n",
        query.query,
        query.query_type.as_str(),
        if query.visual_aids_requested { "Yes" } else { "No" },
    );

    if let Some(level) = query.student_engagement_level {
        input.push_str(&format!(
            "\nThe student's current engagement level is: {}\n",
            level
        ));
    }

    if let Some(history) = query.student_history.as_ref().filter(|h| !h.is_empty()) {
        input.push_str("\nHere is the student's past interaction history:\n");
        for entry in history {
            input.push_str(&format!("- {}\n", entry));
        }
    }

    input
}

#[async_trait]
impl ContextualResponseService for OpenAiContextualAdapter {
    async fn provide_contextual_response(
        &self,
        query: &ContextualQuery,
    ) -> PortResult<ContextualAnswer> {
        if query.query.trim().is_empty() {
            return Err(PortError::InvalidInput("query must not be empty".to_string()));
        }

        let parts = vec![text_part(render_user_input(query))?];
        let reply: ContextualReply =
            complete_json(&self.client, &self.model, SYSTEM_INSTRUCTIONS, parts).await?;
        Ok(reply.to_domain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::llm::parse_structured_reply;
    use study_companion_core::domain::QueryType;

    fn query() -> ContextualQuery {
        ContextualQuery {
            query: "What is a black hole?".to_string(),
            query_type: QueryType::Voice,
            visual_aids_requested: true,
            student_engagement_level: None,
            student_history: None,
        }
    }

    #[test]
    fn optional_context_is_only_rendered_when_present() {
        let bare = render_user_input(&query());
        assert!(bare.contains("Query Type: voice"));
        assert!(bare.contains("visual aids: Yes"));
        assert!(!bare.contains("engagement level"));
        assert!(!bare.contains("interaction history"));

        let full = render_user_input(&ContextualQuery {
            student_engagement_level: Some(35.0),
            student_history: Some(vec!["Asked about stars".to_string()]),
            ..query()
        });
        assert!(full.contains("engagement level is: 35"));
        assert!(full.contains("- Asked about stars"));
    }

    #[test]
    fn empty_optional_fields_collapse_to_none() {
        let reply: ContextualReply = parse_structured_reply(
            r#"{"response": "A region of spacetime...", "visualAids": [], "suggestedIntervention": ""}"#,
        )
        .unwrap();
        let answer = reply.to_domain();
        assert!(answer.visual_aids.is_none());
        assert!(answer.suggested_intervention.is_none());
    }
}
