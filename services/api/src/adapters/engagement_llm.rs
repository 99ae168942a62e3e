//! services/api/src/adapters/engagement_llm.rs
//!
//! This module contains the adapter for the facial-expression disengagement LLM.
//! It implements the `EngagementDetectionService` port from the `core` crate.

const SYSTEM_INSTRUCTIONS: &str = r#"You are an AI assistant that analyzes student facial expressions to detect disengagement and suggests interventions.

You will receive an image of the student's face and the name of the current learning module.

Based on the facial expression, determine if the student is disengaged. Provide a boredom level from 0-100 (0 being not bored at all, 100 being extremely bored).

If the student is disengaged, suggest an intervention such as an alternative learning module or explanation. Keep it to one or two friendly sentences addressed to the student.

Reply with a single JSON object and nothing else:
{ "isDisengaged": <true | false>, "boredomLevel": <number 0-100>, "suggestedIntervention": "<text>" }"#;

/// Shown when the model flags disengagement but offers no suggestion of its own.
const FALLBACK_INTERVENTION: &str = "You seem a bit bored. How about a short break?";

use crate::adapters::llm::{complete_json, image_part, text_part};
use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use serde::Deserialize;
use study_companion_core::{
    domain::{DisengagementCheck, DisengagementReport},
    ports::{EngagementDetectionService, PortError, PortResult},
};

/// An adapter that implements `EngagementDetectionService` using a vision-capable LLM.
#[derive(Clone)]
pub struct OpenAiEngagementAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEngagementAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisengagementReply {
    is_disengaged: bool,
    boredom_level: f64,
    #[serde(default)]
    suggested_intervention: String,
}

impl DisengagementReply {
    fn to_domain(self) -> PortResult<DisengagementReport> {
        if !self.boredom_level.is_finite() {
            return Err(PortError::RemoteCallFailed(
                "boredom level is not a number".to_string(),
            ));
        }
        let suggestion = self.suggested_intervention.trim();
        let suggested_intervention = if suggestion.is_empty() && self.is_disengaged {
            FALLBACK_INTERVENTION.to_string()
        } else {
            suggestion.to_string()
        };

        Ok(DisengagementReport {
            is_disengaged: self.is_disengaged,
            boredom_level: self.boredom_level.clamp(0.0, 100.0),
            suggested_intervention,
        })
    }
}

#[async_trait]
impl EngagementDetectionService for OpenAiEngagementAdapter {
    async fn detect_student_disengagement(
        &self,
        check: &DisengagementCheck,
    ) -> PortResult<DisengagementReport> {
        let parts = vec![
            text_part("Face Image:")?,
            image_part(&check.face_data_uri)?,
            text_part(format!("Learning Module: {}", check.learning_module))?,
        ];

        let reply: DisengagementReply =
            complete_json(&self.client, &self.model, SYSTEM_INSTRUCTIONS, parts).await?;
        reply.to_domain()
    }
}
