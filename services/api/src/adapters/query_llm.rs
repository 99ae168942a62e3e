//! services/api/src/adapters/query_llm.rs
//!
//! This module contains the adapter for the student-facing multimodal query LLM.
//! It implements the `QueryAnsweringService` port from the `core` crate.

const SYSTEM_INSTRUCTIONS: &str = r#"You are an AI assistant for students. You will answer their questions to the best of your ability.

You can receive queries in the form of text, voice, or images. Use the appropriate information to answer the question.

Write the answer in markdown. When a small bar chart would make the answer clearer (comparisons, proportions, rankings), include one.

Reply with a single JSON object and nothing else:
{
  "response": "<markdown answer>",
  "includesChart": <true | false>,
  "chart": { "title": "<chart title>", "data": [ { "name": "<category>", "value": <number> } ] } or null
}

"chart" must be null when "includesChart" is false."#;

use crate::adapters::llm::{audio_part, complete_json, image_part, text_part};
use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use serde::Deserialize;
use study_companion_core::{
    domain::{ChartPayload, ChartPoint, MultimodalAnswer, MultimodalQuery},
    ports::{PortError, PortResult, QueryAnsweringService},
};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `QueryAnsweringService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiQueryAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiQueryAdapter {
    /// Creates a new `OpenAiQueryAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// Model Reply Schema
//=========================================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryReply {
    response: String,
    includes_chart: bool,
    #[serde(default)]
    chart: Option<ChartReply>,
}

#[derive(Debug, Deserialize)]
struct ChartReply {
    title: String,
    #[serde(default)]
    data: Vec<ChartPointReply>,
}

#[derive(Debug, Deserialize)]
struct ChartPointReply {
    name: String,
    value: f64,
}

impl QueryReply {
    fn to_domain(self) -> MultimodalAnswer {
        MultimodalAnswer {
            response: self.response,
            includes_chart: self.includes_chart,
            chart: self.chart.map(|chart| ChartPayload {
                title: chart.title,
                points: chart
                    .data
                    .into_iter()
                    .map(|p| ChartPoint {
                        category: p.name,
                        value: p.value,
                    })
                    .collect(),
            }),
        }
    }
}

//=========================================================================================
// `QueryAnsweringService` Trait Implementation
//=========================================================================================

#[async_trait]
impl QueryAnsweringService for OpenAiQueryAdapter {
    async fn process_multimodal_query(
        &self,
        query: &MultimodalQuery,
    ) -> PortResult<MultimodalAnswer> {
        if query.is_empty() {
            return Err(PortError::InvalidInput(
                "a query needs text, voice or an image".to_string(),
            ));
        }

        let mut parts = Vec::new();
        match query.text_query.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(text) => parts.push(text_part(format!("Text Query: {}", text))?),
            None => parts.push(text_part("Text Query: No text query.")?),
        }
        match query.voice_data_uri.as_deref() {
            Some(uri) => {
                parts.push(text_part("Voice Query:")?);
                parts.push(audio_part(uri)?);
            }
            None => parts.push(text_part("Voice Query: No voice query.")?),
        }
        match query.image_data_uri.as_deref() {
            Some(uri) => {
                parts.push(text_part("Image Query:")?);
                parts.push(image_part(uri)?);
            }
            None => parts.push(text_part("Image Query: No image query.")?),
        }

        let reply: QueryReply =
            complete_json(&self.client, &self.model, SYSTEM_INSTRUCTIONS, parts).await?;
        Ok(reply.to_domain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::llm::parse_structured_reply;

    #[test]
    fn chart_reply_maps_to_ordered_points() {
        let reply: QueryReply = parse_structured_reply(
            r#"{
                "response": "Light matters most.",
                "includesChart": true,
                "chart": {
                    "title": "Factors in photosynthesis",
                    "data": [
                        { "name": "Light", "value": 45 },
                        { "name": "Water", "value": 30.5 },
                        { "name": "CO2", "value": 24.5 }
                    ]
                }
            }"#,
        )
        .unwrap();

        let answer = reply.to_domain();
        assert!(answer.includes_chart);
        let chart = answer.chart.unwrap();
        assert_eq!(chart.title, "Factors in photosynthesis");
        let categories: Vec<_> = chart.points.iter().map(|p| p.category.as_str()).collect();
        assert_eq!(categories, ["Light", "Water", "CO2"]);
        assert_eq!(chart.points[1].value, 30.5);
    }

    #[test]
    fn null_chart_is_accepted() {
        let reply: QueryReply = parse_structured_reply(
            r#"{ "response": "Hi!", "includesChart": false, "chart": null }"#,
        )
        .unwrap();
        let answer = reply.to_domain();
        assert!(!answer.includes_chart);
        assert!(answer.chart.is_none());
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let result: PortResult<QueryReply> =
            parse_structured_reply(r#"{ "response": "Hi!" }"#);
        assert!(matches!(result, Err(PortError::RemoteCallFailed(_))));
    }
}
