//! crates/study_companion_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any transport or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Boredom level a disengagement report must exceed before an intervention is surfaced.
pub const BOREDOM_THRESHOLD: f64 = 60.0;

/// Placeholder content for a user message that carried a voice recording.
pub const VOICE_MESSAGE_PLACEHOLDER: &str = "[Voice message]";

/// The user message shown for an image sent without a question.
pub const IMAGE_MESSAGE_PLACEHOLDER: &str = "[Image]";

/// Chat identifier that starts an empty conversation.
pub const NEW_CHAT_ID: &str = "new";

//=========================================================================================
// Chat Transcript
//=========================================================================================

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Ai,
}

/// A single labelled bar of a chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPoint {
    pub category: String,
    pub value: f64,
}

/// A chart attached to an AI message. Points are kept in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPayload {
    pub title: String,
    pub points: Vec<ChartPoint>,
}

impl ChartPayload {
    /// The chart attached when the model signals a chart but sends no data for it.
    pub fn untitled() -> Self {
        Self {
            title: "Chart".to_string(),
            points: Vec::new(),
        }
    }
}

/// The outcome of a quiz question answered by the student.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizResult {
    pub question_text: String,
    pub is_correct: bool,
    pub explanation: String,
}

/// One entry in a chat transcript. Immutable once appended to a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: Option<String>,
    pub chart: Option<ChartPayload>,
    pub visual_aid_url: Option<String>,
    pub quiz_result: Option<QuizResult>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn bare(role: Role) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: None,
            chart: None,
            visual_aid_url: None,
            quiz_result: None,
            created_at: Utc::now(),
        }
    }

    /// A user message carrying markdown text.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::bare(Role::User)
        }
    }

    /// An AI message carrying markdown text. Blank text is stored as no content.
    pub fn ai(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            content: (!content.trim().is_empty()).then_some(content),
            ..Self::bare(Role::Ai)
        }
    }

    /// Builds the AI message for a multimodal answer.
    ///
    /// A chart is attached only when the answer says it includes one.
    pub fn from_answer(answer: MultimodalAnswer) -> Self {
        let chart = answer
            .includes_chart
            .then(|| answer.chart.unwrap_or_else(ChartPayload::untitled));
        Self {
            chart,
            ..Self::ai(answer.response)
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// True when the message carries at least one payload worth showing.
    pub fn has_payload(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.trim().is_empty())
            || self.chart.is_some()
            || self.visual_aid_url.is_some()
            || self.quiz_result.is_some()
    }

    /// Empty messages stay in the log but are never rendered, whoever sent them.
    pub fn is_renderable(&self) -> bool {
        self.has_payload()
    }
}

/// An entry of the chat list shown in the sidebar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
}

//=========================================================================================
// Inference Requests and Responses
//=========================================================================================

/// A student query in any combination of text, voice and image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultimodalQuery {
    pub text_query: Option<String>,
    pub voice_data_uri: Option<String>,
    pub image_data_uri: Option<String>,
}

impl MultimodalQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text_query: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn voice(data_uri: impl Into<String>) -> Self {
        Self {
            voice_data_uri: Some(data_uri.into()),
            ..Self::default()
        }
    }

    pub fn image(data_uri: impl Into<String>) -> Self {
        Self {
            image_data_uri: Some(data_uri.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text_query.as_deref().map_or(true, |t| t.trim().is_empty())
            && self.voice_data_uri.is_none()
            && self.image_data_uri.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultimodalAnswer {
    pub response: String,
    pub includes_chart: bool,
    pub chart: Option<ChartPayload>,
}

/// A single camera frame to be checked for disengagement.
#[derive(Debug, Clone, PartialEq)]
pub struct DisengagementCheck {
    pub face_data_uri: String,
    pub learning_module: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisengagementReport {
    pub is_disengaged: bool,
    /// 0 (not bored at all) to 100 (extremely bored).
    pub boredom_level: f64,
    pub suggested_intervention: String,
}

impl DisengagementReport {
    /// Both the flag and the level have to agree before the student is interrupted.
    pub fn warrants_intervention(&self) -> bool {
        self.is_disengaged && self.boredom_level > BOREDOM_THRESHOLD
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Text,
    Voice,
    Image,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Text => "text",
            QueryType::Voice => "voice",
            QueryType::Image => "image",
        }
    }
}

/// A query answered with the student's engagement and history taken into account.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextualQuery {
    pub query: String,
    pub query_type: QueryType,
    pub visual_aids_requested: bool,
    pub student_engagement_level: Option<f64>,
    pub student_history: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContextualAnswer {
    pub response: String,
    pub visual_aids: Option<Vec<String>>,
    pub suggested_intervention: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(is_disengaged: bool, boredom_level: f64) -> DisengagementReport {
        DisengagementReport {
            is_disengaged,
            boredom_level,
            suggested_intervention: "Take a break".to_string(),
        }
    }

    #[test]
    fn intervention_requires_flag_and_level() {
        assert!(report(true, 75.0).warrants_intervention());
        assert!(!report(true, 45.0).warrants_intervention());
        assert!(!report(true, 60.0).warrants_intervention());
        assert!(!report(false, 95.0).warrants_intervention());
    }

    #[test]
    fn chart_attached_only_when_flagged() {
        let chart = ChartPayload {
            title: "Inputs of photosynthesis".to_string(),
            points: vec![ChartPoint {
                category: "Light".to_string(),
                value: 3.0,
            }],
        };

        let with_chart = Message::from_answer(MultimodalAnswer {
            response: "Plants need light.".to_string(),
            includes_chart: true,
            chart: Some(chart.clone()),
        });
        assert_eq!(with_chart.chart, Some(chart.clone()));

        let unflagged = Message::from_answer(MultimodalAnswer {
            response: "Plants need light.".to_string(),
            includes_chart: false,
            chart: Some(chart),
        });
        assert!(unflagged.chart.is_none());

        let flagged_without_data = Message::from_answer(MultimodalAnswer {
            response: String::new(),
            includes_chart: true,
            chart: None,
        });
        assert_eq!(flagged_without_data.chart, Some(ChartPayload::untitled()));
        assert!(flagged_without_data.is_renderable());
    }

    #[test]
    fn empty_ai_message_is_not_renderable() {
        let empty = Message::ai("   ");
        assert!(empty.content.is_none());
        assert!(!empty.is_renderable());
    }

    #[test]
    fn blank_user_message_is_not_renderable() {
        assert!(!Message::user("").is_renderable());
        assert!(!Message::user(" \n").is_renderable());
        assert!(Message::user(VOICE_MESSAGE_PLACEHOLDER).is_renderable());
    }

    #[test]
    fn blank_text_query_is_empty() {
        assert!(MultimodalQuery::text("  \n").is_empty());
        assert!(MultimodalQuery::default().is_empty());
        assert!(!MultimodalQuery::voice("data:audio/wav;base64,AA==").is_empty());
        assert!(!MultimodalQuery::image("data:image/png;base64,AA==").is_empty());
    }
}
