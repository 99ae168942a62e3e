//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API server
//! for the study companion chat, plus the wire shapes shared with the REST endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use study_companion_core::domain::{ChartPayload, ChatSummary, Message, QuizResult, Role};
use tokio::sync::mpsc;
use utoipa::ToSchema;

/// The per-connection queue of events waiting to be written to the socket.
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================
// NOTE: While a voice recording is active, microphone audio is sent as raw Binary
// frames of PCM16-LE mono samples, not as part of this enum.
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Loads a chat. This must be the first message sent on the connection.
    Init { chat_id: String },

    /// Replaces the active chat with another one (or `"new"` for an empty chat).
    SwitchChat { chat_id: String },

    /// Submits a typed question.
    SendText { text: String },

    /// Submits an image as a data URI, optionally with a question about it.
    SendImage {
        data: String,
        #[serde(default)]
        text: Option<String>,
    },

    /// Starts a voice recording, or stops the active one and submits it.
    ToggleVoice {
        #[serde(default)]
        sample_rate: Option<u32>,
    },

    /// Reports which devices the user allowed the page to use.
    DevicePermissions { microphone: bool, camera: bool },

    /// Turns the real-time engagement detection on or off.
    SetEngagementDetection {
        enabled: bool,
        #[serde(default)]
        learning_module: Option<String>,
    },

    /// A camera frame (base64 PNG or JPEG) for the engagement detection feed.
    VideoFrame { data: String },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationVariant {
    Default,
    Destructive,
}

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The full visible transcript of the chat that just became active.
    SessionLoaded {
        chat_id: String,
        messages: Vec<MessageDto>,
    },

    /// A new message at the end of the transcript. The client scrolls to it.
    MessageAppended { chat_id: String, message: MessageDto },

    /// Whether an AI response is outstanding. Send and voice input stay disabled while true.
    AwaitingResponse { awaiting: bool },

    RecordingChanged { recording: bool },

    EngagementDetectionChanged { enabled: bool },

    /// A transient toast for the user.
    Notification {
        title: String,
        description: String,
        variant: NotificationVariant,
    },

    /// Reports a protocol error to the client.
    Error { message: String },
}

impl ServerMessage {
    pub fn notification(title: &str, description: impl Into<String>) -> Self {
        Self::Notification {
            title: title.to_string(),
            description: description.into(),
            variant: NotificationVariant::Default,
        }
    }

    pub fn failure(title: &str, description: impl Into<String>) -> Self {
        Self::Notification {
            title: title.to_string(),
            description: description.into(),
            variant: NotificationVariant::Destructive,
        }
    }

    pub fn session_loaded<'a>(
        chat_id: &str,
        messages: impl IntoIterator<Item = &'a Message>,
    ) -> Self {
        Self::SessionLoaded {
            chat_id: chat_id.to_string(),
            messages: messages.into_iter().map(MessageDto::from).collect(),
        }
    }

    pub fn message_appended(chat_id: &str, message: &Message) -> Self {
        Self::MessageAppended {
            chat_id: chat_id.to_string(),
            message: message.into(),
        }
    }
}

//=========================================================================================
// Wire Shapes of Domain Types
//=========================================================================================

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoleDto {
    User,
    Ai,
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct ChartPointDto {
    pub name: String,
    pub value: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct ChartDto {
    pub title: String,
    pub data: Vec<ChartPointDto>,
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct QuizResultDto {
    pub question: String,
    pub correct: bool,
    pub explanation: String,
}

/// One chat message as rendered by the client.
#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct MessageDto {
    pub id: String,
    #[serde(rename = "type")]
    pub role: RoleDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_data: Option<ChartDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_aid_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz_result: Option<QuizResultDto>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct ChatSummaryDto {
    pub id: String,
    pub title: String,
}

impl From<&ChartPayload> for ChartDto {
    fn from(chart: &ChartPayload) -> Self {
        Self {
            title: chart.title.clone(),
            data: chart
                .points
                .iter()
                .map(|p| ChartPointDto {
                    name: p.category.clone(),
                    value: p.value,
                })
                .collect(),
        }
    }
}

impl From<&QuizResult> for QuizResultDto {
    fn from(result: &QuizResult) -> Self {
        Self {
            question: result.question_text.clone(),
            correct: result.is_correct,
            explanation: result.explanation.clone(),
        }
    }
}

impl From<&Message> for MessageDto {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            role: match message.role {
                Role::User => RoleDto::User,
                Role::Ai => RoleDto::Ai,
            },
            content: message.content.clone(),
            chart_data: message.chart.as_ref().map(ChartDto::from),
            visual_aid_url: message.visual_aid_url.clone(),
            quiz_result: message.quiz_result.as_ref().map(QuizResultDto::from),
            created_at: message.created_at,
        }
    }
}

impl From<ChatSummary> for ChatSummaryDto {
    fn from(summary: ChatSummary) -> Self {
        Self {
            id: summary.id,
            title: summary.title,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use study_companion_core::domain::ChartPoint;

    #[test]
    fn client_messages_use_snake_case_tags() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"send_text","text":"Explain photosynthesis"}"#)
                .unwrap();
        assert!(matches!(msg, ClientMessage::SendText { ref text } if text == "Explain photosynthesis"));

        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"send_image","data":"data:image/png;base64,iVBORw0KGgo="}"#,
        )
        .unwrap();
        assert!(matches!(msg, ClientMessage::SendImage { text: None, .. }));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"toggle_voice"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::ToggleVoice { sample_rate: None }));

        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"set_engagement_detection","enabled":true}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::SetEngagementDetection { enabled: true, learning_module: None }
        ));
    }

    #[test]
    fn ai_message_with_chart_serializes_like_the_client_expects() {
        let message = Message {
            chart: Some(ChartPayload {
                title: "Inputs".to_string(),
                points: vec![ChartPoint {
                    category: "Light".to_string(),
                    value: 2.0,
                }],
            }),
            ..Message::ai("Here you go.").with_id("7")
        };

        let value = serde_json::to_value(ServerMessage::message_appended("1", &message)).unwrap();
        assert_eq!(value["type"], "message_appended");
        assert_eq!(value["chat_id"], "1");
        assert_eq!(value["message"]["id"], "7");
        assert_eq!(value["message"]["type"], "ai");
        assert_eq!(
            value["message"]["chart_data"],
            json!({ "title": "Inputs", "data": [{ "name": "Light", "value": 2.0 }] })
        );
        assert!(value["message"].get("quiz_result").is_none());
    }

    #[test]
    fn notifications_carry_their_variant() {
        let value =
            serde_json::to_value(ServerMessage::failure("Webcam Error", "Could not access webcam."))
                .unwrap();
        assert_eq!(value["type"], "notification");
        assert_eq!(value["variant"], "destructive");
    }
}
