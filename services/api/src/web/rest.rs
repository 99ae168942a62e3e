//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::{
    protocol::{ChartDto, ChartPointDto, ChatSummaryDto, MessageDto, QuizResultDto, RoleDto},
    state::AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use study_companion_core::{
    domain::{ContextualQuery, QueryType},
    ports::PortError,
};
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        list_chats_handler,
        chat_messages_handler,
        contextual_response_handler,
    ),
    components(
        schemas(
            ChatSummaryDto,
            MessageDto,
            RoleDto,
            ChartDto,
            ChartPointDto,
            QuizResultDto,
            QueryTypeDto,
            ContextualResponseRequest,
            ContextualResponseBody,
        )
    ),
    tags(
        (name = "Study Companion API", description = "API endpoints for the student chat companion.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueryTypeDto {
    Text,
    Voice,
    Image,
}

impl From<QueryTypeDto> for QueryType {
    fn from(dto: QueryTypeDto) -> Self {
        match dto {
            QueryTypeDto::Text => QueryType::Text,
            QueryTypeDto::Voice => QueryType::Voice,
            QueryTypeDto::Image => QueryType::Image,
        }
    }
}

/// A query to answer with the student's engagement and history in mind.
#[derive(Deserialize, Debug, ToSchema)]
pub struct ContextualResponseRequest {
    pub query: String,
    pub query_type: QueryTypeDto,
    #[serde(default)]
    pub visual_aids_requested: bool,
    /// Current engagement on a 0-100 scale, if known.
    #[serde(default)]
    pub student_engagement_level: Option<f64>,
    /// Short notes about what the student studied or asked before.
    #[serde(default)]
    pub student_history: Option<Vec<String>>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ContextualResponseBody {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_aids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_intervention: Option<String>,
}

fn port_error_response(e: PortError) -> (StatusCode, String) {
    let status = match &e {
        PortError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::RemoteCallFailed(_) => StatusCode::BAD_GATEWAY,
        PortError::PermissionDenied(_) | PortError::Unexpected(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List the chats shown in the sidebar.
#[utoipa::path(
    get,
    path = "/chats",
    responses(
        (status = 200, description = "Chats in display order", body = [ChatSummaryDto]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_chats_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<ChatSummaryDto>>, (StatusCode, String)> {
    let chats = app_state.history.list_chats().await.map_err(|e| {
        error!("Failed to list chats: {:?}", e);
        port_error_response(e)
    })?;

    Ok(Json(chats.into_iter().map(ChatSummaryDto::from).collect()))
}

/// Get the visible messages of one chat. Unknown chats are empty.
#[utoipa::path(
    get,
    path = "/chats/{chat_id}/messages",
    responses(
        (status = 200, description = "Messages in chronological order", body = [MessageDto]),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("chat_id" = String, Path, description = "The chat to load, or `new` for an empty chat.")
    )
)]
pub async fn chat_messages_handler(
    State(app_state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Result<Json<Vec<MessageDto>>, (StatusCode, String)> {
    let history = app_state.history.load_history(&chat_id).await.map_err(|e| {
        error!("Failed to load chat '{}': {:?}", chat_id, e);
        port_error_response(e)
    })?;

    Ok(Json(
        history
            .iter()
            .filter(|m| m.is_renderable())
            .map(MessageDto::from)
            .collect(),
    ))
}

/// Answer a query with the student's engagement level and history as context.
#[utoipa::path(
    post,
    path = "/contextual-response",
    request_body = ContextualResponseRequest,
    responses(
        (status = 200, description = "The tailored answer", body = ContextualResponseBody),
        (status = 400, description = "Bad request (e.g., empty query)"),
        (status = 502, description = "The model call failed")
    )
)]
pub async fn contextual_response_handler(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<ContextualResponseRequest>,
) -> Result<Json<ContextualResponseBody>, (StatusCode, String)> {
    if request.query.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "query must not be empty".to_string()));
    }
    if let Some(level) = request.student_engagement_level {
        if !(0.0..=100.0).contains(&level) {
            return Err((
                StatusCode::BAD_REQUEST,
                "student_engagement_level must be between 0 and 100".to_string(),
            ));
        }
    }

    let query = ContextualQuery {
        query: request.query,
        query_type: request.query_type.into(),
        visual_aids_requested: request.visual_aids_requested,
        student_engagement_level: request.student_engagement_level,
        student_history: request.student_history,
    };
    info!(
        "Contextual response requested ({} query).",
        query.query_type.as_str()
    );

    let answer = app_state
        .contextual_adapter
        .provide_contextual_response(&query)
        .await
        .map_err(|e| {
            warn!("Contextual response failed: {}", e);
            port_error_response(e)
        })?;

    Ok(Json(ContextualResponseBody {
        response: answer.response,
        visual_aids: answer.visual_aids,
        suggested_intervention: answer.suggested_intervention,
    }))
}
