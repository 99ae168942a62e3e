//! services/api/src/bin/companion.rs

use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::{
    routing::{get, post},
    Router,
};
use companion_lib::{
    adapters::{
        llm::build_client, InMemoryHistoryAdapter, OpenAiContextualAdapter,
        OpenAiEngagementAdapter, OpenAiQueryAdapter,
    },
    config::Config,
    error::ApiError,
    web::{
        chat_messages_handler, contextual_response_handler, list_chats_handler, rest::ApiDoc,
        state::AppState, ws_handler,
    },
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Initialize Service Adapters ---
    let openai_client = build_client(
        config.require_api_key()?,
        config.openai_base_url.as_deref(),
    );
    if let Some(base_url) = &config.openai_base_url {
        info!("Using model endpoint at {}", base_url);
    }

    let query_adapter = Arc::new(OpenAiQueryAdapter::new(
        openai_client.clone(),
        config.query_model.clone(),
    ));
    let engagement_adapter = Arc::new(OpenAiEngagementAdapter::new(
        openai_client.clone(),
        config.engagement_model.clone(),
    ));
    let contextual_adapter = Arc::new(OpenAiContextualAdapter::new(
        openai_client,
        config.contextual_model.clone(),
    ));

    let history = if config.seed_sample_chats {
        info!("Seeding the sample chats.");
        InMemoryHistoryAdapter::with_sample_chats()
    } else {
        InMemoryHistoryAdapter::new()
    };

    // --- 3. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        config: config.clone(),
        history: Arc::new(history),
        query_adapter,
        engagement_adapter,
        contextual_adapter,
    });

    let cors_origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!(
            "Invalid CORS origin '{}': {}",
            config.cors_origin, e
        ))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // --- 4. Create the Web Router ---
    let api_router = Router::new()
        .route("/chats", get(list_chats_handler))
        .route("/chats/{chat_id}/messages", get(chat_messages_handler))
        .route("/contextual-response", post(contextual_response_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
