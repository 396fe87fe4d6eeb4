use std::net::SocketAddr;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::chat::ChatbotService;
use crate::config::Settings;
use crate::error::ServiceError;
use crate::models::{
    ChatMessage, ChatResponse, HealthResponse, HealthStatus, ReinitializeResponse,
};

#[derive(Clone)]
struct AppState {
    chatbot: ChatbotService,
}

pub async fn run_server(settings: Settings, chatbot: ChatbotService) -> Result<()> {
    let app = router(&settings, chatbot);

    let addr: SocketAddr = settings.bind_addr.parse()?;
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn router(settings: &Settings, chatbot: ChatbotService) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/chat", post(chat_handler))
        .route("/reinitialize", post(reinitialize))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&settings.allowed_origins))
        .with_state(AppState { chatbot })
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_origin = if allowed_origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                        None
                    }
                }),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", err);
    }
    tracing::info!("shutting down");
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let response = if state.chatbot.is_ready().await {
        HealthResponse {
            status: HealthStatus::Healthy,
            message: "Customer Service Chatbot API is running".to_string(),
        }
    } else {
        HealthResponse {
            status: HealthStatus::Unhealthy,
            message: "Customer Service Chatbot API is running but the chatbot is not initialized"
                .to_string(),
        }
    };
    Json(response)
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatMessage>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload?;
    let answer = state.chatbot.answer(&request.message).await?;
    Ok(Json(answer.into()))
}

async fn reinitialize(
    State(state): State<AppState>,
) -> Result<Json<ReinitializeResponse>, ApiError> {
    state.chatbot.initialize().await.map_err(|err| {
        ApiError::internal(format!("Failed to reinitialize chatbot: {}", err))
    })?;

    Ok(Json(ReinitializeResponse {
        status: "success".to_string(),
        message: "Chatbot reinitialized successfully".to_string(),
    }))
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(value: ServiceError) -> Self {
        let status = match &value {
            ServiceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ServiceError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: value.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "detail": self.message });
        (self.status, Json(body)).into_response()
    }
}
