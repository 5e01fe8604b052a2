use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{post, MethodRouter},
    Json, Router,
};
use sdm_automation::{AutomationConfig, AutomationError, Policy, ServiceDesk, SessionLauncher};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::types::{RunRequest, RunResponse};

pub struct AppState {
    pub launcher: Arc<dyn SessionLauncher>,
    pub config: AutomationConfig,
}

/// `POST /` and `POST /api/run`; any other method gets a JSON 405.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", run_route())
        .route("/api/run", run_route())
        .with_state(Arc::new(state))
}

fn run_route() -> MethodRouter<Arc<AppState>> {
    post(run).fallback(method_not_allowed)
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    MethodNotAllowed,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "Method not allowed".to_string(),
            ),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<AutomationError> for ApiError {
    fn from(err: AutomationError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

// ============================================================================
// Run
// ============================================================================

pub async fn run(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<RunResponse>, ApiError> {
    let request = RunRequest::from_body(&body)
        .ok_or_else(|| ApiError::BadRequest("Request number required".to_string()))?;
    info!(
        "📥 POST run - request {} ({}) tasks {:?}",
        request.request_number, request.ticket_type, request.tasks
    );

    let service = ServiceDesk::launch(state.launcher.as_ref(), state.config.clone())
        .await
        .map_err(|e| {
            error!("❌ Browser launch failed: {}", e);
            ApiError::from(e)
        })?;

    service.open_search().await;
    let result = service
        .run_ticket(
            &request.request_number,
            Some(&request.ticket_type),
            &request.tasks,
            Policy::Lenient,
            None,
        )
        .await;

    if let Err(e) = service.close().await {
        warn!("Closing browser failed: {}", e);
    }

    let results = result.map_err(|e| {
        error!("❌ Request {} failed: {}", request.request_number, e);
        ApiError::from(e)
    })?;
    info!("✅ Request {} done", request.request_number);

    Ok(Json(RunResponse {
        success: true,
        request_number: request.request_number,
        ticket_type: request.ticket_type,
        results,
    }))
}
